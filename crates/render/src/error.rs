use metalwerk_frame::SyncError;
use metalwerk_math::MathError;

use crate::QueueError;

/// Errors surfaced by the renderer core.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("invalid renderer configuration: {0}")]
    Config(String),
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error(transparent)]
    Math(#[from] MathError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("frame {frame} submission failed: {source}")]
    Submission {
        frame: u64,
        #[source]
        source: QueueError,
    },
}
