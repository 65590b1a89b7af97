//! Renderer core: drives one frame at a time through a bounded set of
//! in-flight slots.
//!
//! # Invariants
//! - Every acquired slot is released exactly once, including when the
//!   queue rejects the submission.
//! - A resize only affects frames produced after it.
//! - The renderer never owns the device or surface; it talks to a
//!   [`CommandQueue`] handed in by the host.

mod config;
mod error;
mod frame;
mod queue;
mod renderer;

pub use config::{DrawableSize, RendererConfig};
pub use error::RenderError;
pub use frame::{CameraState, FramePhase, FrameReport, FrameSubmission, FrameUniforms};
pub use queue::{CommandQueue, ImmediateQueue, QueueError, SubmitFailure, ThreadedQueue};
pub use renderer::{DebugFrameProducer, FrameProducer, Renderer};

pub fn crate_info() -> &'static str {
    "metalwerk-render v0.1.0"
}
