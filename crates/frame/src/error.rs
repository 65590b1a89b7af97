use std::time::Duration;

use crate::SlotIndex;

/// Errors from constructing or waiting on the frame gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("frame capacity must be in 1..={max}, got {requested}")]
    InvalidCapacity { requested: usize, max: usize },
    #[error("timed out after {waited:?} waiting for frame slot {slot}")]
    Timeout { slot: SlotIndex, waited: Duration },
}
