//! Frames in flight: a fixed pool of per-frame slots guarded by a counting gate.
//!
//! # Invariants
//! - `0 <= available <= capacity` at all times.
//! - A slot is written by the production thread only between its `acquire`
//!   and its hand-off to the GPU; it is reused only after the matching
//!   `release` for that same slot.
//! - Releasing a slot that is not held is a logic bug and panics.
//!
//! The pool never blocks. Blocking lives entirely in [`FrameSynchronizer`],
//! composed in front of the pool by the renderer.

mod error;
mod pool;
mod sync;
mod timer;

pub use error::SyncError;
pub use pool::{FramePool, SlotIndex};
pub use sync::{FrameCompletion, FrameSynchronizer, MAX_FRAMES_IN_FLIGHT, SlotState};
pub use timer::FrameTimer;

pub fn crate_info() -> &'static str {
    "metalwerk-frame v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("frame"));
    }
}
