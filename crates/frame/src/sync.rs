use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::{SlotIndex, SyncError};

/// Upper bound on frames in flight. Real renderers use 2 or 3.
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// Ownership of a single slot, as seen by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Back in the pool; the next `acquire` of this slot proceeds at once.
    Free,
    /// Held by the production thread, which may write the slot's buffer.
    Acquired { frame: u64 },
    /// Handed to the GPU; waiting for its completion notification.
    Submitted { frame: u64 },
}

#[derive(Debug)]
struct GateState {
    available: usize,
    slots: Vec<SlotState>,
    completed: u64,
}

/// Counting gate that bounds the number of frames in flight.
///
/// Equivalent to a semaphore initialised to `capacity`, except that each
/// permit is tied to a slot index: `acquire(slot)` waits for that exact slot
/// to come back, so a slot is never rewritten while the GPU may read it.
/// With a round-robin pool in front and in-order GPU completion the two
/// behave identically.
///
/// `acquire` runs on the production thread and is the only blocking call.
/// `release` runs on whichever thread delivers GPU completion.
pub struct FrameSynchronizer {
    capacity: usize,
    state: Mutex<GateState>,
    freed: Condvar,
}

impl FrameSynchronizer {
    pub fn new(capacity: usize) -> Result<Arc<Self>, SyncError> {
        if capacity == 0 || capacity > MAX_FRAMES_IN_FLIGHT {
            return Err(SyncError::InvalidCapacity {
                requested: capacity,
                max: MAX_FRAMES_IN_FLIGHT,
            });
        }
        Ok(Arc::new(Self {
            capacity,
            state: Mutex::new(GateState {
                available: capacity,
                slots: vec![SlotState::Free; capacity],
                completed: 0,
            }),
            freed: Condvar::new(),
        }))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.lock().available
    }

    pub fn slot_state(&self, slot: SlotIndex) -> SlotState {
        self.check_index(slot);
        self.lock().slots[slot.0]
    }

    /// Number of releases observed since construction.
    pub fn completed_frames(&self) -> u64 {
        self.lock().completed
    }

    /// Block until `slot` is free, then take it for `frame`.
    ///
    /// The returned token is the only way (besides a raw [`release`]) to give
    /// the slot back; hand it to the GPU completion path.
    ///
    /// [`release`]: FrameSynchronizer::release
    pub fn acquire(self: &Arc<Self>, slot: SlotIndex, frame: u64) -> FrameCompletion {
        self.check_index(slot);
        let guard = self.lock();
        if guard.slots[slot.0] != SlotState::Free {
            tracing::debug!(%slot, frame, "frame slot busy, waiting for GPU");
        }
        let mut guard = self
            .freed
            .wait_while(guard, |s| s.slots[slot.0] != SlotState::Free)
            .unwrap_or_else(PoisonError::into_inner);
        self.take(&mut guard, slot, frame)
    }

    /// Take `slot` only if it is free right now.
    pub fn try_acquire(self: &Arc<Self>, slot: SlotIndex, frame: u64) -> Option<FrameCompletion> {
        self.check_index(slot);
        let mut guard = self.lock();
        if guard.slots[slot.0] != SlotState::Free {
            return None;
        }
        Some(self.take(&mut guard, slot, frame))
    }

    /// [`acquire`](FrameSynchronizer::acquire) with an upper bound on the wait.
    pub fn acquire_timeout(
        self: &Arc<Self>,
        slot: SlotIndex,
        frame: u64,
        timeout: Duration,
    ) -> Result<FrameCompletion, SyncError> {
        self.check_index(slot);
        let (mut guard, result) = self
            .freed
            .wait_timeout_while(self.lock(), timeout, |s| {
                s.slots[slot.0] != SlotState::Free
            })
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() {
            tracing::warn!(%slot, frame, ?timeout, "frame slot acquire timed out");
            return Err(SyncError::Timeout {
                slot,
                waited: timeout,
            });
        }
        Ok(self.take(&mut guard, slot, frame))
    }

    /// Record that the frame in `slot` has been handed to the GPU.
    ///
    /// # Panics
    /// If the slot is not currently acquired.
    pub fn mark_submitted(&self, slot: SlotIndex) {
        self.check_index(slot);
        let mut guard = self.lock();
        match guard.slots[slot.0] {
            SlotState::Acquired { frame } => {
                guard.slots[slot.0] = SlotState::Submitted { frame };
            }
            other => {
                drop(guard);
                panic!("frame slot {slot} marked submitted while {other:?}");
            }
        }
    }

    /// Return `slot` to the pool and wake the producer waiting on it.
    ///
    /// # Panics
    /// If the slot is already free (double release). This is a logic bug,
    /// never clamped.
    pub fn release(&self, slot: SlotIndex) {
        self.check_index(slot);
        let mut guard = self.lock();
        let frame = match guard.slots[slot.0] {
            SlotState::Acquired { frame } | SlotState::Submitted { frame } => frame,
            SlotState::Free => {
                drop(guard);
                panic!("double release of frame slot {slot}");
            }
        };
        guard.slots[slot.0] = SlotState::Free;
        guard.available += 1;
        guard.completed += 1;
        assert!(
            guard.available <= self.capacity,
            "available permits {} exceed capacity {}",
            guard.available,
            self.capacity
        );
        tracing::trace!(%slot, frame, available = guard.available, "frame slot released");
        drop(guard);
        // Waiters are keyed by slot, so every waiter must re-check; only the
        // one waiting on `slot` can proceed.
        self.freed.notify_all();
    }

    /// Block until every permit has returned. Call before tearing down
    /// anything the GPU may still reference.
    pub fn wait_idle(&self) {
        let _guard = self
            .freed
            .wait_while(self.lock(), |s| s.available < self.capacity)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// [`wait_idle`](FrameSynchronizer::wait_idle) with an upper bound.
    /// Returns `false` if frames were still in flight when the time ran out.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let (_guard, result) = self
            .freed
            .wait_timeout_while(self.lock(), timeout, |s| s.available < self.capacity)
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }

    fn take(
        self: &Arc<Self>,
        guard: &mut MutexGuard<'_, GateState>,
        slot: SlotIndex,
        frame: u64,
    ) -> FrameCompletion {
        guard.slots[slot.0] = SlotState::Acquired { frame };
        guard.available -= 1;
        tracing::trace!(%slot, frame, available = guard.available, "frame slot acquired");
        FrameCompletion {
            sync: Some(Arc::clone(self)),
            slot,
            frame,
        }
    }

    fn check_index(&self, slot: SlotIndex) {
        assert!(
            slot.0 < self.capacity,
            "frame slot {slot} out of range for capacity {}",
            self.capacity
        );
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for FrameSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("FrameSynchronizer")
            .field("capacity", &self.capacity)
            .field("available", &state.available)
            .field("slots", &state.slots)
            .finish()
    }
}

/// One-shot completion message for a frame in flight.
///
/// Created by `acquire` and delivered by the GPU completion path through
/// [`signal`](FrameCompletion::signal), which releases exactly the slot it
/// was acquired for. Consuming `self` makes a second signal impossible.
///
/// Dropping a token without signalling leaves its slot held forever; the
/// drop is logged at error level so the stall can be traced.
#[must_use = "an unsignalled completion leaks its frame slot"]
pub struct FrameCompletion {
    sync: Option<Arc<FrameSynchronizer>>,
    slot: SlotIndex,
    frame: u64,
}

impl FrameCompletion {
    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Deliver the completion: the slot returns to the pool.
    pub fn signal(mut self) {
        if let Some(sync) = self.sync.take() {
            tracing::trace!(slot = %self.slot, frame = self.frame, "frame completed");
            sync.release(self.slot);
        }
    }
}

impl Drop for FrameCompletion {
    fn drop(&mut self) {
        if self.sync.is_some() {
            tracing::error!(
                slot = %self.slot,
                frame = self.frame,
                "frame completion dropped without signal, slot stays in flight"
            );
        }
    }
}

impl fmt::Debug for FrameCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCompletion")
            .field("slot", &self.slot)
            .field("frame", &self.frame)
            .finish()
    }
}
