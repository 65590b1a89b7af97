use std::fmt;

use crate::SyncError;
use crate::sync::MAX_FRAMES_IN_FLIGHT;

/// Index of a frame slot, in `0..capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(pub usize);

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed ring of per-frame resources handed out in round-robin order.
///
/// Slots are allocated once and reused forever. The pool itself never blocks;
/// whether a slot may be written is decided by the synchronizer.
#[derive(Debug)]
pub struct FramePool<T> {
    slots: Vec<T>,
    cursor: usize,
}

impl<T> FramePool<T> {
    /// Build `count` slots, calling `init` once per slot index.
    pub fn new(count: usize, mut init: impl FnMut(SlotIndex) -> T) -> Result<Self, SyncError> {
        if count == 0 || count > MAX_FRAMES_IN_FLIGHT {
            return Err(SyncError::InvalidCapacity {
                requested: count,
                max: MAX_FRAMES_IN_FLIGHT,
            });
        }
        Ok(Self {
            slots: (0..count).map(|i| init(SlotIndex(i))).collect(),
            cursor: 0,
        })
    }

    /// Next slot in the ring. The first call returns slot 0, then 1, and so
    /// on, wrapping at `len()`.
    pub fn next_slot(&mut self) -> SlotIndex {
        let index = SlotIndex(self.cursor);
        self.cursor = (self.cursor + 1) % self.slots.len();
        index
    }

    pub fn get(&self, index: SlotIndex) -> &T {
        &self.slots[index.0]
    }

    pub fn get_mut(&mut self, index: SlotIndex) -> &mut T {
        &mut self.slots[index.0]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, &T)> {
        self.slots.iter().enumerate().map(|(i, s)| (SlotIndex(i), s))
    }
}
