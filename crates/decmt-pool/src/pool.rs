//! Bounded pool of reusable job slots.
//!
//! A [`JobPool`] owns a fixed number of slots. Producers check a slot out with
//! [`JobPool::acquire_empty`], tag it with a job and publish it with
//! [`JobPool::post_full`]. Consumers pop published slots in posting order with
//! [`JobPool::get_full_nonblocking`] or [`JobPool::get_full_blocking`] and hand them back
//! with [`JobPool::release`].
//!
//! # Slot lifecycle
//!
//! ```text
//! Free ──acquire_empty──▶ CheckedOut ──post_full──▶ Filled ──get_full──▶ Processing
//!  ▲                          │                                             │
//!  └──────── drop ────────────┘◀──────────────── release / drop ────────────┘
//! ```
//!
//! A slot is in exactly one state at a time. Dropping an [`EmptySlot`] that was never
//! posted, or a [`FullSlot`] that was never released, returns the slot to the free list.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crossbeam_queue::ArrayQueue;

use crate::semaphore::Semaphore;

/// State of one pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    /// On the free list.
    Free = 0,
    /// Held by a producer, not yet visible to consumers.
    CheckedOut = 1,
    /// Posted and waiting in the FIFO.
    Filled = 2,
    /// Popped by a consumer and not yet released.
    Processing = 3,
}

impl SlotState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Free,
            1 => Self::CheckedOut,
            2 => Self::Filled,
            _ => Self::Processing,
        }
    }
}

/// A fixed-capacity pool of job slots with a FIFO of posted jobs.
pub struct JobPool<T> {
    name: &'static str,
    free_permits: Semaphore,
    filled_permits: Semaphore,
    free: ArrayQueue<usize>,
    filled: ArrayQueue<(usize, T)>,
    states: Box<[AtomicU8]>,
}

impl<T> JobPool<T> {
    /// Create a pool with `capacity` slots, all free.
    ///
    /// # Arguments
    /// * `name` - Label used in `Debug` output and diagnostics
    /// * `capacity` - Number of slots; clamped to at least one
    #[must_use]
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let free = ArrayQueue::new(capacity);
        for index in 0..capacity {
            // Capacity matches the slot count, so every push succeeds.
            let _ = free.push(index);
        }
        Self {
            name,
            free_permits: Semaphore::new(capacity),
            filled_permits: Semaphore::new(0),
            free,
            filled: ArrayQueue::new(capacity),
            states: (0..capacity).map(|_| AtomicU8::new(SlotState::Free as u8)).collect(),
        }
    }

    /// Pool label.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Total number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.states.len()
    }

    /// Number of slots currently on the free list.
    #[must_use]
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Number of posted jobs not yet consumed.
    #[must_use]
    pub fn filled_len(&self) -> usize {
        self.filled.len()
    }

    /// Current state of slot `index`.
    #[must_use]
    pub fn slot_state(&self, index: usize) -> Option<SlotState> {
        self.states.get(index).map(|s| SlotState::from_u8(s.load(Ordering::SeqCst)))
    }

    /// Check out a free slot, blocking until one is available.
    pub fn acquire_empty(&self) -> EmptySlot<'_, T> {
        self.free_permits.acquire();
        self.take_free_slot()
    }

    /// Check out a free slot if one is available right now.
    pub fn try_acquire_empty(&self) -> Option<EmptySlot<'_, T>> {
        if self.free_permits.try_acquire() { Some(self.take_free_slot()) } else { None }
    }

    /// Tag a checked-out slot with `job` and make it visible to consumers.
    pub fn post_full(&self, slot: EmptySlot<'_, T>, job: T) {
        debug_assert!(std::ptr::eq(slot.pool, self), "slot posted to a foreign pool");
        let index = slot.index;
        std::mem::forget(slot);
        self.transition(index, SlotState::CheckedOut, SlotState::Filled);
        let pushed = self.filled.push((index, job));
        debug_assert!(pushed.is_ok(), "filled queue holds at most one entry per slot");
        self.filled_permits.release();
    }

    /// Pop the oldest posted job, or `None` if nothing is posted.
    pub fn get_full_nonblocking(&self) -> Option<FullSlot<'_, T>> {
        if !self.filled_permits.try_acquire() {
            return None;
        }
        self.take_filled_slot()
    }

    /// Pop the oldest posted job, blocking until one is posted.
    pub fn get_full_blocking(&self) -> FullSlot<'_, T> {
        loop {
            self.filled_permits.acquire();
            if let Some(full) = self.take_filled_slot() {
                return full;
            }
        }
    }

    /// Return a consumed slot to the free list.
    pub fn release(&self, full: FullSlot<'_, T>) {
        debug_assert!(std::ptr::eq(full.pool, self), "slot released to a foreign pool");
        drop(full);
    }

    /// Discard every posted job that has not been consumed.
    ///
    /// Returns the number of jobs discarded.
    pub fn drain(&self) -> usize {
        let mut drained = 0;
        while let Some(full) = self.get_full_nonblocking() {
            drop(full);
            drained += 1;
        }
        drained
    }

    fn take_free_slot(&self) -> EmptySlot<'_, T> {
        // A free permit guarantees a queued index; spin over the tiny window between
        // another thread's push and its permit release.
        let index = loop {
            if let Some(index) = self.free.pop() {
                break index;
            }
            std::hint::spin_loop();
        };
        self.transition(index, SlotState::Free, SlotState::CheckedOut);
        EmptySlot { pool: self, index }
    }

    fn take_filled_slot(&self) -> Option<FullSlot<'_, T>> {
        let (index, job) = self.filled.pop()?;
        self.transition(index, SlotState::Filled, SlotState::Processing);
        Some(FullSlot { pool: self, index, job })
    }

    fn recycle(&self, index: usize, from: SlotState) {
        self.transition(index, from, SlotState::Free);
        let pushed = self.free.push(index);
        debug_assert!(pushed.is_ok(), "free list holds at most one entry per slot");
        self.free_permits.release();
    }

    fn transition(&self, index: usize, from: SlotState, to: SlotState) {
        let swapped = self.states[index].compare_exchange(
            from as u8,
            to as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        debug_assert!(
            swapped.is_ok(),
            "{}: slot {index} expected {from:?} moving to {to:?}, found {:?}",
            self.name,
            swapped.err().map(SlotState::from_u8)
        );
    }
}

impl<T> fmt::Debug for JobPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobPool")
            .field("name", &self.name)
            .field("capacity", &self.capacity())
            .field("free", &self.free_len())
            .field("filled", &self.filled_len())
            .finish()
    }
}

/// A checked-out slot that has not been posted yet.
#[must_use = "an empty slot returns to the free list unless it is posted"]
pub struct EmptySlot<'a, T> {
    pool: &'a JobPool<T>,
    index: usize,
}

impl<T> EmptySlot<'_, T> {
    /// Index of the slot within its pool.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Drop for EmptySlot<'_, T> {
    fn drop(&mut self) {
        self.pool.recycle(self.index, SlotState::CheckedOut);
    }
}

impl<T> fmt::Debug for EmptySlot<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmptySlot").field("pool", &self.pool.name).field("index", &self.index).finish()
    }
}

/// A consumed slot carrying its job.
pub struct FullSlot<'a, T> {
    pool: &'a JobPool<T>,
    index: usize,
    job: T,
}

impl<T> FullSlot<'_, T> {
    /// The job this slot was tagged with.
    #[must_use]
    pub fn job(&self) -> &T {
        &self.job
    }

    /// Index of the slot within its pool.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Drop for FullSlot<'_, T> {
    fn drop(&mut self) {
        self.pool.recycle(self.index, SlotState::Processing);
    }
}

impl<T: fmt::Debug> fmt::Debug for FullSlot<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FullSlot")
            .field("pool", &self.pool.name)
            .field("index", &self.index)
            .field("job", &self.job)
            .finish()
    }
}
