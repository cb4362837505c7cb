//! Counting semaphore built on `parking_lot` primitives.

use parking_lot::{Condvar, Mutex};

/// A counting semaphore.
///
/// `acquire` blocks while the count is zero; `try_acquire` never blocks.
#[derive(Debug)]
pub struct Semaphore {
    count: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Create a semaphore holding `initial` permits.
    #[must_use]
    pub fn new(initial: usize) -> Self {
        Self { count: Mutex::new(initial), available: Condvar::new() }
    }

    /// Take one permit, blocking until one is available.
    pub fn acquire(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.available.wait(&mut count);
        }
        *count -= 1;
    }

    /// Take one permit if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    /// Return one permit and wake a single waiter.
    pub fn release(&self) {
        let mut count = self.count.lock();
        *count += 1;
        drop(count);
        self.available.notify_one();
    }

    /// Current number of permits.
    pub fn available_permits(&self) -> usize {
        *self.count.lock()
    }
}
