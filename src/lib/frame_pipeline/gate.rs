//! Stage gates and the frame-completion barrier.
//!
//! A [`StageGate`] is a broadcast latch: the driver opens it once per frame and every
//! waiting thread proceeds. The [`FrameBarrier`] counts arrivals at the end of a frame;
//! the thread whose arrival completes the count runs the reset closure before anyone is
//! released, so no thread can observe the next frame's gates before the reset.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

/// Broadcast latch guarding the start of one stage.
#[derive(Debug, Default)]
pub struct StageGate {
    open: AtomicBool,
    lock: Mutex<()>,
    opened: Condvar,
}

impl StageGate {
    /// Create a closed gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate and wake every waiter. Opening an open gate is a no-op.
    ///
    /// Returns true if this call opened the gate.
    pub fn open(&self) -> bool {
        let _guard = self.lock.lock();
        let was_open = self.open.swap(true, Ordering::SeqCst);
        if !was_open {
            self.opened.notify_all();
        }
        !was_open
    }

    /// Close the gate.
    pub fn close(&self) {
        let _guard = self.lock.lock();
        self.open.store(false, Ordering::SeqCst);
    }

    /// Returns true if the gate is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Block until the gate is open.
    pub fn wait(&self) {
        if self.is_open() {
            return;
        }
        let mut guard = self.lock.lock();
        while !self.open.load(Ordering::SeqCst) {
            self.opened.wait(&mut guard);
        }
    }
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
}

/// Reusable end-of-frame barrier for a fixed number of parties.
#[derive(Debug)]
pub struct FrameBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
    completions: AtomicU64,
}

impl FrameBarrier {
    /// Create a barrier for `parties` threads (at least one).
    #[must_use]
    pub fn new(parties: usize) -> Self {
        Self {
            parties: parties.max(1),
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
            completions: AtomicU64::new(0),
        }
    }

    /// Number of threads that must arrive to complete a generation.
    #[must_use]
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Threads that have arrived in the current generation.
    #[must_use]
    pub fn arrived(&self) -> usize {
        self.state.lock().arrived
    }

    /// Number of completed generations.
    #[must_use]
    pub fn completions(&self) -> u64 {
        self.completions.load(Ordering::SeqCst)
    }

    /// Arrive and block until every party has arrived.
    ///
    /// The last arriver runs `reset` while holding the barrier lock, then releases the
    /// others. Returns true for the thread that ran `reset`.
    pub fn arrive_and_wait(&self, reset: impl FnOnce()) -> bool {
        let mut state = self.state.lock();
        if self.arrive_locked(&mut state, reset) {
            return true;
        }
        let generation = state.generation;
        while state.generation == generation {
            self.released.wait(&mut state);
        }
        false
    }

    /// Arrive without waiting for the others.
    ///
    /// Used by a thread that is leaving the protocol. Returns true if this arrival
    /// completed the generation and ran `reset`.
    pub fn arrive_no_wait(&self, reset: impl FnOnce()) -> bool {
        let mut state = self.state.lock();
        self.arrive_locked(&mut state, reset)
    }

    fn arrive_locked(&self, state: &mut BarrierState, reset: impl FnOnce()) -> bool {
        state.arrived += 1;
        if state.arrived < self.parties {
            return false;
        }
        reset();
        state.arrived = 0;
        state.generation = state.generation.wrapping_add(1);
        self.completions.fetch_add(1, Ordering::SeqCst);
        self.released.notify_all();
        true
    }
}
