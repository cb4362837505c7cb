//! Adaptive backoff, stall detection and the polled-wait helper.
//!
//! Row gates and intra-tile sync poll shared flags. Each poll that finds the condition
//! unmet calls [`Backoff::snooze`], which yields at the minimum backoff and otherwise
//! sleeps with jitter, doubling up to the maximum. A [`StallWatch`] runs alongside and
//! logs once if the wait exceeds the configured timeout. [`Poller`] ties the two together
//! with the frame-wide abort flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::warn;

use super::config::{SchedulerConfig, StallConfig};
use super::stage::Stage;
use super::stats::PipelineStats;
use crate::errors::{DecodeMtError, Result};

/// Exponential backoff between polls.
#[derive(Debug, Clone)]
pub struct Backoff {
    min_us: u64,
    max_us: u64,
    current_us: u64,
}

impl Backoff {
    /// Create a backoff that starts at `min_us` and caps at `max_us`.
    #[must_use]
    pub fn new(min_us: u64, max_us: u64) -> Self {
        let min_us = min_us.max(1);
        Self { min_us, max_us: max_us.max(min_us), current_us: min_us }
    }

    /// Current backoff in microseconds.
    #[must_use]
    pub fn current_us(&self) -> u64 {
        self.current_us
    }

    /// Reset backoff to minimum (after the condition was met).
    #[inline]
    pub fn reset(&mut self) {
        self.current_us = self.min_us;
    }

    /// Increase backoff exponentially (after a failed poll).
    #[inline]
    pub fn increase(&mut self) {
        self.current_us = (self.current_us * 2).min(self.max_us);
    }

    /// Wait for the current backoff, then increase it.
    ///
    /// Uses `yield_now()` at the minimum to avoid a sleep syscall. Adds ±25% jitter so
    /// threads polling the same flag do not wake in lockstep.
    pub fn snooze(&mut self) {
        if self.current_us <= self.min_us {
            std::thread::yield_now();
        } else {
            let jitter_range = self.current_us / 4;
            let jitter_seed = u64::from(
                SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.subsec_nanos()).unwrap_or(0),
            );
            let jitter = if jitter_range == 0 { 0 } else { jitter_seed % (jitter_range * 2) };
            let actual_us =
                (self.current_us + jitter).saturating_sub(jitter_range).max(self.min_us);
            std::thread::sleep(Duration::from_micros(actual_us));
        }
        self.increase();
    }
}

/// Tracks how long one polled wait has been running and reports a stall once.
#[derive(Debug)]
pub struct StallWatch {
    started: Instant,
    timeout: Option<Duration>,
    reported: bool,
}

impl StallWatch {
    /// Start watching a wait.
    #[must_use]
    pub fn start(config: StallConfig) -> Self {
        let timeout = config.is_enabled().then(|| Duration::from_secs(config.timeout_secs));
        Self { started: Instant::now(), timeout, reported: false }
    }

    /// Time since the wait started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Returns true once the timeout has passed, and only the first time.
    pub fn should_report(&mut self) -> bool {
        match self.timeout {
            Some(timeout) if !self.reported && self.started.elapsed() >= timeout => {
                self.reported = true;
                true
            }
            _ => false,
        }
    }

    /// Log a stall warning built by `describe` if the timeout has just passed.
    ///
    /// Returns true if a warning was logged.
    pub fn check(&mut self, describe: impl FnOnce() -> String) -> bool {
        if self.should_report() {
            warn!(
                "Possible stall: waited {:.1}s for {}",
                self.elapsed().as_secs_f64(),
                describe()
            );
            return true;
        }
        false
    }

    /// Returns true if a stall was reported during this wait.
    #[must_use]
    pub fn reported(&self) -> bool {
        self.reported
    }
}

/// Polls a shared condition with backoff until it holds or the frame is aborted.
#[derive(Clone, Copy)]
pub struct Poller<'a> {
    abort: &'a AtomicBool,
    config: &'a SchedulerConfig,
    stats: &'a PipelineStats,
}

impl<'a> Poller<'a> {
    pub(crate) fn new(
        abort: &'a AtomicBool,
        config: &'a SchedulerConfig,
        stats: &'a PipelineStats,
    ) -> Self {
        Self { abort, config, stats }
    }

    /// Returns true if the frame has been aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Block until `ready` returns true.
    ///
    /// `describe` names the awaited condition in the stall warning.
    ///
    /// # Errors
    /// Returns [`DecodeMtError::Aborted`] if the frame is aborted while waiting.
    pub fn wait_until(
        &self,
        stage: Stage,
        mut ready: impl FnMut() -> bool,
        describe: impl Fn() -> String,
    ) -> Result<()> {
        if ready() {
            return Ok(());
        }
        let mut backoff = Backoff::new(self.config.min_backoff_us, self.config.max_backoff_us);
        let mut watch = StallWatch::start(self.config.stall);
        loop {
            if self.is_aborted() {
                return Err(DecodeMtError::Aborted { stage });
            }
            backoff.snooze();
            if ready() {
                self.stats.record_wait(stage, watch.elapsed());
                return Ok(());
            }
            if watch.check(|| format!("{stage}: {}", describe())) {
                self.stats.record_stall();
            }
        }
    }
}

impl std::fmt::Debug for Poller<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller").field("aborted", &self.is_aborted()).finish_non_exhaustive()
    }
}
