//! Progress tracking for long decode runs.
//!
//! A thread-safe counter that logs a line each time the count crosses an interval
//! boundary, together with the elapsed time and overall rate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use log::info;

use crate::logging::{format_count, format_duration, format_rate};

/// Thread-safe progress tracker that logs at regular intervals.
///
/// # Example
/// ```
/// use decmt_lib::progress::ProgressTracker;
///
/// let tracker = ProgressTracker::new("Decoded frames").with_interval(100);
/// for _ in 0..250 {
///     tracker.log_if_needed(1); // Logs at 100, 200
/// }
/// tracker.log_final(); // Logs "Decoded frames 250 (complete)"
/// ```
pub struct ProgressTracker {
    interval: u64,
    message: String,
    count: AtomicU64,
    started: Instant,
}

impl ProgressTracker {
    /// Create a tracker with a default interval of 100.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { interval: 100, message: message.into(), count: AtomicU64::new(0), started: Instant::now() }
    }

    /// Set the logging interval. Zero is treated as one.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Add `additional` to the count and log every interval boundary crossed.
    ///
    /// # Returns
    /// `true` if the new count is exactly a multiple of the interval.
    pub fn log_if_needed(&self, additional: u64) -> bool {
        if additional == 0 {
            let count = self.count();
            return count > 0 && count.is_multiple_of(self.interval);
        }

        let prev = self.count.fetch_add(additional, Ordering::Relaxed);
        let new_count = prev + additional;

        let elapsed = self.started.elapsed();
        for i in (prev / self.interval + 1)..=(new_count / self.interval) {
            let milestone = i * self.interval;
            info!(
                "{} {} ({}, {})",
                self.message,
                format_count(milestone),
                format_duration(elapsed),
                format_rate(milestone, elapsed)
            );
        }

        new_count.is_multiple_of(self.interval)
    }

    /// Log the final count unless the last call already landed on a boundary.
    pub fn log_final(&self) {
        if !self.log_if_needed(0) {
            let count = self.count();
            if count > 0 {
                info!("{} {} (complete)", self.message, format_count(count));
            }
        }
    }

    /// Current count.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
