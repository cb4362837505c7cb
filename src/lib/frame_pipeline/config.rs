//! Scheduler configuration.
//!
//! [`SchedulerConfig`] collects every knob of a [`FrameScheduler`](super::FrameScheduler):
//! thread count, failure policy, tile-switch heuristic, polling backoff bounds and the
//! stall watchdog. The enums derive [`clap::ValueEnum`] so the CLI can expose them
//! directly.

use clap::ValueEnum;

use crate::errors::{DecodeMtError, Result};

/// Minimum polling backoff in microseconds.
pub const MIN_BACKOFF_US: u64 = 10;
/// Maximum polling backoff in microseconds (1ms).
pub const MAX_BACKOFF_US: u64 = 1000;

/// What happens to the rest of the frame when a stage job fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ErrorPolicy {
    /// Raise a frame-wide abort: every gate wait returns and remaining jobs are drained
    /// without work, so the frame completes promptly with the first error.
    #[default]
    #[value(name = "abort")]
    Abort,
    /// Only the failing thread stops draining the stage. Rows that depend on the failed
    /// job are never released, so downstream gates can wait forever; the stall watchdog
    /// reports such waits.
    #[value(name = "local-only")]
    LocalOnly,
}

/// How a worker picks a tile to help once the reconstruction queue is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TileSwitchStrategy {
    /// The incomplete tile with the most unclaimed rows; ties go to the lowest index.
    #[default]
    #[value(name = "most-rows-pending")]
    MostRowsPending,
    /// The lowest-numbered incomplete tile.
    #[value(name = "lowest-index")]
    LowestIndex,
}

/// Configuration for stall detection on polled waits.
///
/// A wait that has not been satisfied after `timeout_secs` logs diagnostics once and
/// keeps waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallConfig {
    /// Timeout in seconds (0 = disabled).
    pub timeout_secs: u64,
}

impl Default for StallConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl StallConfig {
    /// Create a stall configuration.
    #[must_use]
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    /// Create a disabled configuration (no detection).
    #[must_use]
    pub fn disabled() -> Self {
        Self { timeout_secs: 0 }
    }

    /// Returns true if stall detection is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.timeout_secs > 0
    }
}

/// Configuration for a [`FrameScheduler`](super::FrameScheduler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Total threads including the driver thread.
    pub num_threads: usize,
    /// Failure handling.
    pub error_policy: ErrorPolicy,
    /// Tile-switch heuristic for reconstruction.
    pub tile_switch: TileSwitchStrategy,
    /// Stall watchdog.
    pub stall: StallConfig,
    /// Smallest polling backoff in microseconds.
    pub min_backoff_us: u64,
    /// Largest polling backoff in microseconds.
    pub max_backoff_us: u64,
    /// Collect per-stage timing statistics.
    pub collect_stats: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

impl SchedulerConfig {
    /// Create a configuration with `num_threads` threads (at least one) and defaults
    /// for everything else.
    #[must_use]
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads: num_threads.max(1),
            error_policy: ErrorPolicy::default(),
            tile_switch: TileSwitchStrategy::default(),
            stall: StallConfig::default(),
            min_backoff_us: MIN_BACKOFF_US,
            max_backoff_us: MAX_BACKOFF_US,
            collect_stats: false,
        }
    }

    /// Set the error policy.
    #[must_use]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Set the tile-switch strategy.
    #[must_use]
    pub fn with_tile_switch(mut self, strategy: TileSwitchStrategy) -> Self {
        self.tile_switch = strategy;
        self
    }

    /// Set the stall watchdog.
    #[must_use]
    pub fn with_stall(mut self, stall: StallConfig) -> Self {
        self.stall = stall;
        self
    }

    /// Set the polling backoff bounds in microseconds.
    #[must_use]
    pub fn with_backoff_us(mut self, min_us: u64, max_us: u64) -> Self {
        self.min_backoff_us = min_us;
        self.max_backoff_us = max_us;
        self
    }

    /// Enable or disable statistics collection.
    #[must_use]
    pub fn with_stats(mut self, collect: bool) -> Self {
        self.collect_stats = collect;
        self
    }

    /// Number of pool threads spawned besides the driver.
    #[must_use]
    pub fn pool_threads(&self) -> usize {
        self.num_threads.saturating_sub(1)
    }

    /// Check the configuration.
    ///
    /// # Errors
    /// Returns [`DecodeMtError::InvalidParameter`] for a zero thread count or inverted
    /// backoff bounds.
    pub fn validate(&self) -> Result<()> {
        if self.num_threads == 0 {
            return Err(DecodeMtError::invalid_parameter("num_threads", "must be >= 1"));
        }
        if self.min_backoff_us == 0 {
            return Err(DecodeMtError::invalid_parameter("min_backoff_us", "must be >= 1"));
        }
        if self.max_backoff_us < self.min_backoff_us {
            return Err(DecodeMtError::invalid_parameter(
                "max_backoff_us",
                format!("{} is below min_backoff_us {}", self.max_backoff_us, self.min_backoff_us),
            ));
        }
        Ok(())
    }
}
