//! Statistics collected while decoding frames.
//!
//! Job counts are always recorded. Busy time is recorded only when statistics collection
//! is enabled, since it costs two clock reads per job.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use log::info;

use super::stage::{NUM_STAGES, Stage};
use crate::logging::{format_count, format_duration_precise, format_percent};

/// Statistics collected during scheduling.
///
/// All counters are atomic to allow lock-free updates from multiple threads.
#[derive(Debug)]
pub struct PipelineStats {
    timing_enabled: bool,
    /// Jobs run per stage
    pub stage_jobs: [AtomicU64; NUM_STAGES],
    /// Time spent inside collaborator calls per stage (nanoseconds)
    pub stage_busy_ns: [AtomicU64; NUM_STAGES],
    /// Time spent in polled dependency waits per stage (nanoseconds)
    pub stage_wait_ns: [AtomicU64; NUM_STAGES],
    /// Number of failed jobs
    pub failed_jobs: AtomicU64,
    /// Jobs popped and discarded after an abort
    pub aborted_jobs: AtomicU64,
    /// Tiles picked up through the tile-switch fallback
    pub tile_switches: AtomicU64,
    /// Stall warnings logged
    pub stalls: AtomicU64,
    /// Frames completed
    pub frames: AtomicU64,
    /// Jobs run per thread (index 0 is the driver)
    pub per_thread_jobs: Box<[AtomicU64]>,
}

impl PipelineStats {
    /// Create statistics for `num_threads` threads with timing disabled.
    #[must_use]
    pub fn new(num_threads: usize) -> Self {
        Self {
            timing_enabled: false,
            stage_jobs: Default::default(),
            stage_busy_ns: Default::default(),
            stage_wait_ns: Default::default(),
            failed_jobs: AtomicU64::new(0),
            aborted_jobs: AtomicU64::new(0),
            tile_switches: AtomicU64::new(0),
            stalls: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            per_thread_jobs: (0..num_threads.max(1)).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Enable busy-time recording.
    #[must_use]
    pub fn with_timing(mut self, enabled: bool) -> Self {
        self.timing_enabled = enabled;
        self
    }

    /// Returns true if busy time is recorded.
    #[must_use]
    pub fn timing_enabled(&self) -> bool {
        self.timing_enabled
    }

    /// Start timing a job, if timing is enabled.
    #[must_use]
    pub fn start_job(&self) -> Option<Instant> {
        self.timing_enabled.then(Instant::now)
    }

    /// Record one job of `stage` run by `worker_id`.
    pub fn record_job(&self, stage: Stage, worker_id: usize, started: Option<Instant>) {
        self.stage_jobs[stage.index()].fetch_add(1, Ordering::Relaxed);
        if let Some(counter) = self.per_thread_jobs.get(worker_id) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(started) = started {
            self.stage_busy_ns[stage.index()]
                .fetch_add(started.elapsed().as_nanos() as u64, Ordering::Relaxed);
        }
    }

    /// Record time spent in a polled wait.
    pub fn record_wait(&self, stage: Stage, waited: Duration) {
        if self.timing_enabled {
            self.stage_wait_ns[stage.index()].fetch_add(waited.as_nanos() as u64, Ordering::Relaxed);
        }
    }

    /// Record a failed job.
    pub fn record_failure(&self) {
        self.failed_jobs.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job discarded after an abort.
    pub fn record_aborted_job(&self) {
        self.aborted_jobs.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a tile-switch pick.
    pub fn record_tile_switch(&self) {
        self.tile_switches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stall warning.
    pub fn record_stall(&self) {
        self.stalls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed frame.
    pub fn record_frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Jobs run so far for `stage`.
    #[must_use]
    pub fn jobs(&self, stage: Stage) -> u64 {
        self.stage_jobs[stage.index()].load(Ordering::Relaxed)
    }

    /// Total jobs across all stages.
    #[must_use]
    pub fn total_jobs(&self) -> u64 {
        Stage::ALL.iter().map(|&s| self.jobs(s)).sum()
    }

    /// Primary job failures recorded.
    #[must_use]
    pub fn failed_jobs(&self) -> u64 {
        self.failed_jobs.load(Ordering::Relaxed)
    }

    /// Jobs drained without work after an abort.
    #[must_use]
    pub fn aborted_jobs(&self) -> u64 {
        self.aborted_jobs.load(Ordering::Relaxed)
    }

    /// Times a thread moved to another tile during reconstruction.
    #[must_use]
    pub fn tile_switches(&self) -> u64 {
        self.tile_switches.load(Ordering::Relaxed)
    }

    /// Stall reports from the watchdog.
    #[must_use]
    pub fn stalls(&self) -> u64 {
        self.stalls.load(Ordering::Relaxed)
    }

    /// Format statistics as a human-readable summary.
    #[must_use]
    pub fn format_summary(&self) -> String {
        let mut s = String::new();
        let frames = self.frames.load(Ordering::Relaxed);
        let _ = writeln!(s, "Scheduler statistics ({} frames):", format_count(frames));
        let _ = writeln!(s, "  {:<18} {:>10} {:>12} {:>12}", "Stage", "Jobs", "Busy", "Waiting");
        for stage in Stage::ALL {
            let i = stage.index();
            let _ = writeln!(
                s,
                "  {:<18} {:>10} {:>12} {:>12}",
                stage.to_string(),
                format_count(self.stage_jobs[i].load(Ordering::Relaxed)),
                format_duration_precise(Duration::from_nanos(
                    self.stage_busy_ns[i].load(Ordering::Relaxed)
                )),
                format_duration_precise(Duration::from_nanos(
                    self.stage_wait_ns[i].load(Ordering::Relaxed)
                )),
            );
        }
        let _ = writeln!(
            s,
            "  Tile switches: {}  Failed jobs: {}  Aborted jobs: {}  Stalls: {}",
            format_count(self.tile_switches.load(Ordering::Relaxed)),
            format_count(self.failed_jobs.load(Ordering::Relaxed)),
            format_count(self.aborted_jobs.load(Ordering::Relaxed)),
            format_count(self.stalls.load(Ordering::Relaxed)),
        );
        let total = self.total_jobs();
        let per_thread: Vec<String> = self
            .per_thread_jobs
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let jobs = c.load(Ordering::Relaxed);
                let share = if total == 0 { 0.0 } else { jobs as f64 / total as f64 };
                format!("T{i}:{jobs} ({})", format_percent(share, 1))
            })
            .collect();
        let _ = writeln!(s, "  Jobs per thread: {}", per_thread.join(" "));
        s
    }

    /// Log statistics using the log crate at info level.
    pub fn log_summary(&self) {
        for line in self.format_summary().lines() {
            info!("{line}");
        }
    }
}
