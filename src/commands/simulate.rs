//! Decode a synthetic frame sequence through the scheduler.
//!
//! Runs the full five-stage pipeline over synthetic frames, logging a per-frame summary,
//! the sequence checksum and, optionally, scheduler statistics. Useful for profiling the
//! scheduler in isolation from any real codec.

use anyhow::{Result, bail};
use clap::Parser;
use log::info;

use decmt_lib::logging::OperationTimer;
use decmt_lib::progress::ProgressTracker;

use crate::commands::command::Command;
use crate::commands::common::{
    GeometryOptions, SchedulerOptions, SyntheticOptions, decode_sequence, log_geometry,
};

/// Decode synthetic frames with the multi-threaded frame scheduler.
#[derive(Debug, Parser)]
#[command(
    name = "simulate",
    about = "\x1b[38;5;72m[SCHEDULING]\x1b[0m     \x1b[36mDecode synthetic frames through the scheduler\x1b[0m",
    long_about = r#"
Decode a synthetic frame sequence through the frame-level multi-threaded scheduler.

Each frame runs motion projection, tile parse, tile reconstruction, loop filter and CDEF
stages with deterministic synthetic kernels. The scheduler checks every row and tile
dependency; the synthetic kernels additionally record dependency violations and
duplicate or missing jobs, which are reported at the end.

Use --alternate-tile-cols to switch the tile grid on odd frames and exercise the
geometry-change paths.

Example usage:
  decmt simulate --threads 8 --frames 100
  decmt simulate --threads 4 --width 3840 --height 2160 --tile-cols 8 --tile-rows 4
  decmt simulate --threads 16 --tile-cost 5000 --scheduler-stats
"#
)]
pub struct Simulate {
    /// Number of threads, including the calling thread
    #[arg(short = 't', long = "threads", default_value_t = 4)]
    pub threads: usize,

    /// Picture and tile options
    #[command(flatten)]
    pub geometry: GeometryOptions,

    /// Synthetic decoder options
    #[command(flatten)]
    pub synthetic: SyntheticOptions,

    /// Scheduler options
    #[command(flatten)]
    pub scheduler: SchedulerOptions,

    /// Tile columns to use on odd frames
    #[arg(long = "alternate-tile-cols")]
    pub alternate_tile_cols: Option<u32>,

    /// Log progress every this many frames
    #[arg(long = "progress-interval", default_value_t = 100)]
    pub progress_interval: u64,
}

impl Command for Simulate {
    fn execute(&self, _command_line: &str) -> Result<()> {
        if self.threads == 0 {
            bail!("--threads must be at least 1");
        }
        self.synthetic.validate()?;
        let geometry = self.geometry.frame_geometry()?;
        let alternate = self
            .alternate_tile_cols
            .map(|cols| self.geometry.frame_geometry_with_cols(cols))
            .transpose()?;

        info!("Starting Simulate");
        log_geometry(&geometry);
        info!("Threads: {}", self.threads);
        info!("Frames: {}", self.synthetic.frames);
        if let Some(alt) = &alternate {
            info!("Odd frames use {} tile columns", alt.tile_cols());
        }

        let timer = OperationTimer::new("Decoding synthetic frames");
        let progress =
            ProgressTracker::new("Decoded frames").with_interval(self.progress_interval);
        let outcome = decode_sequence(
            self.scheduler.config(self.threads),
            self.synthetic.frames,
            &self.synthetic.config(),
            |index| match &alternate {
                Some(alt) if index % 2 == 1 => Ok(alt.clone()),
                _ => Ok(geometry.clone()),
            },
            Some(&progress),
        )?;
        timer.log_completion(self.synthetic.frames);

        info!("Sequence checksum: {:016x}", outcome.sequence_checksum());
        if self.scheduler.scheduler_stats {
            for line in outcome.stats_summary.lines() {
                info!("{line}");
            }
        }
        if outcome.violations > 0 || outcome.bad_claim_frames > 0 {
            bail!(
                "Scheduling errors: {} dependency violations, {} frames with missing or repeated jobs",
                outcome.violations,
                outcome.bad_claim_frames
            );
        }
        info!("Simulate complete");
        Ok(())
    }
}
