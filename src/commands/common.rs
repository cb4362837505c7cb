//! Common CLI options shared across commands.
//!
//! This module provides shared argument structures that can be composed into
//! command structs using `#[command(flatten)]`, plus the synthetic decode loop both
//! commands run.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use log::info;

use decmt_lib::frame_pipeline::{
    ErrorPolicy, FrameScheduler, SchedulerConfig, StallConfig, TileSwitchStrategy,
};
use decmt_lib::geometry::{FrameGeometry, PictureGeometry, SuperblockSize};
use decmt_lib::logging::log_frame_summary;
use decmt_lib::progress::ProgressTracker;
use decmt_lib::synthetic::{SyntheticConfig, SyntheticFrame};

/// Picture size and tile grid of the synthetic sequence.
#[derive(Debug, Clone, Args)]
pub struct GeometryOptions {
    /// Picture width in pixels
    #[arg(long = "width", default_value_t = 1920)]
    pub width: u32,

    /// Picture height in pixels
    #[arg(long = "height", default_value_t = 1080)]
    pub height: u32,

    /// Superblock size in pixels
    #[arg(long = "sb-size", value_enum, default_value_t = SuperblockSize::Sb64)]
    pub sb_size: SuperblockSize,

    /// Tile columns
    #[arg(long = "tile-cols", default_value_t = 4)]
    pub tile_cols: u32,

    /// Tile rows
    #[arg(long = "tile-rows", default_value_t = 2)]
    pub tile_rows: u32,
}

impl GeometryOptions {
    /// Build the frame geometry.
    ///
    /// # Errors
    ///
    /// Returns an error if the picture or tile grid is invalid.
    pub fn frame_geometry(&self) -> Result<FrameGeometry> {
        self.frame_geometry_with_cols(self.tile_cols)
    }

    /// Build the frame geometry with a different number of tile columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the picture or tile grid is invalid.
    pub fn frame_geometry_with_cols(&self, tile_cols: u32) -> Result<FrameGeometry> {
        let picture = PictureGeometry::new(self.width, self.height, self.sb_size);
        FrameGeometry::uniform(picture, tile_cols, self.tile_rows).with_context(|| {
            format!(
                "Cannot split a {}x{} picture into {}x{} tiles",
                self.width, self.height, tile_cols, self.tile_rows
            )
        })
    }
}

/// Scheduler tuning options.
#[derive(Debug, Clone, Args)]
pub struct SchedulerOptions {
    /// What to do with the rest of a frame when a job fails.
    #[arg(long = "error-policy", value_enum, default_value_t = ErrorPolicy::default())]
    pub error_policy: ErrorPolicy,

    /// How idle threads pick a tile to help during reconstruction.
    #[arg(long = "tile-switch", value_enum, default_value_t = TileSwitchStrategy::default())]
    pub tile_switch: TileSwitchStrategy,

    /// Seconds a dependency wait may take before diagnostics are logged (0 disables).
    #[arg(long = "stall-timeout", default_value_t = 10)]
    pub stall_timeout: u64,

    /// Collect per-stage timing and print scheduler statistics at completion.
    #[arg(long = "scheduler-stats", default_value = "false")]
    pub scheduler_stats: bool,
}

impl SchedulerOptions {
    /// Scheduler configuration for `threads` threads.
    #[must_use]
    pub fn config(&self, threads: usize) -> SchedulerConfig {
        SchedulerConfig::new(threads)
            .with_error_policy(self.error_policy)
            .with_tile_switch(self.tile_switch)
            .with_stall(StallConfig::new(self.stall_timeout))
            .with_stats(self.scheduler_stats)
    }
}

/// Synthetic decoder options.
#[derive(Debug, Clone, Args)]
pub struct SyntheticOptions {
    /// Number of frames to decode
    #[arg(short = 'n', long = "frames", default_value_t = 30)]
    pub frames: u64,

    /// Seed for the synthetic bitstream
    #[arg(long = "seed", default_value_t = 42)]
    pub seed: u64,

    /// Maximum extra work per superblock, drawn per tile to make tile costs ragged
    #[arg(long = "tile-cost", default_value_t = 0)]
    pub tile_cost: u32,

    /// Skip the deblocking kernel (rows are still gated)
    #[arg(long = "no-loop-filter", default_value = "false")]
    pub no_loop_filter: bool,

    /// Skip the CDEF kernel (rows are still gated)
    #[arg(long = "no-cdef", default_value = "false")]
    pub no_cdef: bool,
}

impl SyntheticOptions {
    /// Validate the options.
    ///
    /// # Errors
    ///
    /// Returns an error if no frames are requested.
    pub fn validate(&self) -> Result<()> {
        if self.frames == 0 {
            bail!("--frames must be at least 1");
        }
        Ok(())
    }

    /// Synthetic frame configuration.
    #[must_use]
    pub fn config(&self) -> SyntheticConfig {
        SyntheticConfig::default()
            .with_seed(self.seed)
            .with_ragged_cost(self.tile_cost)
            .with_filters(!self.no_loop_filter, !self.no_cdef)
    }
}

/// Outcome of decoding a synthetic sequence.
#[derive(Debug, Clone)]
pub struct SequenceOutcome {
    /// Checksum of every frame, in order
    pub checksums: Vec<u64>,
    /// Dependency violations summed over every frame
    pub violations: u64,
    /// Frames in which some job ran twice or not at all
    pub bad_claim_frames: u64,
    /// Rendered scheduler statistics
    pub stats_summary: String,
}

impl SequenceOutcome {
    /// Combined checksum of the whole sequence.
    #[must_use]
    pub fn sequence_checksum(&self) -> u64 {
        self.checksums.iter().fold(0_u64, |acc, c| acc.rotate_left(5) ^ c)
    }
}

/// Decode `frames` synthetic frames with a fresh scheduler.
///
/// `geometry_for` returns the geometry of each frame index, which lets callers exercise
/// geometry changes.
///
/// # Errors
///
/// Returns an error if the scheduler cannot start or a frame fails to decode.
pub fn decode_sequence(
    config: SchedulerConfig,
    frames: u64,
    synthetic: &SyntheticConfig,
    geometry_for: impl Fn(u64) -> Result<FrameGeometry>,
    progress: Option<&ProgressTracker>,
) -> Result<SequenceOutcome> {
    let first = geometry_for(0)?;
    let threads = config.num_threads;
    let mut scheduler = FrameScheduler::new(config, first.required_capacity())
        .with_context(|| format!("Failed to start scheduler with {threads} threads"))?;

    let mut checksums = Vec::with_capacity(frames as usize);
    let mut violations = 0;
    let mut bad_claim_frames = 0;
    for index in 0..frames {
        let geometry = if index == 0 { first.clone() } else { geometry_for(index)? };
        let frame = Arc::new(SyntheticFrame::new(geometry, synthetic.clone(), index));
        let report = scheduler
            .decode_frame(Arc::clone(&frame))
            .with_context(|| format!("Frame {index} failed with {threads} threads"))?;
        log_frame_summary(&report);

        checksums.push(frame.checksum());
        violations += frame.violations();
        if !frame.ran_exactly_once() {
            bad_claim_frames += 1;
        }
        if let Some(tracker) = progress {
            tracker.log_if_needed(1);
        }
    }

    let stats_summary = scheduler.stats().format_summary();
    scheduler.shutdown().context("Scheduler shutdown reported a worker error")?;
    if let Some(tracker) = progress {
        tracker.log_final();
    }
    Ok(SequenceOutcome { checksums, violations, bad_claim_frames, stats_summary })
}

/// Log the geometry a command runs with.
pub fn log_geometry(geometry: &FrameGeometry) {
    let picture = geometry.picture();
    info!(
        "Picture: {}x{} ({} superblocks, {}x{} superblocks), tiles: {}x{}",
        picture.width,
        picture.height,
        picture.sb_size,
        geometry.sb_cols(),
        geometry.sb_rows(),
        geometry.tile_cols(),
        geometry.tile_rows()
    );
}
