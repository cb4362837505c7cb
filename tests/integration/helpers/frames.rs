//! Builders for synthetic frames and schedulers.

#![allow(dead_code)]

use std::sync::Arc;

use decmt_lib::frame_pipeline::{FrameScheduler, SchedulerConfig, StallConfig};
use decmt_lib::geometry::{FrameGeometry, PictureGeometry, SuperblockSize};
use decmt_lib::synthetic::{SyntheticConfig, SyntheticFrame};

/// Uniform tile grid over a picture of 64x64 superblocks.
pub fn grid(width: u32, height: u32, tile_cols: u32, tile_rows: u32) -> FrameGeometry {
    let picture = PictureGeometry::new(width, height, SuperblockSize::Sb64);
    FrameGeometry::uniform(picture, tile_cols, tile_rows).expect("valid test geometry")
}

/// 2x2 tiles over 4x4 superblocks.
pub fn small_2x2() -> FrameGeometry {
    grid(256, 256, 2, 2)
}

/// Scheduler config used by the tests: a short stall timeout so hangs are diagnosed.
pub fn test_config(threads: usize) -> SchedulerConfig {
    SchedulerConfig::new(threads).with_stall(StallConfig::new(5)).with_stats(true)
}

/// A scheduler sized for `geometry`.
pub fn scheduler_for(threads: usize, geometry: &FrameGeometry) -> FrameScheduler<SyntheticFrame> {
    FrameScheduler::new(test_config(threads), geometry.required_capacity())
        .expect("scheduler starts")
}

/// Frame `index` of a synthetic sequence.
pub fn synthetic(geometry: &FrameGeometry, config: &SyntheticConfig, index: u64) -> Arc<SyntheticFrame> {
    Arc::new(SyntheticFrame::new(geometry.clone(), config.clone(), index))
}

/// Decode `frames` frames of `geometry` with `threads` threads and return every frame.
pub fn decode_sequence(
    threads: usize,
    geometry: &FrameGeometry,
    config: &SyntheticConfig,
    frames: u64,
) -> Vec<Arc<SyntheticFrame>> {
    let mut scheduler = scheduler_for(threads, geometry);
    let decoded = (0..frames)
        .map(|index| {
            let frame = synthetic(geometry, config, index);
            scheduler.decode_frame(Arc::clone(&frame)).expect("frame decodes");
            frame
        })
        .collect();
    scheduler.shutdown().expect("clean shutdown");
    decoded
}

/// Checksums of a decoded sequence.
pub fn checksums(frames: &[Arc<SyntheticFrame>]) -> Vec<u64> {
    frames.iter().map(|f| f.checksum()).collect()
}
