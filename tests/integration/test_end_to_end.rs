//! End-to-end decoding of small frames with every stage checked.

use std::sync::Arc;

use decmt_lib::frame_pipeline::{FrameScheduler, SchedulerConfig, Stage};
use decmt_lib::geometry::GeometryChange;
use decmt_lib::synthetic::{SyntheticConfig, SyntheticFrame};

use crate::helpers::{assert_clean_frame, grid, scheduler_for, small_2x2, synthetic};

#[test]
fn test_two_by_two_tiles_three_threads() {
    let geometry = small_2x2();
    assert_eq!(geometry.sb_rows(), 4);
    let mut scheduler = scheduler_for(3, &geometry);

    let frame = synthetic(&geometry, &SyntheticConfig::default(), 0);
    let report = scheduler.decode_frame(Arc::clone(&frame)).unwrap();
    assert_clean_frame(&frame);

    assert_eq!(report.frame_number, 0);
    assert_eq!(report.num_tiles, 4);
    assert_eq!(report.sb_rows, 4);
    assert_eq!(report.geometry_change, GeometryChange::Reconfigure);
    assert_eq!(scheduler.barrier_completions(), 1);
    assert_eq!(frame.boundary_lines_saved(), 4);

    let stats = scheduler.stats();
    assert_eq!(stats.jobs(Stage::MotionProjection), 4);
    assert_eq!(stats.jobs(Stage::Parse), 4);
    assert_eq!(stats.jobs(Stage::Recon), 8);
    assert_eq!(stats.jobs(Stage::LoopFilter), 4);
    assert_eq!(stats.jobs(Stage::Cdef), 4);

    scheduler.shutdown().unwrap();
}

#[test]
fn test_repeated_frames_reuse_state() {
    let geometry = grid(512, 512, 2, 2);
    let mut scheduler = scheduler_for(4, &geometry);
    let config = SyntheticConfig::default();

    for index in 0..10 {
        let frame = synthetic(&geometry, &config, index);
        let report = scheduler.decode_frame(Arc::clone(&frame)).unwrap();
        assert_clean_frame(&frame);
        let expected = if index == 0 { GeometryChange::Reconfigure } else { GeometryChange::Same };
        assert_eq!(report.geometry_change, expected);
        assert_eq!(report.frame_number, index);
    }
    assert_eq!(scheduler.frames_decoded(), 10);
    assert_eq!(scheduler.barrier_completions(), 10);
}

#[test]
fn test_single_thread_runs_everything_on_caller() {
    let geometry = grid(384, 256, 3, 2);
    let mut scheduler: FrameScheduler<SyntheticFrame> =
        FrameScheduler::new(SchedulerConfig::new(1), geometry.required_capacity()).unwrap();
    let frame = synthetic(&geometry, &SyntheticConfig::default(), 0);
    scheduler.decode_frame(Arc::clone(&frame)).unwrap();
    assert_clean_frame(&frame);
    scheduler.shutdown().unwrap();
    assert_eq!(scheduler.num_threads_exited(), 0);
}

#[test]
fn test_more_threads_than_work() {
    let geometry = grid(64, 64, 1, 1);
    let mut scheduler = scheduler_for(8, &geometry);
    let frame = synthetic(&geometry, &SyntheticConfig::default(), 0);
    scheduler.decode_frame(Arc::clone(&frame)).unwrap();
    assert_clean_frame(&frame);
}

#[test]
fn test_without_motion_projection() {
    let geometry = small_2x2();
    let mut scheduler = scheduler_for(3, &geometry);
    let frame = synthetic(&geometry, &SyntheticConfig::default().with_motion_rows(0), 0);
    scheduler.decode_frame(Arc::clone(&frame)).unwrap();
    assert_clean_frame(&frame);
    assert_eq!(scheduler.stats().jobs(Stage::MotionProjection), 0);
}

#[test]
fn test_init_convenience_constructor() {
    let geometry = grid(512, 256, 4, 1);
    let mut scheduler = FrameScheduler::<SyntheticFrame>::init(2, 4, 1, 4).unwrap();
    assert_eq!(scheduler.capacity().max_tiles, 4);
    let frame = synthetic(&geometry, &SyntheticConfig::default(), 0);
    let report = scheduler.decode_frame(Arc::clone(&frame)).unwrap();
    assert_eq!(report.geometry_change, GeometryChange::Reconfigure);
    assert_clean_frame(&frame);
}

#[test]
fn test_stats_summary_after_frames() {
    let geometry = small_2x2();
    let mut scheduler = scheduler_for(2, &geometry);
    for index in 0..3 {
        scheduler.decode_frame(synthetic(&geometry, &SyntheticConfig::default(), index)).unwrap();
    }
    let summary = scheduler.stats().format_summary();
    assert!(summary.contains("3 frames"), "{summary}");
    assert!(summary.contains("cdef"), "{summary}");
}

/// Threads with no tile of their own help the one tall tile row by row.
#[test]
fn test_idle_threads_switch_to_unfinished_tile() {
    let geometry = grid(128, 2048, 1, 1);
    let config = SyntheticConfig::default().with_ragged_cost(2_000);
    let mut scheduler = scheduler_for(4, &geometry);
    for index in 0..10 {
        let frame = synthetic(&geometry, &config, index);
        scheduler.decode_frame(Arc::clone(&frame)).unwrap();
        assert_clean_frame(&frame);
    }
    assert!(scheduler.stats().tile_switches() > 0, "{}", scheduler.stats().format_summary());
    assert_eq!(scheduler.stats().jobs(Stage::Recon), 10 * 32);
    scheduler.shutdown().unwrap();
}
