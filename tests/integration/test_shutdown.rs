//! Pool lifecycle: startup, shutdown and drop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use decmt_lib::errors::DecodeMtError;
use decmt_lib::frame_pipeline::FrameScheduler;
use decmt_lib::synthetic::{SyntheticConfig, SyntheticFrame};
use rstest::rstest;

use crate::helpers::{
    assert_clean_frame, grid, run_with_timeout, scheduler_for, small_2x2, synthetic, test_config,
};

#[test]
fn test_shutdown_four_threads_exits_three() {
    let geometry = small_2x2();
    let mut scheduler = scheduler_for(4, &geometry);
    scheduler.decode_frame(synthetic(&geometry, &SyntheticConfig::default(), 0)).unwrap();
    scheduler.shutdown().unwrap();
    assert_eq!(scheduler.num_threads_exited(), 3);
    assert!(scheduler.is_shut_down());
}

#[rstest]
#[case::one(1)]
#[case::two(2)]
#[case::eight(8)]
fn test_shutdown_before_any_frame(#[case] threads: usize) {
    let mut scheduler = scheduler_for(threads, &small_2x2());
    scheduler.shutdown().unwrap();
    assert_eq!(scheduler.num_threads_exited(), threads - 1);
}

#[test]
fn test_shutdown_is_idempotent_and_final() {
    let geometry = small_2x2();
    let mut scheduler = scheduler_for(3, &geometry);
    scheduler.shutdown().unwrap();
    scheduler.shutdown().unwrap();
    let err = scheduler.decode_frame(synthetic(&geometry, &SyntheticConfig::default(), 0)).unwrap_err();
    assert!(matches!(err, DecodeMtError::ShutDown));
}

#[test]
fn test_drop_joins_pool() {
    let geometry = small_2x2();
    let started = Instant::now();
    {
        let mut scheduler = scheduler_for(6, &geometry);
        for index in 0..3 {
            scheduler.decode_frame(synthetic(&geometry, &SyntheticConfig::default(), index)).unwrap();
        }
    }
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[test]
fn test_scheduler_moves_between_threads() {
    let geometry = small_2x2();
    let mut scheduler: FrameScheduler<SyntheticFrame> =
        FrameScheduler::new(test_config(3), geometry.required_capacity()).unwrap();
    let frame = synthetic(&geometry, &SyntheticConfig::default(), 0);
    let worker_frame = Arc::clone(&frame);
    let handle = std::thread::spawn(move || {
        scheduler.decode_frame(worker_frame).unwrap();
        scheduler.shutdown().unwrap();
        scheduler.num_threads_exited()
    });
    assert_eq!(handle.join().unwrap(), 2);
    assert!(frame.is_complete());
}

/// Shutdown straight after a frame, on a pool much larger than the frame's work.
///
/// Pool threads leave the last frame barrier at different times; a slow one must still
/// take part in the shutdown pass rather than exit early and strand the others.
#[test]
fn test_shutdown_right_after_frame_never_hangs() {
    let result = run_with_timeout(Duration::from_secs(60), || {
        let geometry = grid(64, 64, 1, 1);
        for iteration in 0..200 {
            let mut scheduler = scheduler_for(8, &geometry);
            let frame = synthetic(&geometry, &SyntheticConfig::default(), iteration);
            scheduler.decode_frame(Arc::clone(&frame)).unwrap();
            assert_clean_frame(&frame);
            scheduler.shutdown().unwrap();
            assert_eq!(scheduler.num_threads_exited(), 7, "iteration {iteration}");
        }
    });
    result.unwrap_or_else(|e| panic!("shutdown hung: {e}"));
}

/// Drop straight after a frame goes through the same shutdown pass.
#[test]
fn test_drop_right_after_frame_never_hangs() {
    let result = run_with_timeout(Duration::from_secs(60), || {
        let geometry = grid(64, 64, 1, 1);
        for iteration in 0..200 {
            let mut scheduler = scheduler_for(6, &geometry);
            let frame = synthetic(&geometry, &SyntheticConfig::default(), iteration);
            scheduler.decode_frame(frame).unwrap();
        }
    });
    result.unwrap_or_else(|e| panic!("drop hung: {e}"));
}

/// Reallocation stops the old pool right after the previous frame's barrier.
#[test]
fn test_reallocate_right_after_frame_never_hangs() {
    let result = run_with_timeout(Duration::from_secs(60), || {
        let small = grid(64, 64, 1, 1);
        let large = grid(256, 256, 2, 2);
        let config = SyntheticConfig::default();
        for iteration in 0..100 {
            let mut scheduler = scheduler_for(8, &small);
            scheduler.decode_frame(synthetic(&small, &config, 0)).unwrap();
            let frame = synthetic(&large, &config, 1);
            scheduler.decode_frame(Arc::clone(&frame)).unwrap();
            assert_clean_frame(&frame);
            scheduler.shutdown().unwrap();
            assert_eq!(scheduler.num_threads_exited(), 7, "iteration {iteration}");
        }
    });
    result.unwrap_or_else(|e| panic!("reallocation hung: {e}"));
}
