//! Job failures, panics and configuration errors.

use std::sync::Arc;

use decmt_lib::errors::DecodeMtError;
use decmt_lib::frame_pipeline::{ErrorPolicy, FrameScheduler, FrameState, SchedulerConfig, Stage};
use decmt_lib::geometry::Capacity;
use decmt_lib::synthetic::{Fault, SyntheticConfig, SyntheticFrame};
use rstest::rstest;

use crate::helpers::{assert_clean_frame, grid, scheduler_for, small_2x2, synthetic, test_config};

#[rstest]
#[case::motion(Fault::error(Stage::MotionProjection, 2), Stage::MotionProjection)]
#[case::parse(Fault::error(Stage::Parse, 1), Stage::Parse)]
#[case::recon(Fault::error(Stage::Recon, 2), Stage::Recon)]
#[case::loop_filter(Fault::error(Stage::LoopFilter, 3), Stage::LoopFilter)]
#[case::cdef(Fault::error(Stage::Cdef, 0), Stage::Cdef)]
fn test_abort_policy_surfaces_first_failure(#[case] fault: Fault, #[case] stage: Stage) {
    let geometry = small_2x2();
    let mut scheduler = scheduler_for(4, &geometry);
    let frame = synthetic(&geometry, &SyntheticConfig::default().with_fault(fault), 0);

    let err = scheduler.decode_frame(frame).unwrap_err();
    match err {
        DecodeMtError::JobFailed { stage: failed, ref message, .. } => {
            assert_eq!(failed, stage);
            assert!(message.contains("injected"), "{message}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(scheduler.stats().failed_jobs(), 1);

    // The pool survives and decodes the next frame normally.
    let next = synthetic(&geometry, &SyntheticConfig::default(), 1);
    scheduler.decode_frame(Arc::clone(&next)).unwrap();
    assert_clean_frame(&next);

    // A pool thread that hit the failure reports it again when it exits.
    if let Err(e) = scheduler.shutdown() {
        assert!(matches!(e, DecodeMtError::JobFailed { stage: failed, .. } if failed == stage));
    }
}

#[test]
fn test_panicking_kernel_becomes_job_failure() {
    let geometry = grid(512, 256, 2, 1);
    let mut scheduler = scheduler_for(3, &geometry);
    let config = SyntheticConfig::default().with_fault(Fault::panic(Stage::LoopFilter, 1));
    let err = scheduler.decode_frame(synthetic(&geometry, &config, 0)).unwrap_err();
    assert!(
        matches!(err, DecodeMtError::JobFailed { stage: Stage::LoopFilter, ref message, .. } if message.contains("panicked")),
        "{err:?}"
    );

    let next = synthetic(&geometry, &SyntheticConfig::default(), 1);
    scheduler.decode_frame(Arc::clone(&next)).unwrap();
    assert_clean_frame(&next);
}

#[rstest]
#[case::single_thread(1)]
#[case::pool(4)]
fn test_local_only_cdef_failure(#[case] threads: usize) {
    let geometry = small_2x2();
    let config = test_config(threads).with_error_policy(ErrorPolicy::LocalOnly);
    let mut scheduler: FrameScheduler<SyntheticFrame> =
        FrameScheduler::new(config, geometry.required_capacity()).unwrap();

    let faulty = SyntheticConfig::default().with_fault(Fault::error(Stage::Cdef, 1));
    let err = scheduler.decode_frame(synthetic(&geometry, &faulty, 0)).unwrap_err();
    assert!(matches!(err, DecodeMtError::JobFailed { stage: Stage::Cdef, .. }));

    // Jobs abandoned by the failing thread do not leak into the next frame.
    let next = synthetic(&geometry, &SyntheticConfig::default(), 1);
    scheduler.decode_frame(Arc::clone(&next)).unwrap();
    assert_clean_frame(&next);
}

#[test]
fn test_invalid_backoff_rejected() {
    let config = SchedulerConfig::new(2).with_backoff_us(500, 5);
    let err = FrameScheduler::<SyntheticFrame>::new(config, small_2x2().required_capacity())
        .unwrap_err();
    assert!(matches!(err, DecodeMtError::InvalidParameter { .. }));
}

#[test]
fn test_frame_state_capacity_exceeded() {
    let state = FrameState::new(Capacity::for_grid(1, 1, 2));
    let err = state.configure(&small_2x2()).unwrap_err();
    assert!(matches!(err, DecodeMtError::CapacityExceeded { .. }), "{err:?}");
}

#[test]
fn test_caller_failure_leaves_shutdown_clean() {
    let geometry = small_2x2();
    let mut scheduler = scheduler_for(1, &geometry);
    let config = SyntheticConfig::default().with_fault(Fault::error(Stage::Parse, 0));
    assert!(scheduler.decode_frame(synthetic(&geometry, &config, 0)).is_err());
    // The failure happened on the calling thread, so no pool thread reports it.
    scheduler.shutdown().unwrap();
}
