//! Custom assertion helpers for integration tests.

#![allow(dead_code)]

use decmt_lib::synthetic::SyntheticFrame;

/// Asserts that every job of `frame` ran exactly once, in dependency order, and that the
/// final picture is complete.
///
/// # Panics
///
/// Panics with the first recorded violations if any check fails.
pub fn assert_clean_frame(frame: &SyntheticFrame) {
    assert_eq!(
        frame.violations(),
        0,
        "frame {} saw dependency violations: {:?}",
        frame.frame_index(),
        frame.violation_notes()
    );
    assert!(frame.ran_exactly_once(), "frame {} ran a job twice or not at all", frame.frame_index());
    assert!(frame.is_complete(), "frame {} output is incomplete", frame.frame_index());
}
