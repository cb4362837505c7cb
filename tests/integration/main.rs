//! Integration tests for the decmt scheduler.
//!
//! These tests drive the full scheduler with the synthetic decoder and check the
//! end-to-end properties: identical output for every thread count, every job run exactly
//! once in dependency order, clean shutdown and error propagation.

mod helpers;
mod test_determinism;
mod test_end_to_end;
mod test_error_paths;
mod test_exactly_once;
mod test_geometry_change;
mod test_shutdown;
