//! Helper utilities for integration tests.

pub mod assertions;
pub mod frames;
pub mod timeout;

pub use assertions::*;
pub use frames::*;
pub use timeout::*;
