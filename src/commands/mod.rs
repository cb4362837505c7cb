//! CLI command implementations for decmt.
//!
//! Each submodule implements one command.
//!
//! - [`simulate`] - Decode a synthetic sequence through the scheduler
//! - [`verify`] - Check that output is identical across thread counts

#![allow(
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::uninlined_format_args
)]

pub mod command;
pub mod common;
pub mod simulate;
pub mod verify;
