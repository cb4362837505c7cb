//! Command trait definition for CLI commands.
//!
//! This module defines the [`Command`] trait that all decmt CLI commands implement.
//! The trait uses `enum_dispatch` for efficient dynamic dispatch across command variants.

use anyhow::Result;
use enum_dispatch::enum_dispatch;

/// Trait implemented by all decmt CLI commands.
///
/// The `command_line` parameter contains the full command invocation for logging.
#[enum_dispatch]
pub trait Command {
    #[allow(clippy::missing_errors_doc)]
    fn execute(&self, command_line: &str) -> Result<()>;
}
