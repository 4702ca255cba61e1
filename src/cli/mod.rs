//! Command-line interface for itemforge.
//!
//! Provides the `run` command, which executes one generation call over a
//! directory of line-file strategies.

mod commands;

pub use commands::{parse_cli, run_with_cli};
