//! Raw input sources for strategies.
//!
//! These adapters produce raw records for a strategy's `candidates()`
//! implementation. The generator itself never touches them.
//!
//! - [`DirLineSource`]: lazily iterates the lines of every matching file
//!   under a directory.
//! - [`SqlRowSource`]: runs a parameterized SQLite query and maps each row
//!   into a record as a lazy stream.

mod dir_lines;
mod sql;

pub use dir_lines::{DirLineSource, DirLines};
pub use sql::{SqlRowSource, SqlValue};
