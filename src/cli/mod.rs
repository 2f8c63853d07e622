//! Command-line interface

pub mod args;
pub mod commands;
pub mod errors;

pub use commands::{run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
