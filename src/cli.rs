//! Command line interface of the `tessera` binary.

pub mod args;
pub mod commands;
pub mod output;

pub use args::{Command, OutputFormat, TesseraArgs};
pub use commands::execute_command;
