//! Library for tickflow CLI commands and terminal output.

pub mod commands;
pub mod output;

pub use output::OutputFormat;
