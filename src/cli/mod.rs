//! Command-line interface for artwork-minder.
//!
//! This module provides CLI commands for processing tracks, searching the
//! artwork catalog, optimizing single images, and showing configuration.

mod commands;

pub use commands::{Cli, Commands, run_command};
