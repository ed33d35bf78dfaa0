//! Artwork Minder - gives every track in a batch artwork that fits.
//!
//! Tracks keep their embedded artwork when it already meets the size
//! contract, get it optimized when it does not, or get new artwork from
//! MusicBrainz and the Cover Art Archive. Processed copies are written to
//! an output directory; sources are never modified.

pub mod artwork;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod metadata;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod resolver;
pub mod tasks;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("artwork_minder=info"))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli::run_command(&args)
}
