//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `process`: run a batch job over track files
//! - `search`: query the catalog without touching files
//! - `optimize`: fit one image to the artwork contract
//! - `config`: show the effective configuration, or write it out

mod config;
mod optimize;
mod process;
mod search;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;

use crate::config::{self as app_config, Config};
use crate::resolver::SelectionStrategy;

pub use config::cmd_config;
pub use optimize::cmd_optimize;
pub use process::cmd_process;
pub use search::cmd_search;

/// Artwork Minder CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Add or fix artwork on track files, writing processed copies
    Process {
        /// Track file or directory of tracks
        path: PathBuf,
        /// Output directory (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Choose artwork automatically instead of prompting
        #[arg(short, long, value_enum)]
        strategy: Option<SelectionStrategy>,
        /// Recurse into subdirectories
        #[arg(short, long)]
        recursive: bool,
        /// Search the catalog even when embedded artwork can be optimized
        #[arg(long)]
        search_noncompliant: bool,
        /// Write the job's error log to this file
        #[arg(long)]
        error_log: Option<PathBuf>,
    },
    /// Search the catalog for artwork
    Search {
        #[arg(long)]
        artist: Option<String>,
        #[arg(long)]
        album: Option<String>,
        #[arg(long)]
        title: Option<String>,
        /// Derive artist and title from this file name
        #[arg(long)]
        filename: Option<PathBuf>,
    },
    /// Optimize a single image to the artwork contract
    Optimize {
        /// Source image
        input: PathBuf,
        /// Destination (extension is adjusted to the output format)
        output: PathBuf,
    },
    /// Show the effective configuration and where it is read from
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        write: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let config = match (&cli.command, cli.config.as_deref()) {
        // Writing a new file: start from defaults
        (Commands::Config { write: true }, Some(path)) if !path.exists() => Config::default(),
        (_, path) => load_config(path)?,
    };

    match &cli.command {
        Commands::Process {
            path,
            output,
            strategy,
            recursive,
            search_noncompliant,
            error_log,
        } => {
            let rt = Runtime::new()?;
            let mut config = config;
            if let Some(dir) = output {
                config.output.directory = dir.clone();
            }
            if *search_noncompliant {
                config.resolver.search_when_noncompliant = true;
            }
            let strategy = strategy.or(config.resolver.auto_strategy);
            cmd_process(&rt, &config, path, *recursive, strategy, error_log.as_deref())
        }
        Commands::Search {
            artist,
            album,
            title,
            filename,
        } => {
            let rt = Runtime::new()?;
            cmd_search(
                &rt,
                &config,
                artist.as_deref(),
                album.as_deref(),
                title.as_deref(),
                filename.as_deref(),
            )
        }
        Commands::Optimize { input, output } => cmd_optimize(&config, input, output),
        Commands::Config { write } => cmd_config(&config, cli.config.as_deref(), *write),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(app_config::load_from(path)?),
        None => Ok(app_config::load()),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Collect audio files from a path (file or directory)
pub(crate) fn collect_audio_files(path: &Path, recursive: bool) -> anyhow::Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = if recursive {
        walkdir::WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| is_audio_file(e.path()))
            .map(|e| e.path().to_path_buf())
            .collect()
    } else {
        std::fs::read_dir(path)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|e| is_audio_file(&e.path()))
            .map(|e| e.path())
            .collect()
    };
    files.sort();
    Ok(files)
}

/// Check if a path has an audio file extension
pub(crate) fn is_audio_file(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    matches!(
        ext.as_deref(),
        Some("mp3" | "flac" | "ogg" | "opus" | "m4a" | "wav" | "aiff")
    )
}
