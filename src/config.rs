//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\artwork-minder\config.toml
//! - macOS: ~/Library/Application Support/artwork-minder/config.toml
//! - Linux: ~/.config/artwork-minder/config.toml
//!
//! Every section uses `#[serde(default)]`, so a partial file only
//! overrides what it names. Timings are plain milliseconds to keep the
//! file hand-editable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::resolver::SelectionStrategy;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External catalog (MusicBrainz + Cover Art Archive) settings
    pub catalog: CatalogConfig,

    /// Artwork size contract and optimizer tuning
    pub artwork: ArtworkConfig,

    /// Artwork resolution behavior
    pub resolver: ResolverConfig,

    /// Where and how output files are written
    pub output: OutputConfig,
}

/// Catalog client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// MusicBrainz web service root
    pub musicbrainz_url: String,

    /// Cover Art Archive root
    pub coverart_url: String,

    /// User-Agent sent with every request (MusicBrainz requires one)
    pub user_agent: String,

    /// Minimum gap between any two outbound requests
    pub min_interval_ms: u64,

    /// Retries after the first attempt for transient failures
    pub max_retries: u32,

    /// First backoff delay; doubles per attempt
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay
    pub backoff_cap_ms: u64,

    /// Delay after a 429 when the server suggests none
    pub rate_limit_default_ms: u64,

    /// Longest server-requested delay after a 429
    pub rate_limit_max_ms: u64,

    /// Per-request timeout
    pub timeout_secs: u64,

    /// Releases inspected per search
    pub max_releases: u32,

    /// Largest artwork download accepted
    pub max_download_bytes: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            musicbrainz_url: "https://musicbrainz.org/ws/2".to_string(),
            coverart_url: "https://coverartarchive.org".to_string(),
            user_agent: concat!(
                "ArtworkMinder/",
                env!("CARGO_PKG_VERSION"),
                " (https://github.com/artwork-minder)"
            )
            .to_string(),
            min_interval_ms: 1000,
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_cap_ms: 8000,
            rate_limit_default_ms: 5000,
            rate_limit_max_ms: 60_000,
            timeout_secs: 10,
            max_releases: 5,
            max_download_bytes: 10 * 1024 * 1024,
        }
    }
}

impl CatalogConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Artwork contract and optimizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtworkConfig {
    pub max_width: u32,
    pub max_height: u32,
    /// Byte cap for the encoded image
    pub max_bytes: u64,
    /// First JPEG quality tried
    pub initial_quality: u8,
    /// Quality floor before dimensions are reduced further
    pub min_quality: u8,
    pub quality_step: u8,
    /// Dimension multiplier applied when the quality floor is not enough
    pub downscale_factor: f32,
    /// Keep PNG with alpha when it fits the byte cap
    pub preserve_alpha: bool,
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        Self {
            max_width: 500,
            max_height: 500,
            max_bytes: 500 * 1024,
            initial_quality: 85,
            min_quality: 60,
            quality_step: 5,
            downscale_factor: 0.75,
            preserve_alpha: false,
        }
    }
}

/// Artwork resolution settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Search the catalog even when embedded artwork could be optimized
    pub search_when_noncompliant: bool,

    /// Select automatically instead of waiting for the operator
    pub auto_strategy: Option<SelectionStrategy>,
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output directory
    pub directory: PathBuf,

    /// File name pattern: {Artist}, {Title}, {Album}, {Stem}, {ext}
    pub pattern: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            pattern: "{Artist} - {Title}.{ext}".to_string(),
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("artwork-minder"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    load_from(&path).unwrap_or_else(|e| {
        tracing::error!("{}", e);
        tracing::warn!("Using default configuration");
        Config::default()
    })
}

/// Load configuration from an explicit file, failing loudly.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    let config =
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
    tracing::info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Save configuration to the default location
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)?;
    Ok(path)
}

/// Save configuration to an explicit file
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
