use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::geocode::nominatim;

/// Top-level configuration for photo-geocoder.
///
/// Controls the reverse-geocoding service, the exiftool process, and batch
/// behavior.
///
/// # Loading
///
/// ```rust,no_run
/// use photo_geocoder::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.geocoder.user_agent = "https://example.com/my-photo-tool".into();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Reverse-geocoding service settings (Nominatim).
    pub geocoder: GeocoderConfig,
    /// exiftool process settings.
    pub exiftool: ExifToolConfig,
    /// Batch behavior (worker count, dry run).
    pub batch: BatchConfig,
}

/// Nominatim service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    /// Base URL of the Nominatim instance.
    pub endpoint: String,
    /// Client identifier sent as the `User-Agent` header. Nominatim's usage
    /// policy requires one; the default is this project's URL.
    pub user_agent: String,
    /// Minimum milliseconds between lookups, shared across all workers.
    pub min_interval_ms: u64,
    /// How many times a failed lookup is retried before giving up.
    pub retries: u32,
}

impl GeocoderConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

/// exiftool process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExifToolConfig {
    /// Path to the exiftool executable.
    pub executable: PathBuf,
}

/// Batch behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of files processed concurrently.
    pub concurrency: usize,
    /// If `true`, run the full pipeline but skip the metadata write.
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geocoder: GeocoderConfig {
                endpoint: nominatim::DEFAULT_ENDPOINT.to_string(),
                user_agent: nominatim::DEFAULT_USER_AGENT.to_string(),
                min_interval_ms: 500,
                retries: 1,
            },
            exiftool: ExifToolConfig {
                executable: PathBuf::from("exiftool"),
            },
            batch: BatchConfig {
                concurrency: 2,
                dry_run: false,
            },
        }
    }
}

impl Config {
    /// Resolve the config file path — same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::debug!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }
}
