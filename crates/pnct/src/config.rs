//! Configuration management for pnct.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "pnct";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "rodovias.db";

/// Where DNIT publishes the PNCT archives.
pub const DEFAULT_BASE_URL: &str = "https://servicos.dnit.gov.br/dadospnct/arquivos";

/// Geographic center of Brazil (Brasília), used as the default map center.
pub const DEFAULT_MAP_CENTER: (f64, f64) = (-15.788_497, -47.879_873);

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `PNCT_`)
/// 2. TOML config file at `~/.config/pnct/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Download source configuration.
    pub source: SourceConfig,
    /// Cache configuration.
    pub cache: CacheConfig,
    /// Dashboard configuration.
    pub dashboard: DashboardConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/pnct/rodovias.db`
    pub database_path: Option<PathBuf>,
    /// Number of history entries shown by default.
    pub history_limit: usize,
    /// Maximum number of history entries to retain.
    /// Set to 0 for unlimited.
    pub max_history: usize,
}

/// Download source configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL the archive names are appended to.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Root directory for downloaded archives and extracted CSVs.
    /// Defaults to `~/.local/share/pnct/raw`
    pub raw_data_dir: Option<PathBuf>,
}

/// Cache-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a stored dataset is served without downloading again.
    /// Set to 0 to always download.
    pub ttl_secs: u64,
}

/// Dashboard configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Address the dashboard listens on.
    pub bind: SocketAddr,
    /// Number of rows shown in the preview table.
    pub preview_rows: usize,
    /// Map center as (latitude, longitude).
    pub map_center: (f64, f64),
    /// Initial map zoom level.
    pub map_zoom: u8,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Append log lines to this file in addition to stderr.
    pub file: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Will be resolved to default at runtime
            history_limit: 10,
            max_history: 1_000,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            user_agent: concat!("pnct/", env!("CARGO_PKG_VERSION")).to_string(),
            raw_data_dir: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 3_600 }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8501)),
            preview_rows: 10,
            map_center: DEFAULT_MAP_CENTER,
            map_zoom: 4,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `PNCT_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("PNCT_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.source.timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "source.timeout_secs must be greater than 0".to_string(),
            });
        }

        let base = self.source.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(Error::ConfigValidation {
                message: format!("source.base_url must be an http(s) URL: {base}"),
            });
        }

        if self.dashboard.preview_rows == 0 {
            return Err(Error::ConfigValidation {
                message: "dashboard.preview_rows must be greater than 0".to_string(),
            });
        }

        let (lat, lon) = self.dashboard.map_center;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(Error::ConfigValidation {
                message: format!("dashboard.map_center out of range: ({lat}, {lon})"),
            });
        }

        if self.dashboard.map_zoom > 19 {
            return Err(Error::ConfigValidation {
                message: format!(
                    "dashboard.map_zoom must be at most 19, got {}",
                    self.dashboard.map_zoom
                ),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the raw data directory, resolving defaults if not set.
    #[must_use]
    pub fn raw_data_dir(&self) -> PathBuf {
        self.source
            .raw_data_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("raw"))
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.source.timeout_secs)
    }

    /// Get the cache TTL, or `None` when caching is disabled.
    #[must_use]
    pub fn cache_ttl(&self) -> Option<Duration> {
        if self.cache.ttl_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.cache.ttl_secs))
        }
    }
}
