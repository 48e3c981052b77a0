//! Configuration loading for the portal indexer.
//!
//! Layered config: defaults -> config file -> env vars.
//! The default config file lives at ~/.config/portal-indexer/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::PortalError;

/// Write-lock acquisition and release settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSettings {
    /// Attempts made to acquire the index writer before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff interval after a failed acquisition (ms).
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,

    /// Upper bound for a single backoff interval (ms).
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Long-running batches commit and release the writer after this many
    /// seconds, then re-acquire it before continuing.
    #[serde(default = "default_release_interval_secs")]
    pub release_interval_secs: u64,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_interval_ms() -> u64 {
    100
}

fn default_max_interval_ms() -> u64 {
    2_000
}

fn default_release_interval_secs() -> u64 {
    30
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            release_interval_secs: default_release_interval_secs(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the search index directory
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Memory budget for the index writer in MB
    #[serde(default = "default_writer_memory_mb")]
    pub writer_memory_mb: usize,

    /// Language code used when a record carries none
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Records requested per result page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Writer lock behaviour
    #[serde(default)]
    pub lock: LockSettings,
}

fn default_index_path() -> String {
    ProjectDirs::from("", "", "portal-indexer")
        .map(|p| p.data_local_dir().join("content-index"))
        .unwrap_or_else(|| PathBuf::from("./content-index"))
        .to_string_lossy()
        .to_string()
}

fn default_writer_memory_mb() -> usize {
    50
}

fn default_language() -> String {
    "en".to_string()
}

fn default_page_size() -> u32 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            writer_memory_mb: default_writer_memory_mb(),
            default_language: default_language(),
            page_size: default_page_size(),
            log_level: default_log_level(),
            lock: LockSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/portal-indexer/config.toml)
    /// 3. Explicit config file (optional)
    /// 4. Environment variables (PORTAL_*)
    pub fn load(config_path: Option<&str>) -> Result<Self, PortalError> {
        let config_dir = ProjectDirs::from("", "", "portal-indexer")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("index_path", default_index_path())
            .map_err(|e| PortalError::Config(e.to_string()))?
            .set_default("writer_memory_mb", default_writer_memory_mb() as i64)
            .map_err(|e| PortalError::Config(e.to_string()))?
            .set_default("default_language", default_language())
            .map_err(|e| PortalError::Config(e.to_string()))?
            .set_default("page_size", default_page_size() as i64)
            .map_err(|e| PortalError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| PortalError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: PORTAL_INDEX_PATH, PORTAL_LOCK__MAX_ATTEMPTS, etc.
        builder = builder.add_source(
            Environment::with_prefix("PORTAL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| PortalError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| PortalError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), PortalError> {
        if self.page_size == 0 {
            return Err(PortalError::InvalidInput("page_size must be > 0".into()));
        }
        if self.writer_memory_mb < 15 {
            // tantivy refuses writer budgets below 15MB
            return Err(PortalError::InvalidInput(format!(
                "writer_memory_mb must be >= 15, got {}",
                self.writer_memory_mb
            )));
        }
        if self.lock.max_attempts == 0 {
            return Err(PortalError::InvalidInput(
                "lock.max_attempts must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Expand ~ in index_path to the home directory
    pub fn expanded_index_path(&self) -> PathBuf {
        if let Some(rest) = self.index_path.strip_prefix("~/") {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
        PathBuf::from(&self.index_path)
    }
}
