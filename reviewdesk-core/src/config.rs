//! Configuration management for ReviewDesk
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (REVIEWDESK_*)
//! 3. Config file (~/.config/reviewdesk/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::request::OwnerId;
use crate::{Error, Result};

/// Identity of the signed-in user
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Owner id supplied by the identity provider; unset means signed out
    pub owner: Option<String>,
}

impl SessionConfig {
    pub fn owner_id(&self) -> Option<OwnerId> {
        self.owner
            .as_deref()
            .filter(|o| !o.is_empty())
            .map(OwnerId::from)
    }
}

/// Store location
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Path to the SQLite file; defaults to the cache directory
    pub path: Option<PathBuf>,

    /// Maximum number of pooled connections
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 5,
        }
    }
}

/// Live list synchronization settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound on a full fetch
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,

    /// Upper bound on a status write
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,

    /// Per-subscription queue length of the change feed
    pub feed_buffer: usize,

    /// How often `watch` re-seeds from the store
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            feed_buffer: 256,
            refresh_interval: Duration::from_secs(30),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub database: DatabaseSettings,
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/reviewdesk/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("reviewdesk").join("config.toml"))
    }

    /// Get the default database path (`~/.cache/reviewdesk/reviewdesk.db`)
    pub fn default_database_path() -> Result<PathBuf> {
        dirs::cache_dir()
            .map(|p| p.join("reviewdesk").join("reviewdesk.db"))
            .ok_or_else(|| Error::Config("Could not determine cache directory".to_string()))
    }

    /// Database path after defaults are applied
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Self::default_database_path(),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - REVIEWDESK_OWNER: Signed-in owner id
    /// - REVIEWDESK_DATABASE: Path to the SQLite database
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(owner) = std::env::var("REVIEWDESK_OWNER") {
            self.session.owner = Some(owner);
        }

        if let Ok(path) = std::env::var("REVIEWDESK_DATABASE") {
            self.database.path = Some(PathBuf::from(path));
        }

        self
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, owner: Option<String>, database: Option<PathBuf>) -> Self {
        if let Some(owner) = owner {
            self.session.owner = Some(owner);
        }

        if let Some(path) = database {
            self.database.path = Some(path);
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(owner: Option<String>, database: Option<PathBuf>) -> Result<Self> {
        Ok(Self::load()?
            .with_env_overrides()
            .with_cli_overrides(owner, database))
    }
}
