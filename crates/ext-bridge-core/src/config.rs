//! Runtime configuration.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

/// Default bound on every cross-context call.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

const ENV_REQUEST_TIMEOUT: &str = "EXT_BRIDGE_REQUEST_TIMEOUT_MS";
const ENV_STORAGE_PATH: &str = "EXT_BRIDGE_STORAGE_PATH";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("request_timeout_ms must be greater than zero")]
    ZeroTimeout,
}

/// Which persistence backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    /// JSON file for the `file` backend. Defaults under the user data dir.
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Path the file backend should use.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("ext-bridge")
                .join("storage.json")
        })
    }
}

/// Top-level configuration, usually read from a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub request_timeout_ms: u64,
    pub storage: StorageConfig,
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            storage: StorageConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Parse a TOML document. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns error if the document is invalid or the timeout is zero.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, then apply environment overrides.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env(|var| std::env::var(var).ok())?;
        tracing::debug!(path = %path.display(), ?config, "Loaded configuration");
        Ok(config)
    }

    /// Apply `EXT_BRIDGE_*` overrides read through `lookup`.
    ///
    /// # Errors
    /// Returns error if an override does not parse.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_REQUEST_TIMEOUT) {
            self.request_timeout_ms =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnv {
                        var: ENV_REQUEST_TIMEOUT,
                        value,
                    })?;
        }
        if let Some(value) = lookup(ENV_STORAGE_PATH) {
            self.storage.backend = StorageBackendKind::File;
            self.storage.path = Some(PathBuf::from(value));
        }
        self.validate()
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}
