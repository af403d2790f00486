//! Configuration management for sreflow
//!
//! Handles loading configuration from TOML and `SREFLOW_*` environment
//! overrides. Every setting has a default, so running without any
//! configuration performs the standard bootstrap.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Default values for the bootstrap
pub mod defaults {
    pub const APP_NAME: &str = "agents";
    pub const USER_ID: &str = "u1";
    pub const SESSION_ID: &str = "sess1";
    pub const MESSAGE: &str = "run";
    pub const LOG_LEVEL: &str = "warn";
}

/// Environment variables that override the config file
pub mod env_keys {
    pub const APP_NAME: &str = "SREFLOW_APP_NAME";
    pub const USER_ID: &str = "SREFLOW_USER_ID";
    pub const SESSION_ID: &str = "SREFLOW_SESSION_ID";
    pub const PIPELINE: &str = "SREFLOW_PIPELINE";
}

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub general: GeneralConfig,
}

/// Identity of the session the bootstrap creates and runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    /// Text of the synthetic user message submitted to the pipeline
    pub message: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            app_name: defaults::APP_NAME.to_string(),
            user_id: defaults::USER_ID.to_string(),
            session_id: defaults::SESSION_ID.to_string(),
            message: defaults::MESSAGE.to_string(),
        }
    }
}

/// Where to find the pipeline definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Explicit definition file; searched for when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Apply `SREFLOW_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(app_name) = non_empty(env_keys::APP_NAME) {
            self.session.app_name = app_name;
        }
        if let Some(user_id) = non_empty(env_keys::USER_ID) {
            self.session.user_id = user_id;
        }
        if let Some(session_id) = non_empty(env_keys::SESSION_ID) {
            self.session.session_id = session_id;
        }
        if let Some(path) = non_empty(env_keys::PIPELINE) {
            self.pipeline.path = Some(PathBuf::from(path));
        }
    }
}

/// Holds the configuration read from disk
///
/// A missing file means every setting keeps its default; an unreadable or
/// malformed one is an error.
pub struct ConfigManager {
    config: Config,
}

impl ConfigManager {
    /// Read `sreflow/config.toml` from the user config directory
    pub fn new() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("No user config directory on this platform".to_string()))?;
        Self::with_path(dir.join("sreflow").join("config.toml"))
    }

    /// Read the configuration at `path`
    pub fn with_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                Error::Config(format!("Invalid config {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                Config::default()
            }
            Err(e) => {
                return Err(Error::Config(format!("Cannot read {}: {}", path.display(), e)));
            }
        };
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }
}
