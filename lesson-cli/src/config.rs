use std::path::{Path, PathBuf};

use lesson_player::{PlayerConfig, RemoteConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, Result};

const APP_DIR: &str = "lesson-player";
const CONFIG_FILE: &str = "config.toml";
const CACHE_FILE: &str = "progress.json";

/// Settings read from the TOML file; command-line flags take precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    pub remote: RemoteConfig,
    pub player: PlayerConfig,
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`, or the default location. A missing file yields the
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&raw)?;
        config
            .player
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Overwrite the file with the defaults.
    pub fn reset(path: Option<&Path>) -> Result<PathBuf> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(Self::default_path)
            .ok_or_else(|| AppError::Config("no config directory on this platform".into()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, Self::default().show()?)?;
        Ok(path)
    }

    pub fn show(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, server: Option<String>, cache: Option<PathBuf>) -> Self {
        if let Some(server) = server {
            self.remote.base_url = server;
        }
        if cache.is_some() {
            self.cache_path = cache;
        }
        self
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|dir| dir.join(APP_DIR))
                .unwrap_or_default()
                .join(CACHE_FILE)
        })
    }
}
