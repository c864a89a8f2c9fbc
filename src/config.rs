//! Persistent configuration model and defaults.

use std::path::{Path, PathBuf};

use log::warn;

use crate::error::{Result, StemsMixError};

const APP_DIR_NAME: &str = "stemsmix";

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Storage location.
    pub database: DatabaseConfig,
    #[serde(default)]
    /// Set log retention.
    pub history: HistoryConfig,
    #[serde(default)]
    /// Playlist file export preferences.
    pub export: ExportConfig,
    #[serde(default)]
    pub auto_dj: AutoDjConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DatabaseConfig {
    /// Empty means `<data dir>/stemsmix/library.db`.
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct HistoryConfig {
    /// Unlocked set logs with fewer tracks are deleted on startup.
    #[serde(default = "default_min_tracks_to_keep")]
    pub min_tracks_to_keep: i64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ExportConfig {
    #[serde(default = "default_true")]
    pub use_relative_paths: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AutoDjConfig {
    #[serde(default = "default_true")]
    pub create_queue_on_startup: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    /// One of `error`, `warn`, `info`, `debug`, `trace`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_true() -> bool {
    true
}

fn default_min_tracks_to_keep() -> i64 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            min_tracks_to_keep: default_min_tracks_to_keep(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            use_relative_paths: true,
        }
    }
}

impl Default for AutoDjConfig {
    fn default() -> Self {
        Self {
            create_queue_on_startup: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or_else(|_| {
            warn!("Unknown log level '{}', using info", self.level);
            log::LevelFilter::Info
        })
    }
}

impl Config {
    pub fn database_path(&self) -> Result<PathBuf> {
        if !self.database.path.trim().is_empty() {
            return Ok(PathBuf::from(self.database.path.trim()));
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| StemsMixError::Config("could not find data directory".to_string()))?
            .join(APP_DIR_NAME);
        Ok(data_dir.join("library.db"))
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("config.toml"))
}

/// Reads the config, falling back to defaults when the file is missing or
/// cannot be parsed.
pub fn load_config(path: &Path) -> Config {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read config {}: {}", path.display(), err);
            }
            return Config::default();
        }
    };
    match toml::from_str(&text) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                "Failed to parse config {}: {}. Using defaults.",
                path.display(),
                err
            );
            Config::default()
        }
    }
}

pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    let text = toml::to_string_pretty(config)
        .map_err(|err| StemsMixError::Config(format!("failed to serialize config: {}", err)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| StemsMixError::io(parent, err))?;
    }
    std::fs::write(path, text).map_err(|err| StemsMixError::io(path, err))
}
