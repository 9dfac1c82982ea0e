use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("settings validation failed: {0}")]
    Settings(String),
    #[error("failed to resolve home directory for global config path")]
    HomeDirectoryUnavailable,
}

pub const GLOBAL_STATE_DIR: &str = ".chatdeck";
pub const GLOBAL_SETTINGS_FILE_NAME: &str = "config.yaml";

pub const DEFAULT_RUNNER_BINARY: &str = "ollama";
pub const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

fn default_runner_binary() -> String {
    DEFAULT_RUNNER_BINARY.to_string()
}

fn default_stream_timeout_secs() -> u64 {
    DEFAULT_STREAM_TIMEOUT_SECS
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_runner_binary")]
    pub runner_binary: String,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub generation_timeout_secs: Option<u64>,
    #[serde(default = "default_stream_timeout_secs")]
    pub stream_timeout_secs: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            runner_binary: default_runner_binary(),
            default_model: None,
            generation_timeout_secs: None,
            stream_timeout_secs: default_stream_timeout_secs(),
            history_limit: default_history_limit(),
        }
    }
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runner_binary.trim().is_empty() {
            return Err(ConfigError::Settings(
                "`runner_binary` must be non-empty".to_string(),
            ));
        }
        if self.stream_timeout_secs == 0 {
            return Err(ConfigError::Settings(
                "`stream_timeout_secs` must be greater than zero".to_string(),
            ));
        }
        if self.generation_timeout_secs == Some(0) {
            return Err(ConfigError::Settings(
                "`generation_timeout_secs` must be greater than zero when set".to_string(),
            ));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::Settings(
                "`history_limit` must be greater than zero".to_string(),
            ));
        }
        if let Some(model) = &self.default_model {
            if model.trim().is_empty() {
                return Err(ConfigError::Settings(
                    "`default_model` must be non-empty when set".to_string(),
                ));
            }
        }
        Ok(())
    }
}

pub fn default_state_root_path() -> Result<PathBuf, ConfigError> {
    let home = std::env::var_os("HOME").ok_or(ConfigError::HomeDirectoryUnavailable)?;
    Ok(PathBuf::from(home).join(GLOBAL_STATE_DIR))
}

pub fn default_global_config_path() -> Result<PathBuf, ConfigError> {
    Ok(default_state_root_path()?.join(GLOBAL_SETTINGS_FILE_NAME))
}

/// Missing config file is not an error; the defaults stand in for it.
pub fn load_global_settings() -> Result<Settings, ConfigError> {
    let path = default_global_config_path()?;
    if !path.exists() {
        return Ok(Settings::default());
    }
    let settings = Settings::from_path(&path)?;
    settings.validate()?;
    Ok(settings)
}
