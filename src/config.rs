use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::app_dirs::AppDirs;
use crate::timer::DEFAULT_PROJECT;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Backend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    /// Overrides the backend's default location
    pub data_file: Option<PathBuf>,
    pub default_project: String,
    /// Cadence of the live display in `watch`
    pub refresh_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Json,
            data_file: None,
            default_project: DEFAULT_PROJECT.to_string(),
            refresh_interval_ms: 1000,
        }
    }
}

impl Config {
    /// Where the snapshot lives for the configured backend
    pub fn resolved_data_file(&self) -> PathBuf {
        if let Some(path) = &self.data_file {
            return path.clone();
        }
        let default = match self.backend {
            Backend::Json => AppDirs::state_file(),
            Backend::Sqlite => AppDirs::db_path(),
        };
        default.unwrap_or_else(|| match self.backend {
            Backend::Json => PathBuf::from("timesnap-data.json"),
            Backend::Sqlite => PathBuf::from("timesnap.db"),
        })
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path = AppDirs::config_file().unwrap_or_else(|| PathBuf::from("timesnap_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice::<Config>(&bytes).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable config");
                Config::default()
            }),
            Err(_) => Config::default(),
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}
