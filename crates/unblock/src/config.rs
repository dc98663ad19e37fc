//! Configuration management for unblock.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use unblock_core::{FeedbackStoreConfig, FormatterConfig, SelectorConfig};
use unblock_runtime::SyncConfig;

/// unblock configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Strategy ranking
    pub selector: SelectorConfig,

    /// Feedback retention
    pub feedback: FeedbackStoreConfig,

    /// Recommendation formatting
    pub formatter: FormatterConfig,

    /// Reactive target sync
    pub sync: SyncConfig,

    /// File locations
    pub paths: PathsConfig,
}

/// File locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Data directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Feedback store file; relative paths resolve against `data_dir`
    #[serde(default = "default_feedback_file")]
    pub feedback_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            feedback_file: default_feedback_file(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "unblock", "unblock") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".unblock")
    }
}

fn default_feedback_file() -> PathBuf {
    PathBuf::from("feedback.json")
}

impl Config {
    /// Load configuration from the default location, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults when it is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Config = if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            debug!(path = %path.display(), "Loading configuration");
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("UNBLOCK_CONFIG") {
            PathBuf::from(path)
        } else if let Some(proj_dirs) = ProjectDirs::from("dev", "unblock", "unblock") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.selector.validate().context("Invalid selector configuration")?;
        self.feedback.validate().context("Invalid feedback configuration")?;
        self.formatter.validate().context("Invalid formatter configuration")?;
        self.sync.validate().context("Invalid sync configuration")?;
        Ok(())
    }

    /// Resolved feedback store path.
    pub fn feedback_path(&self) -> PathBuf {
        if self.paths.feedback_file.is_absolute() {
            self.paths.feedback_file.clone()
        } else {
            self.paths.data_dir.join(&self.paths.feedback_file)
        }
    }
}
