//! Configuration management for raidsim
//!
//! Every path the library touches is derived from an explicit [`Config`]
//! handed to the factory and the state store.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default subdirectory of the base directory that holds drive backing storage
pub const DEFAULT_DRIVES_DIR: &str = "drives";

/// Default name of the configuration document
pub const DEFAULT_STATE_DOCUMENT: &str = "state.json";

/// Default name of the detached digest file
pub const DEFAULT_STATE_DIGEST: &str = "state.checksum";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// State store file names, relative to the base directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Configuration document (JSON)
    pub document: String,

    /// Lowercase hex SHA-256 of the document bytes
    pub digest: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        StateConfig {
            document: DEFAULT_STATE_DOCUMENT.to_string(),
            digest: DEFAULT_STATE_DIGEST.to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Root of the RAID workspace
    pub base_dir: PathBuf,

    /// Drive directory name under `base_dir`
    #[serde(default = "default_drives_dir")]
    pub drives_dir: String,

    /// State store file names
    #[serde(default)]
    pub state: StateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_drives_dir() -> String {
    DEFAULT_DRIVES_DIR.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_dir: PathBuf::from("."),
            drives_dir: default_drives_dir(),
            state: StateConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Create a config rooted at `base_dir` with default file names
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Config {
            base_dir: base_dir.into(),
            ..Config::default()
        }
    }

    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::InvalidConfig(format!("Failed to read config file: {}", e))
        })?;

        let mut config: Config = serde_json::from_str(&content).map_err(|e| {
            Error::InvalidConfig(format!("Failed to parse config file: {}", e))
        })?;

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("RAIDSIM_BASE_DIR") {
            let dir = dir.trim();
            if !dir.is_empty() {
                self.base_dir = PathBuf::from(dir);
            }
        }

        if let Ok(level) = std::env::var("RAIDSIM_LOG_LEVEL") {
            let level = level.trim().to_lowercase();
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            Error::InvalidConfig(format!("Failed to serialize config: {}", e))
        })?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path.as_ref(), content).map_err(|e| {
            Error::InvalidConfig(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "Base directory must not be empty".to_string(),
            ));
        }

        for (field, value) in [
            ("drives_dir", &self.drives_dir),
            ("state.document", &self.state.document),
            ("state.digest", &self.state.digest),
        ] {
            if value.is_empty() || value.contains(['/', '\\']) || value == ".." {
                return Err(Error::InvalidConfig(format!(
                    "{} must be a plain file name, got {:?}",
                    field, value
                )));
            }
        }

        if self.state.document == self.state.digest {
            return Err(Error::InvalidConfig(
                "State document and digest must be different files".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(Error::InvalidConfig(format!(
                "Unknown log level {:?}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Directory holding every drive's backing storage
    pub fn drives_path(&self) -> PathBuf {
        self.base_dir.join(&self.drives_dir)
    }

    /// Backing directory of a single drive
    pub fn drive_path(&self, name: &str) -> PathBuf {
        self.drives_path().join(name)
    }

    pub fn state_document_path(&self) -> PathBuf {
        self.base_dir.join(&self.state.document)
    }

    pub fn state_digest_path(&self) -> PathBuf {
        self.base_dir.join(&self.state.digest)
    }
}

/// Default location of the config file (`<config dir>/raidsim/config.json`)
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("raidsim")
        .join("config.json")
}
