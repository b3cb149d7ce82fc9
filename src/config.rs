//! Configuration management for Tallybot
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from a YAML file and CLI overrides.

use crate::cli::Cli;
use crate::error::{Result, TallybotError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for Tallybot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Counter record storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Console transport configuration
    #[serde(default)]
    pub console: ConsoleConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory for counter record files
    ///
    /// When unset, the `TALLYBOT_DATA_DIR` environment variable and then
    /// the platform data directory are consulted.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Console transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Chat identity used for the local console conversation
    #[serde(default = "default_chat_id")]
    pub chat_id: i64,
}

fn default_chat_id() -> i64 {
    0
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            chat_id: default_chat_id(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, applying CLI overrides
    ///
    /// A missing file is not an error: the defaults apply, which keeps the
    /// binary runnable without any setup.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tallybot::cli::Cli;
    /// use tallybot::config::Config;
    ///
    /// let config = Config::load("config/config.yaml", &Cli::default()).unwrap();
    /// config.validate().unwrap();
    /// ```
    pub fn load<P: AsRef<Path>>(path: P, cli: &Cli) -> Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&contents).map_err(TallybotError::Yaml)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        if let Some(data_dir) = &cli.data_dir {
            config.storage.data_dir = Some(PathBuf::from(data_dir));
        }

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(data_dir) = &self.storage.data_dir {
            if data_dir.as_os_str().is_empty() {
                return Err(
                    TallybotError::Config("storage.data_dir must not be empty".into()).into(),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.storage.data_dir.is_none());
        assert_eq!(config.console.chat_id, 0);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load("does/not/exist.yaml", &Cli::default()).unwrap();
        assert!(config.storage.data_dir.is_none());
    }

    #[test]
    fn test_load_parses_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "storage:\n  data_dir: /tmp/tally\nconsole:\n  chat_id: 7\n",
        )
        .unwrap();

        let config = Config::load(&path, &Cli::default()).unwrap();
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/tmp/tally")));
        assert_eq!(config.console.chat_id, 7);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "storage:\n  data_dir: /tmp/tally\n").unwrap();

        let config = Config::load(&path, &Cli::default()).unwrap();
        assert_eq!(config.console.chat_id, 0);
    }

    #[test]
    fn test_cli_data_dir_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "storage:\n  data_dir: /tmp/from-file\n").unwrap();

        let cli = Cli {
            data_dir: Some("/tmp/from-cli".to_string()),
            ..Cli::default()
        };
        let config = Config::load(&path, &cli).unwrap();
        assert_eq!(
            config.storage.data_dir,
            Some(PathBuf::from("/tmp/from-cli"))
        );
    }

    #[test]
    fn test_validate_rejects_empty_data_dir() {
        let config = Config {
            storage: StorageConfig {
                data_dir: Some(PathBuf::new()),
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "storage: [not, a, map]\n").unwrap();
        assert!(Config::load(&path, &Cli::default()).is_err());
    }
}
