//! Session configuration

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

use babelcast_core::{Error, Result};
use babelcast_store::RetryPolicy;

/// Tunables for a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Regeneration budget when a generated room code collides
    pub code_attempts: u32,
    /// Buffered events on the session's internal feed channel
    pub channel_capacity: usize,
    /// Whether the host also subscribes to its own room's message feed
    pub echo_own_messages: bool,
    /// Attempt budget for one-shot store writes
    pub write_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            code_attempts: 4,
            channel_capacity: 64,
            echo_own_messages: false,
            write_attempts: 3,
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Default config file location, if the platform provides one
    pub fn default_path() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("dev", "babelcast", "babelcast")?;
        Some(dirs.config_dir().join("session.toml"))
    }

    /// Load the default config file, falling back to defaults when it is
    /// missing or malformed
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable session config");
                Self::default()
            }
        }
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_attempts(self.write_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.code_attempts, 4);
        assert_eq!(config.channel_capacity, 64);
        assert!(!config.echo_own_messages);
        assert_eq!(config.write_attempts, 3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SessionConfig::from_toml_str("echo_own_messages = true\n").unwrap();
        assert!(config.echo_own_messages);
        assert_eq!(config.code_attempts, 4);
    }

    #[test]
    fn test_malformed_toml_is_a_config_error() {
        let err = SessionConfig::from_toml_str("code_attempts = \"many\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "write_attempts = 5\nchannel_capacity = 16\n").unwrap();

        let config = SessionConfig::load(&path).unwrap();
        assert_eq!(config.write_attempts, 5);
        assert_eq!(config.channel_capacity, 16);

        let missing = SessionConfig::load(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(Error::Config(_))));
    }
}
