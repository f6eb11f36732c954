use dirs::home_dir;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://home.nest.com";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Optional settings read from ~/.nest.yml
///
/// Credentials are never read from or written to this file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host serving `/user/login`
    pub base_url: String,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(self) -> Result<Self> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Config("base_url must not be empty".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::Config(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Get the path to the configuration file (~/.nest.yml)
pub fn get_config_path() -> Result<PathBuf> {
    let home =
        home_dir().ok_or_else(|| Error::Config("Failed to determine home directory".to_string()))?;
    Ok(home.join(".nest.yml"))
}

/// Load ~/.nest.yml, falling back to defaults when it does not exist.
pub fn load_config() -> Result<Config> {
    let config_path = get_config_path()?;

    if !config_path.exists() {
        debug!(
            "No configuration file at {}, using defaults",
            config_path.display()
        );
        return Ok(Config::default());
    }

    load_config_from(&config_path)
}

/// Load an explicitly named configuration file, which must exist.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let content = fs::read_to_string(path)?;
    // An empty file is a valid "all defaults" config.
    let config = if content.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str::<Config>(&content)?
    };

    debug!("Loaded configuration from {}", path.display());
    config.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.base_url, "https://home.nest.com");
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config("poll_interval_secs: 15\n");
        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.poll_interval_secs, 15);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_empty_file_is_defaults() {
        let file = write_config("");
        assert_eq!(load_config_from(file.path()).unwrap(), Config::default());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let file = write_config("poll_interval_secs: 0\n");
        let err = load_config_from(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        let file = write_config("base_url: [unterminated\n");
        let err = load_config_from(file.path()).unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_from(&dir.path().join("missing.yml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config {
            base_url: "https://staging.example.com".to_string(),
            poll_interval_secs: 5,
            request_timeout_secs: 10,
        };

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("base_url: https://staging.example.com"));
        assert!(yaml.contains("poll_interval_secs: 5"));

        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
