//! Configuration management for the Sheba console.
//!
//! Loads configuration from ${SHEBA_HOME}/config.toml with sensible defaults,
//! then applies environment overrides.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Returns the default config template with comments.
///
/// Embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for Sheba configuration and data directories.
    //!
    //! SHEBA_HOME resolution order:
    //! 1. SHEBA_HOME environment variable (if set)
    //! 2. ~/.config/sheba (default)

    use std::path::PathBuf;

    /// Returns the Sheba home directory.
    pub fn sheba_home() -> PathBuf {
        if let Ok(home) = std::env::var("SHEBA_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".sheba"),
            |h| h.join(".config").join("sheba"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        sheba_home().join("config.toml")
    }

    /// Returns the path to the persisted session file.
    pub fn session_path() -> PathBuf {
        sheba_home().join("session.json")
    }

    /// Returns the directory for rolling log files.
    pub fn logs_dir() -> PathBuf {
        sheba_home().join("logs")
    }
}

/// Key names of the two persisted session entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub token_key: String,
    pub user_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            token_key: "auth_token".to_string(),
            user_key: "user_data".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when SHEBA_LOG is unset
    pub level: String,
    /// Also write a daily-rolling file under `<SHEBA_HOME>/logs`
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: false,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the backend REST API
    pub api_base_url: String,

    /// Request timeout in milliseconds (0 disables)
    pub api_timeout_ms: u64,

    /// Authorization header scheme
    pub auth_scheme: String,

    /// Authenticated-only GET endpoint reused to validate a stored token
    pub probe_path: String,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
    const DEFAULT_API_TIMEOUT_MS: u64 = 30_000;
    const DEFAULT_AUTH_SCHEME: &str = "Token";
    const DEFAULT_PROBE_PATH: &str = "/dashboard/overview/";

    /// Loads configuration from the default config path and applies
    /// environment overrides.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&paths::config_path())?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Applies overrides from an environment-like lookup.
    ///
    /// Empty or whitespace-only values are treated as unset.
    ///
    /// # Errors
    /// Returns an error if `SHEBA_API_TIMEOUT_MS` is not a number.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = get("SHEBA_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(ms) = get("SHEBA_API_TIMEOUT_MS") {
            self.api_timeout_ms = ms
                .parse()
                .with_context(|| format!("Invalid SHEBA_API_TIMEOUT_MS: {ms}"))?;
        }
        if let Some(key) = get("SHEBA_TOKEN_KEY") {
            self.storage.token_key = key;
        }
        if let Some(key) = get("SHEBA_USER_KEY") {
            self.storage.user_key = key;
        }
        Ok(())
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    /// Returns an error for a malformed base URL or unusable storage keys.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(self.api_base_url.trim())
            .with_context(|| format!("Invalid API base URL: {}", self.api_base_url))?;

        let storage = &self.storage;
        if storage.token_key.trim().is_empty() || storage.user_key.trim().is_empty() {
            anyhow::bail!("Storage key names must not be empty");
        }
        if storage.token_key == storage.user_key {
            anyhow::bail!(
                "Storage keys must differ (both are '{}')",
                storage.token_key
            );
        }
        Ok(())
    }

    /// Returns the request timeout, or None if disabled.
    pub fn api_timeout(&self) -> Option<Duration> {
        if self.api_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.api_timeout_ms))
        }
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: Self::DEFAULT_API_BASE_URL.to_string(),
            api_timeout_ms: Self::DEFAULT_API_TIMEOUT_MS,
            auth_scheme: Self::DEFAULT_AUTH_SCHEME.to_string(),
            probe_path: Self::DEFAULT_PROBE_PATH.to_string(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nonexistent.toml")).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.storage.token_key, "auth_token");
        assert_eq!(config.storage.user_key, "user_data");
    }

    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            "api_base_url = \"https://admin.example.com/api\"\n[storage]\ntoken_key = \"tok\"\n",
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.api_base_url, "https://admin.example.com/api");
        assert_eq!(config.storage.token_key, "tok");
        assert_eq!(config.storage.user_key, "user_data");
        assert_eq!(config.probe_path, "/dashboard/overview/");
    }

    /// The shipped template must parse to exactly the Rust defaults.
    #[test]
    fn test_template_matches_defaults() {
        let parsed: Config = toml::from_str(default_config_template()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_env_overrides_win_and_blank_is_unset() {
        let env: HashMap<&str, &str> = [
            ("SHEBA_API_BASE_URL", "http://127.0.0.1:9000/api"),
            ("SHEBA_API_TIMEOUT_MS", "0"),
            ("SHEBA_TOKEN_KEY", "   "),
            ("SHEBA_USER_KEY", "profile"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|k| env.get(k).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.api_base_url, "http://127.0.0.1:9000/api");
        assert_eq!(config.api_timeout(), None);
        assert_eq!(config.storage.token_key, "auth_token");
        assert_eq!(config.storage.user_key, "profile");
    }

    #[test]
    fn test_bad_timeout_override_is_an_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|k| {
            (k == "SHEBA_API_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url_and_clashing_keys() {
        let bad_url = Config {
            api_base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(bad_url.validate().is_err());

        let clash = Config {
            storage: StorageConfig {
                token_key: "same".to_string(),
                user_key: "same".to_string(),
            },
            ..Default::default()
        };
        assert!(clash.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_default_timeout_is_thirty_seconds() {
        assert_eq!(
            Config::default().api_timeout(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_init_creates_file_and_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("subdir").join("config.toml");

        Config::init(&config_path).unwrap();
        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("api_base_url ="));
        assert!(contents.contains("[storage]"));

        assert!(Config::init(&config_path).is_err());
    }
}
