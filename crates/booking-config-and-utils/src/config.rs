//! Configuration management for the booking client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default API base URL (can be overridden at compile time via BOOKING_API_BASE_URL env var).
pub const DEFAULT_API_BASE_URL: &str = match option_env!("BOOKING_API_BASE_URL") {
    Some(url) => url,
    None => "http://localhost:8080/api/v1",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;
const DEFAULT_REFRESH_THRESHOLD_SECS: u64 = 300;
const DEFAULT_ADMIN_ROLE: &str = "ADMIN";

const ENV_LOG_LEVEL: &str = "BOOKING_LOG_LEVEL";
const ENV_API_BASE_URL: &str = "BOOKING_API_BASE_URL";

/// Main client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL of the booking REST API, including the version prefix.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Timeout applied to every outbound HTTP request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Interval between proactive expiry checks.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Remaining lifetime below which an access token is renewed.
    #[serde(default = "default_refresh_threshold_secs")]
    pub refresh_threshold_secs: u64,
    /// Role claim required by admin-only routes.
    #[serde(default = "default_admin_role")]
    pub admin_role: String,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_check_interval_secs() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

fn default_refresh_threshold_secs() -> u64 {
    DEFAULT_REFRESH_THRESHOLD_SECS
}

fn default_admin_role() -> String {
    DEFAULT_ADMIN_ROLE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_base_url: default_api_base_url(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            refresh_threshold_secs: DEFAULT_REFRESH_THRESHOLD_SECS,
            admin_role: default_admin_role(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    /// Environment variables take precedence over the file.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup. Blank values are ignored.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(log_level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = log_level;
        }
        if let Some(base_url) = lookup(ENV_API_BASE_URL) {
            self.api_base_url = base_url.trim().to_string();
        }
    }

    /// Reject values that would disable the refresh protocol.
    pub fn validate(&self) -> CoreResult<()> {
        if self.check_interval_secs == 0 {
            return Err(CoreError::Config(
                "check_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(CoreError::Config(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        self.api_base_url()?;
        Ok(())
    }

    /// Get the API base URL as a parsed URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(CoreError::from)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh_threshold_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.check_interval(), Duration::from_secs(60));
        assert_eq!(config.refresh_threshold(), Duration::from_secs(300));
        assert_eq!(config.admin_role, "ADMIN");
    }

    #[test]
    fn test_config_load_from_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "check_interval_secs": 15
        }"#;
        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.check_interval_secs, 15);
        assert_eq!(config.refresh_threshold_secs, 300);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.refresh_threshold_secs = 120;
        config.admin_role = "SUPERVISOR".to_string();
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.refresh_threshold_secs, 120);
        assert_eq!(loaded.admin_role, "SUPERVISOR");
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.check_interval_secs, 60);
    }

    #[test]
    fn test_apply_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("BOOKING_LOG_LEVEL", "trace"),
            ("BOOKING_API_BASE_URL", " https://tickets.example.com/api/v1 "),
        ]);

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.log_level, "trace");
        assert_eq!(config.api_base_url, "https://tickets.example.com/api/v1");
    }

    #[test]
    fn test_apply_overrides_ignores_blank_values() {
        let mut config = Config::default();
        config.apply_overrides(|_| Some("   ".to_string()));

        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.check_interval_secs = 0;
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_config_invalid_url() {
        let mut config = Config::default();
        config.api_base_url = "not a valid url".to_string();

        assert!(config.api_base_url().is_err());
        assert!(config.validate().is_err());
    }
}
