//! Configuration management.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`--config` or the platform config dir)
//! 3. `CALLHOOK_*` environment variables
//!
//! ```toml
//! data_dir = "/var/lib/callhook"
//!
//! [delivery]
//! timeout_secs = 10
//! user_agent = "callhook/0.3.0"
//!
//! [server]
//! port = 8787
//!
//! [logging]
//! format = "json"
//! file = "/var/log/callhook.log"
//!
//! [metrics]
//! enabled = true
//! port = 9090
//! ```

use crate::webhooks::{DEFAULT_TIMEOUT, check_timeout, default_user_agent};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default HTTP port for `callhook serve`.
pub const DEFAULT_SERVER_PORT: u16 = 8787;

/// Name of the `SQLite` database inside the data directory.
pub const DATABASE_FILE: &str = "callhook.db";

/// Main configuration for callhook.
#[derive(Debug, Clone)]
pub struct CallhookConfig {
    /// Directory holding the configuration store and audit log.
    pub data_dir: PathBuf,
    /// Per-attempt delivery timeout.
    pub delivery_timeout: Duration,
    /// `User-Agent` sent with every delivery.
    pub user_agent: String,
    /// HTTP port for the trigger endpoint.
    pub server_port: u16,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Metrics settings.
    pub metrics: MetricsSettings,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Delivery section.
    pub delivery: Option<DeliverySettings>,
    /// Server section.
    pub server: Option<ServerSettings>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
}

/// Delivery section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DeliverySettings {
    /// Per-attempt timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// `User-Agent` override.
    pub user_agent: Option<String>,
}

/// Server section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerSettings {
    /// Listen port.
    pub port: Option<u16>,
}

/// Logging section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Metrics section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsSettings {
    /// Whether the Prometheus recorder is installed.
    pub enabled: Option<bool>,
    /// Exporter listen port.
    pub port: Option<u16>,
}

impl Default for CallhookConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            delivery_timeout: DEFAULT_TIMEOUT,
            user_agent: default_user_agent(),
            server_port: DEFAULT_SERVER_PORT,
            logging: LoggingSettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

impl CallhookConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid config file or the
    /// delivery timeout is out of range.
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform-specific config dir
    /// (`~/.config/callhook/config.toml` on Linux). Returns the default
    /// configuration if no file is found or it cannot be parsed.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(dirs) = directories::ProjectDirs::from("", "", "callhook") else {
            return Self::default();
        };

        let path = dirs.config_dir().join("config.toml");
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                Self::default()
            },
        }
    }

    /// Converts a `ConfigFile` to `CallhookConfig`.
    fn from_config_file(file: ConfigFile) -> crate::Result<Self> {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(delivery) = file.delivery {
            if let Some(secs) = delivery.timeout_secs {
                config.delivery_timeout = check_timeout(Duration::from_secs(secs))?;
            }
            if let Some(user_agent) = delivery.user_agent {
                config.user_agent = user_agent;
            }
        }
        if let Some(port) = file.server.and_then(|s| s.port) {
            config.server_port = port;
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        if let Some(metrics) = file.metrics {
            config.metrics = metrics;
        }

        Ok(config)
    }

    /// Applies `CALLHOOK_*` overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `CALLHOOK_*` overrides from an arbitrary lookup.
    ///
    /// Unparseable values and out-of-range timeouts are ignored.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(dir) = get("CALLHOOK_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(secs) = get("CALLHOOK_DELIVERY_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            match check_timeout(Duration::from_secs(secs)) {
                Ok(timeout) => self.delivery_timeout = timeout,
                Err(e) => tracing::warn!(error = %e, "Ignoring CALLHOOK_DELIVERY_TIMEOUT_SECS"),
            }
        }
        if let Some(port) = get("CALLHOOK_PORT").and_then(|v| v.parse().ok()) {
            self.server_port = port;
        }
        if let Some(enabled) = get("CALLHOOK_METRICS_ENABLED") {
            let enabled = enabled.to_lowercase();
            self.metrics.enabled = Some(matches!(enabled.as_str(), "true" | "1" | "yes"));
        }
        if let Some(port) = get("CALLHOOK_METRICS_PORT").and_then(|v| v.parse().ok()) {
            self.metrics.port = Some(port);
        }
        if let Some(format) = get("CALLHOOK_LOG_FORMAT") {
            self.logging.format = Some(format);
        }
        if let Some(file) = get("CALLHOOK_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }

        self
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Path of the `SQLite` database.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "callhook").map_or_else(
        || PathBuf::from(".callhook"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let config = CallhookConfig::default();

        assert_eq!(config.delivery_timeout, Duration::from_secs(10));
        assert_eq!(config.server_port, 8787);
        assert!(config.user_agent.starts_with("callhook/"));
        assert!(config.database_path().ends_with("callhook.db"));
    }

    #[test]
    fn test_from_toml() {
        let config = CallhookConfig::from_toml(
            r#"
            data_dir = "/tmp/callhook-test"

            [delivery]
            timeout_secs = 3

            [server]
            port = 9999

            [logging]
            format = "json"

            [metrics]
            enabled = true
            port = 9191
            "#,
        )
        .expect("parse");

        assert_eq!(config.data_dir, PathBuf::from("/tmp/callhook-test"));
        assert_eq!(config.delivery_timeout, Duration::from_secs(3));
        assert_eq!(config.server_port, 9999);
        assert_eq!(config.logging.format.as_deref(), Some("json"));
        assert_eq!(config.metrics.enabled, Some(true));
        assert_eq!(config.metrics.port, Some(9191));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(CallhookConfig::from_toml("colour = \"blue\"").is_err());
    }

    #[test]
    fn test_env_overrides_win() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CALLHOOK_DATA_DIR", "/data"),
            ("CALLHOOK_DELIVERY_TIMEOUT_SECS", "25"),
            ("CALLHOOK_PORT", "not-a-port"),
            ("CALLHOOK_METRICS_ENABLED", "yes"),
            ("CALLHOOK_LOG_FORMAT", "json"),
        ]);

        let config = CallhookConfig::default()
            .with_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.delivery_timeout, Duration::from_secs(25));
        assert_eq!(config.server_port, DEFAULT_SERVER_PORT);
        assert_eq!(config.metrics.enabled, Some(true));
        assert_eq!(config.logging.format.as_deref(), Some("json"));
    }

    #[test_case(0 ; "zero")]
    #[test_case(301 ; "above maximum")]
    fn test_out_of_range_timeout_is_rejected(secs: u64) {
        let err = CallhookConfig::from_toml(&format!("[delivery]\ntimeout_secs = {secs}"))
            .expect_err("out of range");
        assert!(matches!(err, crate::Error::InvalidInput(_)));
    }

    #[test]
    fn test_huge_timeout_is_rejected() {
        let toml = format!("[delivery]\ntimeout_secs = {}", u64::MAX);
        assert!(CallhookConfig::from_toml(&toml).is_err());
    }

    #[test]
    fn test_timeout_bounds_are_accepted() {
        for secs in [1, 300] {
            let config = CallhookConfig::from_toml(&format!("[delivery]\ntimeout_secs = {secs}"))
                .expect("in range");
            assert_eq!(config.delivery_timeout, Duration::from_secs(secs));
        }
    }

    #[test_case("0" ; "zero")]
    #[test_case("18446744073709551615" ; "overflowing")]
    fn test_out_of_range_env_timeout_is_ignored(value: &str) {
        let config = CallhookConfig::default().with_overrides(|key| {
            (key == "CALLHOOK_DELIVERY_TIMEOUT_SECS").then(|| value.to_string())
        });
        assert_eq!(config.delivery_timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let err = CallhookConfig::load_from_file(Path::new("/nonexistent/callhook.toml"))
            .expect_err("missing");
        assert!(err.to_string().contains("read_config_file"));
    }
}
