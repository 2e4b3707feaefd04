pub mod cli;
pub mod validation;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Listener and upstream settings. Absent keys take the [`Default`] value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Backend every proxied request is forwarded to.
    pub target_url: String,
    /// Seconds of upstream read inactivity before a request fails.
    pub timeout: u64,
    pub http_pool_max_idle_per_host: usize,
    pub http_pool_idle_timeout_secs: u64,
    pub max_request_body_bytes: usize,
    /// `1` selects the current-thread runtime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 7999,
            target_url: "http://127.0.0.1:8080".into(),
            timeout: 600,
            http_pool_max_idle_per_host: 16,
            http_pool_idle_timeout_secs: 15,
            max_request_body_bytes: 32 << 20,
            runtime_worker_threads: None,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Upstream base with any trailing slash removed, ready for path joining.
    #[must_use]
    pub fn target_base(&self) -> &str {
        self.target_url.trim_end_matches('/')
    }

    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging and fix-rule settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    pub log_level: String,
    /// Log every rewritten SSE payload sent to the client.
    pub verbose: bool,
    pub fixes_path: PathBuf,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".into(),
            verbose: false,
            fixes_path: PathBuf::from("tool_fixes.yaml"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub features: FeaturesConfig,
}

/// Parse a YAML configuration document.
///
/// Values are not checked here; run [`validation::validate_config`] once all
/// overrides have been applied.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails and
/// [`ConfigError::Yaml`] when it does not parse.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Like [`load_config`], but a missing file yields the built-in defaults.
///
/// # Errors
///
/// Same as [`load_config`] for every failure other than the file not existing.
pub fn load_config_or_default(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    match load_config(path) {
        Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            Ok(AppConfig::default())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_example_config() {
        let config = load_config("config.example.yaml");
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.server.port, 7999);
        assert_eq!(config.server.target_url, "http://127.0.0.1:8080");
        assert_eq!(config.features.fixes_path, PathBuf::from("tool_fixes.yaml"));
        assert!(validation::validate_config(&config).is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config_or_default("does-not-exist.yaml").unwrap();
        assert_eq!(config.server.listen_addr(), "0.0.0.0:7999");
        assert_eq!(config.features.log_level, "INFO");
    }

    #[test]
    fn test_missing_file_is_an_error_for_strict_load() {
        assert!(matches!(
            load_config("does-not-exist.yaml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: AppConfig = serde_yaml::from_str("server:\n  port: 9000\n").unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.timeout, 600);
        assert_eq!(config.server.max_request_body_bytes, 32 * 1024 * 1024);
        assert_eq!(config.features.fixes_path, PathBuf::from("tool_fixes.yaml"));
    }

    #[test]
    fn test_out_of_range_values_still_parse() {
        let config: AppConfig = serde_yaml::from_str("server:\n  port: 0\n").unwrap();
        assert_eq!(config.server.port, 0);
    }

    #[test]
    fn test_target_base_strips_trailing_slash() {
        let server = ServerConfig {
            target_url: "http://backend:8080/".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(server.target_base(), "http://backend:8080");
    }
}
