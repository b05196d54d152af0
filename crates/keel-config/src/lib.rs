#![deny(unsafe_code)]

//! Configuration loading and validation for keel.
//!
//! Loads TOML configuration files and validates them against expected schemas.
//! Provides the [`ClientConfig`] type as the central configuration structure:
//! where the engine lives, how the event stream reconnects, and how verbose
//! logging should be.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level client configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Engine endpoint configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Event stream configuration.
    #[serde(default)]
    pub events: EventsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where and how to reach the engine.
///
/// Every field is optional: anything left unset falls back to the
/// `DOCKER_HOST` / `DOCKER_TLS_VERIFY` / `DOCKER_CERT_PATH` environment
/// variables, and finally to the local engine socket.
///
/// ## TOML Example
///
/// ```toml
/// [engine]
/// host = "tcp://engine.example.com:2376"
/// tls_verify = true
/// cert_path = "/etc/keel/certs"
/// ```
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Endpoint URL: `unix:///path`, `tcp://host:port`, `http://…` or `https://…`.
    #[serde(default)]
    pub host: Option<String>,

    /// Force TLS on for network endpoints.
    #[serde(default)]
    pub tls_verify: Option<bool>,

    /// Directory holding `ca.pem`, `cert.pem` and `key.pem`.
    #[serde(default)]
    pub cert_path: Option<String>,
}

/// Event stream reconnection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Fixed delay between a disconnect and the next connection attempt.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Capacity of the notification channel handed to the caller.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_retry_delay_ms() -> u64 {
    3000
}

fn default_channel_capacity() -> usize {
    256
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ClientConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(host) = &self.engine.host {
            let valid_schemes = ["unix://", "unix:", "tcp://", "http://", "https://"];
            if !valid_schemes.iter().any(|s| host.starts_with(s)) {
                return Err(ConfigError::Validation(format!(
                    "engine.host must start with one of {valid_schemes:?}, got {host:?}"
                )));
            }
        }
        if let Some(cert_path) = &self.engine.cert_path
            && cert_path.is_empty()
        {
            return Err(ConfigError::Validation(
                "engine.cert_path must not be empty when set".to_string(),
            ));
        }
        if self.events.retry_delay_ms == 0 {
            return Err(ConfigError::Validation(
                "events.retry_delay_ms must be non-zero".to_string(),
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "events.channel_capacity must be at least 1".to_string(),
            ));
        }
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.engine.host, None);
        assert_eq!(config.engine.tls_verify, None);
        assert_eq!(config.events.retry_delay_ms, 3000);
        assert_eq!(config.events.channel_capacity, 256);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = ClientConfig::parse("").unwrap();
        assert_eq!(config.events.retry_delay_ms, 3000);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [engine]
            host = "tcp://engine.example.com:2376"
            tls_verify = true
            cert_path = "/etc/keel/certs"

            [events]
            retry_delay_ms = 500
            channel_capacity = 16

            [logging]
            level = "debug"
        "#;
        let config = ClientConfig::parse(toml).unwrap();
        assert_eq!(
            config.engine.host.as_deref(),
            Some("tcp://engine.example.com:2376")
        );
        assert_eq!(config.engine.tls_verify, Some(true));
        assert_eq!(config.engine.cert_path.as_deref(), Some("/etc/keel/certs"));
        assert_eq!(config.events.retry_delay_ms, 500);
        assert_eq!(config.events.channel_capacity, 16);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_unknown_scheme() {
        let toml = r#"
            [engine]
            host = "ftp://engine.example.com"
        "#;
        assert!(ClientConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_accepts_unix_host() {
        let toml = r#"
            [engine]
            host = "unix:///var/run/engine.sock"
        "#;
        assert!(ClientConfig::parse(toml).is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_retry_delay() {
        let toml = r#"
            [events]
            retry_delay_ms = 0
        "#;
        assert!(ClientConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let toml = r#"
            [events]
            channel_capacity = 0
        "#;
        assert!(ClientConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_cert_path() {
        let toml = r#"
            [engine]
            cert_path = ""
        "#;
        assert!(ClientConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_log_level() {
        let toml = r#"
            [logging]
            level = "loud"
        "#;
        assert!(ClientConfig::parse(toml).is_err());
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[tokio::test]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keel.toml");
        tokio::fs::write(
            &path,
            b"[engine]\nhost = \"unix:///tmp/engine.sock\"\n[events]\nretry_delay_ms = 250\n",
        )
        .await
        .unwrap();

        let config = ClientConfig::load(&path).await.unwrap();
        assert_eq!(config.engine.host.as_deref(), Some("unix:///tmp/engine.sock"));
        assert_eq!(config.events.retry_delay_ms, 250);
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = ClientConfig::load(Path::new("/nonexistent/file.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[tokio::test]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[").await.unwrap();

        let result = ClientConfig::load(&path).await;
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    // ── Error display ─────────────────────────────────────────────────

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }
}
