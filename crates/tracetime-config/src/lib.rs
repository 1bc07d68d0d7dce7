//! Configuration for tracetimed
//!
//! Covers two files:
//! - the service config (versioned TOML, optional, defaults when absent)
//! - the tracker connection settings saved by clients (`connection.toml`)

mod connection;
mod schema;
mod service;
mod validation;

pub use connection::*;
pub use schema::*;
pub use service::*;
pub use validation::*;

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Validation failed: {}", join_errors(.errors))]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),

    #[error("No configuration found at {}", .0.display())]
    NotFound(PathBuf),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate the service configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<ServiceConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Like [`load_config`], but a missing file yields the defaults
pub fn load_config_or_default(path: impl AsRef<Path>) -> ConfigResult<ServiceConfig> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No service config, using defaults");
            Ok(ServiceConfig::default())
        }
        Err(e) => Err(ConfigError::ReadError(e)),
    }
}

/// Parse and validate the service configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<ServiceConfig> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(ServiceConfig::from_raw(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parse_minimal_config() {
        let config = parse_config("config_version = 1").unwrap();
        assert_eq!(config.checkpoint_interval, Duration::from_secs(30));
        assert_eq!(config.tracker_timeout, Duration::from_secs(15));
    }

    #[test]
    fn parse_full_config() {
        let config = parse_config(
            r#"
            config_version = 1

            [service]
            socket_path = "/tmp/tt/tracetimed.sock"
            data_dir = "/var/lib/tracetime"
            checkpoint_interval_seconds = 10
            tracker_timeout_seconds = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.socket_path, PathBuf::from("/tmp/tt/tracetimed.sock"));
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/tracetime/tracetime.db")
        );
        assert_eq!(
            config.connection_path(),
            PathBuf::from("/var/lib/tracetime/connection.toml")
        );
        assert_eq!(config.checkpoint_interval, Duration::from_secs(10));
        assert_eq!(config.tracker_timeout, Duration::from_secs(5));
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_values() {
        let result = parse_config(
            r#"
            config_version = 1
            [service]
            checkpoint_interval_seconds = 0
            "#,
        );
        match result {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 1),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ServiceConfig::default());

        assert!(matches!(
            load_config(dir.path().join("absent.toml")),
            Err(ConfigError::ReadError(_))
        ));
    }
}
