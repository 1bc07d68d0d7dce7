//! Configuration validation

use crate::schema::RawConfig;
use thiserror::Error;
use tracetime_api::ConnectionSettings;

/// Accepted range for `checkpoint_interval_seconds`
pub const CHECKPOINT_INTERVAL_RANGE: std::ops::RangeInclusive<u64> = 1..=3600;

/// Accepted range for `tracker_timeout_seconds`
pub const TRACKER_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=300;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("service.{field}: {message}")]
    ServiceError { field: &'static str, message: String },

    #[error("connection {field}: {message}")]
    ConnectionError { field: &'static str, message: String },
}

/// Validate a raw service configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let service = &config.service;

    if let Some(seconds) = service.checkpoint_interval_seconds {
        if !CHECKPOINT_INTERVAL_RANGE.contains(&seconds) {
            errors.push(ValidationError::ServiceError {
                field: "checkpoint_interval_seconds",
                message: format!(
                    "{} is outside {}..={}",
                    seconds,
                    CHECKPOINT_INTERVAL_RANGE.start(),
                    CHECKPOINT_INTERVAL_RANGE.end()
                ),
            });
        }
    }

    if let Some(seconds) = service.tracker_timeout_seconds {
        if !TRACKER_TIMEOUT_RANGE.contains(&seconds) {
            errors.push(ValidationError::ServiceError {
                field: "tracker_timeout_seconds",
                message: format!(
                    "{} is outside {}..={}",
                    seconds,
                    TRACKER_TIMEOUT_RANGE.start(),
                    TRACKER_TIMEOUT_RANGE.end()
                ),
            });
        }
    }

    for (field, path) in [
        ("socket_path", &service.socket_path),
        ("data_dir", &service.data_dir),
    ] {
        if let Some(path) = path {
            if !path.is_absolute() {
                errors.push(ValidationError::ServiceError {
                    field,
                    message: format!("'{}' must be an absolute path", path.display()),
                });
            }
        }
    }

    errors
}

/// Validate connection settings before they are saved.
///
/// Incomplete settings may still be saved; `is_usable` reports whether they
/// are enough to drive the tracker.
pub fn validate_connection(settings: &ConnectionSettings) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let url = settings.url.trim();
    if url.is_empty() {
        errors.push(ValidationError::ConnectionError {
            field: "url",
            message: "must not be empty".into(),
        });
    } else if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(ValidationError::ConnectionError {
            field: "url",
            message: format!("'{}' must start with http:// or https://", url),
        });
    }

    if settings.token.trim().is_empty() {
        errors.push(ValidationError::ConnectionError {
            field: "token",
            message: "must not be empty".into(),
        });
    }

    if settings.user_id < 0 {
        errors.push(ValidationError::ConnectionError {
            field: "user_id",
            message: format!("{} is negative", settings.user_id),
        });
    }

    // Labels are stored comma-joined
    for label in &settings.labels {
        if label.contains(',') {
            errors.push(ValidationError::ConnectionError {
                field: "labels",
                message: format!("'{}' contains a comma", label),
            });
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RawServiceConfig;
    use std::path::PathBuf;

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            url: "https://gitlab.example.com".into(),
            token: "glpat-123".into(),
            labels: vec!["dev".into(), "review".into()],
            username: "ana".into(),
            user_id: 12,
        }
    }

    #[test]
    fn test_valid_service_config() {
        let config = RawConfig {
            config_version: 1,
            service: RawServiceConfig {
                socket_path: Some(PathBuf::from("/run/user/1000/tracetime/tracetimed.sock")),
                data_dir: None,
                checkpoint_interval_seconds: Some(30),
                tracker_timeout_seconds: Some(15),
            },
        };
        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn test_out_of_range_intervals() {
        let config = RawConfig {
            config_version: 1,
            service: RawServiceConfig {
                checkpoint_interval_seconds: Some(0),
                tracker_timeout_seconds: Some(10_000),
                data_dir: Some(PathBuf::from("relative/dir")),
                ..Default::default()
            },
        };
        let errors = validate_config(&config);
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_valid_connection() {
        assert!(validate_connection(&settings()).is_empty());
    }

    #[test]
    fn test_connection_errors() {
        let mut bad = settings();
        bad.url = "gitlab.example.com".into();
        bad.token = "  ".into();
        bad.labels.push("a,b".into());

        let errors = validate_connection(&bad);
        let fields: Vec<_> = errors
            .iter()
            .map(|e| match e {
                ValidationError::ConnectionError { field, .. } => *field,
                ValidationError::ServiceError { field, .. } => *field,
            })
            .collect();
        assert_eq!(fields, ["url", "token", "labels"]);
    }
}
