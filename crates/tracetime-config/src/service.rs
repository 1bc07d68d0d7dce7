//! Validated service configuration

use crate::schema::{RawConfig, RawServiceConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracetime_util::{default_data_dir, default_socket_path};

/// Default checkpoint interval in seconds
pub const DEFAULT_CHECKPOINT_INTERVAL_SECS: u64 = 30;

/// Default tracker request timeout in seconds
pub const DEFAULT_TRACKER_TIMEOUT_SECS: u64 = 15;

/// Session database file name inside the data directory
pub const DATABASE_FILE_NAME: &str = "tracetime.db";

/// Connection settings file name inside the data directory
pub const CONNECTION_FILE_NAME: &str = "connection.toml";

/// Service configuration ready for use by the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub checkpoint_interval: Duration,
    pub tracker_timeout: Duration,
}

impl ServiceConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let RawServiceConfig {
            socket_path,
            data_dir,
            checkpoint_interval_seconds,
            tracker_timeout_seconds,
        } = raw.service;

        Self {
            socket_path: socket_path.unwrap_or_else(default_socket_path),
            data_dir: data_dir.unwrap_or_else(default_data_dir),
            checkpoint_interval: Duration::from_secs(
                checkpoint_interval_seconds.unwrap_or(DEFAULT_CHECKPOINT_INTERVAL_SECS),
            ),
            tracker_timeout: Duration::from_secs(
                tracker_timeout_seconds.unwrap_or(DEFAULT_TRACKER_TIMEOUT_SECS),
            ),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    pub fn connection_path(&self) -> PathBuf {
        self.data_dir.join(CONNECTION_FILE_NAME)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawConfig {
            config_version: crate::CURRENT_CONFIG_VERSION,
            service: RawServiceConfig::default(),
        })
    }
}
