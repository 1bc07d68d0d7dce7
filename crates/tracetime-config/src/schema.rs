//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracetime_api::ConnectionSettings;

/// Raw service configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Daemon settings
    #[serde(default)]
    pub service: RawServiceConfig,
}

/// Daemon-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Directory holding the session database and connection settings
    pub data_dir: Option<PathBuf>,

    /// How often running time is folded into the stored total
    pub checkpoint_interval_seconds: Option<u64>,

    /// Timeout for each tracker request
    pub tracker_timeout_seconds: Option<u64>,
}

/// Connection settings as stored on disk
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawConnection {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub token: String,

    /// Comma-joined when written; a TOML array is accepted on read
    #[serde(default)]
    pub labels: RawLabels,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub user_id: i64,
}

/// Labels as a comma-joined string or a TOML list
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawLabels {
    Joined(String),
    List(Vec<String>),
}

impl Default for RawLabels {
    fn default() -> Self {
        RawLabels::Joined(String::new())
    }
}

impl RawLabels {
    /// Split, trim and drop blanks
    pub fn to_vec(&self) -> Vec<String> {
        let parts: Vec<&str> = match self {
            RawLabels::Joined(joined) => joined.split(',').collect(),
            RawLabels::List(list) => list.iter().map(String::as_str).collect(),
        };
        parts
            .into_iter()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl From<RawConnection> for ConnectionSettings {
    fn from(raw: RawConnection) -> Self {
        Self {
            labels: raw.labels.to_vec(),
            url: raw.url,
            token: raw.token,
            username: raw.username,
            user_id: raw.user_id,
        }
    }
}

impl From<&ConnectionSettings> for RawConnection {
    fn from(settings: &ConnectionSettings) -> Self {
        Self {
            url: settings.url.trim().to_string(),
            token: settings.token.trim().to_string(),
            labels: RawLabels::Joined(settings.effective_labels().join(",")),
            username: settings.username.trim().to_string(),
            user_id: settings.user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joined_labels_are_split_and_trimmed() {
        let labels = RawLabels::Joined(" dev, review ,, meeting".into());
        assert_eq!(labels.to_vec(), ["dev", "review", "meeting"]);
    }

    #[test]
    fn list_labels_accepted() {
        let raw: RawConnection = toml::from_str(
            r#"
            url = "https://gitlab.example.com"
            token = "t"
            labels = ["dev", " qa "]
            "#,
        )
        .unwrap();
        assert_eq!(raw.labels.to_vec(), ["dev", "qa"]);
    }

    #[test]
    fn settings_written_comma_joined() {
        let settings = ConnectionSettings {
            url: "https://gitlab.example.com ".into(),
            token: "t".into(),
            labels: vec!["dev".into(), " ".into(), "qa".into()],
            username: "ana".into(),
            user_id: 3,
        };
        let raw = RawConnection::from(&settings);
        assert!(matches!(&raw.labels, RawLabels::Joined(s) if s == "dev,qa"));
        assert_eq!(raw.url, "https://gitlab.example.com");
    }
}
