//! Shared types for the tracetimed API

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracetime_util::{GroupId, IssueId, ProjectId, SessionId};

/// Lifecycle state of a tracked session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    Paused,
    Finished,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Finished => "finished",
        }
    }

    /// Open sessions occupy the single tracking slot
    pub fn is_open(&self) -> bool {
        !matches!(self, SessionStatus::Finished)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Unknown session status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for SessionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(SessionStatus::Idle),
            "running" => Ok(SessionStatus::Running),
            "paused" => Ok(SessionStatus::Paused),
            "finished" => Ok(SessionStatus::Finished),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Read-only projection of a session for clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub group_id: GroupId,
    pub project_id: ProjectId,
    pub issue_id: IssueId,
    pub label: String,
    pub status: SessionStatus,
    pub elapsed_seconds: u64,
    /// Elapsed time in tracker notation, e.g. `1h2m5s`
    pub elapsed_formatted: String,
    pub created_at: DateTime<Local>,
}

/// Tracker connection settings and the label taxonomy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Tracker base URL, e.g. `https://gitlab.example.com`
    pub url: String,
    pub token: String,
    /// Time-type labels offered to the user
    #[serde(default)]
    pub labels: Vec<String>,
    /// Username resolved from the token
    #[serde(default)]
    pub username: String,
    /// Numeric user id resolved from the token
    #[serde(default)]
    pub user_id: i64,
}

impl ConnectionSettings {
    /// Labels with surrounding whitespace removed and blanks dropped
    pub fn effective_labels(&self) -> Vec<String> {
        self.labels
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Whether these settings are complete enough to drive the tracker
    pub fn is_usable(&self) -> bool {
        !self.url.trim().is_empty()
            && !self.token.trim().is_empty()
            && self.user_id > 0
            && !self.username.trim().is_empty()
            && !self.effective_labels().is_empty()
    }
}

/// Identity resolved for a tracker token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerUser {
    pub id: i64,
    pub username: String,
}

/// One group, project, or issue from the tracker directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryItem {
    pub id: i64,
    /// Group/project name or issue title
    pub name: String,
}

/// Full service state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStateSnapshot {
    pub api_version: u32,
    pub open_session: Option<SessionView>,
    pub config_usable: bool,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    pub config_usable: bool,
}
