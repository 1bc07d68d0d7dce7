//! Tracker directory trait

use async_trait::async_trait;
use thiserror::Error;
use tracetime_api::{ConnectionSettings, DirectoryItem, TrackerUser};
use tracetime_util::{GroupId, ProjectId};

/// Errors from tracker operations
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid tracker URL: {0}")]
    InvalidUrl(String),

    #[error("Request to {url} failed with status {status}")]
    Status { status: u16, url: String },

    #[error("Tracker request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TrackerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TrackerError::Timeout
        } else if e.is_decode() {
            TrackerError::Decode(e.to_string())
        } else {
            TrackerError::Http(e.to_string())
        }
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;

/// Base URL and token used to reach the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub url: String,
    pub token: String,
}

impl Credentials {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
        }
    }
}

impl From<&ConnectionSettings> for Credentials {
    fn from(settings: &ConnectionSettings) -> Self {
        Self::new(settings.url.trim(), settings.token.trim())
    }
}

/// Read-only view of the issue tracker.
///
/// Listings preserve the tracker's order.
#[async_trait]
pub trait TrackerDirectory: Send + Sync {
    /// Resolve the user a token belongs to
    async fn test_connection(&self, credentials: &Credentials) -> TrackerResult<TrackerUser>;

    async fn list_groups(&self, credentials: &Credentials) -> TrackerResult<Vec<DirectoryItem>>;

    async fn list_projects(
        &self,
        credentials: &Credentials,
        group_id: GroupId,
    ) -> TrackerResult<Vec<DirectoryItem>>;

    /// Issues of a project; the item name is the issue title
    async fn list_issues(
        &self,
        credentials: &Credentials,
        project_id: ProjectId,
    ) -> TrackerResult<Vec<DirectoryItem>>;
}
