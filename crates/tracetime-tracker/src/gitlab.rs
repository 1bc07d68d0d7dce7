//! GitLab REST v4 directory client

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracetime_api::{DirectoryItem, TrackerUser};
use tracetime_util::{GroupId, ProjectId};
use tracing::{debug, warn};

use crate::{Credentials, TrackerDirectory, TrackerError, TrackerResult};

/// Page size requested for listings
const PER_PAGE: &str = "100";

#[derive(Debug, Deserialize)]
struct RawUser {
    id: i64,
    username: String,
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    id: i64,
    title: String,
}

/// Directory client for a GitLab instance
#[derive(Debug, Clone)]
pub struct GitLabClient {
    client: Client,
}

impl GitLabClient {
    pub fn new(timeout: Duration) -> TrackerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("tracetimed/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TrackerError::Http(e.to_string()))?;

        Ok(Self { client })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        credentials: &Credentials,
        path: &str,
        listing: bool,
    ) -> TrackerResult<T> {
        let url = api_url(&credentials.url, path)?;
        debug!(url = %url, "Tracker request");

        let mut request = self.client.get(&url).bearer_auth(&credentials.token);
        if listing {
            request = request.query(&[("per_page", PER_PAGE)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Tracker request rejected");
            return Err(TrackerError::Status {
                status: status.as_u16(),
                url,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

/// Join a base URL and an API path, tolerating a trailing slash on the base
pub fn api_url(base: &str, path: &str) -> TrackerResult<String> {
    let base = base.trim().trim_end_matches('/');
    // A bare scheme loses its slashes to the trim above and fails here too
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(TrackerError::InvalidUrl(base.to_string()));
    }
    Ok(format!("{}/api/v4/{}", base, path.trim_start_matches('/')))
}

#[async_trait]
impl TrackerDirectory for GitLabClient {
    async fn test_connection(&self, credentials: &Credentials) -> TrackerResult<TrackerUser> {
        let user: RawUser = self.get_json(credentials, "user", false).await?;
        Ok(TrackerUser {
            id: user.id,
            username: user.username,
        })
    }

    async fn list_groups(&self, credentials: &Credentials) -> TrackerResult<Vec<DirectoryItem>> {
        let groups: Vec<RawNamed> = self.get_json(credentials, "groups", true).await?;
        Ok(groups
            .into_iter()
            .map(|g| DirectoryItem {
                id: g.id,
                name: g.name,
            })
            .collect())
    }

    async fn list_projects(
        &self,
        credentials: &Credentials,
        group_id: GroupId,
    ) -> TrackerResult<Vec<DirectoryItem>> {
        let path = format!("groups/{}/projects", group_id);
        let projects: Vec<RawNamed> = self.get_json(credentials, &path, true).await?;
        Ok(projects
            .into_iter()
            .map(|p| DirectoryItem {
                id: p.id,
                name: p.name,
            })
            .collect())
    }

    async fn list_issues(
        &self,
        credentials: &Credentials,
        project_id: ProjectId,
    ) -> TrackerResult<Vec<DirectoryItem>> {
        let path = format!("projects/{}/issues", project_id);
        let issues: Vec<RawIssue> = self.get_json(credentials, &path, true).await?;
        Ok(issues
            .into_iter()
            .map(|i| DirectoryItem {
                id: i.id,
                name: i.title,
            })
            .collect())
    }
}
