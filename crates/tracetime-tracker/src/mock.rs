//! Mock tracker for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracetime_api::{DirectoryItem, TrackerUser};
use tracetime_util::{GroupId, ProjectId};

use crate::{Credentials, TrackerDirectory, TrackerError, TrackerResult};

#[derive(Debug, Default)]
struct MockData {
    user: Option<TrackerUser>,
    token: Option<String>,
    groups: Vec<DirectoryItem>,
    projects: HashMap<GroupId, Vec<DirectoryItem>>,
    issues: HashMap<ProjectId, Vec<DirectoryItem>>,
    fail_with_status: Option<u16>,
    requests: usize,
}

/// In-memory tracker for unit/integration testing
#[derive(Debug, Default)]
pub struct MockTracker {
    data: Mutex<MockData>,
}

impl MockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> std::sync::MutexGuard<'_, MockData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept only `token`, resolving it to `user`
    pub fn with_user(self, token: &str, user: TrackerUser) -> Self {
        {
            let mut data = self.data();
            data.token = Some(token.to_string());
            data.user = Some(user);
        }
        self
    }

    pub fn with_group(self, id: i64, name: &str) -> Self {
        self.data().groups.push(DirectoryItem {
            id,
            name: name.into(),
        });
        self
    }

    pub fn with_project(self, group_id: i64, id: i64, name: &str) -> Self {
        self.data()
            .projects
            .entry(GroupId::new(group_id))
            .or_default()
            .push(DirectoryItem {
                id,
                name: name.into(),
            });
        self
    }

    pub fn with_issue(self, project_id: i64, id: i64, title: &str) -> Self {
        self.data()
            .issues
            .entry(ProjectId::new(project_id))
            .or_default()
            .push(DirectoryItem {
                id,
                name: title.into(),
            });
        self
    }

    /// Make every subsequent call fail with an HTTP status
    pub fn fail_with_status(&self, status: Option<u16>) {
        self.data().fail_with_status = status;
    }

    /// Number of calls served so far
    pub fn request_count(&self) -> usize {
        self.data().requests
    }

    fn check(&self, credentials: &Credentials, path: &str) -> TrackerResult<()> {
        let mut data = self.data();
        data.requests += 1;

        if let Some(status) = data.fail_with_status {
            return Err(TrackerError::Status {
                status,
                url: format!("{}/api/v4/{}", credentials.url, path),
            });
        }
        match &data.token {
            Some(token) if *token != credentials.token => Err(TrackerError::Status {
                status: 401,
                url: format!("{}/api/v4/{}", credentials.url, path),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl TrackerDirectory for MockTracker {
    async fn test_connection(&self, credentials: &Credentials) -> TrackerResult<TrackerUser> {
        self.check(credentials, "user")?;
        self.data()
            .user
            .clone()
            .ok_or(TrackerError::Status {
                status: 401,
                url: format!("{}/api/v4/user", credentials.url),
            })
    }

    async fn list_groups(&self, credentials: &Credentials) -> TrackerResult<Vec<DirectoryItem>> {
        self.check(credentials, "groups")?;
        Ok(self.data().groups.clone())
    }

    async fn list_projects(
        &self,
        credentials: &Credentials,
        group_id: GroupId,
    ) -> TrackerResult<Vec<DirectoryItem>> {
        self.check(credentials, &format!("groups/{}/projects", group_id))?;
        Ok(self
            .data()
            .projects
            .get(&group_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_issues(
        &self,
        credentials: &Credentials,
        project_id: ProjectId,
    ) -> TrackerResult<Vec<DirectoryItem>> {
        self.check(credentials, &format!("projects/{}/issues", project_id))?;
        Ok(self
            .data()
            .issues
            .get(&project_id)
            .cloned()
            .unwrap_or_default())
    }
}
