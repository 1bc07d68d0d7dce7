//! Store trait definitions

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracetime_api::SessionStatus;
use tracetime_util::{GroupId, IssueId, ProjectId, SessionId};

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Sessions

    /// Persist a new session and assign its id; `updated_at` starts at `created_at`
    fn insert_session(&self, session: &NewSession) -> StoreResult<SessionRecord>;

    /// Atomically write the full record; stamps `updated_at` with `now` on success
    fn put_session(&self, session: &mut SessionRecord, now: DateTime<Local>) -> StoreResult<()>;

    fn get_session(&self, id: SessionId) -> StoreResult<SessionRecord>;

    /// The single open session, if any.
    ///
    /// Fails with `CorruptState` if more than one is found.
    fn get_open_session(&self) -> StoreResult<Option<SessionRecord>>;

    /// Most recently updated sessions, newest first
    fn recent_sessions(&self, limit: usize) -> StoreResult<Vec<SessionRecord>>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// A session about to be created
#[derive(Debug, Clone)]
pub struct NewSession {
    pub group_id: GroupId,
    pub project_id: ProjectId,
    pub issue_id: IssueId,
    pub label: String,
    pub status: SessionStatus,
    pub current_interval_start: Option<DateTime<Local>>,
    pub created_at: DateTime<Local>,
}

/// The persisted session record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub group_id: GroupId,
    pub project_id: ProjectId,
    pub issue_id: IssueId,
    pub label: String,
    pub status: SessionStatus,

    /// Whole seconds accrued by completed running intervals
    pub accumulated_seconds: u64,

    /// Start of the live interval; set iff `status == Running`
    pub current_interval_start: Option<DateTime<Local>>,

    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
}

impl SessionRecord {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}
