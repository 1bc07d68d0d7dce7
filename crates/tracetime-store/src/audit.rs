//! Audit event types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracetime_api::SessionStatus;
use tracetime_util::{GroupId, IssueId, ProjectId, SessionId};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    ServiceStarted,

    ServiceStopped,

    SessionStarted {
        session_id: SessionId,
        group_id: GroupId,
        project_id: ProjectId,
        issue_id: IssueId,
        label: String,
    },

    SessionPaused {
        session_id: SessionId,
        accumulated_seconds: u64,
    },

    SessionResumed {
        session_id: SessionId,
    },

    SessionFinished {
        session_id: SessionId,
        elapsed_seconds: u64,
    },

    /// Open session picked up after a restart
    SessionRecovered {
        session_id: SessionId,
        status: SessionStatus,
        accumulated_seconds: u64,
    },

    /// Connection settings replaced
    ConfigSaved { usable: bool },

    ClientConnected {
        client_id: String,
        uid: Option<u32>,
    },

    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self::at(event, tracetime_util::now())
    }

    /// Event stamped with a caller-supplied instant
    pub fn at(event: AuditEventType, timestamp: DateTime<Local>) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp,
            event,
        }
    }
}
