//! Command types for the tracetimed protocol

use serde::{Deserialize, Serialize};
use tracetime_util::{ClientId, GroupId, IssueId, ProjectId, SessionId};

use crate::{
    ConnectionSettings, DirectoryItem, HealthStatus, ServiceStateSnapshot, SessionView,
    TrackerUser, API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed request or unsupported API version
    InvalidRequest,
    InvalidArgument,
    SessionAlreadyOpen,
    InvalidTransition,
    NotFound,
    /// Store write failed or persisted state is inconsistent
    StorageError,
    ConfigNotFound,
    ConfigInvalid,
    TrackerError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Open a new session and start its first interval
    StartTimer {
        group_id: GroupId,
        project_id: ProjectId,
        issue_id: IssueId,
        label: String,
    },

    PauseTimer { session_id: SessionId },

    ResumeTimer { session_id: SessionId },

    /// Finish a session (terminal)
    StopTimer { session_id: SessionId },

    /// Current elapsed time of a session
    GetSessionTime { session_id: SessionId },

    /// The open session left over from a previous run, if any
    ResumeLastSession,

    // Collaborators

    LoadConfig,

    SaveConfig { settings: ConnectionSettings },

    /// Resolve the user behind a token without saving anything
    TestGitlab { url: String, token: String },

    GitlabGroups,

    GitlabProjects { group_id: GroupId },

    GitlabIssues { project_id: ProjectId },

    // Service

    GetState,

    /// Most recently touched sessions, newest first
    GetHistory { limit: usize },

    GetHealth,

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    UnsubscribeEvents,

    /// Ping for keepalive
    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    TimerStarted {
        session_id: SessionId,
    },
    TimerPaused {
        session_id: SessionId,
    },
    TimerResumed {
        session_id: SessionId,
    },
    TimerStopped {
        session_id: SessionId,
        elapsed_seconds: u64,
        elapsed_formatted: String,
    },
    SessionTime {
        session_id: SessionId,
        elapsed_seconds: u64,
        elapsed_formatted: String,
    },
    /// `None` means there is nothing to resume
    LastSession {
        session: Option<SessionView>,
    },
    Config {
        settings: ConnectionSettings,
    },
    ConfigSaved,
    TrackerUser(TrackerUser),
    Groups {
        groups: Vec<DirectoryItem>,
    },
    Projects {
        projects: Vec<DirectoryItem>,
    },
    Issues {
        issues: Vec<DirectoryItem>,
    },
    State(ServiceStateSnapshot),
    History {
        sessions: Vec<SessionView>,
    },
    Health(HealthStatus),
    Subscribed {
        client_id: ClientId,
    },
    Unsubscribed,
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new() -> Self {
        Self {
            client_id: ClientId::new(),
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new()
    }
}
