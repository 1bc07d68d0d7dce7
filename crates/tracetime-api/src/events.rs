//! Event types for tracetimed -> client streaming

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracetime_util::SessionId;

use crate::{ServiceStateSnapshot, SessionView, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: tracetime_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Full state snapshot (sent after every session transition)
    StateChanged(ServiceStateSnapshot),

    SessionStarted {
        session: SessionView,
    },

    SessionPaused {
        session_id: SessionId,
        elapsed_seconds: u64,
    },

    SessionResumed {
        session_id: SessionId,
        elapsed_seconds: u64,
    },

    SessionFinished {
        session_id: SessionId,
        elapsed_seconds: u64,
    },

    /// An open session from a previous run was picked up again
    SessionRecovered {
        session: SessionView,
    },

    /// Connection settings were replaced
    ConfigSaved {
        usable: bool,
    },

    /// Service is shutting down
    Shutdown,
}
