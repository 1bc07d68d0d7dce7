//! Core events emitted by the engine

use tracetime_api::{SessionStatus, SessionView};
use tracetime_util::SessionId;

/// Events emitted by the timer engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
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

    /// Session reached the terminal state
    SessionFinished {
        session_id: SessionId,
        elapsed_seconds: u64,
    },

    /// Open session left over from a previous run was picked up
    SessionRecovered {
        session: SessionView,
        /// Status as stored before recovery
        previous_status: SessionStatus,
    },
}
