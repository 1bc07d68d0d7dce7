//! Engine error taxonomy

use thiserror::Error;
use tracetime_api::SessionStatus;
use tracetime_store::StoreError;
use tracetime_util::SessionId;
use tracing::error;

use crate::Transition;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Session {0} is already open")]
    SessionAlreadyOpen(SessionId),

    #[error("Cannot {operation} session {id} while it is {status}")]
    InvalidTransition {
        id: SessionId,
        status: SessionStatus,
        operation: Transition,
    },

    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Storage error: {0}")]
    Storage(#[source] StoreError),

    #[error("Corrupt state: {0}")]
    CorruptState(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            StoreError::OpenSessionConflict { existing } => {
                EngineError::SessionAlreadyOpen(existing)
            }
            StoreError::CorruptState(msg) => {
                error!(error = %msg, "Persisted session state is corrupt");
                EngineError::CorruptState(msg)
            }
            other => {
                error!(error = %other, "Session store failure");
                EngineError::Storage(other)
            }
        }
    }
}
