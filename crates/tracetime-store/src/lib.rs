//! Persistence layer for tracetimed
//!
//! Provides:
//! - Session records (one row per session, at most one open)
//! - Audit log (append-only)

mod audit;
mod sqlite;
mod traits;

pub use audit::*;
pub use sqlite::*;
pub use traits::*;

use thiserror::Error;
use tracetime_util::SessionId;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session not found: {0}")]
    NotFound(SessionId),

    /// A write would leave two open sessions
    #[error("Session {existing} is already open")]
    OpenSessionConflict { existing: SessionId },

    /// Persisted state violates an invariant (e.g. two open sessions)
    #[error("Corrupt state: {0}")]
    CorruptState(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
