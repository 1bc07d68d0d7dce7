//! IPC layer for tracetimed
//!
//! Provides:
//! - Unix domain socket server
//! - NDJSON (newline-delimited JSON) protocol
//! - Client connection management
//! - Peer UID check (same user or root only)

mod client;
mod server;

pub use client::*;
pub use server::*;

use thiserror::Error;
use tracetime_api::ErrorCode;

/// IPC errors
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Server error: {0}")]
    ServerError(String),

    /// The service answered with an error response
    #[error("{message} ({code:?})")]
    Remote { code: ErrorCode, message: String },
}

pub type IpcResult<T> = Result<T, IpcError>;
