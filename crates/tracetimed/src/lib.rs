//! tracetimed - the durable session timer service
//!
//! Wires together:
//! - Store initialization and startup recovery
//! - Timer engine
//! - Tracker directory and connection settings
//! - IPC server and command dispatch
//! - Periodic checkpointing

mod dispatch;
mod service;

pub use dispatch::*;
pub use service::*;
