//! Shared utilities for tracetimed
//!
//! This crate provides:
//! - ID types (SessionId, GroupId, ProjectId, IssueId, ClientId)
//! - Clock abstraction (system clock, manual clock for tests) and duration helpers
//! - Default paths for socket, data, and config locations

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
