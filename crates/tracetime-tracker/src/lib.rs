//! Issue tracker directory for tracetimed
//!
//! This crate defines the interface between the daemon and the issue tracker
//! (identity lookup and group/project/issue listings), a GitLab REST client
//! implementing it, and a mock for tests. Tracker calls never touch timer
//! state.

mod gitlab;
mod mock;
mod traits;

pub use gitlab::*;
pub use mock::*;
pub use traits::*;
