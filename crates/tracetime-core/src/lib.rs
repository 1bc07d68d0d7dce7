//! Session timer engine for tracetimed
//!
//! This crate is the heart of tracetimed, containing:
//! - Session state machine (Running <-> Paused -> Finished)
//! - Elapsed-time accounting in whole seconds
//! - Recovery of the open session after a restart
//! - Periodic checkpointing of running time

mod engine;
mod error;
mod events;
mod session;

pub use engine::*;
pub use error::*;
pub use events::*;
pub use session::*;
