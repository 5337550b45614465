//! # rewind-server
//!
//! HTTP API for rewind: commit recording, rollback preview and execution,
//! checkpoints, and a server-sent progress stream per project.

pub mod api;
pub mod server;

pub use api::{create_router, ApiError, AppState};
pub use server::RewindServer;
