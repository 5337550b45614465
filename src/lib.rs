//! # rewind
//!
//! Scoped rollback and checkpoints for AI-driven, multi-phase code changes.
//!
//! This crate bundles the engine, the HTTP server and the blocking client.
//! The `rewind` binary lives in `rewind-cli`.

pub use rewind_core as core;
pub use rewind_sdk as sdk;
pub use rewind_server as server;

pub use rewind_core::{
    Error, Result, RewindConfig, RollbackEngine, RollbackMethod, RollbackOptions, RollbackScope,
    RollbackTarget,
};
pub use rewind_sdk::RewindClient;
pub use rewind_server::RewindServer;
