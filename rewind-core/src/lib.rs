//! # rewind-core
//!
//! Core library for rewind - scoped rollback of AI-driven code changes.
//!
//! This crate keeps a ledger mapping commits to the issue and phase that
//! produced them, previews what undoing a phase, an issue or a checkpoint
//! would do to the history, and executes the rollback behind a backup branch.

pub mod analyzer;
pub mod checkpoint;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod executor;
pub mod git;
pub mod hooks;
pub mod lock;
pub mod models;
pub mod paths;
pub mod progress;
pub mod store;
pub mod tracker;

#[cfg(test)]
mod test_support;

pub use config::RewindConfig;
pub use engine::{RollbackEngine, RollbackEngineBuilder};
pub use error::{Error, Result};
pub use git::{GitGateway, GitOutput, ProcessGit};
pub use hooks::{CommandStatusHook, IssueStatusHook, IssueStatusUpdate, NoopStatusHook};
pub use models::{
    Checkpoint, CommitRecord, CommitSource, FileChange, FileOutcome, FileStatus, LinesChanged,
    PreviewCommit, ProgressStage, RollbackMethod, RollbackOptions, RollbackPreview, RollbackProgress,
    RollbackResult, RollbackScope, RollbackTarget, RollbackWarning, Severity, WarningKind,
};
pub use tokio_util::sync::CancellationToken;
