use crate::models::{RollbackMethod, RollbackScope};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

/// What a status hook learns about a finished rollback.
#[derive(Debug, Clone, Serialize)]
pub struct IssueStatusUpdate {
    pub cwd: PathBuf,
    pub scope: RollbackScope,
    pub issue_number: Option<u64>,
    pub phase_number: Option<u32>,
    pub method: RollbackMethod,
    pub backup_branch: String,
    pub revert_commits: Vec<String>,
}

/// Called after a successful rollback when the caller asked for an issue
/// status update. The engine does not wait for the outcome.
#[async_trait]
pub trait IssueStatusHook: Send + Sync {
    async fn on_rollback(&self, update: &IssueStatusUpdate) -> anyhow::Result<()>;
}

pub struct NoopStatusHook;

#[async_trait]
impl IssueStatusHook for NoopStatusHook {
    async fn on_rollback(&self, _update: &IssueStatusUpdate) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Runs a shell command with the update exported as `REWIND_*` variables.
pub struct CommandStatusHook {
    command: String,
    timeout: Duration,
}

impl CommandStatusHook {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

#[cfg(windows)]
fn shell_cmd(cmd: &str) -> (&'static str, Vec<String>) {
    ("cmd.exe", vec!["/C".into(), cmd.into()])
}

#[cfg(not(windows))]
fn shell_cmd(cmd: &str) -> (&'static str, Vec<String>) {
    ("sh", vec!["-c".into(), cmd.into()])
}

#[async_trait]
impl IssueStatusHook for CommandStatusHook {
    async fn on_rollback(&self, update: &IssueStatusUpdate) -> anyhow::Result<()> {
        let (shell, args) = shell_cmd(&self.command);
        let opt = |v: Option<String>| v.unwrap_or_default();

        let child = Command::new(shell)
            .args(&args)
            .current_dir(&update.cwd)
            .env("REWIND_SCOPE", update.scope.as_str())
            .env("REWIND_ISSUE", opt(update.issue_number.map(|n| n.to_string())))
            .env("REWIND_PHASE", opt(update.phase_number.map(|n| n.to_string())))
            .env("REWIND_METHOD", update.method.as_str())
            .env("REWIND_BACKUP_BRANCH", &update.backup_branch)
            .env("REWIND_REVERT_COMMITS", update.revert_commits.join(" "))
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| anyhow::anyhow!("status hook timed out after {:?}", self.timeout))??;

        if !output.status.success() {
            anyhow::bail!(
                "status hook exited with {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}
