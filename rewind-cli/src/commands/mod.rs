pub mod checkpoint;
pub mod log;
pub mod preview;
pub mod record;
pub mod rollback;
pub mod serve;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use rewind_core::{CommitSource, RewindConfig, RollbackEngine, RollbackMethod, RollbackScope, RollbackTarget};
use std::path::{Path, PathBuf};

pub fn project_dir(cwd: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(cwd).with_context(|| format!("cannot open project directory {}", cwd.display()))
}

/// Builds an engine from the project's `.rewind/config.toml`.
pub fn load_engine(cwd: &Path, timeout: Option<u64>) -> Result<RollbackEngine> {
    let mut config = RewindConfig::load(cwd).context("failed to load .rewind/config.toml")?;
    if let Some(secs) = timeout {
        config = config.with_git_timeout(secs);
    }
    Ok(RollbackEngine::new(config))
}

/// Which slice of work to roll back.
#[derive(Args, Debug, Clone, Default)]
pub struct ScopeArgs {
    /// Issue number
    #[arg(long)]
    pub issue: Option<u64>,

    /// Phase of the issue (requires --issue)
    #[arg(long, requires = "issue")]
    pub phase: Option<u32>,

    /// Checkpoint id
    #[arg(long, conflicts_with_all = ["issue", "phase"])]
    pub checkpoint: Option<String>,
}

impl ScopeArgs {
    pub fn resolve(&self) -> Result<(RollbackScope, RollbackTarget)> {
        match (&self.checkpoint, self.issue, self.phase) {
            (Some(id), None, None) => Ok((RollbackScope::Checkpoint, RollbackTarget::checkpoint(id.clone()))),
            (None, Some(issue), Some(phase)) => Ok((RollbackScope::Phase, RollbackTarget::phase(issue, phase))),
            (None, Some(issue), None) => Ok((RollbackScope::Issue, RollbackTarget::issue(issue))),
            (None, None, _) => anyhow::bail!("pass --issue, --issue with --phase, or --checkpoint"),
            _ => anyhow::bail!("--checkpoint cannot be combined with --issue or --phase"),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum MethodArg {
    Revert,
    Reset,
}

impl From<MethodArg> for RollbackMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Revert => RollbackMethod::Revert,
            MethodArg::Reset => RollbackMethod::Reset,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum SourceArg {
    #[value(name = "self")]
    SelfOriginated,
    External,
    Unknown,
}

impl From<SourceArg> for CommitSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::SelfOriginated => CommitSource::SelfOriginated,
            SourceArg::External => CommitSource::External,
            SourceArg::Unknown => CommitSource::Unknown,
        }
    }
}
