//! Thin adapter over the `git` binary.
//!
//! Everything the engine knows about history goes through [`GitGateway`], so
//! callers can swap in their own executor. [`Git`] layers typed helpers on top
//! of a gateway bound to one working directory.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Tree object of an empty repository, used as the base of root commits.
pub const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait GitGateway: Send + Sync {
    /// Runs one git invocation. Only spawn failures and timeouts are errors;
    /// a nonzero exit is reported through [`GitOutput::exit_code`].
    async fn exec(&self, args: &[String], cwd: &Path, timeout: Duration) -> Result<GitOutput>;
}

/// Spawns the `git` found on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct ProcessGit;

/// Subcommands that write refs, the index or the work tree.
const MUTATING: &[&str] = &["revert", "reset", "commit", "update-ref", "branch", "checkout"];

fn is_mutating(args: &[String]) -> bool {
    args.first().is_some_and(|cmd| MUTATING.contains(&cmd.as_str()))
}

#[async_trait]
impl GitGateway for ProcessGit {
    async fn exec(&self, args: &[String], cwd: &Path, timeout: Duration) -> Result<GitOutput> {
        debug!("running git {:?} in {}", args, cwd.display());

        let mut command = Command::new("git");
        command
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0");
        run_bounded(command, args, is_mutating(args), timeout).await
    }
}

/// Runs `command` under `timeout`.
///
/// Read-only commands are killed when the timeout fires. Mutating commands
/// are never interrupted: a killed revert or reset leaves a half-written
/// index and a stale `index.lock`. They are awaited to completion and the
/// timeout is reported afterwards as a failure of the stage.
async fn run_bounded(mut command: Command, args: &[String], mutating: bool, timeout: Duration) -> Result<GitOutput> {
    let command_line = args.join(" ");
    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(!mutating)
        .spawn()
        .map_err(|e| Error::git(&command_line, format!("failed to spawn git: {e}")))?;

    let mut wait = tokio::spawn(child.wait_with_output());
    let output = match tokio::time::timeout(timeout, &mut wait).await {
        Ok(joined) => joined,
        Err(_) if mutating => {
            warn!(
                "git {} exceeded {:?}, waiting for it to finish",
                command_line, timeout
            );
            let _ = wait.await;
            return Err(timed_out(&command_line, timeout));
        }
        Err(_) => {
            warn!("git {} timed out after {:?}", command_line, timeout);
            wait.abort();
            return Err(timed_out(&command_line, timeout));
        }
    };

    let output = output
        .map_err(|e| Error::git(&command_line, format!("git task failed: {e}")))?
        .map_err(|e| Error::git(&command_line, format!("failed to run git: {e}")))?;
    Ok(GitOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

fn timed_out(command_line: &str, timeout: Duration) -> Error {
    Error::git(command_line, format!("timed out after {}s", timeout.as_secs()))
}

/// Parsed `git log` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub hash: String,
    pub parents: Vec<String>,
    pub subject: String,
}

impl LogEntry {
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// First parent, or the empty tree for root commits.
    pub fn diff_base(&self) -> &str {
        self.parents.first().map(String::as_str).unwrap_or(EMPTY_TREE)
    }
}

/// A gateway bound to one working directory and timeout.
#[derive(Clone)]
pub struct Git {
    gateway: Arc<dyn GitGateway>,
    cwd: PathBuf,
    timeout: Duration,
}

impl Git {
    pub fn new(gateway: Arc<dyn GitGateway>, cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            gateway,
            cwd: cwd.into(),
            timeout,
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Runs git and returns the output whatever the exit code.
    pub async fn try_run<S: AsRef<str>>(&self, args: &[S]) -> Result<GitOutput> {
        let args: Vec<String> = args.iter().map(|a| a.as_ref().to_string()).collect();
        self.gateway.exec(&args, &self.cwd, self.timeout).await
    }

    /// Runs git, failing with [`Error::GitCommand`] on a nonzero exit.
    pub async fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<String> {
        let output = self.try_run(args).await?;
        if output.success() {
            return Ok(output.stdout);
        }

        let command = args.iter().map(|a| a.as_ref()).collect::<Vec<_>>().join(" ");
        let stderr = output.stderr.trim();
        let message = if stderr.is_empty() {
            output.stdout.trim().to_string()
        } else {
            stderr.to_string()
        };
        Err(Error::git(command, format!("exit {}: {}", output.exit_code, message)))
    }

    pub async fn is_work_tree(&self) -> bool {
        match self.try_run(&["rev-parse", "--is-inside-work-tree"]).await {
            Ok(output) => output.success() && output.stdout.trim() == "true",
            Err(_) => false,
        }
    }

    pub async fn head(&self) -> Result<String> {
        Ok(self.run(&["rev-parse", "HEAD"]).await?.trim().to_string())
    }

    /// Resolves a revision to a full commit hash, `None` if it does not exist.
    pub async fn resolve_commit(&self, rev: &str) -> Result<Option<String>> {
        let spec = format!("{rev}^{{commit}}");
        let output = self.try_run(&["rev-parse", "--verify", "--quiet", spec.as_str()]).await?;
        if output.success() {
            Ok(Some(output.stdout.trim().to_string()))
        } else {
            Ok(None)
        }
    }

    pub async fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let output = self
            .try_run(&["merge-base", "--is-ancestor", ancestor, descendant])
            .await?;
        match output.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            code => Err(Error::git(
                "merge-base --is-ancestor",
                format!("exit {code}: {}", output.stderr.trim()),
            )),
        }
    }

    /// Best common ancestor of all `commits`.
    pub async fn merge_base_all(&self, commits: &[String]) -> Result<Option<String>> {
        if commits.len() == 1 {
            return Ok(Some(commits[0].clone()));
        }
        let mut args = vec!["merge-base".to_string(), "--octopus".to_string()];
        args.extend(commits.iter().cloned());

        let output = self.try_run(&args).await?;
        match output.exit_code {
            0 => Ok(output.stdout.lines().next().map(|l| l.trim().to_string())),
            1 => Ok(None),
            code => Err(Error::git(
                "merge-base --octopus",
                format!("exit {code}: {}", output.stderr.trim()),
            )),
        }
    }

    /// Commits reachable from `tip` but not from `exclude`, oldest first in
    /// topological order. `exclude = None` walks all the way to the root.
    pub async fn log_range(&self, exclude: Option<&str>, tip: &str) -> Result<Vec<LogEntry>> {
        let range = match exclude {
            Some(base) => format!("{base}..{tip}"),
            None => tip.to_string(),
        };
        let stdout = self
            .run(&[
                "log",
                "--topo-order",
                "--reverse",
                "--format=%H%x1f%P%x1f%s",
                range.as_str(),
            ])
            .await?;

        Ok(stdout.lines().filter_map(parse_log_line).collect())
    }

    pub async fn commit_entry(&self, rev: &str) -> Result<LogEntry> {
        let stdout = self
            .run(&["log", "-1", "--format=%H%x1f%P%x1f%s", rev])
            .await?;
        stdout
            .lines()
            .find_map(parse_log_line)
            .ok_or_else(|| Error::NotFound(format!("commit {rev}")))
    }

    /// `git status --porcelain` lines, untracked files included.
    pub async fn status_porcelain(&self) -> Result<Vec<String>> {
        let stdout = self
            .run(&["status", "--porcelain", "--untracked-files=all"])
            .await?;
        Ok(stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Remote-tracking branches containing `commit`.
    pub async fn remote_branches_containing(&self, commit: &str) -> Result<Vec<String>> {
        let stdout = self
            .run(&[
                "for-each-ref",
                "--format=%(refname:short)",
                "--contains",
                commit,
                "refs/remotes",
            ])
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty() && !name.ends_with("/HEAD"))
            .map(str::to_string)
            .collect())
    }

    pub async fn diff_numstat(&self, from: &str, to: &str) -> Result<String> {
        self.run(&["diff", "--numstat", "-z", "-M", from, to]).await
    }

    pub async fn diff_name_status(&self, from: &str, to: &str) -> Result<String> {
        self.run(&["diff", "--name-status", "-z", "-M", from, to]).await
    }

    pub async fn diff_zero_context(&self, from: &str, to: &str) -> Result<String> {
        self.run(&["diff", "-U0", "--no-color", "-M", from, to]).await
    }

    pub async fn show_file(&self, rev: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let spec = format!("{rev}:{path}");
        let output = self.try_run(&["show", spec.as_str()]).await?;
        if output.success() {
            Ok(Some(output.stdout.into_bytes()))
        } else {
            Ok(None)
        }
    }

    pub async fn branch_exists(&self, name: &str) -> Result<bool> {
        let reference = format!("refs/heads/{name}");
        let output = self
            .try_run(&["show-ref", "--verify", "--quiet", reference.as_str()])
            .await?;
        Ok(output.success())
    }

    pub async fn create_branch(&self, name: &str, at: &str) -> Result<()> {
        self.run(&["branch", name, at]).await.map(|_| ())
    }

    pub async fn update_ref(&self, reference: &str, commit: &str) -> Result<()> {
        self.run(&["update-ref", reference, commit]).await.map(|_| ())
    }

    pub async fn delete_ref(&self, reference: &str) -> Result<()> {
        self.run(&["update-ref", "-d", reference]).await.map(|_| ())
    }

    pub async fn revert_no_commit(&self, commit: &str, is_merge: bool) -> Result<()> {
        if is_merge {
            self.run(&["revert", "--no-commit", "-m", "1", commit]).await?;
        } else {
            self.run(&["revert", "--no-commit", commit]).await?;
        }
        Ok(())
    }

    pub async fn unmerged_paths(&self) -> Result<Vec<String>> {
        let stdout = self
            .run(&["diff", "--name-only", "--diff-filter=U"])
            .await?;
        Ok(stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    pub async fn revert_abort(&self) -> Result<()> {
        self.run(&["revert", "--abort"]).await.map(|_| ())
    }

    pub async fn reset_hard(&self, commit: &str) -> Result<()> {
        self.run(&["reset", "--hard", commit]).await.map(|_| ())
    }

    /// True when the index differs from HEAD.
    pub async fn has_staged_changes(&self) -> Result<bool> {
        let output = self.try_run(&["diff", "--cached", "--quiet"]).await?;
        match output.exit_code {
            0 => Ok(false),
            1 => Ok(true),
            code => Err(Error::git(
                "diff --cached --quiet",
                format!("exit {code}: {}", output.stderr.trim()),
            )),
        }
    }

    pub async fn commit(&self, message: &str) -> Result<String> {
        self.run(&["commit", "--no-edit", "-m", message]).await?;
        self.head().await
    }

    pub async fn push(&self, remote: Option<&str>) -> Result<()> {
        match remote {
            Some(remote) => self.run(&["push", remote]).await?,
            None => self.run(&["push"]).await?,
        };
        Ok(())
    }
}

fn parse_log_line(line: &str) -> Option<LogEntry> {
    let mut parts = line.splitn(3, '\x1f');
    let hash = parts.next()?.trim();
    if hash.is_empty() {
        return None;
    }
    let parents = parts
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let subject = parts.next().unwrap_or_default().to_string();

    Some(LogEntry {
        hash: hash.to_string(),
        parents,
        subject,
    })
}
