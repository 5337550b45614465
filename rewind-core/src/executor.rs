//! Backup-first rollback execution.
//!
//! Every execution walks `preparing -> {reverting | resetting} -> completing`.
//! The backup branch is created before anything destructive runs; from that
//! point on failures are reported through [`RollbackResult`] so the caller
//! always learns where the pre-rollback state was saved.

use crate::analyzer::RollbackAnalyzer;
use crate::config::RewindConfig;
use crate::error::{Error, Result};
use crate::git::{Git, GitGateway};
use crate::hooks::{IssueStatusHook, IssueStatusUpdate};
use crate::lock::ProjectLocks;
use crate::models::{
    ProgressStage, RollbackMethod, RollbackOptions, RollbackPreview, RollbackResult, RollbackScope,
    RollbackTarget,
};
use crate::progress::{ProgressHub, ProgressReporter};
use crate::tracker::CommitTracker;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct RollbackExecutor {
    analyzer: Arc<RollbackAnalyzer>,
    tracker: Arc<CommitTracker>,
    gateway: Arc<dyn GitGateway>,
    locks: Arc<ProjectLocks>,
    progress: Arc<ProgressHub>,
    status_hook: Arc<dyn IssueStatusHook>,
    config: Arc<RewindConfig>,
}

/// What a single execution is working on.
struct Plan<'a> {
    scope: RollbackScope,
    target: &'a RollbackTarget,
    preview: RollbackPreview,
    options: &'a RollbackOptions,
    backup_branch: String,
}

impl RollbackExecutor {
    pub fn new(
        analyzer: Arc<RollbackAnalyzer>,
        tracker: Arc<CommitTracker>,
        gateway: Arc<dyn GitGateway>,
        locks: Arc<ProjectLocks>,
        progress: Arc<ProgressHub>,
        status_hook: Arc<dyn IssueStatusHook>,
        config: Arc<RewindConfig>,
    ) -> Self {
        Self {
            analyzer,
            tracker,
            gateway,
            locks,
            progress,
            status_hook,
            config,
        }
    }

    fn git(&self, cwd: &Path) -> Git {
        Git::new(Arc::clone(&self.gateway), cwd, self.config.git_timeout())
    }

    pub async fn execute_rollback(
        &self,
        scope: RollbackScope,
        target: &RollbackTarget,
        options: RollbackOptions,
        cwd: &Path,
    ) -> Result<RollbackResult> {
        target.validate(scope)?;
        let _guard = self.locks.acquire_execute(cwd).await?;
        let git = self.git(cwd);
        let progress = self.progress.reporter(cwd);

        progress.emit(
            ProgressStage::Preparing,
            0,
            2,
            format!("analyzing {}", target.describe(scope)),
        );
        let preview = self.analyzer.analyze(scope, target, options.method, cwd).await?;

        if let Some(expected) = options.expected_fingerprint.as_deref() {
            if expected != preview.fingerprint() {
                return Err(Error::Blocked {
                    reasons: vec!["repository changed since preview".to_string()],
                });
            }
        }
        if !preview.can_rollback {
            return Err(Error::Blocked {
                reasons: preview.blocking_reasons,
            });
        }
        if options.method == RollbackMethod::Reset && preview.reset_target.is_none() {
            return Err(Error::Validation(format!(
                "cannot reset {}: its earliest commit is a root commit",
                target.describe(scope)
            )));
        }
        if options.cancel.as_ref().is_some_and(|token| token.is_cancelled()) {
            info!("rollback of {} cancelled before backup", target.describe(scope));
            return Err(Error::Cancelled);
        }

        progress.emit(ProgressStage::Preparing, 1, 2, "creating backup branch");
        let backup_branch = self.create_backup(&git, scope, target, &preview.head).await?;
        progress.emit(
            ProgressStage::Preparing,
            2,
            2,
            format!("backup saved as {backup_branch}"),
        );

        let plan = Plan {
            scope,
            target,
            preview,
            options: &options,
            backup_branch,
        };

        match self.apply(&git, &plan, &progress).await {
            Ok(result) => Ok(result),
            Err(e) => {
                error!(
                    "rollback of {} failed, backup kept at {}: {}",
                    target.describe(scope),
                    plan.backup_branch,
                    e
                );
                let mut result = RollbackResult::failed(e.to_string(), &plan.backup_branch);
                result.head = git.head().await.ok();
                Ok(result)
            }
        }
    }

    async fn create_backup(
        &self,
        git: &Git,
        scope: RollbackScope,
        target: &RollbackTarget,
        head: &str,
    ) -> Result<String> {
        let base = format!(
            "{}/{}-{}",
            self.config.backup_prefix.trim_end_matches('/'),
            Utc::now().format("%Y%m%d-%H%M%S"),
            target.slug(scope)
        );

        let mut name = base.clone();
        while git.branch_exists(&name).await? {
            let suffix = Uuid::new_v4().simple().to_string();
            name = format!("{base}-{}", &suffix[..8]);
        }

        git.create_branch(&name, head).await?;
        info!("created backup branch {} at {}", name, head);
        Ok(name)
    }

    async fn apply(&self, git: &Git, plan: &Plan<'_>, progress: &ProgressReporter) -> Result<RollbackResult> {
        let preview = &plan.preview;
        let mut revert_commits = Vec::new();

        if preview.commits.is_empty() {
            info!("{} has nothing to roll back", plan.target.describe(plan.scope));
        } else {
            match plan.options.method {
                RollbackMethod::Revert => {
                    if let Some(commit) = self.revert(git, plan, progress).await? {
                        revert_commits.push(commit);
                    }
                }
                RollbackMethod::Reset => self.reset(git, plan, progress).await?,
            }
        }

        progress.emit(ProgressStage::Completing, 0, 1, "finishing up");
        let head = git.head().await?;

        if !preview.commits.is_empty() {
            let hashes: Vec<String> = preview.commits.iter().map(|c| c.commit_hash.clone()).collect();
            if let Err(e) = self
                .tracker
                .mark_superseded(git.cwd(), &hashes, &plan.backup_branch)
                .await
            {
                warn!("rolled back but failed to update the commit ledger: {}", e);
            }
        }

        if plan.options.update_issue_status {
            self.notify_status(IssueStatusUpdate {
                cwd: git.cwd().to_path_buf(),
                scope: plan.scope,
                issue_number: plan.target.issue_number,
                phase_number: plan.target.phase_number,
                method: plan.options.method,
                backup_branch: plan.backup_branch.clone(),
                revert_commits: revert_commits.clone(),
            });
        }

        let mut result = RollbackResult {
            success: true,
            revert_commits,
            backup_branch: Some(plan.backup_branch.clone()),
            error: None,
            head: Some(head),
            push_skipped: false,
        };

        if plan.options.push_after {
            match plan.options.method {
                RollbackMethod::Revert => {
                    if let Err(e) = git.push(self.config.push_remote.as_deref()).await {
                        warn!("rollback committed but push failed: {}", e);
                        result.success = false;
                        result.error = Some(format!("rollback committed but push failed: {e}"));
                    }
                }
                RollbackMethod::Reset => {
                    info!("not pushing after a reset; publishing rewritten history is left to the user");
                    result.push_skipped = true;
                }
            }
        }

        progress.emit(ProgressStage::Completing, 1, 1, "done");
        info!(
            "rolled back {} with {}, backup {}",
            plan.target.describe(plan.scope),
            plan.options.method.as_str(),
            plan.backup_branch
        );
        Ok(result)
    }

    /// Reverts the candidates newest first into one commit. Returns `None`
    /// when the reversal staged nothing.
    async fn revert(&self, git: &Git, plan: &Plan<'_>, progress: &ProgressReporter) -> Result<Option<String>> {
        let preview = &plan.preview;
        let total = preview.commits.len();

        for (done, commit) in preview.commits.iter().rev().enumerate() {
            progress.emit(
                ProgressStage::Reverting,
                done,
                total,
                format!("reverting {}", short(&commit.commit_hash)),
            );
            if let Err(e) = git
                .revert_no_commit(&commit.commit_hash, commit.is_merge_commit)
                .await
            {
                let files = git.unmerged_paths().await.unwrap_or_default();
                self.restore_tree(git, &preview.head).await;
                if files.is_empty() {
                    return Err(e);
                }
                return Err(Error::Conflict { files });
            }
        }
        progress.emit(ProgressStage::Reverting, total, total, "reverted");

        if !git.has_staged_changes().await? {
            info!("reverting {} staged no changes", plan.target.describe(plan.scope));
            return Ok(None);
        }

        match git.commit(&revert_message(plan)).await {
            Ok(commit) => Ok(Some(commit)),
            Err(e) => {
                self.restore_tree(git, &preview.head).await;
                Err(e)
            }
        }
    }

    async fn reset(&self, git: &Git, plan: &Plan<'_>, progress: &ProgressReporter) -> Result<()> {
        let Some(reset_target) = plan.preview.reset_target.as_deref() else {
            return Err(Error::Validation("no commit to reset to".to_string()));
        };

        progress.emit(
            ProgressStage::Resetting,
            0,
            1,
            format!("resetting to {}", short(reset_target)),
        );
        git.reset_hard(reset_target).await?;
        progress.emit(ProgressStage::Resetting, 1, 1, "reset complete");
        Ok(())
    }

    /// Puts the work tree back to `head` after a failed revert.
    async fn restore_tree(&self, git: &Git, head: &str) {
        // Single-commit reverts leave no sequencer state, so this may fail.
        let _ = git.revert_abort().await;
        if let Err(e) = git.reset_hard(head).await {
            error!("failed to restore work tree to {}: {}", head, e);
        }
    }

    fn notify_status(&self, update: IssueStatusUpdate) {
        let hook = Arc::clone(&self.status_hook);
        tokio::spawn(async move {
            if let Err(e) = hook.on_rollback(&update).await {
                warn!("issue status hook failed: {:#}", e);
            }
        });
    }
}

fn short(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}

fn revert_message(plan: &Plan<'_>) -> String {
    let commits = &plan.preview.commits;
    let mut message = format!(
        "Revert {}\n\nThis reverts {} commit(s):\n",
        plan.target.describe(plan.scope),
        commits.len()
    );
    for commit in commits.iter().rev() {
        message.push_str(&format!("  {} {}\n", commit.commit_hash, commit.message));
    }
    message.push_str(&format!("\nBackup: {}\n", plan.backup_branch));
    message
}
