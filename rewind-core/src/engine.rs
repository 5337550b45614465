use crate::analyzer::RollbackAnalyzer;
use crate::checkpoint::{CheckpointManager, CheckpointStore};
use crate::config::RewindConfig;
use crate::diff::FileDiff;
use crate::error::{Error, Result};
use crate::executor::RollbackExecutor;
use crate::git::{Git, GitGateway, ProcessGit};
use crate::hooks::{CommandStatusHook, IssueStatusHook, NoopStatusHook};
use crate::lock::ProjectLocks;
use crate::models::{
    Checkpoint, CommitRecord, CommitSource, RollbackMethod, RollbackOptions, RollbackPreview,
    RollbackProgress, RollbackResult, RollbackScope, RollbackTarget,
};
use crate::progress::ProgressHub;
use crate::tracker::CommitTracker;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Entry point wiring the tracker, analyzer, executor and checkpoint manager
/// around one lock map and one progress hub.
pub struct RollbackEngine {
    config: Arc<RewindConfig>,
    gateway: Arc<dyn GitGateway>,
    tracker: Arc<CommitTracker>,
    analyzer: Arc<RollbackAnalyzer>,
    executor: Arc<RollbackExecutor>,
    checkpoints: CheckpointManager,
    locks: Arc<ProjectLocks>,
    progress: Arc<ProgressHub>,
}

pub struct RollbackEngineBuilder {
    config: RewindConfig,
    gateway: Option<Arc<dyn GitGateway>>,
    status_hook: Option<Arc<dyn IssueStatusHook>>,
}

impl RollbackEngineBuilder {
    pub fn gateway(mut self, gateway: Arc<dyn GitGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn status_hook(mut self, hook: Arc<dyn IssueStatusHook>) -> Self {
        self.status_hook = Some(hook);
        self
    }

    pub fn build(self) -> RollbackEngine {
        let config = Arc::new(self.config);
        let gateway = self.gateway.unwrap_or_else(|| Arc::new(ProcessGit));
        let status_hook: Arc<dyn IssueStatusHook> = match (self.status_hook, &config.status_hook_command) {
            (Some(hook), _) => hook,
            (None, Some(command)) => Arc::new(CommandStatusHook::new(command.clone(), config.git_timeout())),
            (None, None) => Arc::new(NoopStatusHook),
        };

        let locks = Arc::new(ProjectLocks::new());
        let progress = Arc::new(ProgressHub::new(config.progress_capacity));
        let tracker = Arc::new(CommitTracker::new(config.metadata_dir.clone()));
        let checkpoint_store = Arc::new(CheckpointStore::new(config.metadata_dir.clone()));

        let analyzer = Arc::new(RollbackAnalyzer::new(
            Arc::clone(&gateway),
            Arc::clone(&tracker),
            Arc::clone(&checkpoint_store),
            Arc::clone(&locks),
            Arc::clone(&config),
        ));
        let executor = Arc::new(RollbackExecutor::new(
            Arc::clone(&analyzer),
            Arc::clone(&tracker),
            Arc::clone(&gateway),
            Arc::clone(&locks),
            Arc::clone(&progress),
            status_hook,
            Arc::clone(&config),
        ));
        let checkpoints = CheckpointManager::new(
            checkpoint_store,
            Arc::clone(&executor),
            Arc::clone(&gateway),
            Arc::clone(&locks),
            Arc::clone(&config),
        );

        RollbackEngine {
            config,
            gateway,
            tracker,
            analyzer,
            executor,
            checkpoints,
            locks,
            progress,
        }
    }
}

impl RollbackEngine {
    pub fn new(config: RewindConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: RewindConfig) -> RollbackEngineBuilder {
        RollbackEngineBuilder {
            config,
            gateway: None,
            status_hook: None,
        }
    }

    pub fn config(&self) -> &RewindConfig {
        &self.config
    }

    fn git(&self, cwd: &Path) -> Git {
        Git::new(Arc::clone(&self.gateway), cwd, self.config.git_timeout())
    }

    // Commit tracking

    /// Records a commit reported by the caller. Inside a work tree the hash is
    /// resolved against history: parents and merge status always come from
    /// git, the message only when the caller left it empty. Hashes git does
    /// not know are kept as given and reconciled at preview time.
    ///
    /// Returns the stored record and whether the ledger changed.
    pub async fn record_commit(&self, cwd: &Path, record: CommitRecord) -> Result<(CommitRecord, bool)> {
        if record.commit_hash.trim().is_empty() {
            return Err(Error::Validation("commit_hash must not be empty".to_string()));
        }
        if record.issue_number == 0 {
            return Err(Error::Validation("issue_number must be positive".to_string()));
        }

        let git = self.git(cwd);
        let record = if git.is_work_tree().await {
            self.resolve_record(&git, record).await?
        } else {
            record
        };
        let recorded = self.tracker.record_commit(cwd, record.clone()).await?;
        Ok((record, recorded))
    }

    async fn resolve_record(&self, git: &Git, mut record: CommitRecord) -> Result<CommitRecord> {
        let Some(hash) = git.resolve_commit(record.commit_hash.trim()).await? else {
            debug!("commit {} is not in history, recording as given", record.commit_hash);
            return Ok(record);
        };
        let entry = git.commit_entry(&hash).await?;
        record.commit_hash = entry.hash;
        if record.message.trim().is_empty() {
            record.message = entry.subject;
        }
        Ok(record.with_parents(entry.parents))
    }

    /// Records the current `HEAD` of `cwd` for the given issue and phase.
    /// Returns the record and whether the ledger changed.
    pub async fn record_head_commit(
        &self,
        cwd: &Path,
        issue_number: u64,
        phase_number: Option<u32>,
        source: CommitSource,
    ) -> Result<(CommitRecord, bool)> {
        if issue_number == 0 {
            return Err(Error::Validation("issue_number must be positive".to_string()));
        }
        let git = self.git(cwd);
        if !git.is_work_tree().await {
            return Err(Error::NotARepository(cwd.to_path_buf()));
        }
        self.tracker
            .record_head_commit(&git, issue_number, phase_number, source)
            .await
    }

    pub async fn get_commits_for_issue(&self, cwd: &Path, issue_number: u64) -> Result<Vec<CommitRecord>> {
        self.tracker.get_commits_for_issue(cwd, issue_number).await
    }

    pub async fn get_commits_for_phase(
        &self,
        cwd: &Path,
        issue_number: u64,
        phase_number: u32,
    ) -> Result<Vec<CommitRecord>> {
        self.tracker
            .get_commits_for_phase(cwd, issue_number, phase_number)
            .await
    }

    pub async fn all_commits(&self, cwd: &Path) -> Result<Vec<CommitRecord>> {
        self.tracker.all_commits(cwd).await
    }

    // Rollback

    pub async fn preview_rollback(
        &self,
        scope: RollbackScope,
        target: &RollbackTarget,
        cwd: &Path,
    ) -> Result<RollbackPreview> {
        self.analyzer.preview_rollback(scope, target, cwd).await
    }

    pub async fn preview_rollback_with_method(
        &self,
        scope: RollbackScope,
        target: &RollbackTarget,
        method: RollbackMethod,
        cwd: &Path,
    ) -> Result<RollbackPreview> {
        self.analyzer
            .preview_rollback_with_method(scope, target, method, cwd)
            .await
    }

    pub async fn preview_file(
        &self,
        scope: RollbackScope,
        target: &RollbackTarget,
        path: &str,
        cwd: &Path,
    ) -> Result<FileDiff> {
        self.analyzer.preview_file(scope, target, path, cwd).await
    }

    pub async fn execute_rollback(
        &self,
        scope: RollbackScope,
        target: &RollbackTarget,
        options: RollbackOptions,
        cwd: &Path,
    ) -> Result<RollbackResult> {
        self.executor.execute_rollback(scope, target, options, cwd).await
    }

    // Checkpoints

    pub async fn create_checkpoint(
        &self,
        name: &str,
        issue_number: Option<u64>,
        cwd: &Path,
        description: Option<String>,
    ) -> Result<Checkpoint> {
        self.checkpoints
            .create_checkpoint(name, issue_number, cwd, description)
            .await
    }

    pub async fn list_checkpoints(&self, cwd: &Path) -> Result<Vec<Checkpoint>> {
        self.checkpoints.list_checkpoints(cwd).await
    }

    pub async fn get_checkpoint(&self, id: &str, cwd: &Path) -> Result<Checkpoint> {
        self.checkpoints.get_checkpoint(id, cwd).await
    }

    pub async fn delete_checkpoint(&self, id: &str, cwd: &Path) -> Result<Checkpoint> {
        self.checkpoints.delete_checkpoint(id, cwd).await
    }

    pub async fn rollback_to_checkpoint(
        &self,
        id: &str,
        options: RollbackOptions,
        cwd: &Path,
    ) -> Result<RollbackResult> {
        self.checkpoints.rollback_to_checkpoint(id, options, cwd).await
    }

    // Progress and state

    pub fn subscribe_progress(&self, cwd: &Path) -> broadcast::Receiver<RollbackProgress> {
        self.progress.subscribe(cwd)
    }

    /// Whether an execute currently holds `cwd`.
    pub fn is_busy(&self, cwd: &Path) -> bool {
        self.locks.is_busy(cwd)
    }
}
