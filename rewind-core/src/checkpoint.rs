use crate::config::RewindConfig;
use crate::error::{Error, Result};
use crate::executor::RollbackExecutor;
use crate::git::{Git, GitGateway};
use crate::lock::ProjectLocks;
use crate::models::{Checkpoint, RollbackOptions, RollbackResult, RollbackScope, RollbackTarget};
use crate::store::{Document, DocumentStore};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const CHECKPOINTS_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointDocument {
    pub version: u32,
    pub checkpoints: Vec<Checkpoint>,
}

impl Default for CheckpointDocument {
    fn default() -> Self {
        Self {
            version: CHECKPOINTS_VERSION,
            checkpoints: Vec::new(),
        }
    }
}

impl Document for CheckpointDocument {
    const FILE_NAME: &'static str = "checkpoints.json";
    const VERSION: u32 = CHECKPOINTS_VERSION;

    fn version(&self) -> u32 {
        self.version
    }
}

/// Checkpoint metadata, one document per project.
pub struct CheckpointStore {
    store: DocumentStore<CheckpointDocument>,
}

impl CheckpointStore {
    pub fn new(metadata_dir: impl Into<String>) -> Self {
        Self {
            store: DocumentStore::new(metadata_dir),
        }
    }

    pub async fn get(&self, cwd: &Path, id: &str) -> Result<Checkpoint> {
        self.store
            .read(cwd)
            .await?
            .checkpoints
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("checkpoint {id}")))
    }

    /// Newest first.
    pub async fn list(&self, cwd: &Path) -> Result<Vec<Checkpoint>> {
        let mut checkpoints = self.store.read(cwd).await?.checkpoints.clone();
        checkpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(checkpoints)
    }

    async fn insert(&self, cwd: &Path, checkpoint: Checkpoint) -> Result<()> {
        self.store
            .update(cwd, move |doc| {
                doc.checkpoints.push(checkpoint);
                Ok(())
            })
            .await
    }

    async fn remove(&self, cwd: &Path, id: &str) -> Result<Checkpoint> {
        self.store
            .update(cwd, |doc| {
                let index = doc
                    .checkpoints
                    .iter()
                    .position(|c| c.id == id)
                    .ok_or_else(|| Error::NotFound(format!("checkpoint {id}")))?;
                Ok(doc.checkpoints.remove(index))
            })
            .await
    }
}

/// Named recovery points pinned by a dedicated ref so the commit survives
/// garbage collection.
pub struct CheckpointManager {
    store: Arc<CheckpointStore>,
    executor: Arc<RollbackExecutor>,
    gateway: Arc<dyn GitGateway>,
    locks: Arc<ProjectLocks>,
    config: Arc<RewindConfig>,
}

impl CheckpointManager {
    pub fn new(
        store: Arc<CheckpointStore>,
        executor: Arc<RollbackExecutor>,
        gateway: Arc<dyn GitGateway>,
        locks: Arc<ProjectLocks>,
        config: Arc<RewindConfig>,
    ) -> Self {
        Self {
            store,
            executor,
            gateway,
            locks,
            config,
        }
    }

    fn git(&self, cwd: &Path) -> Git {
        Git::new(Arc::clone(&self.gateway), cwd, self.config.git_timeout())
    }

    pub async fn create_checkpoint(
        &self,
        name: &str,
        issue_number: Option<u64>,
        cwd: &Path,
        description: Option<String>,
    ) -> Result<Checkpoint> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("checkpoint name must not be empty".to_string()));
        }

        let git = self.git(cwd);
        if !git.is_work_tree().await {
            return Err(Error::NotARepository(cwd.to_path_buf()));
        }

        let _tree = self.locks.read_tree(cwd).await;
        let head = git.head().await?;
        let checkpoint = Checkpoint::new(name, head)
            .with_issue(issue_number)
            .with_description(description.filter(|d| !d.trim().is_empty()));

        let reference = self.config.checkpoint_ref(&checkpoint.id);
        git.update_ref(&reference, &checkpoint.commit_hash).await?;

        if let Err(e) = self.store.insert(cwd, checkpoint.clone()).await {
            warn!("failed to save checkpoint {}, removing {}: {}", checkpoint.id, reference, e);
            if let Err(cleanup) = git.delete_ref(&reference).await {
                warn!("failed to remove {}: {}", reference, cleanup);
            }
            return Err(e);
        }

        info!(
            "created checkpoint '{}' ({}) at {}",
            checkpoint.name, checkpoint.id, checkpoint.commit_hash
        );
        Ok(checkpoint)
    }

    pub async fn list_checkpoints(&self, cwd: &Path) -> Result<Vec<Checkpoint>> {
        self.store.list(cwd).await
    }

    pub async fn get_checkpoint(&self, id: &str, cwd: &Path) -> Result<Checkpoint> {
        self.store.get(cwd, id).await
    }

    pub async fn delete_checkpoint(&self, id: &str, cwd: &Path) -> Result<Checkpoint> {
        let _tree = self.locks.read_tree(cwd).await;
        let removed = self.store.remove(cwd, id).await?;

        let reference = self.config.checkpoint_ref(id);
        if let Err(e) = self.git(cwd).delete_ref(&reference).await {
            warn!("checkpoint {} removed but {} could not be deleted: {}", id, reference, e);
        }

        info!("deleted checkpoint '{}' ({})", removed.name, removed.id);
        Ok(removed)
    }

    pub async fn rollback_to_checkpoint(
        &self,
        id: &str,
        options: RollbackOptions,
        cwd: &Path,
    ) -> Result<RollbackResult> {
        self.executor
            .execute_rollback(RollbackScope::Checkpoint, &RollbackTarget::checkpoint(id), options, cwd)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RollbackEngine;
    use crate::models::RollbackMethod;
    use crate::test_support::TestRepo;

    #[tokio::test]
    async fn test_create_pins_head_with_a_ref() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());

        let checkpoint = engine
            .create_checkpoint("before refactor", Some(4), repo.path(), Some("safe point".into()))
            .await
            .unwrap();

        assert_eq!(checkpoint.commit_hash, repo.head().await);
        assert_eq!(checkpoint.issue_number, Some(4));
        let pinned = repo
            .git_cmd(&["rev-parse", &format!("refs/rewind/checkpoints/{}", checkpoint.id)])
            .await;
        assert_eq!(pinned, checkpoint.commit_hash);
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());

        let err = engine
            .create_checkpoint("   ", None, repo.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());

        let first = engine.create_checkpoint("first", None, repo.path(), None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = engine.create_checkpoint("second", None, repo.path(), None).await.unwrap();

        let ids: Vec<_> = engine
            .list_checkpoints(repo.path())
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_ref() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        let checkpoint = engine.create_checkpoint("tmp", None, repo.path(), None).await.unwrap();

        engine.delete_checkpoint(&checkpoint.id, repo.path()).await.unwrap();

        assert!(engine.list_checkpoints(repo.path()).await.unwrap().is_empty());
        let refs = repo.git_cmd(&["for-each-ref", "refs/rewind"]).await;
        assert!(refs.is_empty());
        assert!(matches!(
            engine.delete_checkpoint(&checkpoint.id, repo.path()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rollback_restores_checkpoint_head() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        repo.commit_file("a.txt", "one\n", "one").await;
        let checkpoint = engine.create_checkpoint("mark", None, repo.path(), None).await.unwrap();
        repo.commit_file("a.txt", "two\n", "two").await;
        repo.commit_file("b.txt", "new\n", "three").await;

        let result = engine
            .rollback_to_checkpoint(&checkpoint.id, RollbackOptions::new(RollbackMethod::Reset), repo.path())
            .await
            .unwrap();

        assert!(result.success, "{:?}", result.error);
        assert_eq!(repo.head().await, checkpoint.commit_hash);
        assert_eq!(repo.read_file("a.txt").as_deref(), Some("one\n"));
        assert!(repo.read_file("b.txt").is_none());
    }

    #[tokio::test]
    async fn test_revert_to_checkpoint_restores_content() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        repo.commit_file("a.txt", "one\n", "one").await;
        let checkpoint = engine.create_checkpoint("mark", None, repo.path(), None).await.unwrap();
        repo.commit_file("a.txt", "two\n", "two").await;
        repo.commit_file("b.txt", "new\n", "three").await;

        let result = engine
            .rollback_to_checkpoint(&checkpoint.id, RollbackOptions::new(RollbackMethod::Revert), repo.path())
            .await
            .unwrap();

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.revert_commits.len(), 1);
        assert_eq!(repo.read_file("a.txt").as_deref(), Some("one\n"));
        assert!(repo.read_file("b.txt").is_none());
        let diff = repo
            .git_cmd(&["diff", "--stat", &checkpoint.commit_hash, "HEAD"])
            .await;
        assert!(diff.is_empty());
    }

    #[tokio::test]
    async fn test_deleted_checkpoint_cannot_be_restored() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        let checkpoint = engine.create_checkpoint("gone", None, repo.path(), None).await.unwrap();
        repo.commit_file("a.txt", "later\n", "later").await;
        let head = repo.head().await;
        let branches = repo.git_cmd(&["branch", "--list"]).await;

        engine.delete_checkpoint(&checkpoint.id, repo.path()).await.unwrap();
        let err = engine
            .rollback_to_checkpoint(&checkpoint.id, RollbackOptions::default(), repo.path())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(repo.head().await, head);
        assert_eq!(repo.git_cmd(&["branch", "--list"]).await, branches);
    }
}
