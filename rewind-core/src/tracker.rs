use crate::error::Result;
use crate::git::Git;
use crate::models::{CommitRecord, CommitSource, Supersession};
use crate::store::{Document, DocumentStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerDocument {
    pub version: u32,
    pub commits: Vec<CommitRecord>,
}

impl Default for LedgerDocument {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            commits: Vec::new(),
        }
    }
}

impl Document for LedgerDocument {
    const FILE_NAME: &'static str = "commits.json";
    const VERSION: u32 = LEDGER_VERSION;

    fn version(&self) -> u32 {
        self.version
    }
}

/// Append-only ledger mapping commits to the issue and phase that produced them.
pub struct CommitTracker {
    store: DocumentStore<LedgerDocument>,
}

impl CommitTracker {
    pub fn new(metadata_dir: impl Into<String>) -> Self {
        Self {
            store: DocumentStore::new(metadata_dir),
        }
    }

    /// Appends `record` unless its hash is already known. Returns whether the
    /// ledger changed.
    pub async fn record_commit(&self, cwd: &Path, record: CommitRecord) -> Result<bool> {
        let hash = record.commit_hash.clone();
        let appended = self
            .store
            .update(cwd, move |doc| {
                if doc.commits.iter().any(|c| c.commit_hash == record.commit_hash) {
                    return Ok(false);
                }
                doc.commits.push(record);
                Ok(true)
            })
            .await?;

        if appended {
            info!("recorded commit {} in {}", hash, cwd.display());
        } else {
            debug!("commit {} already recorded", hash);
        }
        Ok(appended)
    }

    /// Records the current `HEAD` of `git`'s work tree. Returns the record and
    /// whether it was new.
    pub async fn record_head_commit(
        &self,
        git: &Git,
        issue_number: u64,
        phase_number: Option<u32>,
        source: CommitSource,
    ) -> Result<(CommitRecord, bool)> {
        let entry = git.commit_entry("HEAD").await?;
        let mut record = CommitRecord::new(entry.hash, issue_number, entry.subject)
            .with_source(source)
            .with_parents(entry.parents);
        if let Some(phase) = phase_number {
            record = record.with_phase(phase);
        }

        let recorded = self.record_commit(git.cwd(), record.clone()).await?;
        Ok((record, recorded))
    }

    pub async fn get_commits_for_issue(&self, cwd: &Path, issue_number: u64) -> Result<Vec<CommitRecord>> {
        self.query(cwd, |c| c.issue_number == issue_number).await
    }

    pub async fn get_commits_for_phase(
        &self,
        cwd: &Path,
        issue_number: u64,
        phase_number: u32,
    ) -> Result<Vec<CommitRecord>> {
        self.query(cwd, |c| {
            c.issue_number == issue_number && c.phase_number == Some(phase_number)
        })
        .await
    }

    /// Every active record, in ledger order.
    pub async fn all_commits(&self, cwd: &Path) -> Result<Vec<CommitRecord>> {
        self.query(cwd, |_| true).await
    }

    async fn query<F>(&self, cwd: &Path, filter: F) -> Result<Vec<CommitRecord>>
    where
        F: Fn(&CommitRecord) -> bool,
    {
        let doc = self.store.read(cwd).await?;
        let mut commits: Vec<CommitRecord> = doc
            .commits
            .iter()
            .filter(|c| c.is_active() && filter(c))
            .cloned()
            .collect();
        // Stable: equal timestamps keep ledger order.
        commits.sort_by_key(|c| c.timestamp);
        Ok(commits)
    }

    /// Marks the given commits as undone by a rollback. Returns how many
    /// records were newly superseded.
    pub async fn mark_superseded(&self, cwd: &Path, hashes: &[String], backup_branch: &str) -> Result<usize> {
        let wanted: HashSet<&str> = hashes.iter().map(String::as_str).collect();
        let at = Utc::now();

        let count = self
            .store
            .update(cwd, |doc| {
                let mut count = 0;
                for record in doc.commits.iter_mut() {
                    if record.is_active() && wanted.contains(record.commit_hash.as_str()) {
                        record.superseded = Some(Supersession {
                            at,
                            backup_branch: backup_branch.to_string(),
                        });
                        count += 1;
                    }
                }
                Ok(count)
            })
            .await?;

        info!("marked {} ledger entries superseded by {}", count, backup_branch);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;
    use chrono::Duration;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_record_commit_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let tracker = CommitTracker::new(".rewind");
        let record = CommitRecord::new("abc", 7, "phase 1").with_phase(1);

        assert!(tracker.record_commit(dir.path(), record.clone()).await.unwrap());
        assert!(!tracker.record_commit(dir.path(), record).await.unwrap());

        assert_eq!(tracker.get_commits_for_issue(dir.path(), 7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_queries_filter_and_order_by_timestamp() {
        let dir = TempDir::new().unwrap();
        let tracker = CommitTracker::new(".rewind");
        let now = Utc::now();

        let late = CommitRecord::new("c3", 7, "phase 2 again")
            .with_phase(2)
            .with_timestamp(now + Duration::seconds(10));
        let early = CommitRecord::new("c1", 7, "phase 1")
            .with_phase(1)
            .with_timestamp(now);
        let middle = CommitRecord::new("c2", 7, "phase 2")
            .with_phase(2)
            .with_timestamp(now + Duration::seconds(5));
        let other = CommitRecord::new("c9", 8, "other issue").with_timestamp(now);

        for record in [late, early, middle, other] {
            tracker.record_commit(dir.path(), record).await.unwrap();
        }

        let issue: Vec<_> = tracker
            .get_commits_for_issue(dir.path(), 7)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.commit_hash)
            .collect();
        assert_eq!(issue, vec!["c1", "c2", "c3"]);

        let phase: Vec<_> = tracker
            .get_commits_for_phase(dir.path(), 7, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.commit_hash)
            .collect();
        assert_eq!(phase, vec!["c2", "c3"]);
    }

    #[tokio::test]
    async fn test_concurrent_records_are_serialized() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(CommitTracker::new(".rewind"));

        let mut handles = Vec::new();
        for i in 0..20 {
            let tracker = Arc::clone(&tracker);
            let path = dir.path().to_path_buf();
            handles.push(tokio::spawn(async move {
                let record = CommitRecord::new(format!("hash-{i}"), 1, "work");
                tracker.record_commit(&path, record).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(tracker.get_commits_for_issue(dir.path(), 1).await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_superseded_records_leave_queries() {
        let dir = TempDir::new().unwrap();
        let tracker = CommitTracker::new(".rewind");
        tracker
            .record_commit(dir.path(), CommitRecord::new("a", 3, "one").with_phase(1))
            .await
            .unwrap();
        tracker
            .record_commit(dir.path(), CommitRecord::new("b", 3, "two").with_phase(2))
            .await
            .unwrap();

        let count = tracker
            .mark_superseded(dir.path(), &["a".to_string()], "rewind-backup/x")
            .await
            .unwrap();
        assert_eq!(count, 1);

        let remaining = tracker.get_commits_for_issue(dir.path(), 3).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].commit_hash, "b");

        // Re-recording a superseded hash stays a no-op.
        assert!(!tracker
            .record_commit(dir.path(), CommitRecord::new("a", 3, "one"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_record_head_commit_reads_history() {
        let repo = TestRepo::new().await;
        let hash = repo.commit_file("src/lib.rs", "fn a() {}\n", "Add a").await;
        let tracker = CommitTracker::new(".rewind");

        let (record, recorded) = tracker
            .record_head_commit(&repo.git(), 12, Some(1), CommitSource::SelfOriginated)
            .await
            .unwrap();
        assert!(recorded);

        assert_eq!(record.commit_hash, hash);
        assert_eq!(record.message, "Add a");
        assert_eq!(record.parent_hashes, vec![repo.root_commit.clone()]);
        assert!(!record.is_merge_commit);

        let stored = tracker.get_commits_for_phase(repo.path(), 12, 1).await.unwrap();
        assert_eq!(stored, vec![record]);
    }
}
