//! Read-only rollback analysis: scope resolution, diff statistics and risk
//! classification.

use crate::checkpoint::CheckpointStore;
use crate::config::RewindConfig;
use crate::diff::{parse_name_status_z, parse_numstat_z, parse_zero_context, FileDiff, FilePatch};
use crate::error::{Error, Result};
use crate::git::{Git, GitGateway, LogEntry};
use crate::lock::ProjectLocks;
use crate::models::{
    CommitRecord, FileChange, FileOutcome, FileStatus, LinesChanged, PreviewCommit, RollbackMethod,
    RollbackPreview, RollbackScope, RollbackTarget, RollbackWarning, Severity, WarningKind,
};
use crate::tracker::CommitTracker;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Commits a scope resolves to, plus the surrounding live range.
struct Resolution {
    /// Every commit from the range base (exclusive) to HEAD, oldest first.
    range: Vec<LogEntry>,
    candidates: HashSet<String>,
    phases: HashMap<String, Option<u32>>,
    skipped: Vec<String>,
    reset_target: Option<String>,
}

impl Resolution {
    fn is_candidate(&self, hash: &str) -> bool {
        self.candidates.contains(hash)
    }

    fn candidate_entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.range.iter().filter(|e| self.is_candidate(&e.hash))
    }

    fn external_entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.range.iter().filter(|e| !self.is_candidate(&e.hash))
    }
}

pub struct RollbackAnalyzer {
    gateway: Arc<dyn GitGateway>,
    tracker: Arc<CommitTracker>,
    checkpoints: Arc<CheckpointStore>,
    locks: Arc<ProjectLocks>,
    config: Arc<RewindConfig>,
}

impl RollbackAnalyzer {
    pub fn new(
        gateway: Arc<dyn GitGateway>,
        tracker: Arc<CommitTracker>,
        checkpoints: Arc<CheckpointStore>,
        locks: Arc<ProjectLocks>,
        config: Arc<RewindConfig>,
    ) -> Self {
        Self {
            gateway,
            tracker,
            checkpoints,
            locks,
            config,
        }
    }

    fn git(&self, cwd: &Path) -> Git {
        Git::new(Arc::clone(&self.gateway), cwd, self.config.git_timeout())
    }

    /// Preview of a revert.
    pub async fn preview_rollback(
        &self,
        scope: RollbackScope,
        target: &RollbackTarget,
        cwd: &Path,
    ) -> Result<RollbackPreview> {
        self.preview_rollback_with_method(scope, target, RollbackMethod::Revert, cwd)
            .await
    }

    pub async fn preview_rollback_with_method(
        &self,
        scope: RollbackScope,
        target: &RollbackTarget,
        method: RollbackMethod,
        cwd: &Path,
    ) -> Result<RollbackPreview> {
        target.validate(scope)?;
        let _tree = self.locks.read_tree(cwd).await;
        self.analyze(scope, target, method, cwd).await
    }

    /// Diff of one affected file between HEAD and the state the rollback
    /// would leave it in.
    pub async fn preview_file(
        &self,
        scope: RollbackScope,
        target: &RollbackTarget,
        path: &str,
        cwd: &Path,
    ) -> Result<FileDiff> {
        target.validate(scope)?;
        let _tree = self.locks.read_tree(cwd).await;
        let preview = self.analyze(scope, target, RollbackMethod::Revert, cwd).await?;

        let change = preview
            .files_affected
            .iter()
            .find(|f| f.path == path)
            .ok_or_else(|| Error::NotFound(format!("{path} is not affected by {}", target.describe(scope))))?;

        let git = self.git(cwd);
        let current = git.show_file(&preview.head, path).await?;
        let restored = match (change.will_be, preview.reset_target.as_deref()) {
            (FileOutcome::Deleted, _) | (_, None) => None,
            (_, Some(base)) => git.show_file(base, path).await?,
        };

        Ok(FileDiff::from_contents(path, current, restored))
    }

    /// Analysis without locking; callers hold the tree lock.
    pub(crate) async fn analyze(
        &self,
        scope: RollbackScope,
        target: &RollbackTarget,
        method: RollbackMethod,
        cwd: &Path,
    ) -> Result<RollbackPreview> {
        target.validate(scope)?;
        let git = self.git(cwd);
        if !git.is_work_tree().await {
            return Err(Error::NotARepository(cwd.to_path_buf()));
        }
        let head = git.head().await?;

        let resolution = match scope {
            RollbackScope::Issue | RollbackScope::Phase => {
                self.resolve_ledger(&git, scope, target, &head).await?
            }
            RollbackScope::Checkpoint => self.resolve_checkpoint(&git, target, &head).await?,
        };

        debug!(
            "{}: {} candidate(s) in a range of {}, {} skipped",
            target.describe(scope),
            resolution.candidates.len(),
            resolution.range.len(),
            resolution.skipped.len()
        );

        let commits: Vec<PreviewCommit> = resolution
            .candidate_entries()
            .map(|entry| PreviewCommit {
                commit_hash: entry.hash.clone(),
                message: entry.subject.clone(),
                phase_number: resolution.phases.get(&entry.hash).copied().flatten(),
                parent_hashes: entry.parents.clone(),
                is_merge_commit: entry.is_merge(),
            })
            .collect();

        let (files_affected, lines_changed) = self.file_stats(&git, &resolution).await?;

        let mut warnings = Vec::new();
        let mut blocking_reasons = Vec::new();

        let dirty = self.dirty_paths(&git).await?;
        if !dirty.is_empty() {
            warnings.push(RollbackWarning::new(
                WarningKind::DirtyWorkingTree,
                Severity::High,
                format!(
                    "Working tree has {} uncommitted change(s): {}",
                    dirty.len(),
                    summarize(&dirty)
                ),
            ));
            blocking_reasons
                .push("working tree has uncommitted changes; commit or stash them first".to_string());
        }

        if scope != RollbackScope::Checkpoint {
            let external: Vec<&LogEntry> = resolution.external_entries().collect();
            if !external.is_empty() {
                let labels: Vec<String> = external.iter().map(|e| short_label(e)).collect();
                warnings.push(RollbackWarning::new(
                    WarningKind::ExternalCommits,
                    Severity::High,
                    format!(
                        "{} commit(s) in the range are not part of {}: {}",
                        external.len(),
                        target.describe(scope),
                        summarize(&labels)
                    ),
                ));
                if method == RollbackMethod::Reset {
                    blocking_reasons.push(format!(
                        "reset would discard {} commit(s) outside {}; use revert instead",
                        external.len(),
                        target.describe(scope)
                    ));
                }
            }
        }

        let merges = commits.iter().filter(|c| c.is_merge_commit).count();
        if merges > 0 {
            warnings.push(RollbackWarning::new(
                WarningKind::MergeCommit,
                Severity::Medium,
                format!("{merges} merge commit(s) in scope; they are reverted against their first parent"),
            ));
        }

        let remotes = self.pushed_to(&git, &commits).await?;
        if !remotes.is_empty() {
            let message = match method {
                RollbackMethod::Revert => format!(
                    "Commits are already on {}; the revert adds new commits on top",
                    summarize(&remotes)
                ),
                RollbackMethod::Reset => format!(
                    "Commits are already on {}; a reset rewrites published history and needs a force push",
                    summarize(&remotes)
                ),
            };
            warnings.push(RollbackWarning::new(WarningKind::Pushed, Severity::High, message));
        }

        let conflicts = self.conflicting_paths(&git, &resolution).await?;
        if !conflicts.is_empty() {
            warnings.push(RollbackWarning::new(
                WarningKind::Conflicts,
                Severity::High,
                format!("Later commits also change {}", summarize(&conflicts)),
            ));
        }

        let can_rollback = blocking_reasons.is_empty();
        info!(
            "preview of {} ({}): {} commit(s), {} warning(s), can_rollback={}",
            target.describe(scope),
            method.as_str(),
            commits.len(),
            warnings.len(),
            can_rollback
        );

        Ok(RollbackPreview {
            scope,
            target: target.clone(),
            method,
            head,
            commits,
            files_affected,
            lines_changed,
            warnings,
            can_rollback,
            blocking_reasons,
            skipped_commits: resolution.skipped,
            reset_target: resolution.reset_target,
        })
    }

    async fn resolve_ledger(
        &self,
        git: &Git,
        scope: RollbackScope,
        target: &RollbackTarget,
        head: &str,
    ) -> Result<Resolution> {
        let cwd = git.cwd();
        let issue = target.issue_number.unwrap_or_default();
        let records: Vec<CommitRecord> = match (scope, target.phase_number) {
            (RollbackScope::Phase, Some(phase)) => self.tracker.get_commits_for_phase(cwd, issue, phase).await?,
            _ => self.tracker.get_commits_for_issue(cwd, issue).await?,
        };
        if records.is_empty() {
            return Err(Error::NotFound(format!("no tracked commits for {}", target.describe(scope))));
        }

        let mut candidates = HashSet::new();
        let mut phases = HashMap::new();
        let mut skipped = Vec::new();
        for record in &records {
            let resolved = match git.resolve_commit(&record.commit_hash).await? {
                Some(hash) => git.is_ancestor(&hash, head).await?.then_some(hash),
                None => None,
            };
            let Some(resolved) = resolved else {
                warn!(
                    "ledger entry {} is no longer in the history of HEAD, skipping",
                    record.commit_hash
                );
                skipped.push(record.commit_hash.clone());
                continue;
            };
            phases.insert(resolved.clone(), record.phase_number);
            candidates.insert(resolved);
        }
        if candidates.is_empty() {
            return Err(Error::NotFound(format!(
                "none of the {} tracked commit(s) for {} are in the history of HEAD",
                records.len(),
                target.describe(scope)
            )));
        }

        let mut ordered: Vec<String> = candidates.iter().cloned().collect();
        ordered.sort();
        let base = match git.merge_base_all(&ordered).await? {
            Some(base) if candidates.contains(&base) => git.commit_entry(&base).await?.parents.first().cloned(),
            other => other,
        };

        let range = git.log_range(base.as_deref(), head).await?;
        Ok(Resolution {
            range,
            candidates,
            phases,
            skipped,
            reset_target: base,
        })
    }

    async fn resolve_checkpoint(&self, git: &Git, target: &RollbackTarget, head: &str) -> Result<Resolution> {
        let id = target.checkpoint_id.as_deref().unwrap_or_default().trim();
        let checkpoint = self.checkpoints.get(git.cwd(), id).await?;

        let commit = git
            .resolve_commit(&checkpoint.commit_hash)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "commit {} of checkpoint '{}'",
                    checkpoint.commit_hash, checkpoint.name
                ))
            })?;
        if !git.is_ancestor(&commit, head).await? {
            return Err(Error::Validation(format!(
                "checkpoint '{}' ({}) is not an ancestor of HEAD",
                checkpoint.name, commit
            )));
        }

        let range = git.log_range(Some(&commit), head).await?;
        let ledger: HashMap<String, Option<u32>> = self
            .tracker
            .all_commits(git.cwd())
            .await?
            .into_iter()
            .map(|r| (r.commit_hash, r.phase_number))
            .collect();

        let candidates: HashSet<String> = range.iter().map(|e| e.hash.clone()).collect();
        let phases = candidates
            .iter()
            .map(|hash| (hash.clone(), ledger.get(hash).copied().flatten()))
            .collect();

        Ok(Resolution {
            range,
            candidates,
            phases,
            skipped: Vec::new(),
            reset_target: Some(commit),
        })
    }

    async fn file_stats(&self, git: &Git, resolution: &Resolution) -> Result<(Vec<FileChange>, LinesChanged)> {
        let mut statuses: BTreeMap<String, FileStatus> = BTreeMap::new();
        let mut binary: HashSet<String> = HashSet::new();
        let mut lines = LinesChanged::default();

        for entry in resolution.candidate_entries() {
            let numstat = git.diff_numstat(entry.diff_base(), &entry.hash).await?;
            for stat in parse_numstat_z(&numstat) {
                match (stat.added, stat.removed) {
                    (Some(added), Some(removed)) => {
                        lines.added += added;
                        lines.removed += removed;
                    }
                    _ => {
                        binary.insert(stat.path);
                    }
                }
            }

            let name_status = git.diff_name_status(entry.diff_base(), &entry.hash).await?;
            for change in parse_name_status_z(&name_status) {
                match statuses.remove(&change.path) {
                    None => {
                        statuses.insert(change.path, change.status);
                    }
                    Some(previous) => {
                        if let Some(status) = merge_status(previous, change.status) {
                            statuses.insert(change.path, status);
                        }
                    }
                }
            }
        }

        let mut externally_touched: HashSet<String> = HashSet::new();
        for entry in resolution.external_entries() {
            let name_status = git.diff_name_status(entry.diff_base(), &entry.hash).await?;
            for change in parse_name_status_z(&name_status) {
                externally_touched.extend(change.old_path);
                externally_touched.insert(change.path);
            }
        }

        let files = statuses
            .into_iter()
            .map(|(path, status)| {
                let will_be = if externally_touched.contains(&path) {
                    FileOutcome::Modified
                } else if status == FileStatus::Added {
                    FileOutcome::Deleted
                } else {
                    FileOutcome::Restored
                };
                FileChange {
                    preview_available: !binary.contains(&path),
                    path,
                    status,
                    will_be,
                }
            })
            .collect();

        Ok((files, lines))
    }

    async fn dirty_paths(&self, git: &Git) -> Result<Vec<String>> {
        let metadata = self.config.metadata_dir.trim_end_matches('/');
        let prefix = format!("{metadata}/");

        Ok(git
            .status_porcelain()
            .await?
            .into_iter()
            .filter_map(|line| line.get(3..).map(|p| p.trim_matches('"').to_string()))
            .filter(|path| path != metadata && !path.starts_with(&prefix))
            .collect())
    }

    async fn pushed_to(&self, git: &Git, commits: &[PreviewCommit]) -> Result<Vec<String>> {
        let mut remotes = BTreeSet::new();
        for commit in commits {
            remotes.extend(git.remote_branches_containing(&commit.commit_hash).await?);
        }
        Ok(remotes.into_iter().collect())
    }

    /// Paths where a candidate's result lines are rewritten by a later
    /// commit that stays in place, or a file the candidate deleted was
    /// brought back.
    async fn conflicting_paths(&self, git: &Git, resolution: &Resolution) -> Result<Vec<String>> {
        let mut patches: HashMap<&str, Vec<FilePatch>> = HashMap::new();
        for entry in &resolution.range {
            let diff = git.diff_zero_context(entry.diff_base(), &entry.hash).await?;
            patches.insert(entry.hash.as_str(), parse_zero_context(&diff));
        }

        let mut conflicts = BTreeSet::new();
        for (index, entry) in resolution.range.iter().enumerate() {
            if !resolution.is_candidate(&entry.hash) {
                continue;
            }
            let mine = &patches[entry.hash.as_str()];
            for later in resolution.range[index + 1..]
                .iter()
                .filter(|e| !resolution.is_candidate(&e.hash))
            {
                for theirs in &patches[later.hash.as_str()] {
                    for patch in mine {
                        if let Some(path) = patch.conflicts_with_later(theirs) {
                            conflicts.insert(path.to_string());
                        }
                    }
                }
            }
        }

        Ok(conflicts.into_iter().collect())
    }
}

/// Net status of a path changed by two successive commits. `None` when the
/// path nets out (added then deleted).
fn merge_status(previous: FileStatus, next: FileStatus) -> Option<FileStatus> {
    use FileStatus::*;
    match (previous, next) {
        (Added, Deleted) => None,
        (Added, _) => Some(Added),
        (Deleted, Added) | (Deleted, Modified) => Some(Modified),
        (_, Deleted) => Some(Deleted),
        (previous, Modified) => Some(previous),
        (_, next) => Some(next),
    }
}

fn short_label(entry: &LogEntry) -> String {
    let short = entry.hash.get(..7).unwrap_or(&entry.hash);
    format!("{short} {}", entry.subject)
}

fn summarize(items: &[String]) -> String {
    const SHOWN: usize = 5;
    let mut text = items.iter().take(SHOWN).cloned().collect::<Vec<_>>().join(", ");
    if items.len() > SHOWN {
        text.push_str(&format!(" and {} more", items.len() - SHOWN));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RollbackEngine;
    use crate::models::CommitSource;
    use crate::test_support::TestRepo;

    async fn track(engine: &RollbackEngine, repo: &TestRepo, hash: &str, issue: u64, phase: u32) {
        let record = CommitRecord::new(hash, issue, format!("phase {phase}")).with_phase(phase);
        engine.record_commit(repo.path(), record).await.unwrap();
    }

    /// Issue #7 with phases 1 to 3, one commit each.
    async fn issue_seven(engine: &RollbackEngine, repo: &TestRepo) -> Vec<String> {
        let mut hashes = Vec::new();
        for (phase, (path, content)) in [("a.txt", "a\n"), ("b.txt", "b\n"), ("a.txt", "a\nmore\n")]
            .into_iter()
            .enumerate()
        {
            let phase = phase as u32 + 1;
            let hash = repo.commit_file(path, content, &format!("issue 7 phase {phase}")).await;
            track(engine, repo, &hash, 7, phase).await;
            hashes.push(hash);
        }
        hashes
    }

    #[test]
    fn test_merge_status() {
        assert_eq!(merge_status(FileStatus::Added, FileStatus::Deleted), None);
        assert_eq!(merge_status(FileStatus::Added, FileStatus::Modified), Some(FileStatus::Added));
        assert_eq!(merge_status(FileStatus::Deleted, FileStatus::Added), Some(FileStatus::Modified));
        assert_eq!(merge_status(FileStatus::Modified, FileStatus::Deleted), Some(FileStatus::Deleted));
        assert_eq!(merge_status(FileStatus::Renamed, FileStatus::Modified), Some(FileStatus::Renamed));
    }

    #[tokio::test]
    async fn test_clean_issue_preview() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        let hashes = issue_seven(&engine, &repo).await;

        let preview = engine
            .preview_rollback(RollbackScope::Issue, &RollbackTarget::issue(7), repo.path())
            .await
            .unwrap();

        let listed: Vec<_> = preview.commits.iter().map(|c| c.commit_hash.clone()).collect();
        assert_eq!(listed, hashes);
        assert_eq!(preview.commits[1].phase_number, Some(2));
        assert!(preview.warnings.is_empty(), "{:?}", preview.warnings);
        assert!(preview.can_rollback);
        assert!(preview.blocking_reasons.is_empty());
        assert_eq!(preview.reset_target.as_deref(), Some(repo.root_commit.as_str()));

        let paths: Vec<_> = preview.files_affected.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt"]);
        assert!(preview
            .files_affected
            .iter()
            .all(|f| f.status == FileStatus::Added && f.will_be == FileOutcome::Deleted));
        assert_eq!(preview.lines_changed, LinesChanged { added: 3, removed: 0 });
    }

    #[tokio::test]
    async fn test_phase_preview_only_lists_that_phase() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        let hashes = issue_seven(&engine, &repo).await;

        let preview = engine
            .preview_rollback(RollbackScope::Phase, &RollbackTarget::phase(7, 2), repo.path())
            .await
            .unwrap();

        assert_eq!(preview.commits.len(), 1);
        assert_eq!(preview.commits[0].commit_hash, hashes[1]);
        // Phase 3 sits on top of phase 2 and is not part of the scope.
        assert!(preview.has_warning(WarningKind::ExternalCommits));
        assert!(preview.can_rollback);
    }

    #[tokio::test]
    async fn test_dirty_tree_blocks_rollback() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        issue_seven(&engine, &repo).await;
        repo.write_file("a.txt", "uncommitted\n");

        let preview = engine
            .preview_rollback(RollbackScope::Issue, &RollbackTarget::issue(7), repo.path())
            .await
            .unwrap();

        assert!(preview.has_warning(WarningKind::DirtyWorkingTree));
        assert!(!preview.can_rollback);
        assert!(!preview.blocking_reasons.is_empty());
    }

    #[tokio::test]
    async fn test_external_commit_blocks_reset_only() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        let first = repo.commit_file("a.txt", "a\n", "phase 1").await;
        track(&engine, &repo, &first, 3, 1).await;
        let second = repo.commit_file("b.txt", "b\n", "phase 2").await;
        track(&engine, &repo, &second, 3, 2).await;
        repo.commit_file("manual.txt", "by hand\n", "manual fix").await;
        let target = RollbackTarget::issue(3);

        let revert = engine
            .preview_rollback(RollbackScope::Issue, &target, repo.path())
            .await
            .unwrap();
        let reset = engine
            .preview_rollback_with_method(RollbackScope::Issue, &target, RollbackMethod::Reset, repo.path())
            .await
            .unwrap();

        assert!(revert.has_warning(WarningKind::ExternalCommits));
        assert!(revert.can_rollback);
        assert!(reset.has_warning(WarningKind::ExternalCommits));
        assert!(!reset.can_rollback);
        assert_eq!(reset.blocking_reasons.len(), 1);
    }

    #[tokio::test]
    async fn test_later_edit_of_same_lines_is_a_conflict() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        repo.commit_file("a.txt", "one\ntwo\nthree\n", "base").await;
        let tracked = repo.commit_file("a.txt", "one\nTWO\nthree\n", "agent edit").await;
        track(&engine, &repo, &tracked, 9, 1).await;
        repo.commit_file("a.txt", "one\nTwo!\nthree\n", "manual edit").await;

        let preview = engine
            .preview_rollback(RollbackScope::Issue, &RollbackTarget::issue(9), repo.path())
            .await
            .unwrap();

        assert!(preview.has_warning(WarningKind::Conflicts));
        let file = &preview.files_affected[0];
        assert_eq!(file.path, "a.txt");
        assert_eq!(file.will_be, FileOutcome::Modified);
    }

    #[tokio::test]
    async fn test_re_added_file_is_a_conflict() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        repo.commit_file("x.txt", "original\n", "base").await;
        let tracked = repo.remove_file("x.txt", "agent removes x").await;
        track(&engine, &repo, &tracked, 9, 1).await;
        repo.commit_file("x.txt", "rewritten by hand\n", "manual re-add").await;

        let preview = engine
            .preview_rollback(RollbackScope::Issue, &RollbackTarget::issue(9), repo.path())
            .await
            .unwrap();

        assert!(preview.has_warning(WarningKind::ExternalCommits));
        assert!(preview.has_warning(WarningKind::Conflicts));
        let conflict = preview
            .warnings
            .iter()
            .find(|w| w.kind == WarningKind::Conflicts)
            .unwrap();
        assert!(conflict.message.contains("x.txt"));
    }

    #[tokio::test]
    async fn test_distant_edit_is_not_a_conflict() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        let lines: String = (1..=20).map(|n| format!("line {n}\n")).collect();
        repo.commit_file("a.txt", &lines, "base").await;
        let tracked = repo
            .commit_file("a.txt", &lines.replace("line 2\n", "line two\n"), "agent edit")
            .await;
        track(&engine, &repo, &tracked, 9, 1).await;
        let current = repo.read_file("a.txt").unwrap();
        repo.commit_file("a.txt", &current.replace("line 18\n", "line eighteen\n"), "manual edit")
            .await;

        let preview = engine
            .preview_rollback(RollbackScope::Issue, &RollbackTarget::issue(9), repo.path())
            .await
            .unwrap();

        assert!(preview.has_warning(WarningKind::ExternalCommits));
        assert!(!preview.has_warning(WarningKind::Conflicts));
    }

    #[tokio::test]
    async fn test_rewritten_ledger_entry_is_skipped() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        let kept = repo.commit_file("a.txt", "a\n", "phase 1").await;
        track(&engine, &repo, &kept, 5, 1).await;
        let dropped = repo.commit_file("b.txt", "b\n", "phase 2").await;
        track(&engine, &repo, &dropped, 5, 2).await;
        repo.git_cmd(&["reset", "--hard", &kept]).await;
        repo.git_cmd(&["reflog", "expire", "--expire=now", "--all"]).await;
        repo.git_cmd(&["gc", "--prune=now", "--quiet"]).await;

        let preview = engine
            .preview_rollback(RollbackScope::Issue, &RollbackTarget::issue(5), repo.path())
            .await
            .unwrap();

        assert_eq!(preview.commits.len(), 1);
        assert_eq!(preview.commits[0].commit_hash, kept);
        assert_eq!(preview.skipped_commits, vec![dropped]);
    }

    #[tokio::test]
    async fn test_off_branch_entry_is_skipped() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        repo.git_cmd(&["checkout", "-q", "-b", "side"]).await;
        let side = repo.commit_file("side.txt", "s\n", "side work").await;
        track(&engine, &repo, &side, 6, 1).await;
        repo.git_cmd(&["checkout", "-q", "-"]).await;

        let err = engine
            .preview_rollback(RollbackScope::Issue, &RollbackTarget::issue(6), repo.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_untracked_issue_is_not_found() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());

        let err = engine
            .preview_rollback(RollbackScope::Issue, &RollbackTarget::issue(42), repo.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_target_fails_before_git() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = RollbackEngine::new(RewindConfig::default());

        let err = engine
            .preview_rollback(RollbackScope::Phase, &RollbackTarget::issue(1), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = engine
            .preview_rollback(RollbackScope::Issue, &RollbackTarget::issue(1), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotARepository(_)));
    }

    #[tokio::test]
    async fn test_preview_is_repeatable_and_read_only() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        issue_seven(&engine, &repo).await;
        let refs_before = repo.git_cmd(&["for-each-ref"]).await;
        let head_before = repo.head().await;
        let status_before = repo.git_cmd(&["status", "--porcelain"]).await;

        let target = RollbackTarget::issue(7);
        let first = engine
            .preview_rollback(RollbackScope::Issue, &target, repo.path())
            .await
            .unwrap();
        let second = engine
            .preview_rollback(RollbackScope::Issue, &target, repo.path())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(repo.git_cmd(&["for-each-ref"]).await, refs_before);
        assert_eq!(repo.head().await, head_before);
        assert_eq!(repo.git_cmd(&["status", "--porcelain"]).await, status_before);
    }

    #[tokio::test]
    async fn test_checkpoint_scope_never_reports_external_commits() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        let checkpoint = engine.create_checkpoint("start", None, repo.path(), None).await.unwrap();
        let tracked = repo.commit_file("a.txt", "a\n", "agent").await;
        track(&engine, &repo, &tracked, 2, 1).await;
        repo.commit_file("b.txt", "b\n", "manual").await;

        let preview = engine
            .preview_rollback_with_method(
                RollbackScope::Checkpoint,
                &RollbackTarget::checkpoint(&checkpoint.id),
                RollbackMethod::Reset,
                repo.path(),
            )
            .await
            .unwrap();

        assert_eq!(preview.commits.len(), 2);
        assert_eq!(preview.commits[0].phase_number, Some(1));
        assert!(!preview.has_warning(WarningKind::ExternalCommits));
        assert!(preview.can_rollback);
        assert_eq!(preview.reset_target.as_deref(), Some(checkpoint.commit_hash.as_str()));
    }

    #[tokio::test]
    async fn test_checkpoint_off_history_is_invalid() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        repo.git_cmd(&["checkout", "-q", "-b", "side"]).await;
        repo.commit_file("side.txt", "s\n", "side work").await;
        let checkpoint = engine.create_checkpoint("side", None, repo.path(), None).await.unwrap();
        repo.git_cmd(&["checkout", "-q", "-"]).await;

        let err = engine
            .preview_rollback(
                RollbackScope::Checkpoint,
                &RollbackTarget::checkpoint(&checkpoint.id),
                repo.path(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_pushed_commits_are_flagged() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        let hash = repo.commit_file("a.txt", "a\n", "agent").await;
        engine
            .record_commit(
                repo.path(),
                CommitRecord::new(&hash, 4, "agent").with_source(CommitSource::SelfOriginated),
            )
            .await
            .unwrap();
        // A remote-tracking ref is all the check looks at.
        repo.git_cmd(&["update-ref", "refs/remotes/origin/main", &hash]).await;

        let preview = engine
            .preview_rollback(RollbackScope::Issue, &RollbackTarget::issue(4), repo.path())
            .await
            .unwrap();

        let warning = preview
            .warnings
            .iter()
            .find(|w| w.kind == WarningKind::Pushed)
            .unwrap();
        assert!(warning.message.contains("origin/main"));
        assert_eq!(warning.severity, Severity::High);
        assert!(preview.can_rollback);
    }

    #[tokio::test]
    async fn test_preview_file_shows_restored_content() {
        let repo = TestRepo::new().await;
        let engine = RollbackEngine::new(RewindConfig::default());
        repo.commit_file("a.txt", "old\n", "base").await;
        let hash = repo.commit_file("a.txt", "new\n", "agent").await;
        track(&engine, &repo, &hash, 8, 1).await;

        let diff = engine
            .preview_file(RollbackScope::Issue, &RollbackTarget::issue(8), "a.txt", repo.path())
            .await
            .unwrap();

        assert_eq!(diff.old_content.as_deref(), Some("new\n"));
        assert_eq!(diff.new_content.as_deref(), Some("old\n"));
        assert!(diff.has_changes());
    }
}
