use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitSource {
    SelfOriginated,
    External,
    Unknown,
}

impl CommitSource {
    pub fn as_str(&self) -> &str {
        match self {
            CommitSource::SelfOriginated => "self_originated",
            CommitSource::External => "external",
            CommitSource::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "self_originated" | "self" => Some(CommitSource::SelfOriginated),
            "external" => Some(CommitSource::External),
            "unknown" => Some(CommitSource::Unknown),
            _ => None,
        }
    }
}

/// Set on a ledger entry once a successful rollback has undone its commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supersession {
    pub at: DateTime<Utc>,
    pub backup_branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub commit_hash: String,
    pub issue_number: u64,
    pub phase_number: Option<u32>,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub source: CommitSource,
    pub parent_hashes: Vec<String>,
    pub is_merge_commit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded: Option<Supersession>,
}

impl CommitRecord {
    pub fn new(commit_hash: impl Into<String>, issue_number: u64, message: impl Into<String>) -> Self {
        Self {
            commit_hash: commit_hash.into(),
            issue_number,
            phase_number: None,
            timestamp: Utc::now(),
            message: message.into(),
            source: CommitSource::SelfOriginated,
            parent_hashes: Vec::new(),
            is_merge_commit: false,
            superseded: None,
        }
    }

    pub fn with_phase(mut self, phase_number: u32) -> Self {
        self.phase_number = Some(phase_number);
        self
    }

    pub fn with_source(mut self, source: CommitSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_parents(mut self, parent_hashes: Vec<String>) -> Self {
        self.is_merge_commit = parent_hashes.len() > 1;
        self.parent_hashes = parent_hashes;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_active(&self) -> bool {
        self.superseded.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackScope {
    Phase,
    Issue,
    Checkpoint,
}

impl RollbackScope {
    pub fn as_str(&self) -> &str {
        match self {
            RollbackScope::Phase => "phase",
            RollbackScope::Issue => "issue",
            RollbackScope::Checkpoint => "checkpoint",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "phase" => Some(RollbackScope::Phase),
            "issue" => Some(RollbackScope::Issue),
            "checkpoint" => Some(RollbackScope::Checkpoint),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
}

impl RollbackTarget {
    pub fn issue(issue_number: u64) -> Self {
        Self {
            issue_number: Some(issue_number),
            ..Default::default()
        }
    }

    pub fn phase(issue_number: u64, phase_number: u32) -> Self {
        Self {
            issue_number: Some(issue_number),
            phase_number: Some(phase_number),
            checkpoint_id: None,
        }
    }

    pub fn checkpoint(checkpoint_id: impl Into<String>) -> Self {
        Self {
            checkpoint_id: Some(checkpoint_id.into()),
            ..Default::default()
        }
    }

    /// Exactly the fields the scope needs must be set, nothing else.
    pub fn validate(&self, scope: RollbackScope) -> Result<()> {
        let invalid = |msg: &str| Err(Error::Validation(format!("{} scope: {}", scope.as_str(), msg)));

        match scope {
            RollbackScope::Issue => {
                match self.issue_number {
                    None => return invalid("issue_number is required"),
                    Some(0) => return invalid("issue_number must be positive"),
                    Some(_) => {}
                }
                if self.phase_number.is_some() {
                    return invalid("phase_number is not allowed");
                }
                if self.checkpoint_id.is_some() {
                    return invalid("checkpoint_id is not allowed");
                }
            }
            RollbackScope::Phase => {
                match self.issue_number {
                    None => return invalid("issue_number is required"),
                    Some(0) => return invalid("issue_number must be positive"),
                    Some(_) => {}
                }
                if self.phase_number.is_none() {
                    return invalid("phase_number is required");
                }
                if self.checkpoint_id.is_some() {
                    return invalid("checkpoint_id is not allowed");
                }
            }
            RollbackScope::Checkpoint => {
                match self.checkpoint_id.as_deref().map(str::trim) {
                    None | Some("") => return invalid("checkpoint_id is required"),
                    Some(_) => {}
                }
                if self.issue_number.is_some() || self.phase_number.is_some() {
                    return invalid("issue_number and phase_number are not allowed");
                }
            }
        }

        Ok(())
    }

    /// Short human label, e.g. "issue #7 phase 2".
    pub fn describe(&self, scope: RollbackScope) -> String {
        match scope {
            RollbackScope::Issue => format!("issue #{}", self.issue_number.unwrap_or_default()),
            RollbackScope::Phase => format!(
                "issue #{} phase {}",
                self.issue_number.unwrap_or_default(),
                self.phase_number.unwrap_or_default()
            ),
            RollbackScope::Checkpoint => {
                format!("checkpoint {}", self.checkpoint_id.as_deref().unwrap_or_default())
            }
        }
    }

    /// Ref-safe slug used in backup branch names.
    pub fn slug(&self, scope: RollbackScope) -> String {
        match scope {
            RollbackScope::Issue => format!("issue-{}", self.issue_number.unwrap_or_default()),
            RollbackScope::Phase => format!(
                "issue-{}-phase-{}",
                self.issue_number.unwrap_or_default(),
                self.phase_number.unwrap_or_default()
            ),
            RollbackScope::Checkpoint => {
                let id: String = self
                    .checkpoint_id
                    .as_deref()
                    .unwrap_or_default()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
                    .take(8)
                    .collect();
                format!("checkpoint-{}", id)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Modified,
    Added,
    Deleted,
    Renamed,
}

impl FileStatus {
    /// Maps a `git diff --name-status` letter.
    pub fn from_git_letter(letter: char) -> Option<Self> {
        match letter {
            'M' | 'T' => Some(FileStatus::Modified),
            'A' | 'C' => Some(FileStatus::Added),
            'D' => Some(FileStatus::Deleted),
            'R' => Some(FileStatus::Renamed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    Restored,
    Deleted,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub status: FileStatus,
    pub will_be: FileOutcome,
    pub preview_available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    Pushed,
    Conflicts,
    ExternalCommits,
    MergeCommit,
    DirtyWorkingTree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackWarning {
    #[serde(rename = "type")]
    pub kind: WarningKind,
    pub message: String,
    pub severity: Severity,
}

impl RollbackWarning {
    pub fn new(kind: WarningKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackMethod {
    #[default]
    Revert,
    Reset,
}

impl RollbackMethod {
    pub fn as_str(&self) -> &str {
        match self {
            RollbackMethod::Revert => "revert",
            RollbackMethod::Reset => "reset",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "revert" => Some(RollbackMethod::Revert),
            "reset" => Some(RollbackMethod::Reset),
            _ => None,
        }
    }
}

/// One commit inside a preview, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewCommit {
    pub commit_hash: String,
    pub message: String,
    pub phase_number: Option<u32>,
    pub parent_hashes: Vec<String>,
    pub is_merge_commit: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinesChanged {
    pub added: u64,
    pub removed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackPreview {
    pub scope: RollbackScope,
    pub target: RollbackTarget,
    pub method: RollbackMethod,
    pub head: String,
    pub commits: Vec<PreviewCommit>,
    pub files_affected: Vec<FileChange>,
    pub lines_changed: LinesChanged,
    pub warnings: Vec<RollbackWarning>,
    pub can_rollback: bool,
    pub blocking_reasons: Vec<String>,
    pub skipped_commits: Vec<String>,
    pub reset_target: Option<String>,
}

impl RollbackPreview {
    pub fn has_warning(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }

    /// SHA-256 over the canonical JSON form. Two previews of an unchanged
    /// repository share a fingerprint.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackOptions {
    #[serde(default)]
    pub method: RollbackMethod,
    #[serde(default)]
    pub update_issue_status: bool,
    #[serde(default)]
    pub push_after: bool,
    /// Fingerprint of the preview the caller approved.
    #[serde(default)]
    pub expected_fingerprint: Option<String>,
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
}

impl RollbackOptions {
    pub fn new(method: RollbackMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn with_push_after(mut self) -> Self {
        self.push_after = true;
        self
    }

    pub fn with_issue_status_update(mut self) -> Self {
        self.update_issue_status = true;
        self
    }

    pub fn with_expected_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.expected_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackResult {
    pub success: bool,
    pub revert_commits: Vec<String>,
    pub backup_branch: Option<String>,
    pub error: Option<String>,
    pub head: Option<String>,
    pub push_skipped: bool,
}

impl RollbackResult {
    pub fn failed(error: impl Into<String>, backup_branch: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            backup_branch: Some(backup_branch.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub name: String,
    pub commit_hash: String,
    pub issue_number: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
}

impl Checkpoint {
    pub fn new(name: impl Into<String>, commit_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            commit_hash: commit_hash.into(),
            issue_number: None,
            created_at: Utc::now(),
            description: None,
        }
    }

    pub fn with_issue(mut self, issue_number: Option<u64>) -> Self {
        self.issue_number = issue_number;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Preparing,
    Reverting,
    Resetting,
    Completing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackProgress {
    pub stage: ProgressStage,
    pub current: usize,
    pub total: usize,
    pub message: String,
}

impl RollbackProgress {
    pub fn new(stage: ProgressStage, current: usize, total: usize, message: impl Into<String>) -> Self {
        Self {
            stage,
            current,
            total,
            message: message.into(),
        }
    }
}
