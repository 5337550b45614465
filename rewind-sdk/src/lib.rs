//! # rewind-sdk
//!
//! Blocking client for agents and orchestrators talking to a running
//! `rewind serve`.
//!
//! ## Example
//!
//! ```no_run
//! use rewind_sdk::RewindClient;
//! use rewind_core::{RollbackMethod, RollbackOptions, RollbackScope, RollbackTarget};
//!
//! let client = RewindClient::new("http://localhost:3030", "/path/to/project");
//!
//! // After each commit the agent makes
//! client.record_head(7, Some(1)).unwrap();
//!
//! // Later, undo phase 1 of issue 7
//! let target = RollbackTarget::phase(7, 1);
//! let preview = client.preview(RollbackScope::Phase, &target, RollbackMethod::Revert).unwrap();
//! if preview.preview.can_rollback {
//!     let options = RollbackOptions::default().with_expected_fingerprint(preview.fingerprint);
//!     client.execute(RollbackScope::Phase, &target, options).unwrap();
//! }
//! ```

use anyhow::Result;
use rewind_core::diff::FileDiff;
use rewind_core::{
    Checkpoint, CommitRecord, CommitSource, RollbackMethod, RollbackOptions, RollbackPreview,
    RollbackResult, RollbackScope, RollbackTarget,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Error body returned by the server for any non-2xx response.
#[derive(Debug, Clone, thiserror::Error, Deserialize)]
#[error("{error}: {message}")]
pub struct ApiError {
    #[serde(skip)]
    pub status: u16,
    pub error: String,
    pub message: String,
    #[serde(default)]
    pub blocking_reasons: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewResponse {
    #[serde(flatten)]
    pub preview: RollbackPreview,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordResponse {
    pub recorded: bool,
    pub commit: CommitRecord,
}

#[derive(Serialize)]
struct RecordCommitRequest<'a> {
    cwd: &'a Path,
    commit_hash: Option<&'a str>,
    issue_number: u64,
    phase_number: Option<u32>,
    message: Option<&'a str>,
    source: CommitSource,
}

#[derive(Serialize)]
struct ScopedRequest<'a, T: Serialize> {
    cwd: &'a Path,
    scope: RollbackScope,
    target: &'a RollbackTarget,
    #[serde(flatten)]
    extra: T,
}

#[derive(Serialize)]
struct CreateCheckpointRequest<'a> {
    cwd: &'a Path,
    name: &'a str,
    issue_number: Option<u64>,
    description: Option<&'a str>,
}

/// Client bound to one server and one project directory.
#[derive(Clone)]
pub struct RewindClient {
    base_url: String,
    cwd: PathBuf,
    client: reqwest::blocking::Client,
}

impl RewindClient {
    /// * `base_url` - server address, e.g. "http://localhost:3030"
    /// * `cwd` - project directory as seen by the server
    pub fn new(base_url: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cwd: cwd.into(),
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn cwd_query(&self) -> [(&'static str, String); 1] {
        [("cwd", self.cwd.to_string_lossy().into_owned())]
    }

    /// Turns error responses into [`ApiError`] so callers can downcast.
    fn decode<T: serde::de::DeserializeOwned>(response: reqwest::blocking::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json()?);
        }
        let body = response.text()?;
        let mut err: ApiError = serde_json::from_str(&body).unwrap_or_else(|_| ApiError {
            status: 0,
            error: "http".to_string(),
            message: body,
            blocking_reasons: Vec::new(),
        });
        err.status = status.as_u16();
        Err(err.into())
    }

    pub fn health_check(&self) -> Result<bool> {
        let response = self.client.get(self.url("/health")).send()?;
        Ok(response.status().is_success())
    }

    /// Records the project's current `HEAD`.
    pub fn record_head(&self, issue_number: u64, phase_number: Option<u32>) -> Result<CommitRecord> {
        let request = RecordCommitRequest {
            cwd: &self.cwd,
            commit_hash: None,
            issue_number,
            phase_number,
            message: None,
            source: CommitSource::SelfOriginated,
        };
        let response: RecordResponse = Self::decode(self.client.post(self.url("/commits")).json(&request).send()?)?;
        Ok(response.commit)
    }

    /// Records a specific commit. Returns whether it was new to the ledger.
    pub fn record_commit(
        &self,
        commit_hash: &str,
        issue_number: u64,
        phase_number: Option<u32>,
        message: &str,
        source: CommitSource,
    ) -> Result<bool> {
        let request = RecordCommitRequest {
            cwd: &self.cwd,
            commit_hash: Some(commit_hash),
            issue_number,
            phase_number,
            message: Some(message),
            source,
        };
        let response: RecordResponse = Self::decode(self.client.post(self.url("/commits")).json(&request).send()?)?;
        Ok(response.recorded)
    }

    pub fn get_commits(&self, issue_number: u64, phase_number: Option<u32>) -> Result<Vec<CommitRecord>> {
        let mut query = vec![
            ("cwd", self.cwd.to_string_lossy().into_owned()),
            ("issue", issue_number.to_string()),
        ];
        if let Some(phase) = phase_number {
            query.push(("phase", phase.to_string()));
        }
        Self::decode(self.client.get(self.url("/commits")).query(&query).send()?)
    }

    pub fn preview(
        &self,
        scope: RollbackScope,
        target: &RollbackTarget,
        method: RollbackMethod,
    ) -> Result<PreviewResponse> {
        let request = ScopedRequest {
            cwd: &self.cwd,
            scope,
            target,
            extra: serde_json::json!({ "method": method }),
        };
        Self::decode(
            self.client
                .post(self.url("/rollback/preview"))
                .json(&request)
                .send()?,
        )
    }

    pub fn preview_file(&self, scope: RollbackScope, target: &RollbackTarget, path: &str) -> Result<FileDiff> {
        let request = ScopedRequest {
            cwd: &self.cwd,
            scope,
            target,
            extra: serde_json::json!({ "path": path }),
        };
        Self::decode(
            self.client
                .post(self.url("/rollback/preview/file"))
                .json(&request)
                .send()?,
        )
    }

    pub fn execute(
        &self,
        scope: RollbackScope,
        target: &RollbackTarget,
        options: RollbackOptions,
    ) -> Result<RollbackResult> {
        let request = ScopedRequest {
            cwd: &self.cwd,
            scope,
            target,
            extra: serde_json::json!({ "options": options }),
        };
        Self::decode(
            self.client
                .post(self.url("/rollback/execute"))
                .json(&request)
                .send()?,
        )
    }

    pub fn create_checkpoint(
        &self,
        name: &str,
        issue_number: Option<u64>,
        description: Option<&str>,
    ) -> Result<Checkpoint> {
        let request = CreateCheckpointRequest {
            cwd: &self.cwd,
            name,
            issue_number,
            description,
        };
        Self::decode(self.client.post(self.url("/checkpoints")).json(&request).send()?)
    }

    pub fn list_checkpoints(&self) -> Result<Vec<Checkpoint>> {
        Self::decode(
            self.client
                .get(self.url("/checkpoints"))
                .query(&self.cwd_query())
                .send()?,
        )
    }

    pub fn get_checkpoint(&self, id: &str) -> Result<Checkpoint> {
        Self::decode(
            self.client
                .get(self.url(&format!("/checkpoints/{}", id)))
                .query(&self.cwd_query())
                .send()?,
        )
    }

    pub fn delete_checkpoint(&self, id: &str) -> Result<Checkpoint> {
        Self::decode(
            self.client
                .delete(self.url(&format!("/checkpoints/{}", id)))
                .query(&self.cwd_query())
                .send()?,
        )
    }

    pub fn rollback_to_checkpoint(&self, id: &str, options: RollbackOptions) -> Result<RollbackResult> {
        let body = serde_json::json!({ "cwd": self.cwd, "options": options });
        Self::decode(
            self.client
                .post(self.url(&format!("/checkpoints/{}/rollback", id)))
                .json(&body)
                .send()?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_core::{RewindConfig, RollbackEngine};
    use rewind_server::{create_router, AppState};
    use std::process::Command;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git").args(args).current_dir(dir).output().unwrap();
        assert!(output.status.success(), "git {:?} failed", args);
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn commit(dir: &Path, file: &str, content: &str, message: &str) -> String {
        std::fs::write(dir.join(file), content).unwrap();
        git(dir, &["add", "-A"]);
        git(dir, &["commit", "-q", "-m", message]);
        git(dir, &["rev-parse", "HEAD"])
    }

    fn repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "-q"]);
        git(dir.path(), &["config", "user.email", "test@test.com"]);
        git(dir.path(), &["config", "user.name", "Test"]);
        git(dir.path(), &["config", "commit.gpgsign", "false"]);
        commit(dir.path(), "README.md", "# project\n", "initial");
        dir
    }

    /// Runs the router on an ephemeral port in a background runtime.
    fn spawn_server() -> String {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                tx.send(listener.local_addr().unwrap()).unwrap();
                let engine = Arc::new(RollbackEngine::new(RewindConfig::default()));
                axum::serve(listener, create_router(AppState { engine }))
                    .await
                    .unwrap();
            });
        });
        format!("http://{}", rx.recv().unwrap())
    }

    #[test]
    fn test_client_creation() {
        let client = RewindClient::new("http://localhost:3030/", "/tmp/project");
        assert_eq!(client.base_url, "http://localhost:3030");
        assert_eq!(client.url("/health"), "http://localhost:3030/health");
        assert_eq!(client.cwd(), Path::new("/tmp/project"));
    }

    #[test]
    fn test_record_preview_and_execute() {
        let dir = repo();
        let client = RewindClient::new(spawn_server(), dir.path());
        assert!(client.health_check().unwrap());

        let hash = commit(dir.path(), "feature.txt", "feature\n", "add feature");
        let record = client.record_head(7, Some(1)).unwrap();
        assert_eq!(record.commit_hash, hash);
        assert!(!client
            .record_commit(&hash, 7, Some(1), "add feature", CommitSource::SelfOriginated)
            .unwrap());
        assert_eq!(client.get_commits(7, Some(1)).unwrap().len(), 1);

        let target = RollbackTarget::phase(7, 1);
        let preview = client
            .preview(RollbackScope::Phase, &target, RollbackMethod::Revert)
            .unwrap();
        assert!(preview.preview.can_rollback);
        assert_eq!(preview.preview.commits.len(), 1);

        let diff = client
            .preview_file(RollbackScope::Phase, &target, "feature.txt")
            .unwrap();
        assert_eq!(diff.old_content.as_deref(), Some("feature\n"));
        assert!(diff.new_content.is_none());

        let options = RollbackOptions::default().with_expected_fingerprint(preview.fingerprint);
        let result = client.execute(RollbackScope::Phase, &target, options).unwrap();
        assert!(result.success);
        assert_eq!(result.revert_commits.len(), 1);
        assert!(!dir.path().join("feature.txt").exists());
    }

    #[test]
    fn test_errors_carry_kind_and_status() {
        let dir = repo();
        let client = RewindClient::new(spawn_server(), dir.path());

        let err = client.get_checkpoint("missing").unwrap_err();
        let api = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api.status, 404);
        assert_eq!(api.error, "not_found");

        let err = client
            .preview(RollbackScope::Issue, &RollbackTarget::default(), RollbackMethod::Revert)
            .unwrap_err();
        assert_eq!(err.downcast_ref::<ApiError>().unwrap().status, 400);
    }

    #[test]
    fn test_checkpoint_lifecycle() {
        let dir = repo();
        let client = RewindClient::new(spawn_server(), dir.path());

        let checkpoint = client
            .create_checkpoint("before refactor", Some(3), Some("clean state"))
            .unwrap();
        commit(dir.path(), "refactor.txt", "x\n", "refactor");

        assert_eq!(client.list_checkpoints().unwrap().len(), 1);
        assert_eq!(client.get_checkpoint(&checkpoint.id).unwrap().name, "before refactor");

        let result = client
            .rollback_to_checkpoint(&checkpoint.id, RollbackOptions::new(RollbackMethod::Reset))
            .unwrap();
        assert!(result.success);
        assert!(!dir.path().join("refactor.txt").exists());

        client.delete_checkpoint(&checkpoint.id).unwrap();
        assert!(client.list_checkpoints().unwrap().is_empty());
    }
}
