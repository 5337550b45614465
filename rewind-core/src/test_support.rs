//! Scratch git repositories for tests.

use crate::git::{Git, ProcessGit};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;

pub struct TestRepo {
    dir: TempDir,
    pub root_commit: String,
}

impl TestRepo {
    /// Initialises a repository with one root commit containing `README.md`.
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut repo = Self {
            dir,
            root_commit: String::new(),
        };

        repo.git_cmd(&["init", "-q"]).await;
        repo.git_cmd(&["config", "user.email", "test@test.com"]).await;
        repo.git_cmd(&["config", "user.name", "Test"]).await;
        repo.git_cmd(&["config", "commit.gpgsign", "false"]).await;
        repo.root_commit = repo.commit_file("README.md", "# project\n", "initial").await;
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git(&self) -> Git {
        Git::new(Arc::new(ProcessGit), self.path(), Duration::from_secs(30))
    }

    pub async fn git_cmd(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .await
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    pub fn write_file(&self, path: &str, content: &str) {
        let full_path = self.path().join(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full_path, content).unwrap();
    }

    pub fn read_file(&self, path: &str) -> Option<String> {
        std::fs::read_to_string(self.path().join(path)).ok()
    }

    /// Writes `content` to `path`, commits it and returns the new hash.
    pub async fn commit_file(&self, path: &str, content: &str, message: &str) -> String {
        self.write_file(path, content);
        self.git_cmd(&["add", "-A"]).await;
        self.git_cmd(&["commit", "-q", "-m", message]).await;
        self.head().await
    }

    pub async fn remove_file(&self, path: &str, message: &str) -> String {
        self.git_cmd(&["rm", "-q", path]).await;
        self.git_cmd(&["commit", "-q", "-m", message]).await;
        self.head().await
    }

    pub async fn head(&self) -> String {
        self.git_cmd(&["rev-parse", "HEAD"]).await
    }
}
