use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_METADATA_DIR: &str = ".rewind";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewindConfig {
    /// Directory, relative to the project root, holding the ledger and checkpoints.
    pub metadata_dir: String,
    /// Upper bound for a single git invocation.
    pub git_timeout_secs: u64,
    pub backup_prefix: String,
    pub checkpoint_ref_prefix: String,
    /// Remote used by `push_after`; `None` pushes to the branch's upstream.
    pub push_remote: Option<String>,
    pub progress_capacity: usize,
    /// Shell command run after a rollback when an issue status update is requested.
    pub status_hook_command: Option<String>,
}

impl Default for RewindConfig {
    fn default() -> Self {
        Self {
            metadata_dir: DEFAULT_METADATA_DIR.to_string(),
            git_timeout_secs: 30,
            backup_prefix: "rewind-backup".to_string(),
            checkpoint_ref_prefix: "refs/rewind/checkpoints".to_string(),
            push_remote: None,
            progress_capacity: 64,
            status_hook_command: None,
        }
    }
}

impl RewindConfig {
    /// Reads `<project>/.rewind/config.toml`, falling back to defaults when absent.
    pub fn load(project: &Path) -> Result<Self> {
        let path = project.join(DEFAULT_METADATA_DIR).join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&raw)?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn with_git_timeout(mut self, secs: u64) -> Self {
        self.git_timeout_secs = secs;
        self
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs.max(1))
    }

    pub fn metadata_path(&self, project: &Path) -> PathBuf {
        project.join(&self.metadata_dir)
    }

    pub fn checkpoint_ref(&self, id: &str) -> String {
        format!("{}/{}", self.checkpoint_ref_prefix.trim_end_matches('/'), id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RewindConfig::load(dir.path()).unwrap();

        assert_eq!(config, RewindConfig::default());
        assert_eq!(config.git_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_config_overrides() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(DEFAULT_METADATA_DIR)).unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_METADATA_DIR).join(CONFIG_FILE),
            "git_timeout_secs = 5\npush_remote = \"origin\"\n",
        )
        .unwrap();

        let config = RewindConfig::load(dir.path()).unwrap();

        assert_eq!(config.git_timeout_secs, 5);
        assert_eq!(config.push_remote.as_deref(), Some("origin"));
        assert_eq!(config.backup_prefix, "rewind-backup");
    }

    #[test]
    fn test_checkpoint_ref() {
        let config = RewindConfig::default();
        assert_eq!(config.checkpoint_ref("abc"), "refs/rewind/checkpoints/abc");
    }
}
