use crate::error::{Error, Result};
use crate::paths::project_key;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

#[derive(Default)]
struct ProjectLock {
    execute: Arc<Mutex<()>>,
    tree: Arc<RwLock<()>>,
}

/// Held for the whole of an execute: no second execute, no preview.
pub struct ExecuteGuard {
    _execute: OwnedMutexGuard<()>,
    _tree: OwnedRwLockWriteGuard<()>,
}

/// Lock map keyed by project path, so several projects can roll back at once.
#[derive(Default)]
pub struct ProjectLocks {
    locks: DashMap<PathBuf, Arc<ProjectLock>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn project(&self, cwd: &Path) -> Arc<ProjectLock> {
        let entry = self.locks.entry(project_key(cwd)).or_default();
        Arc::clone(entry.value())
    }

    /// Claims the execute slot without waiting, then waits for in-flight
    /// previews to drain.
    pub async fn acquire_execute(&self, cwd: &Path) -> Result<ExecuteGuard> {
        let project = self.project(cwd);
        let execute = Arc::clone(&project.execute)
            .try_lock_owned()
            .map_err(|_| Error::Busy(cwd.to_path_buf()))?;
        let tree = Arc::clone(&project.tree).write_owned().await;

        Ok(ExecuteGuard {
            _execute: execute,
            _tree: tree,
        })
    }

    /// Shared access for read-only analysis; waits while an execute runs.
    pub async fn read_tree(&self, cwd: &Path) -> OwnedRwLockReadGuard<()> {
        let project = self.project(cwd);
        Arc::clone(&project.tree).read_owned().await
    }

    pub fn is_busy(&self, cwd: &Path) -> bool {
        self.project(cwd).execute.try_lock().is_err()
    }
}
