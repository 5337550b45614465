//! Per-project JSON documents under the metadata directory.
//!
//! Each document is loaded lazily and cached. Writes for one project go
//! through a single writer: the writer re-reads the file, applies the
//! mutation, persists atomically and drops the cache.

use crate::error::{Error, Result};
use crate::paths::project_key;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

pub trait Document:
    Default + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const FILE_NAME: &'static str;
    const VERSION: u32;

    fn version(&self) -> u32;
}

struct ProjectDocument<D> {
    path: PathBuf,
    cache: RwLock<Option<Arc<D>>>,
    writer: Mutex<()>,
}

pub struct DocumentStore<D: Document> {
    metadata_dir: String,
    projects: DashMap<PathBuf, Arc<ProjectDocument<D>>>,
}

impl<D: Document> DocumentStore<D> {
    pub fn new(metadata_dir: impl Into<String>) -> Self {
        Self {
            metadata_dir: metadata_dir.into(),
            projects: DashMap::new(),
        }
    }

    fn project(&self, cwd: &Path) -> Arc<ProjectDocument<D>> {
        let key = project_key(cwd);
        let entry = self.projects.entry(key.clone()).or_insert_with(|| {
            Arc::new(ProjectDocument {
                path: key.join(&self.metadata_dir).join(D::FILE_NAME),
                cache: RwLock::new(None),
                writer: Mutex::new(()),
            })
        });
        Arc::clone(entry.value())
    }

    pub fn path_for(&self, cwd: &Path) -> PathBuf {
        self.project(cwd).path.clone()
    }

    pub async fn read(&self, cwd: &Path) -> Result<Arc<D>> {
        let project = self.project(cwd);

        if let Some(doc) = project.cache.read().await.as_ref() {
            return Ok(Arc::clone(doc));
        }

        let mut cache = project.cache.write().await;
        if let Some(doc) = cache.as_ref() {
            return Ok(Arc::clone(doc));
        }
        let doc = Arc::new(load::<D>(&project.path).await?);
        *cache = Some(Arc::clone(&doc));
        Ok(doc)
    }

    /// Applies `mutate` to a fresh copy of the document and persists it if it
    /// changed.
    pub async fn update<T, F>(&self, cwd: &Path, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut D) -> Result<T>,
    {
        let project = self.project(cwd);
        let _writer = project.writer.lock().await;

        let before = load::<D>(&project.path).await?;
        let mut doc = before.clone();
        let outcome = mutate(&mut doc)?;

        if doc != before {
            persist(&project.path, &doc).await?;
            *project.cache.write().await = None;
            debug!("wrote {}", project.path.display());
        }

        Ok(outcome)
    }
}

async fn load<D: Document>(path: &Path) -> Result<D> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(D::default()),
        Err(e) => return Err(e.into()),
    };

    let doc: D = serde_json::from_str(&raw)?;
    if doc.version() > D::VERSION {
        return Err(Error::Validation(format!(
            "{} has version {}, newer than supported version {}",
            path.display(),
            doc.version(),
            D::VERSION
        )));
    }
    Ok(doc)
}

async fn persist<D: Document>(path: &Path, doc: &D) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
        // Keep the metadata directory out of `git status` and `git add -A`.
        let ignore = dir.join(".gitignore");
        if tokio::fs::metadata(&ignore).await.is_err() {
            tokio::fs::write(&ignore, "*\n").await?;
        }
    }

    let mut json = serde_json::to_string_pretty(doc)?;
    json.push('\n');

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
