// Build Cache
// Persists configured directories once the build outcome is known

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("cache task failed: {0}")]
    Task(String),
}

/// What a persist call saved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSummary {
    pub saved: Vec<PathBuf>,
    /// Configured sources that did not exist
    pub skipped: Vec<PathBuf>,
    pub files: u64,
}

#[async_trait::async_trait]
pub trait CachePersister: Send + Sync {
    async fn persist(&self, build_id: &str) -> Result<CacheSummary, CacheError>;
}

/// Persister for builds with nothing to cache
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait::async_trait]
impl CachePersister for NoopCache {
    async fn persist(&self, _build_id: &str) -> Result<CacheSummary, CacheError> {
        Ok(CacheSummary::default())
    }
}

/// Copies source directories into `<storage>/cache/<build_id>/`
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    storage_root: PathBuf,
    sources: Vec<PathBuf>,
}

impl DirectoryCache {
    pub fn new(storage_root: impl Into<PathBuf>, sources: Vec<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            sources,
        }
    }

    pub fn destination(&self, build_id: &str) -> PathBuf {
        self.storage_root.join("cache").join(build_id)
    }

    fn persist_blocking(&self, build_id: &str) -> Result<CacheSummary, CacheError> {
        let destination = self.destination(build_id);
        std::fs::create_dir_all(&destination)?;

        let mut summary = CacheSummary::default();
        for (i, source) in self.sources.iter().enumerate() {
            if !source.exists() {
                debug!(source = %source.display(), "cache source missing, skipping");
                summary.skipped.push(source.clone());
                continue;
            }
            let name = source
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| format!("cache-{}", i).into());
            let target = destination.join(name);
            summary.files += copy_recursive(source, &target)?;
            summary.saved.push(target);
        }

        info!(
            build_id,
            saved = summary.saved.len(),
            files = summary.files,
            "cache written to {}",
            destination.display()
        );
        Ok(summary)
    }
}

#[async_trait::async_trait]
impl CachePersister for DirectoryCache {
    async fn persist(&self, build_id: &str) -> Result<CacheSummary, CacheError> {
        let cache = self.clone();
        let build_id = build_id.to_string();
        tokio::task::spawn_blocking(move || cache.persist_blocking(&build_id))
            .await
            .map_err(|e| CacheError::Task(e.to_string()))?
    }
}

/// Copy a file or directory tree, returning the number of files copied
fn copy_recursive(source: &Path, target: &Path) -> io::Result<u64> {
    if source.is_file() {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(source, target)?;
        return Ok(1);
    }

    std::fs::create_dir_all(target)?;
    let mut copied = 0;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        copied += copy_recursive(&entry.path(), &target.join(entry.file_name()))?;
    }
    Ok(copied)
}
