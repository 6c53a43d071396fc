//! # Local File Storage
//!
//! `file://` backend on the local file system.
//!
//! Writes go to a sibling temp file which is fsync'd and then renamed over
//! the target, so a reader never observes a partially written file. Binds
//! memory-map the file when enabled.

use super::{FileStorage, FileView};
use crate::{RdgError, Uri};
use async_trait::async_trait;
use bytes::Bytes;
use memmap2::Mmap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Local file-system backend.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    mmap: bool,
}

impl LocalFileStorage {
    /// Create a backend; `mmap` selects memory-mapped binds.
    #[must_use]
    pub fn new(mmap: bool) -> Self {
        Self { mmap }
    }

    fn path_of(uri: &Uri) -> PathBuf {
        PathBuf::from(uri.path())
    }
}

impl Default for LocalFileStorage {
    fn default() -> Self {
        Self::new(true)
    }
}

fn io_error(uri: &Uri, e: std::io::Error) -> RdgError {
    match RdgError::from(e) {
        RdgError::NotFound(msg) => RdgError::NotFound(format!("{uri}: {msg}")),
        RdgError::IoError(msg) => RdgError::IoError(format!("{uri}: {msg}")),
        other => other,
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    fn scheme(&self) -> &str {
        "file"
    }

    async fn put(&self, uri: &Uri, data: Bytes) -> Result<(), RdgError> {
        let path = Self::path_of(uri);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(uri, e))?;
        }

        let tmp = path.with_file_name(format!(
            "{}.tmp-{}",
            uri.base_name(),
            Uuid::new_v4().simple()
        ));

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| io_error(uri, e))?;
        file.write_all(&data).await.map_err(|e| io_error(uri, e))?;
        file.sync_all().await.map_err(|e| io_error(uri, e))?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(uri, e));
        }

        tracing::trace!(%uri, bytes = data.len(), "file written");
        Ok(())
    }

    async fn get(&self, uri: &Uri) -> Result<Bytes, RdgError> {
        let data = tokio::fs::read(Self::path_of(uri))
            .await
            .map_err(|e| io_error(uri, e))?;
        Ok(Bytes::from(data))
    }

    async fn bind(&self, uri: &Uri) -> Result<FileView, RdgError> {
        if !self.mmap {
            return Ok(FileView::owned(self.get(uri).await?));
        }

        let path = Self::path_of(uri);
        let target = uri.clone();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&path).map_err(|e| io_error(&target, e))?;
            let len = file.metadata().map_err(|e| io_error(&target, e))?.len();
            if len == 0 {
                // zero-length files cannot be mapped
                return Ok(FileView::default());
            }
            // SAFETY: files under a partition directory are immutable once
            // renamed into place; nothing truncates them while mapped.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| io_error(&target, e))?;
            Ok(FileView::mapped(mmap))
        })
        .await
        .map_err(|e| RdgError::IoError(format!("bind task failed: {e}")))?
    }

    async fn exists(&self, uri: &Uri) -> Result<bool, RdgError> {
        tokio::fs::try_exists(Self::path_of(uri))
            .await
            .map_err(|e| io_error(uri, e))
    }

    async fn delete(&self, uri: &Uri) -> Result<(), RdgError> {
        tokio::fs::remove_file(Self::path_of(uri))
            .await
            .map_err(|e| io_error(uri, e))
    }
}
