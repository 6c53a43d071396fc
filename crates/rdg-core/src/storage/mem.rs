//! # In-Memory File Storage
//!
//! `mem://` backend keeping every file in a process-local map.
//! Counts writes so tests can verify that unchanged columns are not
//! rewritten.

use super::FileStorage;
use crate::{RdgError, Uri};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory backend.
#[derive(Debug, Default)]
pub struct MemFileStorage {
    files: RwLock<BTreeMap<String, Bytes>>,
    puts: AtomicU64,
}

impl MemFileStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files currently stored.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    /// Total successful writes since creation.
    #[must_use]
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    /// URIs of stored files under `dir`, sorted.
    #[must_use]
    pub fn list(&self, dir: &Uri) -> Vec<String> {
        let prefix = format!("{}/", dir.as_str());
        self.files
            .read()
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl FileStorage for MemFileStorage {
    fn scheme(&self) -> &str {
        "mem"
    }

    async fn put(&self, uri: &Uri, data: Bytes) -> Result<(), RdgError> {
        self.files.write().insert(uri.as_str().to_string(), data);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, uri: &Uri) -> Result<Bytes, RdgError> {
        self.files
            .read()
            .get(uri.as_str())
            .cloned()
            .ok_or_else(|| RdgError::NotFound(uri.to_string()))
    }

    async fn exists(&self, uri: &Uri) -> Result<bool, RdgError> {
        Ok(self.files.read().contains_key(uri.as_str()))
    }

    async fn delete(&self, uri: &Uri) -> Result<(), RdgError> {
        self.files
            .write()
            .remove(uri.as_str())
            .map(|_| ())
            .ok_or_else(|| RdgError::NotFound(uri.to_string()))
    }
}
