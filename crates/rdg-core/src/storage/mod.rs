//! # Blob Storage
//!
//! Path-addressed byte storage behind the `FileStorage` trait, plus the
//! registry that maps URI schemes to backends.
//!
//! ## Backends
//!
//! - `LocalFileStorage` (`file://`): tokio::fs, write-to-temp + rename,
//!   memory-mapped binds
//! - `MemFileStorage` (`mem://`): in-process map, for tests and scratch graphs
//! - `FailingStorage`: wraps any backend and fails selected writes
//!
//! The registry is an explicit value carried by `RdgContext`; nothing is
//! registered globally.

pub mod failing;
pub mod local;
pub mod mem;

pub use failing::FailingStorage;
pub use local::LocalFileStorage;
pub use mem::MemFileStorage;

use crate::{RdgError, Uri};
use async_trait::async_trait;
use bytes::Bytes;
use memmap2::Mmap;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

// =============================================================================
// FILE VIEW
// =============================================================================

/// Read-only bytes of a bound file: either memory-mapped or owned.
///
/// Cloning is cheap and shares the underlying buffer, so a view can be handed
/// to an in-flight write while the partition keeps using it.
#[derive(Clone, Default)]
pub struct FileView {
    bytes: Bytes,
    mapped: bool,
}

impl FileView {
    /// View over owned bytes.
    pub fn owned(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            mapped: false,
        }
    }

    /// View over a memory map; the map lives as long as any clone.
    #[must_use]
    pub fn mapped(mmap: Mmap) -> Self {
        Self {
            bytes: Bytes::from_owner(mmap),
            mapped: true,
        }
    }

    /// Shared handle to the bytes.
    #[must_use]
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    /// True if backed by a memory map.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }
}

impl Deref for FileView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq for FileView {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl fmt::Debug for FileView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileView")
            .field("len", &self.bytes.len())
            .field("mapped", &self.mapped)
            .finish()
    }
}

// =============================================================================
// FILESTORAGE TRAIT
// =============================================================================

/// A byte store addressed by `Uri`.
///
/// Implementations must be safe for concurrent use from many tasks. A write
/// that returns `Ok` is durable. Writers never target the same path
/// concurrently: column and topology files get unique names and the
/// metadata-pointer file has a single elected writer.
#[async_trait]
pub trait FileStorage: Send + Sync + fmt::Debug {
    /// URI scheme served by this backend.
    fn scheme(&self) -> &str;

    /// Durably write `data` at `uri`, replacing any previous content.
    async fn put(&self, uri: &Uri, data: Bytes) -> Result<(), RdgError>;

    /// Read the whole file.
    async fn get(&self, uri: &Uri) -> Result<Bytes, RdgError>;

    /// Bind a file for zero-copy reading where the backend supports it.
    async fn bind(&self, uri: &Uri) -> Result<FileView, RdgError> {
        Ok(FileView::owned(self.get(uri).await?))
    }

    /// True if a file exists at `uri`.
    async fn exists(&self, uri: &Uri) -> Result<bool, RdgError>;

    /// Remove the file at `uri`.
    async fn delete(&self, uri: &Uri) -> Result<(), RdgError>;
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Scheme → backend map.
#[derive(Debug, Clone, Default)]
pub struct FileStorageRegistry {
    backends: BTreeMap<String, Arc<dyn FileStorage>>,
}

impl FileStorageRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry serving `file://` from the local file system and `mem://`
    /// from a fresh in-memory store.
    #[must_use]
    pub fn with_defaults(mmap_topology: bool) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LocalFileStorage::new(mmap_topology)));
        registry.register(Arc::new(MemFileStorage::new()));
        registry
    }

    /// Register a backend under its scheme, replacing any previous one.
    pub fn register(&mut self, storage: Arc<dyn FileStorage>) {
        self.backends.insert(storage.scheme().to_string(), storage);
    }

    /// Backend responsible for `uri`.
    pub fn resolve(&self, uri: &Uri) -> Result<Arc<dyn FileStorage>, RdgError> {
        self.backends.get(uri.scheme()).cloned().ok_or_else(|| {
            RdgError::InvalidArgument(format!(
                "no file storage registered for scheme {:?} ({})",
                uri.scheme(),
                uri
            ))
        })
    }

    /// Synchronous-from-the-caller's-view durable write.
    pub async fn put(&self, uri: &Uri, data: Bytes) -> Result<(), RdgError> {
        self.resolve(uri)?.put(uri, data).await
    }

    /// Read a whole file.
    pub async fn get(&self, uri: &Uri) -> Result<Bytes, RdgError> {
        self.resolve(uri)?.get(uri).await
    }

    /// Bind a file for reading.
    pub async fn bind(&self, uri: &Uri) -> Result<FileView, RdgError> {
        self.resolve(uri)?.bind(uri).await
    }

    /// True if a file exists at `uri`.
    pub async fn exists(&self, uri: &Uri) -> Result<bool, RdgError> {
        self.resolve(uri)?.exists(uri).await
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_routes_by_scheme() {
        let mem = Arc::new(MemFileStorage::new());
        let mut registry = FileStorageRegistry::new();
        registry.register(mem.clone());

        let uri = Uri::parse("mem://g/file").expect("uri");
        registry
            .put(&uri, Bytes::from_static(b"abc"))
            .await
            .expect("put");
        assert_eq!(registry.get(&uri).await.expect("get"), "abc");
        assert_eq!(mem.file_count(), 1);
    }

    #[tokio::test]
    async fn unknown_scheme_rejected() {
        let registry = FileStorageRegistry::new();
        let uri = Uri::parse("s3://bucket/key").expect("uri");
        let result = registry.get(&uri).await;
        assert!(matches!(result, Err(RdgError::InvalidArgument(_))));
    }

    #[test]
    fn file_view_shares_bytes() {
        let view = FileView::owned(vec![1u8, 2, 3]);
        let clone = view.clone();
        assert_eq!(&*clone, &[1, 2, 3]);
        assert!(!view.is_mapped());
        assert_eq!(view, clone);
    }
}
