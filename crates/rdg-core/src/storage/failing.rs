//! # Failing Storage
//!
//! Wraps a backend and injects I/O errors into selected writes.
//!
//! Set `put_fail_at` to a call number to fail that write and every later
//! one (0 = never). `fail_prefix` restricts failures to files whose base
//! name starts with the prefix. Reads always delegate.

use super::{FileStorage, FileView};
use crate::{RdgError, Uri};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Backend decorator with configurable write failures.
#[derive(Debug)]
pub struct FailingStorage {
    inner: Arc<dyn FileStorage>,
    /// Fail `put` on this call number and after (0 = never).
    pub put_fail_at: AtomicU64,
    fail_prefix: Mutex<Option<String>>,
    put_count: AtomicU64,
    failed: AtomicU64,
}

impl FailingStorage {
    /// Wrap `inner`; no failures configured.
    #[must_use]
    pub fn new(inner: Arc<dyn FileStorage>) -> Self {
        Self {
            inner,
            put_fail_at: AtomicU64::new(0),
            fail_prefix: Mutex::new(None),
            put_count: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Fail the `n`-th matching write and every later one.
    pub fn fail_puts_from(&self, n: u64) {
        self.put_count.store(0, Ordering::SeqCst);
        self.put_fail_at.store(n, Ordering::SeqCst);
    }

    /// Only count writes whose base name starts with `prefix`.
    pub fn only_matching(&self, prefix: impl Into<String>) {
        *self.fail_prefix.lock() = Some(prefix.into());
    }

    /// Disable every failure.
    pub fn clear_failures(&self) {
        self.put_fail_at.store(0, Ordering::SeqCst);
        *self.fail_prefix.lock() = None;
    }

    /// Number of writes that were failed.
    #[must_use]
    pub fn failed_puts(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    fn should_fail(&self, uri: &Uri) -> bool {
        if let Some(prefix) = self.fail_prefix.lock().as_deref()
            && !uri.base_name().starts_with(prefix)
        {
            return false;
        }
        let count = self.put_count.fetch_add(1, Ordering::SeqCst) + 1;
        let target = self.put_fail_at.load(Ordering::SeqCst);
        target != 0 && count >= target
    }
}

#[async_trait]
impl FileStorage for FailingStorage {
    fn scheme(&self) -> &str {
        self.inner.scheme()
    }

    async fn put(&self, uri: &Uri, data: Bytes) -> Result<(), RdgError> {
        if self.should_fail(uri) {
            self.failed.fetch_add(1, Ordering::SeqCst);
            return Err(RdgError::IoError(format!("injected write failure: {uri}")));
        }
        self.inner.put(uri, data).await
    }

    async fn get(&self, uri: &Uri) -> Result<Bytes, RdgError> {
        self.inner.get(uri).await
    }

    async fn bind(&self, uri: &Uri) -> Result<FileView, RdgError> {
        self.inner.bind(uri).await
    }

    async fn exists(&self, uri: &Uri) -> Result<bool, RdgError> {
        self.inner.exists(uri).await
    }

    async fn delete(&self, uri: &Uri) -> Result<(), RdgError> {
        self.inner.delete(uri).await
    }
}
