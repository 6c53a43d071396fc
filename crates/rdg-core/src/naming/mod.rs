//! # Naming Service
//!
//! Maps a partition directory to its latest committed `RdgMeta`.
//!
//! The naming service is the single source of truth for "latest": readers
//! never discover versions by listing a directory. Publication of a version
//! is a compare-and-update against the version the writer started from, so
//! two writers racing on the same directory cannot both win.
//!
//! ## Implementations
//!
//! - `MemNameServer`: process-local map, for tests and single-process runs
//! - `RedbNameServer`: redb-backed, survives restarts

pub mod redb_naming;

pub use redb_naming::RedbNameServer;

use crate::{RdgError, RdgMeta, Uri};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;

/// Catalog of latest versions.
#[async_trait]
pub trait NameServer: Send + Sync + fmt::Debug {
    /// Latest published version of `dir`.
    ///
    /// Returns `NotFound` if the directory was never created.
    async fn lookup(&self, dir: &Uri) -> Result<RdgMeta, RdgError>;

    /// Replace the latest version of `dir` with `new_meta` if the current
    /// latest is still `expected_old_version`.
    ///
    /// Returns `NamingConflict` if another writer got there first.
    async fn update(
        &self,
        dir: &Uri,
        expected_old_version: u64,
        new_meta: &RdgMeta,
    ) -> Result<(), RdgError>;

    /// Register a new directory with its initial (empty) version.
    ///
    /// Returns `InvalidArgument` if the directory already exists.
    async fn create(&self, dir: &Uri, meta: &RdgMeta) -> Result<(), RdgError>;
}

/// Shared acceptance rule for `update`.
pub(crate) fn check_update(
    dir: &Uri,
    current: Option<&RdgMeta>,
    expected_old_version: u64,
    new_meta: &RdgMeta,
) -> Result<(), RdgError> {
    let current = current.ok_or_else(|| RdgError::NotFound(format!("rdg {dir}")))?;
    if current.version() != expected_old_version {
        return Err(RdgError::NamingConflict {
            dir: dir.to_string(),
            expected: expected_old_version,
            actual: current.version(),
        });
    }
    if new_meta.version() <= expected_old_version {
        return Err(RdgError::InvalidArgument(format!(
            "new version {} of {} does not follow {}",
            new_meta.version(),
            dir,
            expected_old_version
        )));
    }
    if new_meta.dir() != dir {
        return Err(RdgError::InvalidArgument(format!(
            "meta for {} published under {}",
            new_meta.dir(),
            dir
        )));
    }
    Ok(())
}

// =============================================================================
// IN-MEMORY NAME SERVER
// =============================================================================

/// Process-local naming service.
#[derive(Debug, Default)]
pub struct MemNameServer {
    entries: Mutex<BTreeMap<Uri, RdgMeta>>,
}

impl MemNameServer {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NameServer for MemNameServer {
    async fn lookup(&self, dir: &Uri) -> Result<RdgMeta, RdgError> {
        self.entries
            .lock()
            .get(dir)
            .cloned()
            .ok_or_else(|| RdgError::NotFound(format!("rdg {dir}")))
    }

    async fn update(
        &self,
        dir: &Uri,
        expected_old_version: u64,
        new_meta: &RdgMeta,
    ) -> Result<(), RdgError> {
        let mut entries = self.entries.lock();
        check_update(dir, entries.get(dir), expected_old_version, new_meta)?;
        entries.insert(dir.clone(), new_meta.clone());
        tracing::debug!(%dir, version = new_meta.version(), "latest version updated");
        Ok(())
    }

    async fn create(&self, dir: &Uri, meta: &RdgMeta) -> Result<(), RdgError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(dir) {
            return Err(RdgError::InvalidArgument(format!("rdg {dir} already exists")));
        }
        entries.insert(dir.clone(), meta.clone());
        Ok(())
    }
}
