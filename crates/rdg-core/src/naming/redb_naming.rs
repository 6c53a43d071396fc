//! # redb-backed Naming Service
//!
//! A durable catalog of latest versions using the redb embedded database.
//!
//! redb provides what the naming service needs:
//! - ACID transactions (the compare-and-update runs inside one write
//!   transaction, so concurrent updates serialize)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (lookups never block on an update)
//!
//! redb is synchronous; every call runs on tokio's blocking pool.

use super::{NameServer, check_update};
use crate::{RdgError, RdgMeta, Uri};
use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

/// Table of latest versions: directory URI -> postcard-encoded `RdgMeta`.
const LATEST: TableDefinition<&str, &[u8]> = TableDefinition::new("latest");

fn db_error(e: impl std::fmt::Display) -> RdgError {
    RdgError::IoError(e.to_string())
}

/// Naming service persisted in a redb file.
pub struct RedbNameServer {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbNameServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbNameServer").finish_non_exhaustive()
    }
}

impl RedbNameServer {
    /// Open or create a catalog at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RdgError> {
        let db = Database::create(path.as_ref()).map_err(db_error)?;

        // Initialize the table if it doesn't exist
        {
            let write_txn = db.begin_write().map_err(db_error)?;
            let _ = write_txn.open_table(LATEST).map_err(db_error)?;
            write_txn.commit().map_err(db_error)?;
        }

        Ok(Self { db: Arc::new(db) })
    }

    async fn run<T, F>(&self, f: F) -> Result<T, RdgError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, RdgError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| RdgError::IoError(format!("naming task failed: {e}")))?
    }

    fn read_entry(db: &Database, dir: &Uri) -> Result<Option<RdgMeta>, RdgError> {
        let read_txn = db.begin_read().map_err(db_error)?;
        let table = read_txn.open_table(LATEST).map_err(db_error)?;
        table
            .get(dir.as_str())
            .map_err(db_error)?
            .map(|v| {
                postcard::from_bytes::<RdgMeta>(v.value())
                    .map_err(|e| RdgError::IoError(format!("corrupt naming entry {dir}: {e}")))
            })
            .transpose()
    }
}

#[async_trait]
impl NameServer for RedbNameServer {
    async fn lookup(&self, dir: &Uri) -> Result<RdgMeta, RdgError> {
        let dir = dir.clone();
        self.run(move |db| {
            Self::read_entry(db, &dir)?.ok_or_else(|| RdgError::NotFound(format!("rdg {dir}")))
        })
        .await
    }

    async fn update(
        &self,
        dir: &Uri,
        expected_old_version: u64,
        new_meta: &RdgMeta,
    ) -> Result<(), RdgError> {
        let dir = dir.clone();
        let new_meta = new_meta.clone();
        self.run(move |db| {
            let bytes = postcard::to_allocvec(&new_meta).map_err(db_error)?;

            let write_txn = db.begin_write().map_err(db_error)?;
            {
                let mut table = write_txn.open_table(LATEST).map_err(db_error)?;
                let current = table
                    .get(dir.as_str())
                    .map_err(db_error)?
                    .map(|v| postcard::from_bytes::<RdgMeta>(v.value()).map_err(db_error))
                    .transpose()?;
                // dropping the transaction uncommitted discards it
                check_update(&dir, current.as_ref(), expected_old_version, &new_meta)?;
                table
                    .insert(dir.as_str(), bytes.as_slice())
                    .map_err(db_error)?;
            }
            write_txn.commit().map_err(db_error)?;

            tracing::debug!(%dir, version = new_meta.version(), "latest version updated");
            Ok(())
        })
        .await
    }

    async fn create(&self, dir: &Uri, meta: &RdgMeta) -> Result<(), RdgError> {
        let dir = dir.clone();
        let meta = meta.clone();
        self.run(move |db| {
            let bytes = postcard::to_allocvec(&meta).map_err(db_error)?;

            let write_txn = db.begin_write().map_err(db_error)?;
            {
                let mut table = write_txn.open_table(LATEST).map_err(db_error)?;
                if table.get(dir.as_str()).map_err(db_error)?.is_some() {
                    return Err(RdgError::InvalidArgument(format!(
                        "rdg {dir} already exists"
                    )));
                }
                table
                    .insert(dir.as_str(), bytes.as_slice())
                    .map_err(db_error)?;
            }
            write_txn.commit().map_err(db_error)?;
            Ok(())
        })
        .await
    }
}
