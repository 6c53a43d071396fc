//! # Write Groups
//!
//! Batches independent asynchronous blob writes behind one join point.
//!
//! `start_store` hands a write to the tokio runtime and returns at once;
//! writes of a group run concurrently, bounded by `write_concurrency`, with
//! no ordering among themselves. `finish` waits for all of them and reports
//! the first failure. Success is all-or-nothing from the caller's view even
//! though the individual writes are not atomic as a set: a failed group may
//! leave orphan files behind, but nothing references them.
//!
//! Dropping an unfinished group aborts its in-flight writes.

use crate::context::RdgContext;
use crate::fault::{FaultInjector, FaultPoint};
use crate::storage::FileStorageRegistry;
use crate::{RdgError, Uri};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// A batch of pending durable writes.
#[derive(Debug)]
pub struct WriteGroup {
    storage: FileStorageRegistry,
    faults: Arc<FaultInjector>,
    permits: Arc<Semaphore>,
    tasks: JoinSet<Result<(), RdgError>>,
    started: usize,
}

impl WriteGroup {
    /// Empty group writing through the context's storage.
    #[must_use]
    pub fn new(ctx: &RdgContext) -> Self {
        Self {
            storage: ctx.storage().clone(),
            faults: Arc::clone(ctx.faults()),
            permits: Arc::new(Semaphore::new(ctx.config().write_concurrency)),
            tasks: JoinSet::new(),
            started: 0,
        }
    }

    /// Enqueue a write of `data` to `uri` without waiting for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_store(&mut self, uri: Uri, data: Bytes) -> Result<(), RdgError> {
        self.faults.check(FaultPoint::BeforeStartStore)?;

        let storage = self.storage.resolve(&uri)?;
        let permits = Arc::clone(&self.permits);
        self.tasks.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| RdgError::IoError(format!("write group closed: {e}")))?;
            tracing::debug!(%uri, bytes = data.len(), "write started");
            storage.put(&uri, data).await
        });
        self.started += 1;

        self.faults.check(FaultPoint::AfterStartStore)
    }

    /// Fault injector shared with the rest of the pipeline.
    pub(crate) fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Number of writes enqueued so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.started
    }

    /// True if nothing was enqueued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.started == 0
    }

    /// Wait for every write; the first failure is returned after all of
    /// them settled.
    pub async fn finish(mut self) -> Result<(), RdgError> {
        let mut first_error = None;
        let mut failed = 0usize;

        while let Some(joined) = self.tasks.join_next().await {
            let result = joined
                .unwrap_or_else(|e| Err(RdgError::IoError(format!("write task failed: {e}"))));
            if let Err(e) = result {
                failed += 1;
                tracing::warn!(error = %e, "async write failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => {
                tracing::error!(failed, total = self.started, "at least one async write failed");
                Err(e)
            }
            None => {
                tracing::debug!(total = self.started, "write group finished");
                Ok(())
            }
        }
    }
}
