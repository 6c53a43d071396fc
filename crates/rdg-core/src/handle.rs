//! # Partition Handles
//!
//! An open partition directory: the version it currently points at and what
//! the holder may do with it. A successful commit advances the handle to
//! the new version; a failed one leaves it at the last good version.

use crate::comm::one_host_only;
use crate::context::RdgContext;
use crate::meta::RdgMeta;
use crate::{RdgError, Uri};
use bytes::Bytes;

/// Access requested when opening a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Load only.
    Read,
    /// Commit only.
    Write,
    /// Load and commit.
    ReadWrite,
}

impl OpenMode {
    /// True if the mode permits loading.
    #[must_use]
    pub fn allows_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// True if the mode permits committing.
    #[must_use]
    pub fn allows_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// An open partition directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdgHandle {
    meta: RdgMeta,
    mode: OpenMode,
}

impl RdgHandle {
    /// Open `dir` at its latest published version.
    pub async fn open(ctx: &RdgContext, dir: &Uri, mode: OpenMode) -> Result<Self, RdgError> {
        let meta = ctx.name_server().lookup(dir).await?;
        tracing::debug!(%dir, version = meta.version(), ?mode, "rdg opened");
        Ok(Self { meta, mode })
    }

    /// Register `dir` as a new, empty partition directory (version 0).
    ///
    /// Collective: every host calls it, the leader does the work.
    pub async fn create(ctx: &RdgContext, dir: &Uri) -> Result<(), RdgError> {
        let meta = RdgMeta::empty(dir.clone());
        let ns = ctx.name_server();
        let storage = ctx.storage();
        let meta = &meta;
        one_host_only(ctx.comm(), || async move {
            ns.create(dir, meta).await?;
            storage
                .put(&meta.meta_file(), Bytes::from(meta.to_json_string()?))
                .await
        })
        .await?;
        tracing::info!(%dir, "rdg created");
        Ok(())
    }

    /// Version this handle points at.
    #[must_use]
    pub fn meta(&self) -> &RdgMeta {
        &self.meta
    }

    /// Access mode.
    #[must_use]
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub(crate) fn set_meta(&mut self, meta: RdgMeta) {
        self.meta = meta;
    }
}
