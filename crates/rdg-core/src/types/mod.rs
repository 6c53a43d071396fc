//! # Core Type Definitions
//!
//! This module contains the types shared by every layer of the engine:
//! - Graph identifiers (`NodeId`, `EdgeId`)
//! - Error types (`RdgError`)
//!
//! ## Error Policy
//!
//! - No silent failures: every fallible operation returns `Result<T, RdgError>`
//! - Errors propagate to the nearest caller that can decide (abort the commit,
//!   keep the previous version, report to the analytics layer)
//! - Corrupted in-memory state is not an error value: it aborts the process

use crate::fault::FaultPoint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// GRAPH IDENTIFIERS
// =============================================================================

/// Local identifier of a node inside one partition.
///
/// Nodes are dense: a partition with `n` nodes uses ids `0..n`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Position of the node in per-node columns.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Local identifier of an edge inside one partition.
///
/// Edges are numbered by their position in the CSR destination array, so the
/// edges of one node form a contiguous range.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct EdgeId(pub u64);

impl EdgeId {
    /// Position of the edge in per-edge columns.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while loading, mutating or committing a partition.
#[derive(Debug, Error)]
pub enum RdgError {
    /// The caller asked for something inconsistent with the stored state
    /// (host-count mismatch, malformed header, wrong handle mode, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A blob-store or file-system operation failed.
    #[error("I/O error: {0}")]
    IoError(String),

    /// A column could not be encoded to or decoded from its file format.
    #[error("Column codec error: {0}")]
    ArrowError(String),

    /// Another writer already advanced the latest version of the directory.
    #[error("Naming conflict on {dir}: expected version {expected}, found {actual}")]
    NamingConflict {
        /// Partition directory whose update was rejected.
        dir: String,
        /// Version the caller expected to replace.
        expected: u64,
        /// Version currently recorded by the naming service.
        actual: u64,
    },

    /// A requested property name does not exist in the loaded tables.
    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    /// A property exists but is stored with an incompatible type.
    #[error("Type mismatch for property {name}: expected {expected}, found {actual}")]
    TypeMismatch {
        /// Property name.
        name: String,
        /// Type requested by the typed view.
        expected: String,
        /// Type recorded in the column.
        actual: String,
    },

    /// A file, directory or naming entry does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Execution was stopped at a fault-injection checkpoint.
    #[error("Fault injected at {0:?}")]
    FaultInjected(FaultPoint),

    /// The elected leader host failed a step every host depends on.
    #[error("Leader host failed: {0}")]
    LeaderFailed(String),

    /// Another host of the group failed its part of a collective step.
    #[error("Host failed: {0}")]
    HostFailed(String),
}

impl From<std::io::Error> for RdgError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(e.to_string())
        } else {
            Self::IoError(e.to_string())
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
