//! # rdg-core
//!
//! Versioned, crash-consistent persistence for partitioned property graphs.
//!
//! A graph is split into partitions, one per host. Each partition (`Rdg`)
//! holds a CSR topology plus columnar node and edge attribute tables. A
//! directory accumulates immutable versions of the whole partitioned graph;
//! a naming service records which version is current.
//!
//! ## Layers
//!
//! - `storage` / `formats`: byte stores keyed by URI, column file codec
//! - `write_group`: bounded-concurrency async writes with a join point
//! - `part_header` / `meta`: per-host and per-version JSON descriptors
//! - `naming` / `comm`: version publication and the leader protocol
//! - `rdg` / `handle`: load, mutate and commit a partition
//! - `graph`: typed attribute access bound once at construction
//!
//! ## Commit Contract
//!
//! - Every host writes only new files; nothing written is ever overwritten
//! - The naming update is the single linearization point of a commit
//! - A failed commit leaves the in-memory partition and its handle untouched
//! - Columns that were not modified are never rewritten
//!
//! ## Environment
//!
//! Storage backends, the naming service, the communicator and the fault
//! injector are carried explicitly in an `RdgContext`. There are no
//! process-wide registries.

// =============================================================================
// MODULES
// =============================================================================

pub mod column;
pub mod comm;
pub mod config;
pub mod context;
pub mod fault;
pub mod formats;
pub mod graph;
pub mod handle;
pub mod meta;
pub mod naming;
pub mod part_header;
pub mod primitives;
pub mod properties;
pub mod rdg;
pub mod storage;
pub mod topology;
pub mod types;
pub mod uri;
pub mod write_group;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{EdgeId, NodeId, RdgError};
pub use uri::Uri;

// =============================================================================
// RE-EXPORTS: Partition Model
// =============================================================================

pub use column::{Column, ColumnData, ColumnValue, DataType, Table};
pub use graph::{EdgeRange, Property, PropertyGraph, PropertyTuple};
pub use meta::{RdgLineage, RdgMeta};
pub use part_header::{PartHeader, PartitionMetadata, PropStorageInfo};
pub use rdg::Rdg;
pub use topology::CsrTopology;

// =============================================================================
// RE-EXPORTS: Commit Protocol
// =============================================================================

pub use comm::{CommBackend, LocalComm, exchange, one_host_only};
pub use context::{RdgContext, RdgContextBuilder};
pub use handle::{OpenMode, RdgHandle};
pub use naming::{MemNameServer, NameServer, RedbNameServer};
pub use write_group::WriteGroup;

// =============================================================================
// RE-EXPORTS: Storage and Configuration
// =============================================================================

pub use config::RdgConfig;
pub use fault::{FaultInjector, FaultPlan, FaultPoint, FaultSensitivity};
pub use storage::{
    FailingStorage, FileStorage, FileStorageRegistry, FileView, LocalFileStorage, MemFileStorage,
};
