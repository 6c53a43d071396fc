//! # Format Primitives
//!
//! Fixed constants of the on-storage layout.
//!
//! These values are part of the persisted format: changing one makes
//! previously committed versions unreadable.

/// Magic bytes opening every column file.
///
/// - Column File = Magic Bytes ("RDGC") + Version (u8) + postcard payload.
pub const COLUMN_MAGIC_BYTES: &[u8; 4] = b"RDGC";

/// Current column file format version.
///
/// Increment this when making breaking changes to the column payload.
pub const COLUMN_FORMAT_VERSION: u8 = 1;

/// Version tag stored in the first word of a topology file.
pub const TOPOLOGY_FORMAT_VERSION: u64 = 1;

/// Size in bytes of the fixed topology header (four little-endian u64 words).
pub const TOPOLOGY_HEADER_SIZE: usize = 32;

// =============================================================================
// FILE NAMING
// =============================================================================

/// Prefix of the per-version metadata-pointer file.
pub const META_FILE_PREFIX: &str = "meta_";

/// Prefix of the per-host partition header file.
pub const PARTITION_FILE_PREFIX: &str = "part_vers";

/// Base name prefix of topology files.
pub const TOPOLOGY_FILE_NAME: &str = "topology";

// =============================================================================
// PARTITION-BOUNDARY PROPERTY NAMES
// =============================================================================

/// Prefix of mirror-node columns (`mirror_nodes_<host>`).
pub const MIRROR_NODES_PROP_NAME: &str = "mirror_nodes";

/// Prefix of master-node columns (`master_nodes_<host>`).
pub const MASTER_NODES_PROP_NAME: &str = "master_nodes";

/// Exact name of the local-to-global id column.
pub const LOCAL_TO_GLOBAL_PROP_NAME: &str = "local_to_global_vector";

// =============================================================================
// LIMITS
// =============================================================================

/// Default upper bound on a single column file.
///
/// Validated BEFORE deserialization so corrupted length prefixes cannot
/// trigger huge allocations.
pub const DEFAULT_MAX_COLUMN_FILE_BYTES: usize = 1024 * 1024 * 1024;

/// Default number of blob writes a `WriteGroup` keeps in flight.
pub const DEFAULT_WRITE_CONCURRENCY: usize = 16;

/// Host that performs single-writer steps of the commit protocol.
pub const LEADER_HOST: u32 = 0;

/// Name of the mirror-node column for host `i`.
#[must_use]
pub fn mirror_prop_name(i: usize) -> String {
    format!("{MIRROR_NODES_PROP_NAME}_{i}")
}

/// Name of the master-node column for host `i`.
#[must_use]
pub fn master_prop_name(i: usize) -> String {
    format!("{MASTER_NODES_PROP_NAME}_{i}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(COLUMN_MAGIC_BYTES, b"RDGC");
    }

    #[test]
    fn boundary_names_keep_their_prefix() {
        assert!(mirror_prop_name(3).starts_with(MIRROR_NODES_PROP_NAME));
        assert!(master_prop_name(0).starts_with(MASTER_NODES_PROP_NAME));
        assert_eq!(mirror_prop_name(12), "mirror_nodes_12");
    }
}
