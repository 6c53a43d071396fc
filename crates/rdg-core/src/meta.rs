//! # Version Records
//!
//! `RdgMeta` identifies one committed, immutable snapshot of a partition
//! directory. Versions of a directory are totally ordered by their integer
//! field; the naming service records which one is the latest.
//!
//! ## Files derived from a version
//!
//! - `meta_<version:020>`: metadata-pointer file (JSON `RdgMeta`), written
//!   by the leader host once the version is published
//! - `part_vers<version:020>_rdg_node<host:05>`: partition header of one host
//!
//! Zero-padding keeps lexical and numeric order identical.

use crate::primitives::{META_FILE_PREFIX, PARTITION_FILE_PREFIX};
use crate::{RdgError, Uri};
use serde::{Deserialize, Serialize};

// =============================================================================
// LINEAGE
// =============================================================================

/// Append-only record of the commands that produced a version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RdgLineage {
    command_lines: Vec<String>,
}

impl RdgLineage {
    /// Empty lineage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more command. Earlier entries are never rewritten.
    pub fn add_command_line(&mut self, command_line: impl Into<String>) {
        self.command_lines.push(command_line.into());
    }

    /// Commands, oldest first.
    #[must_use]
    pub fn command_lines(&self) -> &[String] {
        &self.command_lines
    }

    /// Number of recorded commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.command_lines.len()
    }

    /// True if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.command_lines.is_empty()
    }
}

// =============================================================================
// RDG META
// =============================================================================

/// Descriptor of one committed snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdgMeta {
    version: u64,
    num_hosts: u32,
    policy_id: u32,
    transposed: bool,
    lineage: RdgLineage,
    dir: Uri,
}

impl RdgMeta {
    /// Record of a freshly created directory: version 0, no hosts.
    #[must_use]
    pub fn empty(dir: Uri) -> Self {
        Self {
            version: 0,
            num_hosts: 0,
            policy_id: 0,
            transposed: false,
            lineage: RdgLineage::new(),
            dir,
        }
    }

    /// Version number.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of hosts that wrote this version.
    #[must_use]
    pub fn num_hosts(&self) -> u32 {
        self.num_hosts
    }

    /// Partitioning policy identifier.
    #[must_use]
    pub fn policy_id(&self) -> u32 {
        self.policy_id
    }

    /// True if edges are stored transposed.
    #[must_use]
    pub fn transposed(&self) -> bool {
        self.transposed
    }

    /// Commands that produced this version.
    #[must_use]
    pub fn lineage(&self) -> &RdgLineage {
        &self.lineage
    }

    /// Partition directory.
    #[must_use]
    pub fn dir(&self) -> &Uri {
        &self.dir
    }

    /// True for a directory that was created but never committed to.
    #[must_use]
    pub fn is_empty_rdg(&self) -> bool {
        self.num_hosts == 0
    }

    /// Descriptor of the version following this one, in the same directory.
    ///
    /// Pure: nothing is read or written.
    #[must_use]
    pub fn next_version(
        &self,
        num_hosts: u32,
        policy_id: u32,
        transposed: bool,
        lineage: RdgLineage,
    ) -> Self {
        Self {
            version: self.version + 1,
            num_hosts,
            policy_id,
            transposed,
            lineage,
            dir: self.dir.clone(),
        }
    }

    /// Metadata-pointer file of `version` in `dir`.
    #[must_use]
    pub fn file_name(dir: &Uri, version: u64) -> Uri {
        dir.join(&format!("{META_FILE_PREFIX}{version:020}"))
    }

    /// Partition header file of `host` for `version` in `dir`.
    #[must_use]
    pub fn partition_file_name(dir: &Uri, host: u32, version: u64) -> Uri {
        dir.join(&format!(
            "{PARTITION_FILE_PREFIX}{version:020}_rdg_node{host:05}"
        ))
    }

    /// This version's metadata-pointer file.
    #[must_use]
    pub fn meta_file(&self) -> Uri {
        Self::file_name(&self.dir, self.version)
    }

    /// This version's header file for `host`.
    #[must_use]
    pub fn partition_file(&self, host: u32) -> Uri {
        Self::partition_file_name(&self.dir, host, self.version)
    }

    /// JSON text of the pointer file.
    pub fn to_json_string(&self) -> Result<String, RdgError> {
        serde_json::to_string_pretty(self).map_err(|e| RdgError::IoError(e.to_string()))
    }

    /// Parse a pointer file.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, RdgError> {
        serde_json::from_slice(bytes)
            .map_err(|e| RdgError::InvalidArgument(format!("malformed rdg meta: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir() -> Uri {
        Uri::parse("mem://graphs/g").expect("uri")
    }

    #[test]
    fn fresh_directory_is_empty() {
        let meta = RdgMeta::empty(dir());
        assert!(meta.is_empty_rdg());
        assert_eq!(meta.version(), 0);
    }

    #[test]
    fn next_version_increments_and_keeps_dir() {
        let mut lineage = RdgLineage::new();
        lineage.add_command_line("import edges.csv");
        let v1 = RdgMeta::empty(dir()).next_version(4, 2, true, lineage.clone());
        assert_eq!(v1.version(), 1);
        assert_eq!(v1.num_hosts(), 4);
        assert_eq!(v1.policy_id(), 2);
        assert!(v1.transposed());
        assert_eq!(v1.dir(), &dir());
        assert!(!v1.is_empty_rdg());

        lineage.add_command_line("bfs --source 0");
        let v2 = v1.next_version(4, 2, true, lineage);
        assert_eq!(v2.version(), 2);
        assert_eq!(v2.lineage().command_lines()[0], "import edges.csv");
        assert_eq!(v2.lineage().len(), 2);
    }

    #[test]
    fn file_names_are_zero_padded() {
        assert_eq!(
            RdgMeta::file_name(&dir(), 7).as_str(),
            "mem://graphs/g/meta_00000000000000000007"
        );
        assert_eq!(
            RdgMeta::partition_file_name(&dir(), 3, 12).base_name(),
            "part_vers00000000000000000012_rdg_node00003"
        );
    }

    #[test]
    fn json_roundtrip() {
        let meta = RdgMeta::empty(dir()).next_version(1, 0, false, RdgLineage::new());
        let text = meta.to_json_string().expect("serialize");
        let parsed = RdgMeta::from_json_bytes(text.as_bytes()).expect("parse");
        assert_eq!(parsed, meta);
        assert!(matches!(
            RdgMeta::from_json_bytes(b"{\"version\": 1}"),
            Err(RdgError::InvalidArgument(_))
        ));
    }
}
