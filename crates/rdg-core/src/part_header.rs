//! # Partition Headers
//!
//! The metadata record of one host's partition in one version: where every
//! attribute column lives, where the topology lives, and the partitioning
//! policy fields. Stored as JSON next to the column files.
//!
//! ## Storage-info invariant
//!
//! Each list holds one `PropStorageInfo` per column, in table order. An
//! entry's `path` is non-empty iff the column was durably written since its
//! last in-memory mutation. Mutating a column clears its path so the next
//! commit rewrites it; columns with a path are never rewritten.
//!
//! A stored header lists only persisted entries, so every entry read back
//! from storage names its file.

use crate::fault::FaultPoint;
use crate::meta::RdgMeta;
use crate::properties::check_property_name;
use crate::storage::FileStorageRegistry;
use crate::write_group::WriteGroup;
use crate::{RdgError, Uri};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// STORAGE INFO
// =============================================================================

/// Where one column is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropStorageInfo {
    name: String,
    path: String,
    persist: bool,
}

impl PropStorageInfo {
    /// Entry for a column not yet written; persisted on the next commit.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: String::new(),
            persist: true,
        }
    }

    /// Entry for a column stored at `path` (a base name in the directory).
    pub fn persisted(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            persist: true,
        }
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base name of the column file, empty if not written since last change.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// True if the column is written on commit.
    #[must_use]
    pub fn persist(&self) -> bool {
        self.persist
    }

    /// True if the column is written and unchanged since.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        !self.path.is_empty()
    }

    /// True if the next commit must write this column.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.persist && self.path.is_empty()
    }

    pub(crate) fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub(crate) fn clear_path(&mut self) {
        self.path.clear();
    }
}

// =============================================================================
// PARTITION METADATA
// =============================================================================

/// Partitioning policy fields of one host's partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartitionMetadata {
    pub policy_id: u32,
    pub transposed: bool,
    pub is_outgoing_edge_cut: bool,
    pub is_vertex_cut: bool,
    pub num_global_nodes: u64,
    pub max_global_node_id: u64,
    pub num_global_edges: u64,
    pub num_nodes: u64,
    pub num_edges: u64,
    pub num_owned: u64,
}

// =============================================================================
// PART HEADER
// =============================================================================

/// Header of one host's partition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartHeader {
    node_prop_info_list: Vec<PropStorageInfo>,
    edge_prop_info_list: Vec<PropStorageInfo>,
    part_prop_info_list: Vec<PropStorageInfo>,
    topology_path: String,
    metadata: PartitionMetadata,
}

impl PartHeader {
    /// Header of a partition with no columns and no topology yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch, parse and validate a stored header.
    pub async fn read(storage: &FileStorageRegistry, uri: &Uri) -> Result<Self, RdgError> {
        let bytes = storage.get(uri).await?;
        let header = Self::from_json_bytes(&bytes)?;
        tracing::debug!(
            %uri,
            node_props = header.node_prop_info_list.len(),
            edge_props = header.edge_prop_info_list.len(),
            "partition header read"
        );
        Ok(header)
    }

    /// Parse a stored header.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, RdgError> {
        let header: Self = serde_json::from_slice(bytes)
            .map_err(|e| RdgError::InvalidArgument(format!("malformed partition header: {e}")))?;
        header.validate()?;
        if let Some(info) = header.all_entries().find(|p| !p.is_persisted()) {
            return Err(RdgError::InvalidArgument(format!(
                "stored header lists unpersisted property {}",
                info.name
            )));
        }
        Ok(header)
    }

    /// JSON text of the stored form: transient entries are left out.
    pub fn to_json_string(&self) -> Result<String, RdgError> {
        let stored = Self {
            node_prop_info_list: persisted_only(&self.node_prop_info_list),
            edge_prop_info_list: persisted_only(&self.edge_prop_info_list),
            part_prop_info_list: persisted_only(&self.part_prop_info_list),
            topology_path: self.topology_path.clone(),
            metadata: self.metadata,
        };
        serde_json::to_string_pretty(&stored).map_err(|e| RdgError::IoError(e.to_string()))
    }

    /// Serialize and enqueue this header as `host`'s header of `version`.
    pub fn write(
        &self,
        dir: &Uri,
        host: u32,
        version: u64,
        group: &mut WriteGroup,
    ) -> Result<(), RdgError> {
        group.faults().check(FaultPoint::BeforeHeaderWrite)?;
        let text = self.to_json_string()?;
        group.start_store(
            RdgMeta::partition_file_name(dir, host, version),
            Bytes::from(text),
        )?;
        group.faults().check(FaultPoint::AfterHeaderWrite)
    }

    /// Structural checks: unique names per list that can serve as file
    /// names, and a topology path once anything was persisted.
    pub fn validate(&self) -> Result<(), RdgError> {
        for (kind, list) in [
            ("node", &self.node_prop_info_list),
            ("edge", &self.edge_prop_info_list),
            ("partition", &self.part_prop_info_list),
        ] {
            let mut seen = BTreeSet::new();
            for info in list {
                if info.name.is_empty() {
                    return Err(RdgError::InvalidArgument(format!(
                        "unnamed {kind} property"
                    )));
                }
                check_property_name(&info.name)?;
                if !seen.insert(info.name.as_str()) {
                    return Err(RdgError::InvalidArgument(format!(
                        "duplicate {kind} property {}",
                        info.name
                    )));
                }
            }
        }

        if self.topology_path.is_empty() && self.all_entries().any(PropStorageInfo::is_persisted) {
            return Err(RdgError::InvalidArgument(
                "persisted properties without a topology".to_string(),
            ));
        }
        Ok(())
    }

    /// Keep only the requested attributes, in requested order.
    ///
    /// `None` keeps a list as is. Topology and partition-boundary entries are
    /// never pruned. Nothing changes if a name is unknown.
    pub fn prune_props_to(
        &mut self,
        node_names: Option<&[String]>,
        edge_names: Option<&[String]>,
    ) -> Result<(), RdgError> {
        let nodes = match node_names {
            Some(names) => Some(select(&self.node_prop_info_list, names)?),
            None => None,
        };
        let edges = match edge_names {
            Some(names) => Some(select(&self.edge_prop_info_list, names)?),
            None => None,
        };
        if let Some(nodes) = nodes {
            self.node_prop_info_list = nodes;
        }
        if let Some(edges) = edges {
            self.edge_prop_info_list = edges;
        }
        Ok(())
    }

    /// Forget every storage location, so the next commit rewrites all
    /// columns and the topology (used when storing into a new directory).
    pub fn unbind_from_storage(&mut self) {
        for info in self
            .node_prop_info_list
            .iter_mut()
            .chain(self.edge_prop_info_list.iter_mut())
            .chain(self.part_prop_info_list.iter_mut())
        {
            info.clear_path();
        }
        self.topology_path.clear();
    }

    // =========================================================================
    // PERSISTENCE SELECTION
    // =========================================================================

    /// Persist every node and edge attribute on commit.
    pub fn mark_all_properties_persistent(&mut self) {
        for info in self
            .node_prop_info_list
            .iter_mut()
            .chain(self.edge_prop_info_list.iter_mut())
        {
            info.persist = true;
        }
    }

    /// Persist exactly the named node attributes; the others stay in memory.
    pub fn mark_node_properties_persistent(&mut self, names: &[String]) -> Result<(), RdgError> {
        mark_persistent(&mut self.node_prop_info_list, names)
    }

    /// Persist exactly the named edge attributes; the others stay in memory.
    pub fn mark_edge_properties_persistent(&mut self, names: &[String]) -> Result<(), RdgError> {
        mark_persistent(&mut self.edge_prop_info_list, names)
    }

    // =========================================================================
    // ENTRY LISTS
    // =========================================================================

    /// Node attribute entries, in table order.
    #[must_use]
    pub fn node_prop_info_list(&self) -> &[PropStorageInfo] {
        &self.node_prop_info_list
    }

    /// Edge attribute entries, in table order.
    #[must_use]
    pub fn edge_prop_info_list(&self) -> &[PropStorageInfo] {
        &self.edge_prop_info_list
    }

    /// Partition-boundary column entries.
    #[must_use]
    pub fn part_prop_info_list(&self) -> &[PropStorageInfo] {
        &self.part_prop_info_list
    }

    pub(crate) fn set_node_prop_info_list(&mut self, list: Vec<PropStorageInfo>) {
        self.node_prop_info_list = list;
    }

    pub(crate) fn set_edge_prop_info_list(&mut self, list: Vec<PropStorageInfo>) {
        self.edge_prop_info_list = list;
    }

    pub(crate) fn set_part_prop_info_list(&mut self, list: Vec<PropStorageInfo>) {
        self.part_prop_info_list = list;
    }

    /// Append a node attribute entry.
    pub fn append_node_prop_storage_info(&mut self, info: PropStorageInfo) {
        self.node_prop_info_list.push(info);
    }

    /// Append an edge attribute entry.
    pub fn append_edge_prop_storage_info(&mut self, info: PropStorageInfo) {
        self.edge_prop_info_list.push(info);
    }

    /// Remove the node attribute entry at `i`.
    pub fn remove_node_prop_storage_info(&mut self, i: usize) -> Result<PropStorageInfo, RdgError> {
        remove_at(&mut self.node_prop_info_list, i)
    }

    /// Remove the edge attribute entry at `i`.
    pub fn remove_edge_prop_storage_info(&mut self, i: usize) -> Result<PropStorageInfo, RdgError> {
        remove_at(&mut self.edge_prop_info_list, i)
    }

    pub(crate) fn node_prop_info_mut(&mut self, i: usize) -> Option<&mut PropStorageInfo> {
        self.node_prop_info_list.get_mut(i)
    }

    pub(crate) fn edge_prop_info_mut(&mut self, i: usize) -> Option<&mut PropStorageInfo> {
        self.edge_prop_info_list.get_mut(i)
    }

    /// Drop the partition-boundary entry `name`, so its column is written
    /// again on the next commit.
    pub(crate) fn forget_part_prop(&mut self, name: &str) {
        self.part_prop_info_list.retain(|p| p.name != name);
    }

    /// Base name of the topology file, empty if never written.
    #[must_use]
    pub fn topology_path(&self) -> &str {
        &self.topology_path
    }

    pub(crate) fn set_topology_path(&mut self, path: impl Into<String>) {
        self.topology_path = path.into();
    }

    /// Partitioning policy fields.
    #[must_use]
    pub fn metadata(&self) -> &PartitionMetadata {
        &self.metadata
    }

    /// Replace the partitioning policy fields.
    pub fn set_metadata(&mut self, metadata: PartitionMetadata) {
        self.metadata = metadata;
    }

    fn all_entries(&self) -> impl Iterator<Item = &PropStorageInfo> {
        self.node_prop_info_list
            .iter()
            .chain(&self.edge_prop_info_list)
            .chain(&self.part_prop_info_list)
    }
}

fn persisted_only(list: &[PropStorageInfo]) -> Vec<PropStorageInfo> {
    list.iter().filter(|p| p.is_persisted()).cloned().collect()
}

fn select(list: &[PropStorageInfo], names: &[String]) -> Result<Vec<PropStorageInfo>, RdgError> {
    names
        .iter()
        .map(|name| {
            list.iter()
                .find(|p| &p.name == name)
                .cloned()
                .ok_or_else(|| RdgError::PropertyNotFound(name.clone()))
        })
        .collect()
}

fn mark_persistent(list: &mut [PropStorageInfo], names: &[String]) -> Result<(), RdgError> {
    if let Some(missing) = names.iter().find(|n| !list.iter().any(|p| &p.name == *n)) {
        return Err(RdgError::PropertyNotFound(missing.clone()));
    }
    for info in list {
        info.persist = names.contains(&info.name);
    }
    Ok(())
}

fn remove_at(list: &mut Vec<PropStorageInfo>, i: usize) -> Result<PropStorageInfo, RdgError> {
    if i >= list.len() {
        return Err(RdgError::InvalidArgument(format!(
            "property index {} out of range ({} properties)",
            i,
            list.len()
        )));
    }
    Ok(list.remove(i))
}

// =============================================================================
// TESTS
// =============================================================================
