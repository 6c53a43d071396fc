//! # Partition Instance
//!
//! `Rdg` is the live, mutable representation of one host's partition: the
//! node and edge attribute tables, the topology buffer, the
//! partition-boundary columns and the header describing where all of it is
//! stored.
//!
//! ## Lifecycle
//!
//! - `make` loads a version (optionally only some attributes)
//! - mutation happens in memory; nothing is persisted implicitly
//! - `store` writes the dirty parts and publishes a new version
//!
//! ## Commit protocol
//!
//! 1. Write the topology if it was never written (or was replaced)
//! 2. Write dirty node, edge and partition-boundary columns
//! 3. Write the partition header of the new version
//! 4. Derive the next `RdgMeta`, lineage extended by the command line
//! 5. Wait for every write of the group
//! 6. Exchange outcomes across hosts; one host's failure fails every host
//! 7. Leader: compare-and-update the naming service
//! 8. Leader: write the metadata-pointer file
//! 9. Advance the handle
//!
//! Nothing is visible to readers before step 7. Any failure before it leaves
//! the naming service, the handle and this `Rdg` exactly as they were.
//!
//! A commit always describes the whole partition as held in memory. An
//! `Rdg` loaded with attribute filters therefore publishes a version
//! without the attributes it did not load.

use crate::column::{Column, Table};
use crate::comm::{exchange, one_host_only};
use crate::context::RdgContext;
use crate::fault::FaultPoint;
use crate::handle::RdgHandle;
use crate::meta::{RdgLineage, RdgMeta};
use crate::part_header::{PartHeader, PartitionMetadata, PropStorageInfo};
use crate::primitives::{
    LOCAL_TO_GLOBAL_PROP_NAME, MASTER_NODES_PROP_NAME, MIRROR_NODES_PROP_NAME,
    TOPOLOGY_FILE_NAME, master_prop_name, mirror_prop_name,
};
use crate::properties::{check_property_names, load_columns, write_part_arrays, write_table};
use crate::storage::FileView;
use crate::topology::CsrTopology;
use crate::write_group::WriteGroup;
use crate::{RdgError, Uri};
use bytes::Bytes;

/// Log and abort: in-memory state no longer matches its header.
fn fatal_column_mismatch(kind: &str, columns: usize, entries: usize) -> ! {
    tracing::error!(
        kind,
        columns,
        entries,
        "column count does not match storage entries; refusing to persist corrupted state"
    );
    std::process::abort()
}

/// One host's partition of a graph.
#[derive(Debug)]
pub struct Rdg {
    node_table: Table,
    edge_table: Table,
    topology: FileView,
    topology_dirty: bool,
    mirror_nodes: Vec<Column>,
    master_nodes: Vec<Column>,
    local_to_global: Option<Column>,
    part_header: PartHeader,
    lineage: RdgLineage,
    rdg_dir: Option<Uri>,
}

impl Default for Rdg {
    fn default() -> Self {
        Self::new()
    }
}

impl Rdg {
    /// An empty partition, not bound to any directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            node_table: Table::new(),
            edge_table: Table::new(),
            topology: FileView::owned(CsrTopology::empty()),
            topology_dirty: false,
            mirror_nodes: Vec::new(),
            master_nodes: Vec::new(),
            local_to_global: None,
            part_header: PartHeader::new(),
            lineage: RdgLineage::new(),
            rdg_dir: None,
        }
    }

    // =========================================================================
    // LOAD
    // =========================================================================

    /// Load this host's partition of the version `handle` points at.
    ///
    /// `None` filters load every attribute; `Some(names)` loads exactly the
    /// named ones, in that order. Topology and partition-boundary columns are
    /// always loaded. On error nothing is returned.
    ///
    /// Attributes left out by a filter are not part of the returned `Rdg`:
    /// storing it publishes a version without them.
    pub async fn make(
        ctx: &RdgContext,
        handle: &RdgHandle,
        node_props: Option<&[String]>,
        edge_props: Option<&[String]>,
    ) -> Result<Self, RdgError> {
        if !handle.mode().allows_read() {
            return Err(RdgError::InvalidArgument(
                "handle does not allow read".to_string(),
            ));
        }
        Self::make_from_meta(ctx, handle.meta(), node_props, edge_props).await
    }

    /// Load this host's partition of a specific version.
    pub async fn make_from_meta(
        ctx: &RdgContext,
        meta: &RdgMeta,
        node_props: Option<&[String]>,
        edge_props: Option<&[String]>,
    ) -> Result<Self, RdgError> {
        let comm = ctx.comm();
        if meta.is_empty_rdg() {
            return Ok(Self {
                rdg_dir: Some(meta.dir().clone()),
                ..Self::new()
            });
        }
        if meta.num_hosts() != comm.num() {
            tracing::error!(
                stored = meta.num_hosts(),
                current = comm.num(),
                "number of hosts for partitioned graph does not match current number of hosts"
            );
            return Err(RdgError::InvalidArgument(format!(
                "rdg {} was written by {} hosts, running on {}",
                meta.dir(),
                meta.num_hosts(),
                comm.num()
            )));
        }

        let partition_path = meta.partition_file(comm.id());
        let mut header = PartHeader::read(ctx.storage(), &partition_path).await?;
        header.prune_props_to(node_props, edge_props)?;

        let mut rdg = Self::do_make(ctx, meta.dir(), header).await?;
        rdg.lineage = meta.lineage().clone();
        tracing::info!(
            dir = %meta.dir(),
            version = meta.version(),
            host = comm.id(),
            node_props = rdg.node_table.num_columns(),
            edge_props = rdg.edge_table.num_columns(),
            "rdg loaded"
        );
        Ok(rdg)
    }

    async fn do_make(ctx: &RdgContext, dir: &Uri, header: PartHeader) -> Result<Self, RdgError> {
        let storage = ctx.storage();
        let max_bytes = ctx.config().max_column_file_bytes;

        let node_columns =
            load_columns(storage, dir, header.node_prop_info_list(), max_bytes).await?;
        let edge_columns =
            load_columns(storage, dir, header.edge_prop_info_list(), max_bytes).await?;
        let part_columns =
            load_columns(storage, dir, header.part_prop_info_list(), max_bytes).await?;

        let mut rdg = Self::new();
        rdg.node_table = Table::from_columns(node_columns)?;
        rdg.edge_table = Table::from_columns(edge_columns)?;
        for column in part_columns {
            rdg.add_partition_metadata_array(column)?;
        }

        if !header.topology_path().is_empty() {
            let view = storage.bind(&dir.join(header.topology_path())).await?;
            CsrTopology::parse(&view)?;
            rdg.topology = view;
        }

        rdg.part_header = header;
        rdg.rdg_dir = Some(dir.clone());
        Ok(rdg)
    }

    /// Route a loaded partition-boundary column to its slot by name.
    fn add_partition_metadata_array(&mut self, column: Column) -> Result<(), RdgError> {
        let name = column.name();
        if name.starts_with(MIRROR_NODES_PROP_NAME) {
            self.mirror_nodes.push(column);
        } else if name.starts_with(MASTER_NODES_PROP_NAME) {
            self.master_nodes.push(column);
        } else if name == LOCAL_TO_GLOBAL_PROP_NAME {
            self.local_to_global = Some(column);
        } else {
            return Err(RdgError::InvalidArgument(format!(
                "unknown partition array {name}"
            )));
        }
        Ok(())
    }

    // =========================================================================
    // STORE
    // =========================================================================

    /// Persist this partition as the next version of `handle`'s directory.
    ///
    /// Collective: every host stores its own partition. `topology`, when
    /// given, replaces the topology and is always written to a fresh file.
    /// On success `handle` points at the new version; on failure `handle`
    /// and `self` are unchanged.
    ///
    /// The new version holds exactly the attributes currently in `self`;
    /// attributes skipped by a filtered `make` are not carried over.
    pub async fn store(
        &mut self,
        ctx: &RdgContext,
        handle: &mut RdgHandle,
        command_line: &str,
        topology: Option<Bytes>,
    ) -> Result<(), RdgError> {
        let comm = ctx.comm();
        let staged = self.stage(ctx, handle, command_line, topology).await;
        let staged = exchange(comm, staged).await?;
        exchange(comm, ctx.faults().check(FaultPoint::AfterBarrier)).await?;

        publish(ctx, handle.meta(), &staged.meta).await?;
        handle.set_meta(staged.meta);

        self.part_header = staged.header;
        self.lineage = staged.lineage;
        self.rdg_dir = Some(handle.meta().dir().clone());
        self.topology_dirty = false;
        if let Some(view) = staged.topology {
            self.topology = view;
        }
        Ok(())
    }

    /// Steps 1-5: everything this host does on its own.
    async fn stage(
        &self,
        ctx: &RdgContext,
        handle: &RdgHandle,
        command_line: &str,
        topology: Option<Bytes>,
    ) -> Result<Staged, RdgError> {
        if !handle.mode().allows_write() {
            return Err(RdgError::InvalidArgument(
                "handle does not allow write".to_string(),
            ));
        }
        tracing::debug!(
            meta_num_hosts = handle.meta().num_hosts(),
            meta_policy_id = handle.meta().policy_id(),
            num_hosts = ctx.comm().num(),
            policy_id = self.part_header.metadata().policy_id,
            "rdg store"
        );

        let dir = handle.meta().dir().clone();
        let mut header = self.part_header.clone();
        if self.rdg_dir.as_ref() != Some(&dir) {
            header.unbind_from_storage();
        }

        let mut group = WriteGroup::new(ctx);
        let mut new_topology = None;
        if let Some(bytes) = topology {
            CsrTopology::parse(&bytes)?;
            let path = dir.rand_file(TOPOLOGY_FILE_NAME);
            header.set_topology_path(path.base_name());
            group.start_store(path, bytes.clone())?;
            new_topology = Some(FileView::owned(bytes));
        } else if self.topology_dirty {
            header.set_topology_path("");
        }

        let (lineage, meta) = self
            .do_store(ctx, handle, &mut header, group, command_line)
            .await?;
        Ok(Staged {
            header,
            lineage,
            meta,
            topology: new_topology,
        })
    }

    async fn do_store(
        &self,
        ctx: &RdgContext,
        handle: &RdgHandle,
        header: &mut PartHeader,
        mut group: WriteGroup,
        command_line: &str,
    ) -> Result<(RdgLineage, RdgMeta), RdgError> {
        let dir = handle.meta().dir().clone();
        let faults = ctx.faults().as_ref();

        if header.topology_path().is_empty() {
            let path = dir.rand_file(TOPOLOGY_FILE_NAME);
            header.set_topology_path(path.base_name());
            group.start_store(path, self.topology.bytes())?;
        }

        if self.node_table.num_columns() != header.node_prop_info_list().len() {
            fatal_column_mismatch(
                "node",
                self.node_table.num_columns(),
                header.node_prop_info_list().len(),
            );
        }
        if self.edge_table.num_columns() != header.edge_prop_info_list().len() {
            fatal_column_mismatch(
                "edge",
                self.edge_table.num_columns(),
                header.edge_prop_info_list().len(),
            );
        }
        // names become file names; a header that would not load back is
        // never written
        header.validate()?;

        let nodes = write_table(&self.node_table, header.node_prop_info_list(), &dir, &mut group)
            .inspect_err(|e| tracing::debug!(error = %e, "failed to write node properties"))?;
        header.set_node_prop_info_list(nodes);

        let edges = write_table(&self.edge_table, header.edge_prop_info_list(), &dir, &mut group)
            .inspect_err(|e| tracing::debug!(error = %e, "failed to write edge properties"))?;
        header.set_edge_prop_info_list(edges);

        let parts = write_part_arrays(
            &self.mirror_nodes,
            &self.master_nodes,
            self.local_to_global.as_ref(),
            header.part_prop_info_list(),
            &dir,
            &mut group,
        )?;
        header.set_part_prop_info_list(parts);

        let comm = ctx.comm();
        let mut lineage = self.lineage.clone();
        lineage.add_command_line(command_line);
        let metadata = *header.metadata();
        let new_meta = handle.meta().next_version(
            comm.num(),
            metadata.policy_id,
            metadata.transposed,
            lineage.clone(),
        );

        header.write(&dir, comm.id(), new_meta.version(), &mut group)?;

        faults.check(FaultPoint::BeforeFinish)?;
        group.finish().await?;
        faults.check(FaultPoint::AfterFinish)?;
        faults.check(FaultPoint::BeforeBarrier)?;
        Ok((lineage, new_meta))
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    /// Append node attribute columns. Rows must match the existing table.
    ///
    /// Names must be non-empty and free of `/`, since each column is stored
    /// in a file named after it.
    pub fn add_node_properties(&mut self, table: Table) -> Result<(), RdgError> {
        check_property_names(&table)?;
        let names: Vec<String> = table.column_names().into_iter().map(String::from).collect();
        self.node_table.add_columns(table)?;
        for name in names {
            self.part_header
                .append_node_prop_storage_info(PropStorageInfo::new(name));
        }
        Ok(())
    }

    /// Append edge attribute columns. Rows must match the existing table.
    pub fn add_edge_properties(&mut self, table: Table) -> Result<(), RdgError> {
        check_property_names(&table)?;
        let names: Vec<String> = table.column_names().into_iter().map(String::from).collect();
        self.edge_table.add_columns(table)?;
        for name in names {
            self.part_header
                .append_edge_prop_storage_info(PropStorageInfo::new(name));
        }
        Ok(())
    }

    /// Remove the node attribute at position `i`.
    pub fn remove_node_property(&mut self, i: usize) -> Result<(), RdgError> {
        self.node_table.remove_column(i)?;
        self.part_header.remove_node_prop_storage_info(i)?;
        Ok(())
    }

    /// Remove the edge attribute at position `i`.
    pub fn remove_edge_property(&mut self, i: usize) -> Result<(), RdgError> {
        self.edge_table.remove_column(i)?;
        self.part_header.remove_edge_prop_storage_info(i)?;
        Ok(())
    }

    /// Mutable node attribute at position `i`; it is rewritten on the next
    /// commit.
    pub fn node_property_mut(&mut self, i: usize) -> Option<&mut Column> {
        self.part_header.node_prop_info_mut(i)?.clear_path();
        self.node_table.column_mut(i)
    }

    /// Mutable edge attribute at position `i`; it is rewritten on the next
    /// commit.
    pub fn edge_property_mut(&mut self, i: usize) -> Option<&mut Column> {
        self.part_header.edge_prop_info_mut(i)?.clear_path();
        self.edge_table.column_mut(i)
    }

    /// Replace the topology. It is written to a fresh file on the next
    /// commit.
    pub fn set_topology(&mut self, topology: Bytes) -> Result<(), RdgError> {
        CsrTopology::parse(&topology)?;
        self.topology = FileView::owned(topology);
        self.topology_dirty = true;
        Ok(())
    }

    /// Add the mirror-node column of the next host.
    pub fn add_mirror_nodes(&mut self, column: Column) {
        let name = mirror_prop_name(self.mirror_nodes.len());
        self.part_header.forget_part_prop(&name);
        self.mirror_nodes.push(column.renamed(name));
    }

    /// Add the master-node column of the next host.
    pub fn add_master_nodes(&mut self, column: Column) {
        let name = master_prop_name(self.master_nodes.len());
        self.part_header.forget_part_prop(&name);
        self.master_nodes.push(column.renamed(name));
    }

    /// Set the local-to-global node id column.
    pub fn set_local_to_global_vector(&mut self, column: Column) {
        self.part_header.forget_part_prop(LOCAL_TO_GLOBAL_PROP_NAME);
        self.local_to_global = Some(column.renamed(LOCAL_TO_GLOBAL_PROP_NAME));
    }

    /// Persist every attribute on commit.
    pub fn mark_all_properties_persistent(&mut self) {
        self.part_header.mark_all_properties_persistent();
    }

    /// Persist exactly the named node attributes on commit.
    pub fn mark_node_properties_persistent(&mut self, names: &[String]) -> Result<(), RdgError> {
        self.part_header.mark_node_properties_persistent(names)
    }

    /// Persist exactly the named edge attributes on commit.
    pub fn mark_edge_properties_persistent(&mut self, names: &[String]) -> Result<(), RdgError> {
        self.part_header.mark_edge_properties_persistent(names)
    }

    /// Replace the partitioning policy fields.
    pub fn set_part_metadata(&mut self, metadata: PartitionMetadata) {
        self.part_header.set_metadata(metadata);
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Check the header's structural invariants.
    pub fn validate(&self) -> Result<(), RdgError> {
        self.part_header.validate()
    }

    /// Node attribute table.
    #[must_use]
    pub fn node_table(&self) -> &Table {
        &self.node_table
    }

    /// Edge attribute table.
    #[must_use]
    pub fn edge_table(&self) -> &Table {
        &self.edge_table
    }

    /// Topology buffer.
    #[must_use]
    pub fn topology(&self) -> &FileView {
        &self.topology
    }

    /// Mirror-node columns, one per host.
    #[must_use]
    pub fn mirror_nodes(&self) -> &[Column] {
        &self.mirror_nodes
    }

    /// Master-node columns, one per host.
    #[must_use]
    pub fn master_nodes(&self) -> &[Column] {
        &self.master_nodes
    }

    /// Local-to-global node id column.
    #[must_use]
    pub fn local_to_global_vector(&self) -> Option<&Column> {
        self.local_to_global.as_ref()
    }

    /// Storage header.
    #[must_use]
    pub fn part_header(&self) -> &PartHeader {
        &self.part_header
    }

    /// Partitioning policy fields.
    #[must_use]
    pub fn part_metadata(&self) -> &PartitionMetadata {
        self.part_header.metadata()
    }

    /// Commands that produced this partition's version.
    #[must_use]
    pub fn lineage(&self) -> &RdgLineage {
        &self.lineage
    }

    /// Directory this partition was loaded from or last stored to.
    #[must_use]
    pub fn rdg_dir(&self) -> Option<&Uri> {
        self.rdg_dir.as_ref()
    }
}

/// A partition written to storage but not yet published.
#[derive(Debug)]
struct Staged {
    header: PartHeader,
    lineage: RdgLineage,
    meta: RdgMeta,
    topology: Option<FileView>,
}

/// Steps 7-8: make `new_meta` the latest version of `old`'s directory.
async fn publish(ctx: &RdgContext, old: &RdgMeta, new_meta: &RdgMeta) -> Result<(), RdgError> {
    let comm = ctx.comm();
    let faults = ctx.faults().as_ref();
    let dir = old.dir();
    let old_version = old.version();

    let ns = ctx.name_server();
    one_host_only(comm, || async move {
        faults.check(FaultPoint::BeforeNamingUpdate)?;
        ns.update(dir, old_version, new_meta).await?;
        faults.check(FaultPoint::AfterNamingUpdate)
    })
    .await
    .inspect_err(|e| tracing::error!(%dir, error = %e, "unable to update rdg"))?;

    let storage = ctx.storage();
    one_host_only(comm, || async move {
        faults.check(FaultPoint::BeforeMetaWrite)?;
        let text = new_meta.to_json_string()?;
        storage.put(&new_meta.meta_file(), Bytes::from(text)).await?;
        faults.check(FaultPoint::AfterMetaWrite)
    })
    .await
    .inspect_err(|e| {
        tracing::error!(file = %new_meta.meta_file(), error = %e, "commit pointer write failed")
    })?;

    tracing::info!(
        %dir,
        version = new_meta.version(),
        host = comm.id(),
        "rdg committed"
    );
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
