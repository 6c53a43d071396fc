//! # Column Storage
//!
//! Writing attribute columns to their own files and reading them back.
//!
//! Columns are stored one per file, never packed, so a partial load fetches
//! only the requested attributes. Every write goes to a freshly generated
//! name (`<name>-<uuid>`): files are immutable once written and concurrent
//! writers never collide.
//!
//! Writes are incremental: a column whose storage entry already names a
//! file is left untouched.

use crate::column::{Column, Table};
use crate::fault::FaultPoint;
use crate::formats::{column_from_bytes, column_to_bytes};
use crate::part_header::PropStorageInfo;
use crate::primitives::{LOCAL_TO_GLOBAL_PROP_NAME, master_prop_name, mirror_prop_name};
use crate::storage::FileStorageRegistry;
use crate::write_group::WriteGroup;
use crate::{RdgError, Uri};
use bytes::Bytes;
use tokio::task::JoinSet;

// =============================================================================
// WRITING
// =============================================================================

/// Reject attribute names that cannot name a column file.
pub fn check_property_names(table: &Table) -> Result<(), RdgError> {
    for name in table.column_names() {
        check_property_name(name)?;
    }
    Ok(())
}

pub(crate) fn check_property_name(name: &str) -> Result<(), RdgError> {
    if name.is_empty() {
        return Err(RdgError::InvalidArgument(
            "property name must not be empty".to_string(),
        ));
    }
    if name.contains('/') {
        return Err(RdgError::InvalidArgument(format!(
            "property name {name} must not contain '/'"
        )));
    }
    Ok(())
}

/// Encode `column` and enqueue it under a fresh name derived from `name`.
///
/// Returns the base name of the file.
pub fn store_column_at_name(
    column: &Column,
    dir: &Uri,
    name: &str,
    group: &mut WriteGroup,
) -> Result<String, RdgError> {
    let bytes = column_to_bytes(column)?;
    let uri = dir.rand_file(name);
    let path = uri.base_name().to_string();
    group.start_store(uri, Bytes::from(bytes))?;
    Ok(path)
}

/// Write every dirty column of `table` and return the updated entries.
///
/// `props` must hold one entry per column, in table order. Entries that
/// already name a file, or are not marked to persist, are kept as they are.
/// On error no updated list is returned.
pub fn write_table(
    table: &Table,
    props: &[PropStorageInfo],
    dir: &Uri,
    group: &mut WriteGroup,
) -> Result<Vec<PropStorageInfo>, RdgError> {
    let mut next = props.to_vec();
    let mut written = 0usize;

    for (i, info) in next.iter_mut().enumerate() {
        if !info.is_dirty() {
            continue;
        }
        let column = table.column(i).ok_or_else(|| {
            RdgError::InvalidArgument(format!("no column for property {}", info.name()))
        })?;
        let path = store_column_at_name(column, dir, info.name(), group)?;
        info.set_path(path);
        written += 1;
    }
    group.faults().check(FaultPoint::AfterColumnWrites)?;

    tracing::debug!(%dir, written, total = props.len(), "table written");
    Ok(next)
}

/// Write the partition-boundary columns and return their entries in
/// canonical order: mirrors, masters, then the local-to-global vector.
///
/// A column whose entry in `existing` already names a file is not rewritten.
pub fn write_part_arrays(
    mirror_nodes: &[Column],
    master_nodes: &[Column],
    local_to_global: Option<&Column>,
    existing: &[PropStorageInfo],
    dir: &Uri,
    group: &mut WriteGroup,
) -> Result<Vec<PropStorageInfo>, RdgError> {
    let named = mirror_nodes
        .iter()
        .enumerate()
        .map(|(i, c)| (mirror_prop_name(i), c))
        .chain(
            master_nodes
                .iter()
                .enumerate()
                .map(|(i, c)| (master_prop_name(i), c)),
        )
        .chain(local_to_global.map(|c| (LOCAL_TO_GLOBAL_PROP_NAME.to_string(), c)));

    let mut next = Vec::new();
    for (name, column) in named {
        let reused = existing
            .iter()
            .find(|p| p.name() == name && p.is_persisted())
            .cloned();
        let info = match reused {
            Some(info) => info,
            None => {
                let path = store_column_at_name(column, dir, &name, group)?;
                PropStorageInfo::persisted(name, path)
            }
        };
        next.push(info);
    }

    tracing::debug!(
        %dir,
        mirrors = mirror_nodes.len(),
        masters = master_nodes.len(),
        local_to_global = local_to_global.is_some(),
        "partition arrays written"
    );
    Ok(next)
}

// =============================================================================
// READING
// =============================================================================

/// Fetch and decode the columns named by `props`, concurrently.
///
/// Columns come back in `props` order. Every entry must name a file; the
/// decoded column must carry the entry's name.
pub async fn load_columns(
    storage: &FileStorageRegistry,
    dir: &Uri,
    props: &[PropStorageInfo],
    max_bytes: usize,
) -> Result<Vec<Column>, RdgError> {
    let mut tasks = JoinSet::new();
    for (i, info) in props.iter().enumerate() {
        if !info.is_persisted() {
            return Err(RdgError::InvalidArgument(format!(
                "property {} has no stored file",
                info.name()
            )));
        }
        let uri = dir.join(info.path());
        let backend = storage.resolve(&uri)?;
        let name = info.name().to_string();
        tasks.spawn(async move {
            let bytes = backend.get(&uri).await?;
            let column = column_from_bytes(&bytes, max_bytes)?;
            if column.name() != name {
                return Err(RdgError::InvalidArgument(format!(
                    "{uri} holds column {} instead of {name}",
                    column.name()
                )));
            }
            Ok((i, column))
        });
    }

    let mut slots: Vec<Option<Column>> = vec![None; props.len()];
    while let Some(joined) = tasks.join_next().await {
        let (i, column) =
            joined.map_err(|e| RdgError::IoError(format!("load task failed: {e}")))??;
        slots[i] = Some(column);
    }

    slots
        .into_iter()
        .zip(props)
        .map(|(slot, info)| {
            slot.ok_or_else(|| RdgError::IoError(format!("column {} was not loaded", info.name())))
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RdgContext;
    use crate::storage::MemFileStorage;
    use std::sync::Arc;

    const LIMIT: usize = 1 << 20;

    fn setup() -> (RdgContext, Arc<MemFileStorage>, Uri) {
        let mem = Arc::new(MemFileStorage::new());
        let mut registry = FileStorageRegistry::new();
        registry.register(mem.clone());
        let ctx = RdgContext::builder()
            .storage(registry)
            .build()
            .expect("context");
        (ctx, mem, Uri::parse("mem://g").expect("uri"))
    }

    fn table() -> Table {
        Table::from_columns(vec![
            Column::new("weight", vec![0.5f64, 1.5]),
            Column::new("label", vec!["A".to_string(), "B".to_string()]),
        ])
        .expect("table")
    }

    #[tokio::test]
    async fn only_dirty_columns_are_written() {
        let (ctx, mem, dir) = setup();
        let props = vec![
            PropStorageInfo::persisted("weight", "weight-old"),
            PropStorageInfo::new("label"),
        ];

        let mut group = WriteGroup::new(&ctx);
        let next = write_table(&table(), &props, &dir, &mut group).expect("write");
        group.finish().await.expect("finish");

        assert_eq!(mem.put_count(), 1);
        assert_eq!(next[0].path(), "weight-old");
        assert!(next[1].path().starts_with("label-"));
    }

    #[tokio::test]
    async fn failure_returns_no_partial_list() {
        let (ctx, _mem, dir) = setup();
        let props = vec![PropStorageInfo::new("weight"), PropStorageInfo::new("label")];
        ctx.faults().arm(crate::fault::FaultPlan::AtPoint {
            point: FaultPoint::AfterColumnWrites,
        });
        let mut group = WriteGroup::new(&ctx);
        let result = write_table(&table(), &props, &dir, &mut group);
        assert!(matches!(result, Err(RdgError::FaultInjected(_))));
        assert!(props.iter().all(PropStorageInfo::is_dirty));
    }

    #[tokio::test]
    async fn load_returns_columns_in_entry_order() {
        let (ctx, _mem, dir) = setup();
        let props = vec![PropStorageInfo::new("weight"), PropStorageInfo::new("label")];
        let mut group = WriteGroup::new(&ctx);
        let written = write_table(&table(), &props, &dir, &mut group).expect("write");
        group.finish().await.expect("finish");

        let reversed: Vec<_> = written.iter().rev().cloned().collect();
        let columns = load_columns(ctx.storage(), &dir, &reversed, LIMIT)
            .await
            .expect("load");
        let names: Vec<_> = columns.iter().map(Column::name).collect();
        assert_eq!(names, vec!["label", "weight"]);
        assert_eq!(columns[1].typed::<f64>().expect("f64"), &[0.5, 1.5]);
    }

    #[tokio::test]
    async fn load_missing_file_fails() {
        let (ctx, _mem, dir) = setup();
        let props = vec![PropStorageInfo::persisted("weight", "weight-gone")];
        let result = load_columns(ctx.storage(), &dir, &props, LIMIT).await;
        assert!(matches!(result, Err(RdgError::NotFound(_))));
    }

    #[tokio::test]
    async fn part_arrays_reuse_persisted_entries() {
        let (ctx, mem, dir) = setup();
        let mirrors = vec![Column::new("mirror_nodes_0", vec![3u64, 4])];
        let masters = vec![
            Column::new("master_nodes_0", vec![0u64]),
            Column::new("master_nodes_1", vec![1u64]),
        ];
        let l2g = Column::new(LOCAL_TO_GLOBAL_PROP_NAME, vec![10u64, 11, 12]);

        let mut group = WriteGroup::new(&ctx);
        let first =
            write_part_arrays(&mirrors, &masters, Some(&l2g), &[], &dir, &mut group).expect("write");
        group.finish().await.expect("finish");
        let names: Vec<_> = first.iter().map(PropStorageInfo::name).collect();
        assert_eq!(
            names,
            vec![
                "mirror_nodes_0",
                "master_nodes_0",
                "master_nodes_1",
                "local_to_global_vector"
            ]
        );
        assert_eq!(mem.put_count(), 4);

        let mut group = WriteGroup::new(&ctx);
        let second = write_part_arrays(&mirrors, &masters, Some(&l2g), &first, &dir, &mut group)
            .expect("rewrite");
        group.finish().await.expect("finish");
        assert_eq!(second, first);
        assert_eq!(mem.put_count(), 4);
    }
}
