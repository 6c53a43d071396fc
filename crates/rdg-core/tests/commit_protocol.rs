//! # Commit Protocol Tests
//!
//! A commit either publishes a complete new version or leaves the previous
//! one as the latest, on every host.
//!
//! ## Groups
//! - Atomicity under injected faults at every checkpoint
//! - Storage write failures
//! - Concurrent writers and naming conflicts
//! - Incremental persistence
//! - Multi-host commits

use rdg_core::{
    Column, FailingStorage, FaultPlan, FaultPoint, FaultSensitivity, FileStorageRegistry,
    LocalComm, MemFileStorage, MemNameServer, OpenMode, Rdg, RdgContext, RdgError, RdgHandle,
    RdgMeta, Table, Uri,
};
use std::sync::Arc;
use std::time::Duration;

fn nodes() -> Table {
    Table::from_columns(vec![
        Column::new("id", vec![1i64, 2]),
        Column::new("label", vec!["A".to_string(), "B".to_string()]),
    ])
    .expect("table")
}

fn scores() -> Table {
    Table::from_columns(vec![Column::new("score", vec![0.5f64, 0.25])]).expect("table")
}

async fn create_and_open(ctx: &RdgContext, dir: &Uri) -> RdgHandle {
    RdgHandle::create(ctx, dir).await.expect("create");
    RdgHandle::open(ctx, dir, OpenMode::ReadWrite)
        .await
        .expect("open")
}

/// A directory at version 1 with two node attributes, and its partition.
async fn committed_v1(ctx: &RdgContext, dir: &Uri) -> (Rdg, RdgHandle) {
    let mut handle = create_and_open(ctx, dir).await;
    let mut rdg = Rdg::new();
    rdg.add_node_properties(nodes()).expect("add");
    rdg.store(ctx, &mut handle, "import", None)
        .await
        .expect("store v1");
    (rdg, handle)
}

fn mem_context() -> (RdgContext, Arc<MemFileStorage>) {
    let mem = Arc::new(MemFileStorage::new());
    let mut storage = FileStorageRegistry::new();
    storage.register(mem.clone());
    let ctx = RdgContext::builder()
        .storage(storage)
        .build()
        .expect("context");
    (ctx, mem)
}

// =============================================================================
// ATOMICITY UNDER INJECTED FAULTS
// =============================================================================

mod atomicity {
    use super::*;

    /// A fault at any checkpoint before publication keeps the old version
    /// latest, leaves the partition and handle untouched, and a retry
    /// succeeds.
    #[tokio::test]
    async fn faults_before_publication_keep_previous_version() {
        for point in FaultPoint::ALL
            .into_iter()
            .filter(|p| p.precedes_publication())
        {
            let ctx = RdgContext::builder().build().expect("context");
            let dir = Uri::parse(format!("mem://atomicity/{point:?}")).expect("uri");
            let (mut rdg, mut handle) = committed_v1(&ctx, &dir).await;

            rdg.add_node_properties(scores()).expect("add");
            let header_before = rdg.part_header().clone();
            let lineage_before = rdg.lineage().clone();

            ctx.faults().arm(FaultPlan::AtPoint { point });
            let err = rdg
                .store(&ctx, &mut handle, "score", None)
                .await
                .expect_err("fault fires");
            assert!(
                matches!(err, RdgError::FaultInjected(p) if p == point),
                "{point:?}: {err}"
            );

            let latest = ctx.name_server().lookup(&dir).await.expect("lookup");
            assert_eq!(latest.version(), 1, "{point:?}");
            assert_eq!(handle.meta().version(), 1, "{point:?}");
            assert_eq!(rdg.part_header(), &header_before, "{point:?}");
            assert_eq!(rdg.lineage(), &lineage_before, "{point:?}");

            // readers still see exactly the old attributes
            let reader = Rdg::make(&ctx, &handle, None, None).await.expect("make");
            assert_eq!(reader.node_table().column_names(), vec!["id", "label"]);

            rdg.store(&ctx, &mut handle, "score", None)
                .await
                .expect("retry");
            assert_eq!(handle.meta().version(), 2, "{point:?}");
            let reader = Rdg::make(&ctx, &handle, None, None).await.expect("make");
            assert_eq!(
                reader.node_table().column_names(),
                vec!["id", "label", "score"]
            );
        }
    }

    /// Once the naming service accepted the version it is published: the
    /// stale handle conflicts, a reopened one sees the new version.
    #[tokio::test]
    async fn faults_after_publication_leave_version_visible() {
        for point in FaultPoint::ALL
            .into_iter()
            .filter(|p| !p.precedes_publication())
        {
            let ctx = RdgContext::builder().build().expect("context");
            let dir = Uri::parse(format!("mem://published/{point:?}")).expect("uri");
            let (mut rdg, mut handle) = committed_v1(&ctx, &dir).await;
            rdg.add_node_properties(scores()).expect("add");

            ctx.faults().arm(FaultPlan::AtPoint { point });
            let err = rdg
                .store(&ctx, &mut handle, "score", None)
                .await
                .expect_err("fault fires");
            assert!(matches!(err, RdgError::FaultInjected(_)), "{point:?}");
            assert_eq!(handle.meta().version(), 1, "{point:?}");

            let latest = ctx.name_server().lookup(&dir).await.expect("lookup");
            assert_eq!(latest.version(), 2, "{point:?}");

            let result = rdg.store(&ctx, &mut handle, "again", None).await;
            assert!(
                matches!(result, Err(RdgError::NamingConflict { .. })),
                "{point:?}"
            );

            let reopened = RdgHandle::open(&ctx, &dir, OpenMode::Read)
                .await
                .expect("open");
            let reader = Rdg::make(&ctx, &reopened, None, None).await.expect("make");
            assert_eq!(reader.node_table().num_columns(), 3, "{point:?}");
        }
    }

    #[tokio::test]
    async fn counted_plan_fires_at_first_high_checkpoint() {
        let ctx = RdgContext::builder().build().expect("context");
        let dir = Uri::parse("mem://atomicity/counted").expect("uri");
        let (mut rdg, mut handle) = committed_v1(&ctx, &dir).await;

        ctx.faults().arm(FaultPlan::AfterCount {
            count: 1,
            sensitivity: FaultSensitivity::High,
        });
        let result = rdg.store(&ctx, &mut handle, "noop", None).await;
        assert!(matches!(
            result,
            Err(RdgError::FaultInjected(FaultPoint::BeforeFinish))
        ));
        assert_eq!(ctx.faults().fired(), Some(FaultPoint::BeforeFinish));
        assert_eq!(
            ctx.name_server()
                .lookup(&dir)
                .await
                .expect("lookup")
                .version(),
            1
        );
    }

    #[tokio::test]
    async fn plan_from_config_is_armed_at_build() {
        let config = rdg_core::RdgConfig::from_toml_str(
            r#"
            [fault_plan]
            mode = "at_point"
            point = "before_naming_update"
            "#,
        )
        .expect("config");
        let ctx = RdgContext::builder().config(config).build().expect("context");
        let dir = Uri::parse("mem://atomicity/config").expect("uri");
        let mut handle = create_and_open(&ctx, &dir).await;

        let mut rdg = Rdg::new();
        rdg.add_node_properties(nodes()).expect("add");
        let result = rdg.store(&ctx, &mut handle, "import", None).await;
        assert!(matches!(
            result,
            Err(RdgError::FaultInjected(FaultPoint::BeforeNamingUpdate))
        ));
        assert!(
            ctx.name_server()
                .lookup(&dir)
                .await
                .expect("lookup")
                .is_empty_rdg()
        );
    }
}

// =============================================================================
// STORAGE WRITE FAILURES
// =============================================================================

mod write_failures {
    use super::*;

    fn failing_context() -> (RdgContext, Arc<FailingStorage>) {
        let failing = Arc::new(FailingStorage::new(Arc::new(MemFileStorage::new())));
        let mut storage = FileStorageRegistry::new();
        storage.register(failing.clone());
        let ctx = RdgContext::builder()
            .storage(storage)
            .build()
            .expect("context");
        (ctx, failing)
    }

    #[tokio::test]
    async fn failed_column_write_aborts_commit() {
        let (ctx, failing) = failing_context();
        let dir = Uri::parse("mem://failures/column").expect("uri");
        let (mut rdg, mut handle) = committed_v1(&ctx, &dir).await;

        rdg.add_node_properties(scores()).expect("add");
        failing.only_matching("score");
        failing.fail_puts_from(1);

        let result = rdg.store(&ctx, &mut handle, "score", None).await;
        assert!(matches!(result, Err(RdgError::IoError(_))));
        assert_eq!(failing.failed_puts(), 1);
        assert_eq!(handle.meta().version(), 1);
        assert!(!rdg.part_header().node_prop_info_list()[2].is_persisted());

        failing.clear_failures();
        rdg.store(&ctx, &mut handle, "score", None)
            .await
            .expect("retry");
        assert_eq!(handle.meta().version(), 2);
    }

    #[tokio::test]
    async fn failed_header_write_aborts_commit() {
        let (ctx, failing) = failing_context();
        let dir = Uri::parse("mem://failures/header").expect("uri");
        let (mut rdg, mut handle) = committed_v1(&ctx, &dir).await;

        failing.only_matching("part_vers");
        failing.fail_puts_from(1);
        let result = rdg.store(&ctx, &mut handle, "noop", None).await;
        assert!(matches!(result, Err(RdgError::IoError(_))));

        let latest = ctx.name_server().lookup(&dir).await.expect("lookup");
        assert_eq!(latest.version(), 1);
        let exists = ctx
            .storage()
            .exists(&RdgMeta::file_name(&dir, 2))
            .await
            .expect("exists");
        assert!(!exists, "no pointer file for an unpublished version");
    }
}

// =============================================================================
// CONCURRENT WRITERS
// =============================================================================

mod conflicts {
    use super::*;

    /// Two writers open the same version; the second commit loses.
    #[tokio::test]
    async fn second_writer_gets_naming_conflict() {
        let ctx = RdgContext::builder().build().expect("context");
        let dir = Uri::parse("mem://conflicts/two").expect("uri");
        let mut first = create_and_open(&ctx, &dir).await;
        let mut second = RdgHandle::open(&ctx, &dir, OpenMode::ReadWrite)
            .await
            .expect("open");

        let mut a = Rdg::new();
        a.add_node_properties(nodes()).expect("add");
        a.store(&ctx, &mut first, "writer a", None)
            .await
            .expect("first wins");

        let mut b = Rdg::new();
        b.add_node_properties(scores()).expect("add");
        let err = b
            .store(&ctx, &mut second, "writer b", None)
            .await
            .expect_err("second loses");
        match err {
            RdgError::NamingConflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            other => unreachable!("unexpected error {other:?}"),
        }
        assert_eq!(second.meta().version(), 0);
        assert!(b.lineage().is_empty());

        let latest = ctx.name_server().lookup(&dir).await.expect("lookup");
        assert_eq!(latest.lineage().command_lines(), ["writer a"]);
    }

    #[tokio::test]
    async fn store_into_new_directory_rewrites_everything() {
        let (ctx, mem) = mem_context();
        let src = Uri::parse("mem://conflicts/src").expect("uri");
        let dst = Uri::parse("mem://conflicts/dst").expect("uri");
        let (mut rdg, _) = committed_v1(&ctx, &src).await;

        let mut dst_handle = create_and_open(&ctx, &dst).await;
        rdg.store(&ctx, &mut dst_handle, "copy", None)
            .await
            .expect("store");

        // two columns, topology, header, pointers for versions 0 and 1
        let files = mem.list(&dst);
        assert_eq!(files.len(), 6, "{files:?}");
        assert_eq!(rdg.rdg_dir(), Some(&dst));
        let copy = Rdg::make(&ctx, &dst_handle, None, None).await.expect("make");
        assert_eq!(copy.node_table(), rdg.node_table());
    }
}

// =============================================================================
// INCREMENTAL PERSISTENCE
// =============================================================================

mod incremental {
    use super::*;

    /// Storing twice without a mutation writes no attribute, only the new
    /// header and pointer, and the header content is unchanged.
    #[tokio::test]
    async fn second_store_rewrites_nothing() {
        let (ctx, mem) = mem_context();
        let dir = Uri::parse("mem://incremental/idempotent").expect("uri");
        let (mut rdg, mut handle) = committed_v1(&ctx, &dir).await;
        let puts_before = mem.put_count();

        rdg.store(&ctx, &mut handle, "again", None)
            .await
            .expect("store v2");
        assert_eq!(mem.put_count() - puts_before, 2);

        let v1 = ctx
            .storage()
            .get(&RdgMeta::partition_file_name(&dir, 0, 1))
            .await
            .expect("v1 header");
        let v2 = ctx
            .storage()
            .get(&RdgMeta::partition_file_name(&dir, 0, 2))
            .await
            .expect("v2 header");
        assert_eq!(v1, v2);
        assert_eq!(
            handle.meta().lineage().command_lines(),
            ["import", "again"]
        );
    }

    #[tokio::test]
    async fn only_mutated_column_is_written() {
        let (ctx, mem) = mem_context();
        let dir = Uri::parse("mem://incremental/mutated").expect("uri");
        let (mut rdg, mut handle) = committed_v1(&ctx, &dir).await;
        let puts_before = mem.put_count();

        rdg.node_property_mut(0)
            .expect("id")
            .typed_mut::<i64>()
            .expect("int64")[0] = 7;
        rdg.store(&ctx, &mut handle, "bump", None)
            .await
            .expect("store");
        assert_eq!(mem.put_count() - puts_before, 3);

        let loaded = Rdg::make(&ctx, &handle, None, None).await.expect("make");
        assert_eq!(
            loaded
                .node_table()
                .column(0)
                .expect("id")
                .typed::<i64>()
                .expect("int64"),
            &[7, 2]
        );
    }

    #[tokio::test]
    async fn unpersisted_attribute_is_not_committed() {
        let ctx = RdgContext::builder().build().expect("context");
        let dir = Uri::parse("mem://incremental/scratch").expect("uri");
        let (mut rdg, mut handle) = committed_v1(&ctx, &dir).await;

        rdg.add_node_properties(scores()).expect("add");
        rdg.mark_node_properties_persistent(&["id".to_string(), "label".to_string()])
            .expect("mark");
        rdg.store(&ctx, &mut handle, "scratch", None)
            .await
            .expect("store");

        let loaded = Rdg::make(&ctx, &handle, None, None).await.expect("make");
        assert_eq!(loaded.node_table().column_names(), vec!["id", "label"]);
    }
}

// =============================================================================
// MULTI-HOST COMMITS
// =============================================================================

mod multi_host {
    use super::*;
    use rdg_core::CsrTopology;

    /// Longest a group may take to agree on an outcome.
    const AGREE_WITHIN: Duration = Duration::from_secs(10);

    /// Two hosts sharing one store and naming service; host 1 writes through
    /// the returned `FailingStorage`.
    fn hosts_with_flaky_second() -> (RdgContext, RdgContext, Arc<FailingStorage>) {
        let mem = Arc::new(MemFileStorage::new());
        let ns = Arc::new(MemNameServer::new());
        let failing = Arc::new(FailingStorage::new(mem.clone()));
        let mut comms = LocalComm::group(2).into_iter();

        let mut healthy = FileStorageRegistry::new();
        healthy.register(mem);
        let h0 = RdgContext::builder()
            .storage(healthy)
            .name_server(ns.clone())
            .comm(Arc::new(comms.next().expect("host 0")))
            .build()
            .expect("context");

        let mut flaky = FileStorageRegistry::new();
        flaky.register(failing.clone());
        let h1 = RdgContext::builder()
            .storage(flaky)
            .name_server(ns)
            .comm(Arc::new(comms.next().expect("host 1")))
            .build()
            .expect("context");
        (h0, h1, failing)
    }

    async fn store_host(ctx: RdgContext, dir: Uri) -> Result<RdgHandle, RdgError> {
        let host = ctx.comm().id();
        let mut handle = RdgHandle::open(&ctx, &dir, OpenMode::ReadWrite).await?;
        let mut rdg = Rdg::new();
        rdg.set_topology(CsrTopology::encode(&[1, 1], &[1])?)?;
        rdg.add_node_properties(Table::from_columns(vec![Column::new(
            "owner",
            vec![host, host],
        )])?)?;
        rdg.store(&ctx, &mut handle, "partition", None).await?;
        Ok(handle)
    }

    #[tokio::test]
    async fn every_host_commits_its_partition() {
        let base = RdgContext::builder().build().expect("context");
        let dir = Uri::parse("mem://multi/two").expect("uri");
        RdgHandle::create(&base, &dir).await.expect("create");

        let mut comms = LocalComm::group(2).into_iter();
        let h0 = base.for_host(Arc::new(comms.next().expect("host 0")));
        let h1 = base.for_host(Arc::new(comms.next().expect("host 1")));

        let (r0, r1) = tokio::join!(
            store_host(h0.clone(), dir.clone()),
            store_host(h1.clone(), dir.clone())
        );
        let (handle0, handle1) = (r0.expect("host 0"), r1.expect("host 1"));
        assert_eq!(handle0.meta(), handle1.meta());
        assert_eq!(handle0.meta().num_hosts(), 2);

        for (ctx, handle) in [(&h0, &handle0), (&h1, &handle1)] {
            let rdg = Rdg::make(ctx, handle, None, None).await.expect("make");
            let owner = rdg
                .node_table()
                .column(0)
                .expect("owner")
                .typed::<u32>()
                .expect("uint32")
                .to_vec();
            assert_eq!(owner, vec![ctx.comm().id(); 2]);
        }

        // loading with the wrong host count is refused
        let result = Rdg::make(&base, &handle0, None, None).await;
        assert!(matches!(result, Err(RdgError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn leader_fault_fails_every_host() {
        let base = RdgContext::builder().build().expect("context");
        let dir = Uri::parse("mem://multi/leader").expect("uri");
        RdgHandle::create(&base, &dir).await.expect("create");

        let mut comms = LocalComm::group(2).into_iter();
        let h0 = base.for_host(Arc::new(comms.next().expect("host 0")));
        let h1 = base.for_host(Arc::new(comms.next().expect("host 1")));
        h0.faults().arm(FaultPlan::AtPoint {
            point: FaultPoint::BeforeNamingUpdate,
        });

        let (r0, r1) = tokio::join!(store_host(h0, dir.clone()), store_host(h1, dir.clone()));
        assert!(matches!(
            r0,
            Err(RdgError::FaultInjected(FaultPoint::BeforeNamingUpdate))
        ));
        assert!(matches!(r1, Err(RdgError::LeaderFailed(_))));
        assert!(
            base.name_server()
                .lookup(&dir)
                .await
                .expect("lookup")
                .is_empty_rdg()
        );
    }

    #[tokio::test]
    async fn follower_write_failure_fails_every_host() {
        let (h0, h1, failing) = hosts_with_flaky_second();
        let dir = Uri::parse("mem://multi/follower").expect("uri");
        RdgHandle::create(&h0, &dir).await.expect("create");

        failing.only_matching("part_vers");
        failing.fail_puts_from(1);
        let (r0, r1) = tokio::time::timeout(AGREE_WITHIN, async {
            tokio::join!(
                store_host(h0.clone(), dir.clone()),
                store_host(h1.clone(), dir.clone())
            )
        })
        .await
        .expect("hosts must agree on the outcome");

        assert!(matches!(r1, Err(RdgError::IoError(_))));
        match r0 {
            Err(RdgError::HostFailed(msg)) => assert!(msg.contains("host 1")),
            other => unreachable!("unexpected outcome {other:?}"),
        }
        let latest = h0.name_server().lookup(&dir).await.expect("lookup");
        assert!(latest.is_empty_rdg());

        // the group recovers once the store does
        failing.clear_failures();
        let (r0, r1) = tokio::time::timeout(AGREE_WITHIN, async {
            tokio::join!(
                store_host(h0.clone(), dir.clone()),
                store_host(h1.clone(), dir.clone())
            )
        })
        .await
        .expect("hosts must agree on the outcome");
        assert_eq!(r0.expect("host 0").meta().version(), 1);
        assert_eq!(r1.expect("host 1").meta().version(), 1);
    }

    #[tokio::test]
    async fn follower_fault_around_exchange_fails_every_host() {
        for point in [FaultPoint::BeforeBarrier, FaultPoint::AfterBarrier] {
            let base = RdgContext::builder().build().expect("context");
            let dir = Uri::parse("mem://multi/follower-fault").expect("uri");
            RdgHandle::create(&base, &dir).await.expect("create");

            let mut comms = LocalComm::group(2).into_iter();
            let h0 = base.for_host(Arc::new(comms.next().expect("host 0")));
            let h1 = base.for_host(Arc::new(comms.next().expect("host 1")));
            h1.faults().arm(FaultPlan::AtPoint { point });

            let (r0, r1) = tokio::time::timeout(AGREE_WITHIN, async {
                tokio::join!(store_host(h0, dir.clone()), store_host(h1, dir.clone()))
            })
            .await
            .expect("hosts must agree on the outcome");

            assert!(matches!(r1, Err(RdgError::FaultInjected(p)) if p == point));
            assert!(matches!(r0, Err(RdgError::HostFailed(_))));
            let latest = base.name_server().lookup(&dir).await.expect("lookup");
            assert!(latest.is_empty_rdg(), "{point:?} published a version");
        }
    }
}
