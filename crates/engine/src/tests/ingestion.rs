use crate::{
    error::SyncError,
    ingestion::IngestionCoordinator,
    tests::fake::{FakeSource, FakeTarget, SourceState, TargetState, int, text},
};
use model::core::{
    column::{ColumnSpec, TableSchema},
    policy::CdcPolicy,
    table::{GENERATED_KEY_COLUMN, TableSpec},
};
use model::records::value::Value;
use std::sync::{Arc, Mutex};

type Ops = Arc<Mutex<Vec<String>>>;

fn keyed_schema() -> TableSchema {
    TableSchema::new(vec![
        ColumnSpec::new("id", "NUMBER(38,0)", false, None, true),
        ColumnSpec::new("v", "VARCHAR", true, None, false),
    ])
}

fn keyless_schema() -> TableSchema {
    TableSchema::new(vec![ColumnSpec::new("v", "VARCHAR", true, None, false)])
}

fn orders(policy: CdcPolicy) -> TableSpec {
    TableSpec::new("sales_db", "public", "orders", policy).unwrap()
}

struct Fixture {
    coordinator: IngestionCoordinator,
    table: TableSpec,
    source: Arc<Mutex<SourceState>>,
    target: Arc<Mutex<TargetState>>,
    ops: Ops,
}

fn fixture(
    policy: CdcPolicy,
    schema: TableSchema,
    target_columns: Vec<ColumnSpec>,
    primary_keys: Vec<String>,
) -> Fixture {
    let ops: Ops = Arc::new(Mutex::new(Vec::new()));
    let source = FakeSource::new(schema, ops.clone());
    let target = FakeTarget::new(ops.clone()).with_table(target_columns, primary_keys);
    let source_state = source.handle();
    let target_state = target.handle();
    let coordinator = IngestionCoordinator::new(Box::new(source), Box::new(target)).unwrap();
    Fixture {
        coordinator,
        table: orders(policy),
        source: source_state,
        target: target_state,
        ops,
    }
}

fn keyed_fixture(policy: CdcPolicy) -> Fixture {
    fixture(
        policy,
        keyed_schema(),
        vec![
            ColumnSpec::new("id", "NUMERIC(38,0)", false, None, true),
            ColumnSpec::new("v", "VARCHAR", true, None, false),
        ],
        vec!["id".to_string()],
    )
}

fn keyless_fixture() -> Fixture {
    fixture(
        CdcPolicy::StandardStream,
        keyless_schema(),
        vec![
            ColumnSpec::new("v", "VARCHAR", true, None, false),
            ColumnSpec::new(GENERATED_KEY_COLUMN, "VARCHAR", false, None, true),
        ],
        vec![GENERATED_KEY_COLUMN.to_string()],
    )
}

fn sorted_rows(rows: Vec<Vec<Value>>) -> Vec<String> {
    let mut rendered: Vec<String> = rows.into_iter().map(|r| format!("{r:?}")).collect();
    rendered.sort();
    rendered
}

#[tokio::test]
async fn full_refresh_replicates_two_rows_then_tracks_mutations() {
    let mut fx = keyed_fixture(CdcPolicy::FullRefresh);
    {
        let mut src = fx.source.lock().unwrap();
        src.insert_row(vec![int(1), text("a")]);
        src.insert_row(vec![int(2), text("b")]);
    }

    fx.coordinator.sync_table(&fx.table).await.unwrap();
    {
        let target = fx.target.lock().unwrap();
        assert_eq!(
            sorted_rows(target.rows()),
            sorted_rows(vec![vec![int(1), text("a")], vec![int(2), text("b")]])
        );
        assert_eq!(target.etl_events.len(), 1);
    }
    let first_updated_at = fx.target.lock().unwrap().updated_at;

    {
        let mut src = fx.source.lock().unwrap();
        src.delete_row("row-1");
        src.insert_row(vec![int(3), text("c")]);
    }
    fx.coordinator.sync_table(&fx.table).await.unwrap();

    let target = fx.target.lock().unwrap();
    assert_eq!(
        sorted_rows(target.rows()),
        sorted_rows(vec![vec![int(2), text("b")], vec![int(3), text("c")]])
    );
    assert_eq!(target.etl_events.len(), 2);
    assert!(target.updated_at > first_updated_at);
}

#[tokio::test]
async fn full_refresh_of_empty_source_empties_target_and_still_tracks() {
    let mut fx = keyed_fixture(CdcPolicy::FullRefresh);
    {
        let mut src = fx.source.lock().unwrap();
        src.insert_row(vec![int(1), text("a")]);
    }
    fx.coordinator.sync_table(&fx.table).await.unwrap();
    assert_eq!(fx.target.lock().unwrap().rows().len(), 1);

    fx.source.lock().unwrap().delete_row("row-1");
    fx.coordinator.sync_table(&fx.table).await.unwrap();

    let target = fx.target.lock().unwrap();
    assert!(target.rows().is_empty());
    assert_eq!(target.etl_events.len(), 2);
}

#[tokio::test]
async fn standard_stream_applies_updates_deletes_and_inserts() {
    let mut fx = keyed_fixture(CdcPolicy::StandardStream);
    let (r1, r2) = {
        let mut src = fx.source.lock().unwrap();
        let r1 = src.insert_row(vec![int(1), text("a")]);
        let r2 = src.insert_row(vec![int(2), text("b")]);
        (r1, r2)
    };

    fx.coordinator.sync_table(&fx.table).await.unwrap();
    {
        let target = fx.target.lock().unwrap();
        assert_eq!(
            sorted_rows(target.rows()),
            sorted_rows(vec![vec![int(1), text("a")], vec![int(2), text("b")]])
        );
        let src = fx.source.lock().unwrap();
        assert!(src.staging.is_empty());
        assert!(src.stream.is_empty());
    }

    {
        let mut src = fx.source.lock().unwrap();
        src.update_row(&r1, vec![int(1), text("a2")]);
        src.delete_row(&r2);
        src.insert_row(vec![int(3), text("c")]);
    }
    fx.coordinator.sync_table(&fx.table).await.unwrap();

    let target = fx.target.lock().unwrap();
    assert_eq!(
        sorted_rows(target.rows()),
        sorted_rows(vec![vec![int(1), text("a2")], vec![int(3), text("c")]])
    );
    assert_eq!(target.etl_events.len(), 2);
}

#[tokio::test]
async fn append_only_stream_never_applies_deletes() {
    let mut fx = keyed_fixture(CdcPolicy::AppendOnlyStream);
    let r1 = fx.source.lock().unwrap().insert_row(vec![int(1), text("a")]);

    fx.coordinator.sync_table(&fx.table).await.unwrap();
    assert_eq!(fx.target.lock().unwrap().rows().len(), 1);

    {
        let mut src = fx.source.lock().unwrap();
        src.delete_row(&r1);
        src.insert_row(vec![int(2), text("b")]);
    }
    fx.coordinator.sync_table(&fx.table).await.unwrap();

    let target = fx.target.lock().unwrap();
    assert_eq!(
        sorted_rows(target.rows()),
        sorted_rows(vec![vec![int(1), text("a")], vec![int(2), text("b")]])
    );
    let source_rows = fx.source.lock().unwrap().base_rows.len();
    assert!(target.rows().len() >= source_rows);
    assert!(
        !fx.ops
            .lock()
            .unwrap()
            .iter()
            .any(|op| op == "target.process_delete_batches")
    );
}

#[tokio::test]
async fn keyless_standard_stream_rides_on_the_generated_key() {
    let mut fx = keyless_fixture();
    let (r1, r2) = {
        let mut src = fx.source.lock().unwrap();
        (
            src.insert_row(vec![text("x")]),
            src.insert_row(vec![text("x")]),
        )
    };

    fx.coordinator.sync_table(&fx.table).await.unwrap();
    {
        let target = fx.target.lock().unwrap();
        assert_eq!(
            sorted_rows(target.rows()),
            sorted_rows(vec![
                vec![text("x"), text(&r1)],
                vec![text("x"), text(&r2)],
            ])
        );
    }

    fx.source.lock().unwrap().delete_row(&r1);
    fx.coordinator.sync_table(&fx.table).await.unwrap();

    let target = fx.target.lock().unwrap();
    assert_eq!(
        sorted_rows(target.rows()),
        sorted_rows(vec![vec![text("x"), text(&r2)]])
    );
}

#[tokio::test]
async fn half_commit_is_reconciled_by_the_next_cycle() {
    let mut fx = keyed_fixture(CdcPolicy::StandardStream);
    let (r1, r2) = {
        let mut src = fx.source.lock().unwrap();
        let r1 = src.insert_row(vec![int(1), text("a")]);
        let r2 = src.insert_row(vec![int(2), text("b")]);
        (r1, r2)
    };
    fx.coordinator.sync_table(&fx.table).await.unwrap();

    {
        let mut src = fx.source.lock().unwrap();
        src.update_row(&r1, vec![int(1), text("a2")]);
        src.delete_row(&r2);
        src.insert_row(vec![int(3), text("c")]);
        src.fail_on_cleanup = true;
    }
    let err = fx.coordinator.sync_table(&fx.table).await.unwrap_err();
    assert!(matches!(err, SyncError::TableSync { .. }));

    // Half-committed: the target applied and recorded the cycle, while the
    // staged rows survived on the source, still tagged with that etl id.
    let half_committed_etl = {
        let target = fx.target.lock().unwrap();
        assert_eq!(
            sorted_rows(target.rows()),
            sorted_rows(vec![vec![int(1), text("a2")], vec![int(3), text("c")]])
        );
        assert_eq!(target.etl_events.len(), 2);
        target.etl_ids().last().unwrap().clone()
    };
    {
        let src = fx.source.lock().unwrap();
        assert!(!src.staging.is_empty());
        assert!(src.staged_etl_ids().iter().all(|id| *id == half_committed_etl));
    }

    fx.source.lock().unwrap().fail_on_cleanup = false;
    fx.coordinator.sync_table(&fx.table).await.unwrap();

    // The recovery cycle purges the applied rows and drains an empty
    // stream: zero net change on the target, and the idempotence invariant
    // holds again at rest.
    let target = fx.target.lock().unwrap();
    assert_eq!(
        sorted_rows(target.rows()),
        sorted_rows(vec![vec![int(1), text("a2")], vec![int(3), text("c")]])
    );
    assert_eq!(target.etl_events.len(), 3);
    let src = fx.source.lock().unwrap();
    assert!(src.staging.is_empty());
}

#[tokio::test]
async fn source_commit_failure_after_target_commit_is_not_rolled_back() {
    let mut fx = keyed_fixture(CdcPolicy::StandardStream);
    {
        let mut src = fx.source.lock().unwrap();
        src.insert_row(vec![int(1), text("a")]);
        src.insert_row(vec![int(2), text("b")]);
    }
    fx.coordinator.sync_table(&fx.table).await.unwrap();

    {
        let mut src = fx.source.lock().unwrap();
        src.insert_row(vec![int(3), text("c")]);
        src.fail_on_commit = true;
    }
    let err = fx.coordinator.sync_table(&fx.table).await.unwrap_err();
    assert!(matches!(err, SyncError::TableSync { .. }));

    // The target committed, so the source side must not be rolled back:
    // the drained stream stays consumed and the cleaned staging stays
    // cleaned. Rolling back here would resurrect the delta and re-apply
    // it next cycle as duplicate rows.
    {
        let target = fx.target.lock().unwrap();
        assert_eq!(
            sorted_rows(target.rows()),
            sorted_rows(vec![
                vec![int(1), text("a")],
                vec![int(2), text("b")],
                vec![int(3), text("c")],
            ])
        );
        assert_eq!(target.etl_events.len(), 2);
        let src = fx.source.lock().unwrap();
        assert!(src.stream.is_empty());
        assert!(src.staging.is_empty());
    }

    fx.source.lock().unwrap().fail_on_commit = false;
    fx.coordinator.sync_table(&fx.table).await.unwrap();

    let target = fx.target.lock().unwrap();
    assert_eq!(
        sorted_rows(target.rows()),
        sorted_rows(vec![
            vec![int(1), text("a")],
            vec![int(2), text("b")],
            vec![int(3), text("c")],
        ])
    );
    assert_eq!(target.etl_events.len(), 3);
}

#[tokio::test]
async fn failure_before_target_commit_leaves_target_untouched_then_converges() {
    let mut fx = keyed_fixture(CdcPolicy::StandardStream);
    let r1 = fx.source.lock().unwrap().insert_row(vec![int(1), text("a")]);
    fx.coordinator.sync_table(&fx.table).await.unwrap();

    {
        let mut src = fx.source.lock().unwrap();
        src.update_row(&r1, vec![int(1), text("a2")]);
    }
    fx.target.lock().unwrap().fail_on_trackers = true;
    let err = fx.coordinator.sync_table(&fx.table).await.unwrap_err();
    assert!(matches!(err, SyncError::TableSync { .. }));

    {
        let target = fx.target.lock().unwrap();
        assert_eq!(sorted_rows(target.rows()), sorted_rows(vec![vec![int(1), text("a")]]));
        assert_eq!(target.etl_events.len(), 1);
    }

    // More changes land before the retry; the next cycle applies the
    // combined delta.
    fx.source.lock().unwrap().insert_row(vec![int(4), text("d")]);
    fx.target.lock().unwrap().fail_on_trackers = false;
    fx.coordinator.sync_table(&fx.table).await.unwrap();

    let target = fx.target.lock().unwrap();
    assert_eq!(
        sorted_rows(target.rows()),
        sorted_rows(vec![vec![int(1), text("a2")], vec![int(4), text("d")]])
    );
    assert_eq!(target.etl_events.len(), 2);
}

#[tokio::test]
async fn cycle_without_stream_delta_is_a_tracked_noop() {
    let mut fx = keyed_fixture(CdcPolicy::StandardStream);
    fx.source.lock().unwrap().insert_row(vec![int(1), text("a")]);
    fx.coordinator.sync_table(&fx.table).await.unwrap();
    let rows_before = sorted_rows(fx.target.lock().unwrap().rows());

    fx.coordinator.sync_table(&fx.table).await.unwrap();

    let target = fx.target.lock().unwrap();
    assert_eq!(sorted_rows(target.rows()), rows_before);
    assert_eq!(target.etl_events.len(), 2);
}

#[tokio::test]
async fn insert_then_delete_of_the_same_key_nets_out() {
    let mut fx = keyed_fixture(CdcPolicy::StandardStream);
    {
        let mut src = fx.source.lock().unwrap();
        let rid = src.insert_row(vec![int(9), text("z")]);
        src.delete_row(&rid);
    }
    fx.coordinator.sync_table(&fx.table).await.unwrap();
    assert!(fx.target.lock().unwrap().rows().is_empty());
}

#[tokio::test]
async fn delete_then_reinsert_of_the_same_key_survives() {
    let mut fx = keyed_fixture(CdcPolicy::StandardStream);
    let r1 = fx.source.lock().unwrap().insert_row(vec![int(1), text("a")]);
    fx.coordinator.sync_table(&fx.table).await.unwrap();

    {
        let mut src = fx.source.lock().unwrap();
        src.delete_row(&r1);
        src.insert_row(vec![int(1), text("a9")]);
    }
    fx.coordinator.sync_table(&fx.table).await.unwrap();

    assert_eq!(
        sorted_rows(fx.target.lock().unwrap().rows()),
        sorted_rows(vec![vec![int(1), text("a9")]])
    );
}

#[tokio::test]
async fn target_commits_strictly_before_source() {
    let mut fx = keyed_fixture(CdcPolicy::StandardStream);
    fx.source.lock().unwrap().insert_row(vec![int(1), text("a")]);
    fx.coordinator.sync_table(&fx.table).await.unwrap();

    let ops = fx.ops.lock().unwrap();
    let position = |op: &str| ops.iter().position(|o| o == op).unwrap();
    assert!(position("target.commit") < position("source.cleanup_source"));
    assert!(position("source.cleanup_source") < position("source.commit"));
}

#[tokio::test]
async fn unsupported_policy_is_rejected_before_any_io() {
    let ops: Ops = Arc::new(Mutex::new(Vec::new()));
    let source =
        FakeSource::new(keyed_schema(), ops.clone()).with_supported(&[CdcPolicy::FullRefresh]);
    let target = FakeTarget::new(ops.clone()).with_table(Vec::new(), Vec::new());
    let mut coordinator = IngestionCoordinator::new(Box::new(source), Box::new(target)).unwrap();

    let err = coordinator
        .sync_table(&orders(CdcPolicy::StandardStream))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UnsupportedPolicy { .. }));
    assert!(ops.lock().unwrap().is_empty());
}

#[tokio::test]
async fn one_tables_failure_does_not_poison_the_next_cycle() {
    let mut fx = keyed_fixture(CdcPolicy::StandardStream);
    fx.source.lock().unwrap().insert_row(vec![int(1), text("a")]);

    fx.target.lock().unwrap().fail_on_insert = true;
    assert!(fx.coordinator.sync_table(&fx.table).await.is_err());

    fx.target.lock().unwrap().fail_on_insert = false;
    fx.coordinator.sync_table(&fx.table).await.unwrap();
    assert_eq!(
        sorted_rows(fx.target.lock().unwrap().rows()),
        sorted_rows(vec![vec![int(1), text("a")]])
    );
}
