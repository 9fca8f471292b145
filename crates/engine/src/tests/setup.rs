use crate::{
    schema_sync, source_setup,
    tests::fake::{FakeSource, FakeTarget},
};
use model::core::{
    column::{ColumnSpec, TableSchema},
    policy::CdcPolicy,
    table::{GENERATED_KEY_COLUMN, TableSpec},
};
use std::sync::{Arc, Mutex};

fn keyless_schema() -> TableSchema {
    TableSchema::new(vec![ColumnSpec::new("v", "VARCHAR", true, None, false)])
}

#[tokio::test]
async fn schema_sync_bootstraps_and_creates_inside_one_target_transaction() {
    let ops = Arc::new(Mutex::new(Vec::new()));
    let mut source = FakeSource::new(keyless_schema(), ops.clone());
    let mut target = FakeTarget::new(ops.clone());
    let target_state = target.handle();
    let tables = vec![
        TableSpec::new("sales_db", "public", "orders", CdcPolicy::StandardStream).unwrap(),
    ];

    schema_sync::run(&mut source, &mut target, &tables)
        .await
        .unwrap();

    let ops = ops.lock().unwrap();
    let position = |op: &str| ops.iter().position(|o| o == op).unwrap();
    assert!(position("target.begin") < position("target.setup_environment"));
    assert!(position("target.setup_environment") < position("target.create_table"));
    assert!(position("target.create_table") < position("target.commit"));

    // Keyless standard stream: the surrogate key column was materialized
    // and recorded as the effective key.
    let state = target_state.lock().unwrap();
    let table = state.table.as_ref().unwrap();
    assert!(
        table
            .columns
            .iter()
            .any(|c| c.name == GENERATED_KEY_COLUMN && !c.nullable)
    );
    assert_eq!(table.primary_keys, vec![GENERATED_KEY_COLUMN.to_string()]);
    // The source table itself never has the surrogate column.
    assert!(
        !keyless_schema()
            .columns()
            .iter()
            .any(|c| c.name == GENERATED_KEY_COLUMN)
    );
}

#[tokio::test]
async fn source_setup_runs_inside_one_source_transaction() {
    let ops = Arc::new(Mutex::new(Vec::new()));
    let mut source = FakeSource::new(keyless_schema(), ops.clone());
    let tables = vec![
        TableSpec::new("sales_db", "public", "orders", CdcPolicy::AppendOnlyStream).unwrap(),
    ];

    source_setup::run(&mut source, &tables).await.unwrap();

    let ops = ops.lock().unwrap();
    let position = |op: &str| ops.iter().position(|o| o == op).unwrap();
    assert!(position("source.begin") < position("source.setup_environment"));
    assert!(position("source.setup_environment") < position("source.commit"));
}
