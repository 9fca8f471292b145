use crate::error::SyncError;
use model::core::table::TableSpec;
use tracing::info;
use warehouses::{
    config::WarehouseConfig,
    factory,
    kind::WarehouseRole,
    typemap,
    warehouse::Warehouse,
};

/// Propagates every in-scope table's schema to the target and bootstraps
/// the change-tracking metadata tables, all inside one target transaction.
pub async fn transfer_schema(
    source_config: &WarehouseConfig,
    target_config: &WarehouseConfig,
    tables: &[TableSpec],
) -> Result<(), SyncError> {
    let mut source = factory::create_warehouse(source_config, WarehouseRole::Source);
    let mut target = factory::create_warehouse(target_config, WarehouseRole::Target);

    let outcome = run(source.as_mut(), target.as_mut(), tables).await;
    if outcome.is_err() {
        let _ = target.rollback().await;
    }
    let _ = source.disconnect().await;
    let _ = target.disconnect().await;
    outcome
}

pub(crate) async fn run(
    source: &mut dyn Warehouse,
    target: &mut dyn Warehouse,
    tables: &[TableSpec],
) -> Result<(), SyncError> {
    source.connect().await?;
    target.connect().await?;

    target.begin().await?;
    target.setup_environment(tables).await?;
    for table in tables {
        let source_schema = source.get_schema(table).await?;
        let target_schema = typemap::map_schema(source.kind(), target.kind(), &source_schema)?;
        target
            .create_table(table, &source_schema, &target_schema)
            .await?;
        info!(table = %table.qualified_name(), "table schema transferred");
    }
    target.commit().await?;
    Ok(())
}
