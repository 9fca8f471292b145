use crate::error::SyncError;
use model::core::table::TableSpec;
use tracing::info;
use warehouses::{
    config::WarehouseConfig,
    factory,
    kind::WarehouseRole,
    warehouse::Warehouse,
};

/// Creates the per-table CDC objects (streams and staging tables) on the
/// source, inside one source transaction. Policy validation happens inside
/// the source's setup_environment, which collects every problem in the
/// batch before reporting.
pub async fn setup_source(
    source_config: &WarehouseConfig,
    tables: &[TableSpec],
) -> Result<(), SyncError> {
    let mut source = factory::create_warehouse(source_config, WarehouseRole::Source);

    let outcome = run(source.as_mut(), tables).await;
    if outcome.is_err() {
        let _ = source.rollback().await;
    }
    let _ = source.disconnect().await;
    outcome
}

pub(crate) async fn run(
    source: &mut dyn Warehouse,
    tables: &[TableSpec],
) -> Result<(), SyncError> {
    source.connect().await?;
    source.begin().await?;
    source.setup_environment(tables).await?;
    source.commit().await?;
    info!(tables = tables.len(), "source CDC objects ready");
    Ok(())
}
