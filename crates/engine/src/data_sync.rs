use crate::{error::SyncError, ingestion::IngestionCoordinator};
use model::core::table::TableSpec;
use tracing::{error, info};
use warehouses::{
    config::WarehouseConfig,
    factory,
    kind::WarehouseRole,
};

/// Outcome of one sync_data invocation. One table's failure never aborts
/// the others; the caller decides the process exit code from `failed`.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub synced: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl SyncReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs one CDC cycle over every in-scope table, sequentially.
pub async fn sync_data(
    source_config: &WarehouseConfig,
    target_config: &WarehouseConfig,
    tables: &[TableSpec],
) -> Result<SyncReport, SyncError> {
    let source = factory::create_warehouse(source_config, WarehouseRole::Source);
    let target = factory::create_warehouse(target_config, WarehouseRole::Target);
    let mut coordinator = IngestionCoordinator::new(source, target)?;

    let mut report = SyncReport::default();
    for table in tables {
        match coordinator.sync_table(table).await {
            Ok(()) => report.synced.push(table.qualified_name()),
            Err(e) => {
                error!(table = %table.qualified_name(), "sync failed: {e}");
                report.failed.push((table.qualified_name(), e.to_string()));
            }
        }
    }

    info!(
        synced = report.synced.len(),
        failed = report.failed.len(),
        "data sync finished"
    );
    Ok(report)
}
