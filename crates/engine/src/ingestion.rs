use crate::error::SyncError;
use model::core::{etl::EtlId, policy::CdcPolicy, table::TableSpec};
use tracing::{debug, info, warn};
use warehouses::{error::WarehouseError, normalizer::ValueNormalizer, warehouse::Warehouse};

/// Drives one table's CDC cycle end-to-end across both warehouses.
///
/// The two transactional systems are kept consistent without a distributed
/// transaction manager by commit ordering: the target always commits first,
/// and only then does the source advance its stream offset. An etl id that
/// reached the target's etl_events table is proof the rows were applied, so
/// a crash between the two commits is repaired on the next cycle when
/// `prepare_stream_ingestion` purges those rows from source staging.
pub struct IngestionCoordinator {
    source: Box<dyn Warehouse>,
    target: Box<dyn Warehouse>,
    normalizer: ValueNormalizer,
}

impl IngestionCoordinator {
    pub fn new(
        source: Box<dyn Warehouse>,
        target: Box<dyn Warehouse>,
    ) -> Result<Self, SyncError> {
        let normalizer = ValueNormalizer::resolve(source.kind(), target.kind())?;
        Ok(IngestionCoordinator {
            source,
            target,
            normalizer,
        })
    }

    /// Runs one sync cycle for one table. A fresh etl id is generated per
    /// attempt; a failed attempt's id is simply discarded.
    pub async fn sync_table(&mut self, table: &TableSpec) -> Result<(), SyncError> {
        let policy = table.cdc_policy();
        if !self.source.supported_cdc_policies().contains(&policy) {
            return Err(SyncError::UnsupportedPolicy {
                table: self.source.full_table_name(table),
                policy,
                source_kind: self.source.kind().to_string(),
            });
        }

        let etl_id = EtlId::generate();
        info!(
            table = %table.qualified_name(),
            policy = policy.as_str(),
            etl_id = %etl_id,
            "starting sync cycle"
        );

        let outcome = match policy {
            CdcPolicy::FullRefresh => self.full_refresh_cycle(table, &etl_id).await,
            CdcPolicy::StandardStream => self.stream_cycle(table, &etl_id, true).await,
            CdcPolicy::AppendOnlyStream => self.stream_cycle(table, &etl_id, false).await,
        };

        match outcome {
            Ok(()) => {
                info!(table = %table.qualified_name(), "sync cycle completed");
                Ok(())
            }
            Err(source) => Err(SyncError::TableSync {
                table: table.qualified_name(),
                source,
            }),
        }
    }

    async fn full_refresh_cycle(
        &mut self,
        table: &TableSpec,
        etl_id: &EtlId,
    ) -> Result<(), WarehouseError> {
        let outcome = self.run_full_refresh(table, etl_id).await;
        if outcome.is_err() {
            self.rollback_target().await;
        }
        self.disconnect_both().await;
        outcome
    }

    async fn run_full_refresh(
        &mut self,
        table: &TableSpec,
        etl_id: &EtlId,
    ) -> Result<(), WarehouseError> {
        self.target.connect().await?;
        self.source.connect().await?;
        self.target.begin().await?;
        self.target.truncate_table(table).await?;
        let batches = self.source.get_batches_for_full_refresh(table).await?;
        self.target
            .process_insert_batches(table, batches, &self.normalizer)
            .await?;
        self.target.update_cdc_trackers(table, etl_id).await?;
        self.target.commit().await?;
        Ok(())
    }

    async fn stream_cycle(
        &mut self,
        table: &TableSpec,
        etl_id: &EtlId,
        apply_deletes: bool,
    ) -> Result<(), WarehouseError> {
        let outcome = match self.apply_stream_to_target(table, etl_id, apply_deletes).await {
            Ok(()) => self.advance_source(table).await,
            Err(e) => {
                // Target first: its transaction holds the not-yet-committed
                // applies; the source rollback then rewinds the staged drain.
                self.rollback_target().await;
                self.rollback_source().await;
                Err(e)
            }
        };
        self.disconnect_both().await;
        outcome
    }

    /// The cycle up to and including the target commit. Any failure in
    /// here rolls both sides back and the cycle is safe to retry.
    async fn apply_stream_to_target(
        &mut self,
        table: &TableSpec,
        etl_id: &EtlId,
        apply_deletes: bool,
    ) -> Result<(), WarehouseError> {
        self.target.connect().await?;
        self.source.connect().await?;
        self.target.begin().await?;
        self.source.begin().await?;

        let completed = self.target.get_etl_ids(table).await?;
        self.source
            .prepare_stream_ingestion(table, etl_id, &completed)
            .await?;

        // Deletes are applied against the target's pre-image before inserts
        // from the same snapshot, which is what makes updates
        // (delete-then-insert) land correctly.
        if apply_deletes {
            let deletes = self.source.get_delete_batches_for_stream(table).await?;
            self.target
                .process_delete_batches(table, deletes, &self.normalizer)
                .await?;
        }

        let inserts = self.source.get_insert_batches_for_stream(table).await?;
        self.target
            .process_insert_batches(table, inserts, &self.normalizer)
            .await?;

        self.target.update_cdc_trackers(table, etl_id).await?;
        // Commit point: the target side of the cycle is durable from here.
        self.target.commit().await
    }

    /// Runs after the commit point. The source transaction is never rolled
    /// back from here: it holds the staged rows tagged with this cycle's
    /// etl id, and those rows are what the next cycle's purge uses to
    /// reconcile the two sides. A cleanup failure therefore still commits
    /// the drain before the error propagates.
    async fn advance_source(&mut self, table: &TableSpec) -> Result<(), WarehouseError> {
        let cleaned = self.source.cleanup_source(table).await;
        if let Err(e) = &cleaned {
            warn!(
                table = %table.qualified_name(),
                "source cleanup failed after target commit; the next cycle will purge \
                 the staged rows: {e}"
            );
        }
        let committed = self.source.commit().await;
        cleaned.and(committed)
    }

    async fn rollback_target(&mut self) {
        if let Err(e) = self.target.rollback().await {
            debug!("target rollback after failure: {e}");
        }
    }

    async fn rollback_source(&mut self) {
        if let Err(e) = self.source.rollback().await {
            debug!("source rollback after failure: {e}");
        }
    }

    async fn disconnect_both(&mut self) {
        if let Err(e) = self.source.disconnect().await {
            warn!("failed to disconnect source: {e}");
        }
        if let Err(e) = self.target.disconnect().await {
            warn!("failed to disconnect target: {e}");
        }
    }
}
