use crate::{
    error::WarehouseError,
    kind::{AuthType, WarehouseKind, WarehouseRole},
    normalizer::ValueNormalizer,
};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use model::{
    core::{column::TableSchema, etl::EtlId, policy::CdcPolicy, table::TableSpec},
    records::batch::RowBatch,
};

/// A finite lazy sequence of row batches. Consumed exactly once, in order;
/// producers release server-side resources when the stream ends or is
/// dropped.
pub type RowBatchStream = BoxStream<'static, Result<RowBatch, WarehouseError>>;

/// The capability contract every warehouse backend implements. A backend
/// that does not play a given role returns `NotSupported` from the
/// operations of that role.
#[async_trait]
pub trait Warehouse: Send + Sync {
    fn kind(&self) -> WarehouseKind;
    fn role(&self) -> WarehouseRole;
    fn auth_type(&self) -> AuthType;
    fn supported_cdc_policies(&self) -> &'static [CdcPolicy];

    /// Fully qualified name in this warehouse's own dialect; the source and
    /// target may format the same table differently.
    fn full_table_name(&self, table: &TableSpec) -> String;
    fn change_tracking_schema_fqn(&self) -> String;

    /// Idempotent; a second call on a live connection is a no-op.
    async fn connect(&mut self) -> Result<(), WarehouseError>;
    /// Safe to call when not connected.
    async fn disconnect(&mut self) -> Result<(), WarehouseError>;
    async fn begin(&mut self) -> Result<(), WarehouseError>;
    async fn commit(&mut self) -> Result<(), WarehouseError>;
    async fn rollback(&mut self) -> Result<(), WarehouseError>;

    async fn get_schema(&mut self, table: &TableSpec) -> Result<TableSchema, WarehouseError>;
    async fn get_primary_keys(&mut self, table: &TableSpec) -> Result<Vec<String>, WarehouseError>;

    /// Role-dependent: the source creates streams and staging tables, the
    /// target creates the change-tracking schema and metadata tables.
    async fn setup_environment(&mut self, tables: &[TableSpec]) -> Result<(), WarehouseError>;
    async fn create_table(
        &mut self,
        table: &TableSpec,
        source_schema: &TableSchema,
        target_schema: &TableSchema,
    ) -> Result<(), WarehouseError>;

    async fn get_batches_for_full_refresh(
        &mut self,
        table: &TableSpec,
    ) -> Result<RowBatchStream, WarehouseError>;
    async fn get_delete_batches_for_stream(
        &mut self,
        table: &TableSpec,
    ) -> Result<RowBatchStream, WarehouseError>;
    async fn get_insert_batches_for_stream(
        &mut self,
        table: &TableSpec,
    ) -> Result<RowBatchStream, WarehouseError>;

    async fn process_insert_batches(
        &mut self,
        table: &TableSpec,
        batches: RowBatchStream,
        normalizer: &ValueNormalizer,
    ) -> Result<(), WarehouseError>;
    async fn process_delete_batches(
        &mut self,
        table: &TableSpec,
        batches: RowBatchStream,
        normalizer: &ValueNormalizer,
    ) -> Result<(), WarehouseError>;

    async fn truncate_table(&mut self, table: &TableSpec) -> Result<(), WarehouseError>;

    /// Source-only. Atomically purges staging rows whose etl_id was already
    /// recorded on the target, then drains the live stream into staging
    /// tagging every row with `new_etl_id`.
    async fn prepare_stream_ingestion(
        &mut self,
        table: &TableSpec,
        new_etl_id: &EtlId,
        completed_etl_ids: &[EtlId],
    ) -> Result<(), WarehouseError>;

    /// Source-only; truncates the staging table after the target commits.
    async fn cleanup_source(&mut self, table: &TableSpec) -> Result<(), WarehouseError>;

    /// Target-only; refreshes captured_tables.updated_at and appends an
    /// etl_events row.
    async fn update_cdc_trackers(
        &mut self,
        table: &TableSpec,
        etl_id: &EtlId,
    ) -> Result<(), WarehouseError>;

    /// Target-only; the completed etl ids recorded for a table.
    async fn get_etl_ids(&mut self, table: &TableSpec) -> Result<Vec<EtlId>, WarehouseError>;

    /// Reserved for tests and setup tooling.
    async fn execute_query(
        &mut self,
        sql: &str,
        return_rows: bool,
    ) -> Result<Option<RowBatch>, WarehouseError>;
}
