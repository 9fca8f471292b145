use model::{core::policy::CdcPolicy, error::ModelError};
use thiserror::Error;
use warehouses::error::WarehouseError;

/// Top-level errors for the replication engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Bad operator input surfaced before any warehouse I/O.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ModelError),

    /// The table's policy is not offered by the configured source.
    #[error(
        "invalid cdc_type \"{policy}\" selected for {table}: \"{policy}\" is not supported \
         by {source_kind} sources"
    )]
    UnsupportedPolicy {
        table: String,
        policy: CdcPolicy,
        source_kind: String,
    },

    /// A cycle failed for one table; carries the fully qualified name.
    #[error("sync of {table} failed: {source}")]
    TableSync {
        table: String,
        #[source]
        source: WarehouseError,
    },

    /// Any backend error outside a per-table cycle.
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}
