use thiserror::Error;

/// All errors surfaced by warehouse backends.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Bad operator input: connection settings, unknown kinds, bad pairs.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A backend was asked to play a role it does not implement, or a
    /// policy/column combination the engine cannot honor.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Authentication, network or protocol failure against a warehouse.
    #[error("connection error: {0}")]
    Connection(String),

    /// An expected CDC object (stream, staging table) is absent. The
    /// message tells the operator how to recover.
    #[error("missing object: {0}")]
    MissingObject(String),

    /// Failure inside a batch producer or batch applier.
    #[error("data plane error: {0}")]
    DataPlane(String),

    /// Failure writing the target's metadata tables.
    #[error("bookkeeping error: {0}")]
    Bookkeeping(String),

    /// Any Postgres driver error.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Any HTTP transport error talking to the source.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl WarehouseError {
    pub fn not_connected(kind: &str) -> Self {
        WarehouseError::Connection(format!("{kind} warehouse is not connected"))
    }
}
