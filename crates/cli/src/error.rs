use engine::error::SyncError;
use model::error::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Bad YAML, a missing environment variable, or a malformed table list.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("configuration error: {0}")]
    Model(#[from] ModelError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Some tables failed their cycle; the rest were synced anyway.
    #[error("{failed} table(s) failed to sync")]
    PartialFailure { failed: usize },
}
