use thiserror::Error;

/// Errors produced while building the replication model from operator input.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A cdc_type value outside the three legal policies.
    #[error(
        "unknown cdc_type \"{0}\"; expected one of FULL_REFRESH, APPEND_ONLY_STREAM, STANDARD_STREAM"
    )]
    UnknownCdcPolicy(String),

    /// A table identifier with an empty database, schema or table part.
    #[error("table identifier is missing its {part} part: \"{row}\"")]
    EmptyIdentifier { part: &'static str, row: String },
}
