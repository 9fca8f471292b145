use crate::{core::column::TableSchema, core::policy::CdcPolicy, error::ModelError};
use serde::{Deserialize, Serialize};

/// Name of the surrogate key column materialized on the target when a
/// standard-stream table declares no primary key. The source table never
/// has this column; it is populated from the source's per-row change
/// tracking identity.
pub const GENERATED_KEY_COLUMN: &str = "MELCHI_ROW_ID";

/// One table in scope for replication, as read from the table list.
/// Immutable for the lifetime of a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableSpec {
    database: String,
    schema: String,
    table: String,
    cdc_policy: CdcPolicy,
}

impl TableSpec {
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
        cdc_policy: CdcPolicy,
    ) -> Result<Self, ModelError> {
        let spec = TableSpec {
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
            cdc_policy,
        };
        for (part, value) in [
            ("database", &spec.database),
            ("schema", &spec.schema),
            ("table", &spec.table),
        ] {
            if value.trim().is_empty() {
                return Err(ModelError::EmptyIdentifier {
                    part,
                    row: spec.qualified_name(),
                });
            }
        }
        Ok(spec)
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn cdc_policy(&self) -> CdcPolicy {
        self.cdc_policy
    }

    /// Three-part dotted name, used for logs and error messages. Warehouses
    /// format their own qualified names (the target drops the database part).
    pub fn qualified_name(&self) -> String {
        format!("{}.{}.{}", self.database, self.schema, self.table)
    }

    /// True when the target must materialize a MELCHI_ROW_ID surrogate key:
    /// standard-stream policy over a table with no declared primary key.
    pub fn needs_generated_key(&self, schema: &TableSchema) -> bool {
        self.cdc_policy == CdcPolicy::StandardStream && schema.primary_keys().is_empty()
    }
}
