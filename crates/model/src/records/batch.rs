use crate::records::{row::Row, value::Value};
use serde::{Deserialize, Serialize};

/// Column header carried alongside batch rows: the source column name and
/// its source-dialect logical type, which drives per-value normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchColumn {
    pub name: String,
    pub logical_type: String,
}

impl BatchColumn {
    pub fn new(name: impl Into<String>, logical_type: impl Into<String>) -> Self {
        BatchColumn {
            name: name.into(),
            logical_type: logical_type.into(),
        }
    }
}

/// One batch of rows flowing from source to target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowBatch {
    pub columns: Vec<BatchColumn>,
    pub rows: Vec<Row>,
}

impl RowBatch {
    pub fn new(columns: Vec<BatchColumn>, rows: Vec<Row>) -> Self {
        RowBatch { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Case-insensitive column lookup; warehouses disagree on identifier
    /// casing.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn value(&self, row: &Row, column: &str) -> Value {
        self.column_index(column)
            .and_then(|idx| row.get(idx).cloned())
            .unwrap_or(Value::Null)
    }
}
