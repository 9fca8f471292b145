use serde::{Deserialize, Serialize};

/// One column as described by the source warehouse. `logical_type` is the
/// source dialect's type string; the target equivalent is derived by the
/// type mapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub logical_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
}

impl ColumnSpec {
    pub fn new(
        name: impl Into<String>,
        logical_type: impl Into<String>,
        nullable: bool,
        default_value: Option<String>,
        is_primary_key: bool,
    ) -> Self {
        ColumnSpec {
            name: name.into(),
            logical_type: logical_type.into(),
            nullable,
            default_value,
            is_primary_key,
        }
    }

    /// Geometry and geography columns need special handling in both the
    /// setup validator and the value normalizer.
    pub fn is_spatial(&self) -> bool {
        let upper = self.logical_type.to_uppercase();
        upper.contains("GEOMETRY") || upper.contains("GEOGRAPHY")
    }

    pub fn with_type(mut self, logical_type: impl Into<String>) -> Self {
        self.logical_type = logical_type.into();
        self
    }
}

/// Ordered column list for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TableSchema {
    columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        TableSchema { columns }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn primary_keys(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn push(&mut self, column: ColumnSpec) {
        self.columns.push(column);
    }

    pub fn has_spatial_column(&self) -> bool {
        self.columns.iter().any(ColumnSpec::is_spatial)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }
}
