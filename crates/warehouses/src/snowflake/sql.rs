//! Statement text for the source side. Stream and staging names embed the
//! full source identifier so one change-tracking schema can serve many
//! databases.

use model::core::{etl::EtlId, table::TableSpec};

pub fn full_table_name(table: &TableSpec) -> String {
    format!(
        "{}.{}.{}",
        table.database(),
        table.schema(),
        table.table()
    )
}

pub fn stream_name(change_tracking_schema: &str, table: &TableSpec) -> String {
    format!(
        "{change_tracking_schema}.{}${}${}",
        table.database(),
        table.schema(),
        table.table()
    )
}

pub fn processing_table_name(change_tracking_schema: &str, table: &TableSpec) -> String {
    format!("{}_processing", stream_name(change_tracking_schema, table))
}

pub fn create_stream(
    change_tracking_schema: &str,
    table: &TableSpec,
    append_only: bool,
    replace_existing: bool,
) -> String {
    let stream = stream_name(change_tracking_schema, table);
    let base = full_table_name(table);
    let create = if replace_existing {
        format!("CREATE OR REPLACE STREAM {stream}")
    } else {
        format!("CREATE STREAM IF NOT EXISTS {stream}")
    };
    let append = if append_only { " APPEND_ONLY = TRUE" } else { "" };
    format!("{create} ON TABLE {base}{append} SHOW_INITIAL_ROWS = TRUE;")
}

pub fn create_processing_table(
    change_tracking_schema: &str,
    table: &TableSpec,
    replace_existing: bool,
) -> String {
    let staging = processing_table_name(change_tracking_schema, table);
    let base = full_table_name(table);
    if replace_existing {
        format!("CREATE OR REPLACE TABLE {staging} LIKE {base};")
    } else {
        format!("CREATE TABLE IF NOT EXISTS {staging} LIKE {base};")
    }
}

/// The staging table mirrors the base table plus the stream metadata
/// columns and the per-cycle etl tag.
pub fn add_metadata_columns(change_tracking_schema: &str, table: &TableSpec) -> Vec<String> {
    let staging = processing_table_name(change_tracking_schema, table);
    [
        "\"METADATA$ACTION\" VARCHAR",
        "\"METADATA$ISUPDATE\" VARCHAR",
        "\"METADATA$ROW_ID\" VARCHAR",
        "etl_id VARCHAR",
    ]
    .iter()
    .map(|column| format!("ALTER TABLE {staging} ADD COLUMN IF NOT EXISTS {column};"))
    .collect()
}

/// Rows whose etl_id the target already recorded were applied in a prior
/// cycle whose source commit was lost; purge them before draining.
pub fn purge_completed_rows(staging: &str, completed: &[EtlId]) -> String {
    let ids = completed
        .iter()
        .map(|id| format!("'{}'", id.as_str().replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ");
    format!("DELETE FROM {staging} WHERE etl_id IN ({ids});")
}

/// Draining the stream and tagging the rows happen in one statement so the
/// stream offset advances atomically with the tag.
pub fn drain_stream(staging: &str, stream: &str, etl_id: &EtlId) -> String {
    format!("INSERT INTO {staging} SELECT *, '{etl_id}' FROM {stream};")
}

pub fn tag_untagged_rows(staging: &str, etl_id: &EtlId) -> String {
    format!("UPDATE {staging} SET etl_id = '{etl_id}' WHERE etl_id IS NULL;")
}

pub fn select_streamed_deletes(staging: &str, primary_keys: &[String]) -> String {
    let keys = if primary_keys.is_empty() {
        "\"METADATA$ROW_ID\" AS melchi_row_id".to_string()
    } else {
        primary_keys.join(", ")
    };
    format!("SELECT {keys} FROM {staging} WHERE \"METADATA$ACTION\" = 'DELETE';")
}

pub fn select_streamed_inserts(staging: &str, column_names: &[String]) -> String {
    let mut columns = column_names.to_vec();
    columns.push("\"METADATA$ROW_ID\" AS melchi_row_id".to_string());
    format!(
        "SELECT {} FROM {staging} WHERE \"METADATA$ACTION\" = 'INSERT';",
        columns.join(", ")
    )
}

pub fn select_full_table(table: &TableSpec) -> String {
    format!("SELECT * FROM {};", full_table_name(table))
}

pub fn truncate(table_name: &str) -> String {
    format!("TRUNCATE TABLE {table_name};")
}

pub fn describe_table(table: &TableSpec) -> String {
    format!("DESC TABLE {};", full_table_name(table))
}
