//! Statement text for the target side: metadata bookkeeping, replicated
//! table DDL and the batched apply protocol.

use model::core::{column::TableSchema, etl::EtlId, policy::CdcPolicy, table::TableSpec};

pub fn full_table_name(table: &TableSpec) -> String {
    format!("{}.{}", table.schema(), table.table())
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn create_change_tracking_schema(cts: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {cts};")
}

/// The three metadata tables are the only durable state the system keeps
/// across invocations. `replace_existing` recreates them from scratch.
pub fn create_metadata_tables(cts: &str, replace_existing: bool) -> Vec<String> {
    let mut statements = Vec::new();
    let definitions = [
        (
            "captured_tables",
            "(schema_name VARCHAR, table_name VARCHAR, created_at TIMESTAMP, \
             updated_at TIMESTAMP, primary_keys VARCHAR[], cdc_policy VARCHAR)",
        ),
        (
            "source_columns",
            "(table_catalog VARCHAR, table_schema VARCHAR, table_name VARCHAR, \
             column_name VARCHAR, data_type VARCHAR, column_default VARCHAR, \
             is_nullable BOOLEAN, is_primary_key BOOLEAN)",
        ),
        (
            "etl_events",
            "(schema_name VARCHAR, table_name VARCHAR, etl_id VARCHAR, \
             completed_at TIMESTAMPTZ DEFAULT now())",
        ),
    ];
    for (name, columns) in definitions {
        if replace_existing {
            statements.push(format!("DROP TABLE IF EXISTS {cts}.{name};"));
        }
        statements.push(format!("CREATE TABLE IF NOT EXISTS {cts}.{name} {columns};"));
    }
    statements
}

pub fn create_schema(table: &TableSpec) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {};", table.schema())
}

pub fn install_spatial_support() -> String {
    "CREATE EXTENSION IF NOT EXISTS postgis;".to_string()
}

/// Column list in declared order; the effective primary key is recorded in
/// captured_tables but never enforced as a constraint, because constraint
/// checks inside the apply transaction conflict with delete-then-insert
/// batches.
pub fn create_table_statement(
    table: &TableSpec,
    schema: &TableSchema,
    replace_existing: bool,
) -> String {
    let columns = schema
        .columns()
        .iter()
        .map(|c| {
            let not_null = if c.nullable { "" } else { " NOT NULL" };
            format!("{} {}{not_null}", c.name, c.logical_type)
        })
        .collect::<Vec<_>>()
        .join(", ");
    let create = if replace_existing {
        "CREATE TABLE"
    } else {
        "CREATE TABLE IF NOT EXISTS"
    };
    format!("{create} {} ({columns});", full_table_name(table))
}

pub fn drop_table(table: &TableSpec) -> String {
    format!("DROP TABLE IF EXISTS {};", full_table_name(table))
}

pub fn upsert_captured_table(
    cts: &str,
    table: &TableSpec,
    primary_keys: &[String],
    policy: CdcPolicy,
) -> Vec<String> {
    let schema = quote_literal(table.schema());
    let name = quote_literal(table.table());
    let keys = if primary_keys.is_empty() {
        "ARRAY[]::VARCHAR[]".to_string()
    } else {
        format!(
            "ARRAY[{}]::VARCHAR[]",
            primary_keys
                .iter()
                .map(|k| quote_literal(k))
                .collect::<Vec<_>>()
                .join(", ")
        )
    };
    vec![
        format!(
            "DELETE FROM {cts}.captured_tables WHERE schema_name = {schema} AND \
             table_name = {name};"
        ),
        format!(
            "INSERT INTO {cts}.captured_tables (schema_name, table_name, created_at, \
             updated_at, primary_keys, cdc_policy) VALUES ({schema}, {name}, now(), \
             now(), {keys}, {});",
            quote_literal(policy.as_str())
        ),
    ]
}

pub fn replace_source_columns(
    cts: &str,
    table: &TableSpec,
    source_schema: &TableSchema,
) -> Vec<String> {
    let schema = quote_literal(table.schema());
    let name = quote_literal(table.table());
    let mut statements = vec![format!(
        "DELETE FROM {cts}.source_columns WHERE table_schema = {schema} AND \
         table_name = {name};"
    )];
    let rows = source_schema
        .columns()
        .iter()
        .map(|c| {
            let default = match &c.default_value {
                Some(value) => quote_literal(value),
                None => "NULL".to_string(),
            };
            format!(
                "({}, {schema}, {name}, {}, {}, {default}, {}, {})",
                quote_literal(table.database()),
                quote_literal(&c.name),
                quote_literal(&c.logical_type),
                c.nullable,
                c.is_primary_key
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    if !rows.is_empty() {
        statements.push(format!(
            "INSERT INTO {cts}.source_columns (table_catalog, table_schema, table_name, \
             column_name, data_type, column_default, is_nullable, is_primary_key) \
             VALUES {rows};"
        ));
    }
    statements
}

pub fn truncate(table: &TableSpec) -> String {
    format!("TRUNCATE TABLE {};", full_table_name(table))
}

pub fn insert_rows(table: &TableSpec, columns: &[String], value_tuples: &[String]) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES {};",
        full_table_name(table),
        columns.join(", "),
        value_tuples.join(", ")
    )
}

/// Set-based delete: stage the batch's key tuples in a temp table cloned
/// from the target's own key columns (so the tuples take the target's
/// types), then one DELETE ... IN over it.
pub fn delete_via_staged_keys(
    table: &TableSpec,
    key_columns: &[String],
    key_tuples: &[String],
) -> Vec<String> {
    let fq = full_table_name(table);
    let staged = format!("melchi_delete_keys_{}", table.table().to_lowercase());
    let keys = key_columns.join(", ");
    vec![
        format!("CREATE TEMP TABLE {staged} AS SELECT {keys} FROM {fq} WHERE FALSE;"),
        format!(
            "INSERT INTO {staged} ({keys}) VALUES {};",
            key_tuples.join(", ")
        ),
        format!("DELETE FROM {fq} WHERE ({keys}) IN (SELECT {keys} FROM {staged});"),
        format!("DROP TABLE {staged};"),
    ]
}

pub fn touch_captured_table(cts: &str, table: &TableSpec) -> String {
    format!(
        "UPDATE {cts}.captured_tables SET updated_at = now() WHERE schema_name = {} \
         AND table_name = {};",
        quote_literal(table.schema()),
        quote_literal(table.table())
    )
}

pub fn append_etl_event(cts: &str, table: &TableSpec, etl_id: &EtlId) -> String {
    format!(
        "INSERT INTO {cts}.etl_events (schema_name, table_name, etl_id, completed_at) \
         VALUES ({}, {}, {}, now());",
        quote_literal(table.schema()),
        quote_literal(table.table()),
        quote_literal(etl_id.as_str())
    )
}

pub fn select_etl_ids(cts: &str) -> String {
    format!(
        "SELECT etl_id FROM {cts}.etl_events WHERE schema_name = $1 AND table_name = $2 \
         GROUP BY 1"
    )
}

pub fn select_primary_keys(cts: &str) -> String {
    format!(
        "SELECT primary_keys FROM {cts}.captured_tables WHERE schema_name = $1 AND \
         table_name = $2"
    )
}

pub const TABLE_EXISTS: &str = include_str!("sql/table_exists.sql");

pub const SELECT_COLUMNS: &str = include_str!("sql/columns_ordered.sql");
