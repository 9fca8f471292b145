use crate::error::SyncError;
use model::core::table::TableSpec;
use std::collections::BTreeSet;
use warehouses::{config::WarehouseConfig, error::WarehouseError};

/// Renders the SQL an operator must run (with elevated privileges) before
/// Melchi can manage CDC objects on the source. Pure text generation; no
/// warehouse I/O.
pub fn generate_source_sql(
    source_config: &WarehouseConfig,
    tables: &[TableSpec],
) -> Result<String, SyncError> {
    let config = match source_config {
        WarehouseConfig::Snowflake(c) => c,
        other => {
            return Err(SyncError::Warehouse(WarehouseError::NotSupported(format!(
                "{} is not supported as a source",
                other.kind()
            ))));
        }
    };

    let role = &config.role;
    let cts = config.change_tracking_schema_fqn();

    let mut lines = vec![
        "--This command creates the change tracking schema.  Not required if it already exists."
            .to_string(),
        format!("CREATE SCHEMA IF NOT EXISTS {cts};"),
        String::new(),
        String::new(),
        "--These grants enable Melchi to create objects that track changes.".to_string(),
        format!(
            "GRANT USAGE ON WAREHOUSE {} TO ROLE {role};",
            config.warehouse
        ),
        format!(
            "GRANT USAGE ON DATABASE {} TO ROLE {role};",
            config.change_tracking_database
        ),
        format!("GRANT USAGE, CREATE TABLE, CREATE STREAM ON SCHEMA {cts} TO ROLE {role};"),
        String::new(),
        String::new(),
        "--These grants enable Melchi to read changes from your objects.".to_string(),
    ];

    let mut database_grants = BTreeSet::new();
    let mut schema_grants = BTreeSet::new();
    let mut table_grants = Vec::new();
    let mut change_tracking = Vec::new();
    for table in tables {
        database_grants.insert(format!(
            "GRANT USAGE ON DATABASE {} TO ROLE {role};",
            table.database()
        ));
        schema_grants.insert(format!(
            "GRANT USAGE ON SCHEMA {}.{} TO ROLE {role};",
            table.database(),
            table.schema()
        ));
        table_grants.push(format!(
            "GRANT SELECT ON TABLE {} TO ROLE {role};",
            table.qualified_name()
        ));
        change_tracking.push(format!(
            "ALTER TABLE {} SET CHANGE_TRACKING = TRUE;",
            table.qualified_name()
        ));
    }

    lines.extend(database_grants);
    lines.extend(schema_grants);
    lines.extend(table_grants);
    lines.push(String::new());
    lines.push(String::new());
    lines.push(
        "--These statements alter tables to allow Melchi to create CDC streams on them."
            .to_string(),
    );
    lines.extend(change_tracking);

    Ok(lines.join("\n"))
}
