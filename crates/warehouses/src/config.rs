use crate::kind::WarehouseKind;
use serde::{Deserialize, Serialize};

/// Connection settings for a Snowflake account. `change_tracking_schema`
/// is the schema (inside `change_tracking_database`) that holds the
/// per-table stream and staging objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnowflakeConfig {
    pub account: String,
    pub user: String,
    pub password: String,
    pub role: String,
    pub warehouse: String,
    pub change_tracking_database: String,
    pub change_tracking_schema: String,
    #[serde(default)]
    pub replace_existing: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl SnowflakeConfig {
    pub fn change_tracking_schema_fqn(&self) -> String {
        format!(
            "{}.{}",
            self.change_tracking_database, self.change_tracking_schema
        )
    }
}

/// Connection settings for a Postgres database. `change_tracking_schema`
/// holds the captured_tables / source_columns / etl_events metadata tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub change_tracking_schema: String,
    #[serde(default)]
    pub replace_existing: bool,
}

impl PostgresConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            self.host, self.port, self.user, self.password, self.database
        )
    }
}

/// One configured warehouse connection, keyed by engine kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WarehouseConfig {
    Snowflake(SnowflakeConfig),
    Postgres(PostgresConfig),
}

impl WarehouseConfig {
    pub fn kind(&self) -> WarehouseKind {
        match self {
            WarehouseConfig::Snowflake(_) => WarehouseKind::Snowflake,
            WarehouseConfig::Postgres(_) => WarehouseKind::Postgres,
        }
    }

    pub fn set_replace_existing(&mut self, replace: bool) {
        match self {
            WarehouseConfig::Snowflake(c) => c.replace_existing = replace,
            WarehouseConfig::Postgres(c) => c.replace_existing = replace,
        }
    }
}

fn default_batch_size() -> usize {
    10_000
}

fn default_pg_port() -> u16 {
    5432
}
