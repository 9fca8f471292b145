use crate::{
    config::WarehouseConfig, kind::WarehouseRole, postgres::PostgresWarehouse,
    snowflake::SnowflakeWarehouse, warehouse::Warehouse,
};

/// Builds the concrete backend for a configured connection. The role comes
/// from the config section the connection was declared under.
pub fn create_warehouse(config: &WarehouseConfig, role: WarehouseRole) -> Box<dyn Warehouse> {
    match config {
        WarehouseConfig::Snowflake(c) => Box::new(SnowflakeWarehouse::new(c.clone(), role)),
        WarehouseConfig::Postgres(c) => Box::new(PostgresWarehouse::new(c.clone(), role)),
    }
}
