pub mod sql;
mod warehouse;

pub use warehouse::PostgresWarehouse;
