use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Warehouse engines with a backend in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarehouseKind {
    Snowflake,
    Postgres,
}

impl WarehouseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarehouseKind::Snowflake => "snowflake",
            WarehouseKind::Postgres => "postgres",
        }
    }
}

impl FromStr for WarehouseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "snowflake" => Ok(WarehouseKind::Snowflake),
            "postgres" | "postgresql" => Ok(WarehouseKind::Postgres),
            other => Err(format!("unknown warehouse type \"{other}\"")),
        }
    }
}

impl fmt::Display for WarehouseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the replication a warehouse plays. Set by the config
/// section the connection was declared under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseRole {
    Source,
    Target,
}

impl fmt::Display for WarehouseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarehouseRole::Source => f.write_str("SOURCE"),
            WarehouseRole::Target => f.write_str("TARGET"),
        }
    }
}

/// Informational authentication scheme used by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    UsernameAndPassword,
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthType::UsernameAndPassword => f.write_str("USERNAME_AND_PASSWORD"),
        }
    }
}
