use crate::error::CliError;
use std::{fs, path::Path};
use warehouses::{
    config::{PostgresConfig, SnowflakeConfig, WarehouseConfig},
    kind::WarehouseKind,
};
use yaml_rust2::{Yaml, YamlLoader};

/// Operator configuration: the two warehouse connections plus the table
/// list location. YAML, with `${NAME}` strings resolved from the
/// environment at load time.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source: WarehouseConfig,
    pub target: WarehouseConfig,
    pub tables_path: String,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, CliError> {
        let docs = YamlLoader::load_from_str(raw)
            .map_err(|e| CliError::Config(format!("invalid YAML: {e}")))?;
        let doc = docs
            .first()
            .ok_or_else(|| CliError::Config("config file is empty".into()))?;

        Ok(AppConfig {
            source: parse_warehouse(&doc["source"], "source")?,
            target: parse_warehouse(&doc["target"], "target")?,
            tables_path: require_string(&doc["tables_config"], "path", "tables_config")?,
        })
    }

    /// Destructive operator-only maintenance mode: recreates source CDC
    /// objects and target tables from scratch.
    pub fn set_replace_existing(&mut self, replace: bool) {
        self.source.set_replace_existing(replace);
        self.target.set_replace_existing(replace);
    }
}

fn parse_warehouse(node: &Yaml, section: &str) -> Result<WarehouseConfig, CliError> {
    if node.is_badvalue() {
        return Err(CliError::Config(format!(
            "config file is missing the {section} section"
        )));
    }
    let kind: WarehouseKind = require_string(node, "type", section)?
        .parse()
        .map_err(CliError::Config)?;

    match kind {
        WarehouseKind::Snowflake => Ok(WarehouseConfig::Snowflake(SnowflakeConfig {
            account: require_string(node, "account", section)?,
            user: require_string(node, "user", section)?,
            password: require_string(node, "password", section)?,
            role: require_string(node, "role", section)?,
            warehouse: require_string(node, "warehouse", section)?,
            change_tracking_database: require_string(node, "change_tracking_database", section)?,
            change_tracking_schema: require_string(node, "change_tracking_schema", section)?,
            replace_existing: optional_bool(node, "replace_existing")?,
            batch_size: optional_usize(node, "batch_size")?.unwrap_or(10_000),
        })),
        WarehouseKind::Postgres => Ok(WarehouseConfig::Postgres(PostgresConfig {
            host: require_string(node, "host", section)?,
            port: optional_usize(node, "port")?
                .map(|p| {
                    u16::try_from(p)
                        .map_err(|_| CliError::Config(format!("invalid port {p} in {section}")))
                })
                .transpose()?
                .unwrap_or(5432),
            user: require_string(node, "user", section)?,
            password: require_string(node, "password", section)?,
            database: require_string(node, "database", section)?,
            change_tracking_schema: require_string(node, "change_tracking_schema", section)?,
            replace_existing: optional_bool(node, "replace_existing")?,
        })),
    }
}

fn require_string(node: &Yaml, key: &str, section: &str) -> Result<String, CliError> {
    let value = &node[key];
    if value.is_badvalue() {
        return Err(CliError::Config(format!(
            "{section} config is missing \"{key}\""
        )));
    }
    let raw = match value {
        Yaml::String(s) => s.clone(),
        Yaml::Integer(i) => i.to_string(),
        Yaml::Real(r) => r.clone(),
        Yaml::Boolean(b) => b.to_string(),
        _ => {
            return Err(CliError::Config(format!(
                "{section}.{key} must be a scalar value"
            )));
        }
    };
    interpolate(&raw, &format!("{section}.{key}"))
}

fn optional_bool(node: &Yaml, key: &str) -> Result<bool, CliError> {
    match &node[key] {
        Yaml::BadValue => Ok(false),
        Yaml::Boolean(b) => Ok(*b),
        other => Err(CliError::Config(format!(
            "\"{key}\" must be a boolean, got {other:?}"
        ))),
    }
}

fn optional_usize(node: &Yaml, key: &str) -> Result<Option<usize>, CliError> {
    match &node[key] {
        Yaml::BadValue => Ok(None),
        Yaml::Integer(i) if *i > 0 => Ok(Some(*i as usize)),
        other => Err(CliError::Config(format!(
            "\"{key}\" must be a positive integer, got {other:?}"
        ))),
    }
}

/// Strings of the exact form `${NAME}` resolve from the environment; a
/// missing variable is a configuration error, not an empty string.
fn interpolate(raw: &str, field: &str) -> Result<String, CliError> {
    let Some(name) = raw.strip_prefix("${").and_then(|r| r.strip_suffix('}')) else {
        return Ok(raw.to_string());
    };
    std::env::var(name).map_err(|_| {
        CliError::Config(format!(
            "environment variable {name} is not set (referenced by {field})"
        ))
    })
}
