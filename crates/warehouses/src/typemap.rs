use crate::{error::WarehouseError, kind::WarehouseKind};
use model::core::column::TableSchema;
use tracing::warn;

// Postgres rejects varchar lengths and timestamp precisions beyond these.
const PG_MAX_VARCHAR_LEN: u64 = 10_485_760;
const PG_MAX_TIMESTAMP_PRECISION: u64 = 6;

/// Maps a source logical type string to the target's equivalent for the
/// given dialect pair.
pub fn map_type(
    source: WarehouseKind,
    target: WarehouseKind,
    source_type: &str,
) -> Result<String, WarehouseError> {
    match (source, target) {
        (WarehouseKind::Snowflake, WarehouseKind::Postgres) => {
            Ok(snowflake_to_postgres(source_type))
        }
        (s, t) => Err(WarehouseError::NotSupported(format!(
            "no type mapping from {s} to {t}"
        ))),
    }
}

/// Maps every column of a source schema, preserving order and key flags.
pub fn map_schema(
    source: WarehouseKind,
    target: WarehouseKind,
    schema: &TableSchema,
) -> Result<TableSchema, WarehouseError> {
    let mut mapped = TableSchema::default();
    for column in schema.columns() {
        let target_type = map_type(source, target, &column.logical_type)?;
        mapped.push(column.clone().with_type(target_type));
    }
    Ok(mapped)
}

fn snowflake_to_postgres(snowflake_type: &str) -> String {
    let trimmed = snowflake_type.trim();
    let (main, args) = match trimmed.split_once('(') {
        Some((main, rest)) => (main.trim().to_uppercase(), rest.trim_end_matches(')')),
        None => (trimmed.to_uppercase(), ""),
    };

    match main.as_str() {
        "BOOLEAN" => "BOOLEAN".to_string(),
        "DATE" => "DATE".to_string(),
        "TIME" => "TIME".to_string(),
        "FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "DOUBLE PRECISION" | "REAL" => {
            "DOUBLE PRECISION".to_string()
        }
        "NUMBER" | "DECIMAL" | "NUMERIC" => {
            if args.is_empty() {
                "NUMERIC".to_string()
            } else {
                format!("NUMERIC({args})")
            }
        }
        "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "BYTEINT" => "BIGINT".to_string(),
        "VARCHAR" | "STRING" | "TEXT" => match parse_first_arg(args) {
            Some(len) if len <= PG_MAX_VARCHAR_LEN => format!("VARCHAR({len})"),
            _ => "TEXT".to_string(),
        },
        "CHAR" | "CHARACTER" => match parse_first_arg(args) {
            Some(len) => format!("CHAR({len})"),
            None => "CHAR".to_string(),
        },
        "BINARY" | "VARBINARY" => "BYTEA".to_string(),
        "TIMESTAMP_TZ" | "TIMESTAMP_LTZ" => "TIMESTAMPTZ".to_string(),
        "TIMESTAMP_NTZ" | "TIMESTAMP" | "DATETIME" => match parse_first_arg(args) {
            Some(p) => format!("TIMESTAMP({})", p.min(PG_MAX_TIMESTAMP_PRECISION)),
            None => "TIMESTAMP".to_string(),
        },
        "VARIANT" | "OBJECT" | "ARRAY" => "JSONB".to_string(),
        "VECTOR" => map_vector(args),
        "GEOGRAPHY" | "GEOMETRY" => "GEOMETRY".to_string(),
        _ => {
            warn!(
                source_type = snowflake_type,
                "unable to map source type to a postgres type, degrading to VARCHAR"
            );
            "VARCHAR".to_string()
        }
    }
}

// VECTOR(FLOAT, 256) becomes a fixed-length array of the mapped element.
fn map_vector(args: &str) -> String {
    let mut parts = args.splitn(2, ',');
    let element = parts.next().unwrap_or("").trim();
    let length = parts.next().unwrap_or("").trim();
    let mapped_element = snowflake_to_postgres(element);
    if length.is_empty() {
        format!("{mapped_element}[]")
    } else {
        format!("{mapped_element}[{length}]")
    }
}

fn parse_first_arg(args: &str) -> Option<u64> {
    args.split(',').next()?.trim().parse().ok()
}
