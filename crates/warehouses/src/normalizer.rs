use crate::{error::WarehouseError, kind::WarehouseKind};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use model::records::{batch::RowBatch, value::Value};
use tracing::warn;

/// Pure per-batch value coercion applied at the boundary as rows flow from
/// source to target: geometry payloads arrive as GeoJSON and leave as WKT,
/// binary columns are canonicalized to bytes, everything else passes
/// through untouched.
#[derive(Debug, Clone, Copy)]
pub struct ValueNormalizer {
    source: WarehouseKind,
    target: WarehouseKind,
}

impl ValueNormalizer {
    pub fn resolve(
        source: WarehouseKind,
        target: WarehouseKind,
    ) -> Result<Self, WarehouseError> {
        match (source, target) {
            (WarehouseKind::Snowflake, WarehouseKind::Postgres) => {
                Ok(ValueNormalizer { source, target })
            }
            (s, t) => Err(WarehouseError::NotSupported(format!(
                "no value normalizer for the {s} to {t} pair"
            ))),
        }
    }

    pub fn source(&self) -> WarehouseKind {
        self.source
    }

    pub fn target(&self) -> WarehouseKind {
        self.target
    }

    pub fn normalize_batch(&self, mut batch: RowBatch) -> RowBatch {
        let mut spatial = Vec::new();
        let mut binary = Vec::new();
        for (idx, column) in batch.columns.iter().enumerate() {
            let upper = column.logical_type.to_uppercase();
            if upper.contains("GEOMETRY") || upper.contains("GEOGRAPHY") {
                spatial.push(idx);
            } else if upper.contains("BINARY") {
                binary.push(idx);
            }
        }
        if spatial.is_empty() && binary.is_empty() {
            return batch;
        }

        for row in &mut batch.rows {
            for &idx in &spatial {
                if let Some(value) = row.get(idx).cloned() {
                    row.set(idx, normalize_spatial(value));
                }
            }
            for &idx in &binary {
                if let Some(value) = row.get(idx).cloned() {
                    row.set(idx, normalize_binary(value));
                }
            }
        }
        batch
    }
}

fn normalize_spatial(value: Value) -> Value {
    let Value::Str(text) = &value else {
        return value;
    };
    match geojson_to_wkt(text) {
        Some(wkt) => Value::Str(wkt),
        // Not GeoJSON; assume it is already WKT or another native form.
        None => value,
    }
}

/// Converts a GeoJSON payload to WKT. Point geometries are the only kind
/// the source's change mechanism emits today.
pub fn geojson_to_wkt(payload: &str) -> Option<String> {
    let geojson: serde_json::Value = serde_json::from_str(payload).ok()?;
    let kind = geojson.get("type")?.as_str()?;
    if !kind.eq_ignore_ascii_case("point") {
        warn!(geometry_type = kind, "unsupported GeoJSON geometry type");
        return None;
    }
    let coords = geojson.get("coordinates")?.as_array()?;
    let x = coords.first()?.as_f64()?;
    let y = coords.get(1)?.as_f64()?;
    Some(format!("POINT({x} {y})"))
}

fn normalize_binary(value: Value) -> Value {
    match &value {
        Value::Bytes(_) => value,
        Value::Str(text) => match decode_binary(text) {
            Some(bytes) => Value::Bytes(bytes),
            None => value,
        },
        _ => value,
    }
}

// The source renders binary columns as hex; base64 shows up in older
// exports.
fn decode_binary(text: &str) -> Option<Vec<u8>> {
    if let Ok(bytes) = hex::decode(text) {
        return Some(bytes);
    }
    BASE64.decode(text).ok()
}
