use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar value in flight between warehouses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(BigDecimal),
    Str(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Renders the value as a SQL literal in the target dialect. Strings
    /// double embedded quotes; bytes use the hex escape form.
    pub fn sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Decimal(v) => v.to_string(),
            Value::Str(v) => format!("'{}'", v.replace('\'', "''")),
            Value::Bytes(v) => {
                let hex: String = v.iter().map(|b| format!("{b:02x}")).collect();
                format!("'\\x{hex}'")
            }
            Value::Json(v) => format!("'{}'", v.to_string().replace('\'', "''")),
            Value::Date(v) => format!("'{v}'"),
            Value::Timestamp(v) => format!("'{v}'"),
            Value::TimestampTz(v) => format!("'{}'", v.to_rfc3339()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql_literal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_literals_double_embedded_quotes() {
        assert_eq!(
            Value::Str("o'brien".to_string()).sql_literal(),
            "'o''brien'"
        );
    }

    #[test]
    fn byte_literals_render_as_hex() {
        assert_eq!(Value::Bytes(vec![0xde, 0xad]).sql_literal(), "'\\xdead'");
    }

    #[test]
    fn null_renders_bare() {
        assert_eq!(Value::Null.sql_literal(), "NULL");
    }
}
