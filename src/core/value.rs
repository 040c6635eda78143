//! Purpose: Value model for tuple contents and materialized rows.
//! Exports: `RawValue` (borrowed, as stored in a tuple), `Value` (owned, typed row slot).
//! Role: Boundary between the tuple byte layout and schema-level conversion.
//! Invariants: `RawValue` never allocates; it borrows from the tuple bytes.
//! Invariants: `Value::Null` doubles as the marker for unfilled row slots.
use std::fmt;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RawValue<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(&'a str),
    Bytes(&'a [u8]),
}

impl RawValue<'_> {
    pub fn kind_name(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Bool(_) => "bool",
            RawValue::Int(_) => "int",
            RawValue::Uint(_) => "uint",
            RawValue::Float(_) => "float",
            RawValue::Str(_) => "string",
            RawValue::Bytes(_) => "bytes",
        }
    }

    pub fn to_owned_value(&self) -> Value {
        match *self {
            RawValue::Null => Value::Null,
            RawValue::Bool(value) => Value::Bool(value),
            RawValue::Int(value) => Value::Int(value),
            RawValue::Uint(value) => Value::Uint(value),
            RawValue::Float(value) => Value::Float(value),
            RawValue::Str(value) => Value::String(value.to_string()),
            RawValue::Bytes(value) => Value::Bytes(value.to_vec()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_raw(&self) -> RawValue<'_> {
        match self {
            Value::Null => RawValue::Null,
            Value::Bool(value) => RawValue::Bool(*value),
            Value::Int(value) => RawValue::Int(*value),
            Value::Uint(value) => RawValue::Uint(*value),
            Value::Float(value) => RawValue::Float(*value),
            Value::String(value) => RawValue::Str(value),
            Value::Bytes(value) => RawValue::Bytes(value),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Uint(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::String(value) => f.write_str(value),
            Value::Bytes(value) => {
                f.write_str("0x")?;
                for byte in value {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Uint(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}
