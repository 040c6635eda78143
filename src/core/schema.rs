//! Purpose: Column descriptors, schemas, and the per-column type conversion capability.
//! Exports: `Column`, `Schema`, `TypeConverter`, `ColumnType`.
//! Role: Boundary with the schema catalog; the projector only calls `TypeConverter::convert`.
//! Invariants: Tags are unique within a schema.
//! Invariants: Converters map `RawValue::Null` to `Value::Null` and never panic on bad input.
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::error::{Error, ErrorKind};
use crate::core::value::{RawValue, Value};

pub trait TypeConverter: Send + Sync {
    fn type_name(&self) -> &str;

    fn convert(&self, raw: RawValue<'_>) -> Result<Value, Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnType {
    Int,
    Uint,
    Float,
    Bool,
    String,
    Bytes,
    Any,
}

impl ColumnType {
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Uint => "uint",
            ColumnType::Float => "float",
            ColumnType::Bool => "bool",
            ColumnType::String => "string",
            ColumnType::Bytes => "bytes",
            ColumnType::Any => "any",
        }
    }
}

impl FromStr for ColumnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "int" => Ok(ColumnType::Int),
            "uint" => Ok(ColumnType::Uint),
            "float" => Ok(ColumnType::Float),
            "bool" => Ok(ColumnType::Bool),
            "string" => Ok(ColumnType::String),
            "bytes" => Ok(ColumnType::Bytes),
            "any" => Ok(ColumnType::Any),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown column type '{s}'"))
                .with_hint("Use one of: int, uint, float, bool, string, bytes, any.")),
        }
    }
}

impl TypeConverter for ColumnType {
    fn type_name(&self) -> &str {
        self.name()
    }

    fn convert(&self, raw: RawValue<'_>) -> Result<Value, Error> {
        let converted = match (self, raw) {
            (_, RawValue::Null) => Some(Value::Null),
            (ColumnType::Any, raw) => Some(raw.to_owned_value()),

            (ColumnType::Int, RawValue::Int(v)) => Some(Value::Int(v)),
            (ColumnType::Int, RawValue::Uint(v)) => i64::try_from(v).ok().map(Value::Int),
            (ColumnType::Int, RawValue::Str(s)) => s.trim().parse().ok().map(Value::Int),

            (ColumnType::Uint, RawValue::Uint(v)) => Some(Value::Uint(v)),
            (ColumnType::Uint, RawValue::Int(v)) => u64::try_from(v).ok().map(Value::Uint),
            (ColumnType::Uint, RawValue::Str(s)) => s.trim().parse().ok().map(Value::Uint),

            (ColumnType::Float, RawValue::Float(v)) => Some(Value::Float(v)),
            (ColumnType::Float, RawValue::Int(v)) => Some(Value::Float(v as f64)),
            (ColumnType::Float, RawValue::Uint(v)) => Some(Value::Float(v as f64)),
            (ColumnType::Float, RawValue::Str(s)) => s.trim().parse().ok().map(Value::Float),

            (ColumnType::Bool, RawValue::Bool(v)) => Some(Value::Bool(v)),
            (ColumnType::Bool, RawValue::Str(s)) => s.trim().parse().ok().map(Value::Bool),

            (ColumnType::String, RawValue::Str(s)) => Some(Value::String(s.to_string())),
            (ColumnType::String, RawValue::Bytes(b)) => {
                std::str::from_utf8(b).ok().map(|s| Value::String(s.to_string()))
            }
            (
                ColumnType::String,
                raw @ (RawValue::Bool(_) | RawValue::Int(_) | RawValue::Uint(_) | RawValue::Float(_)),
            ) => Some(Value::String(raw.to_owned_value().to_string())),

            (ColumnType::Bytes, RawValue::Bytes(b)) => Some(Value::Bytes(b.to_vec())),
            (ColumnType::Bytes, RawValue::Str(s)) => Some(Value::Bytes(s.as_bytes().to_vec())),

            _ => None,
        };

        converted.ok_or_else(|| {
            Error::new(ErrorKind::Conversion).with_message(format!(
                "cannot convert {} value to {}",
                raw.kind_name(),
                self.name()
            ))
        })
    }
}

#[derive(Clone)]
pub struct Column {
    pub tag: u64,
    pub name: String,
    pub is_part_of_key: bool,
    converter: Arc<dyn TypeConverter>,
}

impl Column {
    pub fn new(tag: u64, name: impl Into<String>, column_type: ColumnType) -> Self {
        Self::with_converter(tag, name, Arc::new(column_type))
    }

    pub fn with_converter(
        tag: u64,
        name: impl Into<String>,
        converter: Arc<dyn TypeConverter>,
    ) -> Self {
        Self {
            tag,
            name: name.into(),
            is_part_of_key: false,
            converter,
        }
    }

    pub fn key(mut self) -> Self {
        self.is_part_of_key = true;
        self
    }

    pub fn type_name(&self) -> &str {
        self.converter.type_name()
    }

    /// Converts a raw tuple value, attaching this column's name and tag to any error.
    pub fn convert(&self, raw: RawValue<'_>) -> Result<Value, Error> {
        self.converter
            .convert(raw)
            .map_err(|err| err.with_column(self.name.clone()).with_tag(self.tag))
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("tag", &self.tag)
            .field("name", &self.name)
            .field("is_part_of_key", &self.is_part_of_key)
            .field("type", &self.converter.type_name())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Result<Self, Error> {
        let mut tags = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !tags.insert(column.tag) {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("duplicate column tag")
                    .with_tag(column.tag)
                    .with_column(column.name.clone()));
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|column| column.is_part_of_key)
    }

    pub fn value_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|column| !column.is_part_of_key)
    }

    pub fn column_by_tag(&self, tag: u64) -> Option<&Column> {
        self.columns.iter().find(|column| column.tag == tag)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }
}
