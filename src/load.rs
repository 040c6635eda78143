//! Purpose: Load JSON-object lines into a `KvMap` of key/value tuples for the CLI.
//! Exports: `ColumnSpec`, `load_jsonl`.
//! Role: Input side of `tuplerow table`; keeps JSON handling out of the library.
//! Invariants: Column tags are assigned 1.. in declaration order.
//! Invariants: Value tuples are written in ascending tag order; missing fields are omitted.
use std::io::{BufRead, BufReader, Read};
use std::str::FromStr;

use bstr::ByteSlice;
use serde_json::Value as JsonValue;
use tuplerow::api::{
    Column, ColumnType, Error, ErrorKind, KvMap, RawValue, StoredValue, TupleBuf,
};

/// `name:type[:key]` as given on the command line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub is_key: bool,
}

impl FromStr for ColumnSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let usage = || {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid column spec '{s}'"))
                .with_hint("use name:type or name:type:key (e.g. id:int:key)")
        };
        let mut parts = s.split(':');
        let name = parts.next().filter(|name| !name.is_empty()).ok_or_else(usage)?;
        let column_type = parts.next().ok_or_else(usage)?.parse::<ColumnType>()?;
        let is_key = match parts.next() {
            None => false,
            Some("key") => true,
            Some(_) => return Err(usage()),
        };
        if parts.next().is_some() {
            return Err(usage());
        }
        Ok(Self {
            name: name.to_string(),
            column_type,
            is_key,
        })
    }
}

pub fn columns_from_specs(specs: &[ColumnSpec]) -> Vec<Column> {
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let column = Column::new(i as u64 + 1, spec.name.clone(), spec.column_type);
            if spec.is_key { column.key() } else { column }
        })
        .collect()
}

fn raw_from_json<'a>(value: &'a JsonValue, scratch: &'a mut Option<String>) -> RawValue<'a> {
    match value {
        JsonValue::Null => RawValue::Null,
        JsonValue::Bool(b) => RawValue::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                RawValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                RawValue::Uint(u)
            } else {
                RawValue::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(s) => RawValue::Str(s),
        nested => RawValue::Str(scratch.insert(nested.to_string())),
    }
}

fn encode_record(
    columns: &[Column],
    record: &serde_json::Map<String, JsonValue>,
) -> Result<(TupleBuf, StoredValue), Error> {
    let mut scratch: Vec<Option<String>> = vec![None; columns.len()];
    let mut key_pairs = Vec::new();
    let mut value_pairs = Vec::new();
    for (column, slot) in columns.iter().zip(scratch.iter_mut()) {
        match record.get(&column.name) {
            Some(value) => {
                let raw = raw_from_json(value, slot);
                if column.is_part_of_key {
                    key_pairs.push((column.tag, raw));
                } else {
                    value_pairs.push((column.tag, raw));
                }
            }
            None if column.is_part_of_key => key_pairs.push((column.tag, RawValue::Null)),
            None => {}
        }
    }
    let key = TupleBuf::key(&key_pairs)?;
    let value = if value_pairs.is_empty() {
        StoredValue::Absent
    } else {
        TupleBuf::value(&value_pairs)?.into()
    };
    Ok((key, value))
}

/// Reads one JSON object per line. Blank lines are skipped; anything else that is
/// not an object is a `MalformedInput` error naming the line.
pub fn load_jsonl<R: Read>(reader: R, columns: &[Column]) -> Result<KvMap, Error> {
    let mut map = KvMap::new();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut line_no = 0u64;
    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read input")
                .with_source(err)
        })?;
        if read == 0 {
            break;
        }
        line_no += 1;
        let line = buf.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = |detail: String| {
            Error::new(ErrorKind::MalformedInput)
                .with_message(format!("line {line_no}: {detail}"))
                .with_hint("each input line must be one JSON object")
        };
        let record: JsonValue =
            serde_json::from_slice(line).map_err(|err| malformed(err.to_string()))?;
        let JsonValue::Object(record) = record else {
            return Err(malformed(format!("expected an object, got `{}`", line.to_str_lossy())));
        };
        let (key, value) = encode_record(columns, &record)?;
        if map.insert(key, value).is_some() {
            tracing::warn!(line = line_no, "duplicate key; later record wins");
        }
    }
    tracing::debug!(records = map.len(), lines = line_no, "input loaded");
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::{ColumnSpec, columns_from_specs, load_jsonl};
    use tuplerow::api::{ColumnType, ErrorKind, RowProjector, Value};

    fn specs() -> Vec<ColumnSpec> {
        ["id:int:key", "name:string", "tags:string"]
            .iter()
            .map(|s| s.parse().expect("spec"))
            .collect()
    }

    #[test]
    fn parses_column_specs() {
        let spec: ColumnSpec = "id:uint:key".parse().expect("spec");
        assert_eq!(spec.column_type, ColumnType::Uint);
        assert!(spec.is_key);
        for bad in ["", "id", ":int", "id:int:primary", "id:int:key:x", "id:decimal"] {
            let err = bad.parse::<ColumnSpec>().expect_err(bad);
            assert_eq!(err.kind(), ErrorKind::Usage, "{bad}");
        }
    }

    #[test]
    fn loads_objects_keyed_by_key_columns() {
        let input = "{\"id\": 2, \"name\": \"b\"}\n\n{\"id\": 1, \"tags\": [\"x\"]}\n";
        let columns = columns_from_specs(&specs());
        let map = load_jsonl(input.as_bytes(), &columns).expect("load");
        assert_eq!(map.len(), 2);

        let projector = RowProjector::for_columns(columns).expect("projector");
        let rows: Vec<_> = map
            .full_scan(projector)
            .collect::<Result<_, _>>()
            .expect("rows");
        assert_eq!(rows[0].values(), &[Value::Int(1), Value::Null, Value::from("[\"x\"]")]);
        assert_eq!(rows[1].values(), &[Value::Int(2), Value::from("b"), Value::Null]);
    }

    #[test]
    fn non_object_lines_are_rejected() {
        let columns = columns_from_specs(&specs());
        let err = load_jsonl("{\"id\": 1}\n[1, 2]\n".as_bytes(), &columns).expect_err("array");
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert!(err.message().unwrap_or_default().starts_with("line 2:"));

        let err = load_jsonl("{not json\n".as_bytes(), &columns).expect_err("garbage");
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }
}
