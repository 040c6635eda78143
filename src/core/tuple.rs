//! Purpose: Byte layout for tag-addressed tuples plus the storage-level value envelope.
//! Exports: `TupleBuf`, `TupleBuilder`, `StoredValue`, layout constants.
//! Role: Encoding side of the tuple format; decoding lives in `cursor`.
//! Invariants: Value tuples built via `TupleBuilder::ascending` have strictly ascending tags.
//! Invariants: Key tuples carry no ordering guarantee and are written in push order.
//! Invariants: All integers are little-endian; strings and bytes are u32 length-prefixed.
use crate::core::error::{Error, ErrorKind};
use crate::core::value::RawValue;

pub const TUPLE_MAGIC: [u8; 4] = *b"TUP1";
pub const TUPLE_HEADER_LEN: usize = 8;

pub const KIND_NULL: u8 = 0;
pub const KIND_BOOL: u8 = 1;
pub const KIND_INT: u8 = 2;
pub const KIND_UINT: u8 = 3;
pub const KIND_FLOAT: u8 = 4;
pub const KIND_STR: u8 = 5;
pub const KIND_BYTES: u8 = 6;

#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TupleBuf {
    bytes: Vec<u8>,
}

impl TupleBuf {
    /// Wraps bytes produced elsewhere; the layout is checked when a cursor is initialized.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Builds a key tuple, keeping pairs in the given order.
    pub fn key(pairs: &[(u64, RawValue<'_>)]) -> Result<Self, Error> {
        let mut builder = TupleBuilder::new();
        for (tag, value) in pairs {
            builder.push(*tag, *value)?;
        }
        Ok(builder.finish())
    }

    /// Builds a value tuple; tags must be strictly ascending.
    pub fn value(pairs: &[(u64, RawValue<'_>)]) -> Result<Self, Error> {
        let mut builder = TupleBuilder::ascending();
        for (tag, value) in pairs {
            builder.push(*tag, *value)?;
        }
        Ok(builder.finish())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[derive(Debug)]
pub struct TupleBuilder {
    bytes: Vec<u8>,
    count: u32,
    last_tag: Option<u64>,
    ascending: bool,
}

impl TupleBuilder {
    pub fn new() -> Self {
        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(&TUPLE_MAGIC);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        Self {
            bytes,
            count: 0,
            last_tag: None,
            ascending: false,
        }
    }

    pub fn ascending() -> Self {
        Self {
            ascending: true,
            ..Self::new()
        }
    }

    pub fn push(&mut self, tag: u64, value: RawValue<'_>) -> Result<&mut Self, Error> {
        if self.ascending {
            if let Some(last) = self.last_tag {
                if tag <= last {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message("value tuple tags must be strictly ascending")
                        .with_tag(tag));
                }
            }
        }
        if self.count == u32::MAX {
            return Err(Error::new(ErrorKind::Usage).with_message("tuple has too many fields"));
        }

        self.bytes.extend_from_slice(&tag.to_le_bytes());
        match value {
            RawValue::Null => self.bytes.push(KIND_NULL),
            RawValue::Bool(value) => {
                self.bytes.push(KIND_BOOL);
                self.bytes.push(value as u8);
            }
            RawValue::Int(value) => {
                self.bytes.push(KIND_INT);
                self.bytes.extend_from_slice(&value.to_le_bytes());
            }
            RawValue::Uint(value) => {
                self.bytes.push(KIND_UINT);
                self.bytes.extend_from_slice(&value.to_le_bytes());
            }
            RawValue::Float(value) => {
                self.bytes.push(KIND_FLOAT);
                self.bytes.extend_from_slice(&value.to_le_bytes());
            }
            RawValue::Str(value) => {
                self.bytes.push(KIND_STR);
                write_len_prefixed(&mut self.bytes, value.as_bytes(), tag)?;
            }
            RawValue::Bytes(value) => {
                self.bytes.push(KIND_BYTES);
                write_len_prefixed(&mut self.bytes, value, tag)?;
            }
        }

        self.count += 1;
        self.last_tag = Some(tag);
        Ok(self)
    }

    pub fn finish(mut self) -> TupleBuf {
        self.bytes[4..8].copy_from_slice(&self.count.to_le_bytes());
        TupleBuf { bytes: self.bytes }
    }
}

impl Default for TupleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn write_len_prefixed(buf: &mut Vec<u8>, payload: &[u8], tag: u64) -> Result<(), Error> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message("tuple field exceeds u32 length")
            .with_tag(tag)
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(())
}

/// A value as handed over by the storage layer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoredValue {
    /// No value tuple: zero non-key columns, or a logically deleted value.
    Absent,
    Tuple(TupleBuf),
    /// Anything that is not a tuple; decoding it is a malformed-input error.
    Blob(Vec<u8>),
}

impl StoredValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, StoredValue::Absent)
    }

    pub fn as_tuple(&self) -> Option<&TupleBuf> {
        match self {
            StoredValue::Tuple(tuple) => Some(tuple),
            _ => None,
        }
    }
}

impl From<TupleBuf> for StoredValue {
    fn from(tuple: TupleBuf) -> Self {
        StoredValue::Tuple(tuple)
    }
}
