//! Purpose: Sequential decoding over one tuple plus a scoped pool of reusable cursors.
//! Exports: `TupleCursor`, `CursorPool`, `PooledCursor`.
//! Role: Decoding side of the tuple format, consumed by the row projector.
//! Invariants: A cursor yields (tag, value) pairs in stored order; each tag must be
//! Invariants: followed by exactly one `next_value` or `skip_value` call.
//! Invariants: A `PooledCursor` always returns to its pool on drop, including on error paths.
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::core::error::{Error, ErrorKind};
use crate::core::tuple::{
    KIND_BOOL, KIND_BYTES, KIND_FLOAT, KIND_INT, KIND_NULL, KIND_STR, KIND_UINT, TUPLE_HEADER_LEN,
    TUPLE_MAGIC,
};
use crate::core::value::RawValue;

const DEFAULT_MAX_IDLE: usize = 64;

#[derive(Debug, Default)]
pub struct TupleCursor {
    next_off: usize,
    remaining: u32,
    value_pending: bool,
}

impl TupleCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positions the cursor before the first pair of `bytes`, validating the tuple header.
    pub fn init_for(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.reset();
        if bytes.len() < TUPLE_HEADER_LEN {
            return Err(malformed("tuple header too small", 0));
        }
        if bytes[0..4] != TUPLE_MAGIC {
            return Err(malformed("bad tuple magic", 0));
        }
        self.remaining = read_u32(bytes, 4);
        self.next_off = TUPLE_HEADER_LEN;
        Ok(())
    }

    /// Returns the next tag, or `None` once every pair has been read.
    pub fn next_tag(&mut self, bytes: &[u8]) -> Result<Option<u64>, Error> {
        if self.value_pending {
            return Err(Error::new(ErrorKind::Internal)
                .with_message("tuple value must be read or skipped before the next tag"));
        }
        if self.remaining == 0 {
            return Ok(None);
        }
        let tag = read_u64_checked(bytes, self.next_off)?;
        self.next_off += 8;
        self.remaining -= 1;
        self.value_pending = true;
        Ok(Some(tag))
    }

    pub fn next_value<'a>(&mut self, bytes: &'a [u8]) -> Result<RawValue<'a>, Error> {
        let kind = self.take_kind(bytes)?;
        let offset = self.next_off;
        let value = match kind {
            KIND_NULL => RawValue::Null,
            KIND_BOOL => {
                let byte = slice_at(bytes, offset, 1)?[0];
                self.next_off += 1;
                match byte {
                    0 => RawValue::Bool(false),
                    1 => RawValue::Bool(true),
                    _ => return Err(malformed("invalid bool byte", offset)),
                }
            }
            KIND_INT => {
                let value = read_u64_checked(bytes, offset)? as i64;
                self.next_off += 8;
                RawValue::Int(value)
            }
            KIND_UINT => {
                let value = read_u64_checked(bytes, offset)?;
                self.next_off += 8;
                RawValue::Uint(value)
            }
            KIND_FLOAT => {
                let value = f64::from_bits(read_u64_checked(bytes, offset)?);
                self.next_off += 8;
                RawValue::Float(value)
            }
            KIND_STR => {
                let payload = self.take_len_prefixed(bytes)?;
                let value = std::str::from_utf8(payload).map_err(|err| {
                    malformed("string field is not utf-8", offset).with_source(err)
                })?;
                RawValue::Str(value)
            }
            KIND_BYTES => RawValue::Bytes(self.take_len_prefixed(bytes)?),
            _ => return Err(malformed("unknown value kind", offset - 1)),
        };
        Ok(value)
    }

    /// Advances past the pending value without decoding its payload.
    pub fn skip_value(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let kind = self.take_kind(bytes)?;
        let offset = self.next_off;
        let len = match kind {
            KIND_NULL => 0,
            KIND_BOOL => 1,
            KIND_INT | KIND_UINT | KIND_FLOAT => 8,
            KIND_STR | KIND_BYTES => 4 + read_u32_checked(bytes, offset)? as usize,
            _ => return Err(malformed("unknown value kind", offset - 1)),
        };
        slice_at(bytes, offset, len)?;
        self.next_off += len;
        Ok(())
    }

    fn take_kind(&mut self, bytes: &[u8]) -> Result<u8, Error> {
        if !self.value_pending {
            return Err(Error::new(ErrorKind::Internal)
                .with_message("tuple value requested before its tag"));
        }
        let kind = slice_at(bytes, self.next_off, 1)?[0];
        self.next_off += 1;
        self.value_pending = false;
        Ok(kind)
    }

    fn take_len_prefixed<'a>(&mut self, bytes: &'a [u8]) -> Result<&'a [u8], Error> {
        let len = read_u32_checked(bytes, self.next_off)? as usize;
        let payload = slice_at(bytes, self.next_off + 4, len)?;
        self.next_off += 4 + len;
        Ok(payload)
    }

    fn reset(&mut self) {
        self.next_off = 0;
        self.remaining = 0;
        self.value_pending = false;
    }
}

/// Pool of idle cursors shared by the projectors of one scan context.
#[derive(Debug)]
pub struct CursorPool {
    idle: Mutex<Vec<TupleCursor>>,
    max_idle: usize,
    created: AtomicUsize,
}

impl CursorPool {
    pub fn new() -> Self {
        Self::with_max_idle(DEFAULT_MAX_IDLE)
    }

    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
            created: AtomicUsize::new(0),
        }
    }

    pub fn checkout(&self) -> PooledCursor<'_> {
        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let cursor = reused.unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            TupleCursor::new()
        });
        PooledCursor { pool: self, cursor }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of cursors allocated over the pool's lifetime.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    fn checkin(&self, mut cursor: TupleCursor) {
        cursor.reset();
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(cursor);
        }
    }
}

impl Default for CursorPool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct PooledCursor<'p> {
    pool: &'p CursorPool,
    cursor: TupleCursor,
}

impl Deref for PooledCursor<'_> {
    type Target = TupleCursor;

    fn deref(&self) -> &TupleCursor {
        &self.cursor
    }
}

impl DerefMut for PooledCursor<'_> {
    fn deref_mut(&mut self) -> &mut TupleCursor {
        &mut self.cursor
    }
}

impl Drop for PooledCursor<'_> {
    fn drop(&mut self) {
        self.pool.checkin(std::mem::take(&mut self.cursor));
    }
}

fn malformed(message: &str, offset: usize) -> Error {
    Error::new(ErrorKind::MalformedInput)
        .with_message(message)
        .with_offset(offset as u64)
}

fn slice_at(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], Error> {
    offset
        .checked_add(len)
        .and_then(|end| bytes.get(offset..end))
        .ok_or_else(|| malformed("tuple field runs past end of buffer", offset))
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(out)
}

fn read_u32_checked(buf: &[u8], offset: usize) -> Result<u32, Error> {
    let mut out = [0u8; 4];
    out.copy_from_slice(slice_at(buf, offset, 4)?);
    Ok(u32::from_le_bytes(out))
}

fn read_u64_checked(buf: &[u8], offset: usize) -> Result<u64, Error> {
    let mut out = [0u8; 8];
    out.copy_from_slice(slice_at(buf, offset, 8)?);
    Ok(u64::from_le_bytes(out))
}
