//! Purpose: Project a key tuple and optional value tuple into a row of requested columns.
//! Exports: `RowProjector`.
//! Role: Hot decode path between storage key/value pairs and schema-shaped rows.
//! Invariants: Key tuples are scanned exhaustively; their tag order is not guaranteed.
//! Invariants: Value tuples are ascending by tag, so scanning stops once every requested
//! Invariants: value column is filled or the current tag passes the largest requested tag.
//! Invariants: Any decode or conversion failure aborts the call; no partial row escapes.
//! Invariants: Exactly one pooled cursor is checked out per call and returned on every path.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::core::cursor::{CursorPool, TupleCursor};
use crate::core::error::{Error, ErrorKind};
use crate::core::row::Row;
use crate::core::schema::Column;
use crate::core::tuple::StoredValue;
use crate::core::value::Value;

#[derive(Clone, Copy, Debug)]
struct Slot {
    dest: usize,
    column: usize,
    from_key: bool,
}

#[derive(Clone, Copy, Debug)]
enum ScanMode {
    Exhaustive,
    Ascending { wanted: usize, max_tag: u64 },
}

#[derive(Debug)]
pub struct RowProjector {
    slots: HashMap<u64, Slot>,
    columns: Vec<Column>,
    row_width: usize,
    vals_from_key: usize,
    vals_from_value: usize,
    max_value_tag: u64,
    cursors: Arc<CursorPool>,
}

impl RowProjector {
    /// `tag_to_index` maps each requested tag to its slot in the output row. `row_width`
    /// may exceed the number of requested tags; the extra slots stay null.
    pub fn new(
        tag_to_index: HashMap<u64, usize>,
        columns: Vec<Column>,
        row_width: usize,
    ) -> Result<Self, Error> {
        let mut slots = HashMap::with_capacity(tag_to_index.len());
        let mut used = HashSet::with_capacity(tag_to_index.len());
        for (&tag, &dest) in &tag_to_index {
            if dest >= row_width {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!(
                        "destination index {dest} is outside row width {row_width}"
                    ))
                    .with_tag(tag));
            }
            if !used.insert(dest) {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("destination index {dest} is requested twice"))
                    .with_tag(tag));
            }
            let column = columns
                .iter()
                .position(|column| column.tag == tag)
                .ok_or_else(|| {
                    Error::new(ErrorKind::Usage)
                        .with_message("requested tag has no column descriptor")
                        .with_tag(tag)
                })?;
            slots.insert(
                tag,
                Slot {
                    dest,
                    column,
                    from_key: columns[column].is_part_of_key,
                },
            );
        }

        let mut vals_from_key = 0;
        let mut vals_from_value = 0;
        let mut max_value_tag = 0;
        for (tag, slot) in &slots {
            if slot.from_key {
                vals_from_key += 1;
            } else {
                vals_from_value += 1;
                max_value_tag = max_value_tag.max(*tag);
            }
        }

        Ok(Self {
            slots,
            columns,
            row_width,
            vals_from_key,
            vals_from_value,
            max_value_tag,
            cursors: Arc::new(CursorPool::new()),
        })
    }

    /// Projects every column, column `i` landing in slot `i`.
    pub fn for_columns(columns: Vec<Column>) -> Result<Self, Error> {
        let tag_to_index = columns
            .iter()
            .enumerate()
            .map(|(index, column)| (column.tag, index))
            .collect();
        let width = columns.len();
        Self::new(tag_to_index, columns, width)
    }

    /// Shares a cursor pool with other projectors of the same scan context.
    pub fn with_cursor_pool(mut self, cursors: Arc<CursorPool>) -> Self {
        self.cursors = cursors;
        self
    }

    pub fn cursor_pool(&self) -> &Arc<CursorPool> {
        &self.cursors
    }

    pub fn row_width(&self) -> usize {
        self.row_width
    }

    pub fn convert(&self, key: &StoredValue, value: &StoredValue) -> Result<Row, Error> {
        let key_tuple = match key {
            StoredValue::Tuple(tuple) => tuple,
            _ => {
                return Err(
                    Error::new(ErrorKind::MalformedInput).with_message("invalid key is not a tuple")
                );
            }
        };
        let value_tuple = match value {
            StoredValue::Tuple(tuple) => Some(tuple),
            StoredValue::Absent => None,
            StoredValue::Blob(_) => {
                return Err(Error::new(ErrorKind::MalformedInput)
                    .with_message("invalid value is not a tuple"));
            }
        };

        let mut cursor = self.cursors.checkout();
        let mut values = vec![Value::Null; self.row_width];

        if self.vals_from_key > 0 {
            self.scan_tuple(
                &mut cursor,
                key_tuple.as_slice(),
                &mut values,
                true,
                ScanMode::Exhaustive,
            )?;
        }

        if self.vals_from_value > 0 {
            if let Some(tuple) = value_tuple {
                let mode = ScanMode::Ascending {
                    wanted: self.vals_from_value,
                    max_tag: self.max_value_tag,
                };
                self.scan_tuple(&mut cursor, tuple.as_slice(), &mut values, false, mode)?;
            }
        }

        Ok(Row::new(values))
    }

    fn scan_tuple(
        &self,
        cursor: &mut TupleCursor,
        bytes: &[u8],
        values: &mut [Value],
        key_side: bool,
        mode: ScanMode,
    ) -> Result<(), Error> {
        cursor.init_for(bytes)?;
        let mut filled = 0usize;
        while let Some(tag) = cursor.next_tag(bytes)? {
            if let ScanMode::Ascending { max_tag, .. } = mode {
                if tag > max_tag {
                    break;
                }
            }

            match self.slots.get(&tag) {
                Some(slot) if slot.from_key == key_side => {
                    let raw = cursor.next_value(bytes)?;
                    values[slot.dest] = self.columns[slot.column].convert(raw)?;
                    filled += 1;
                }
                _ => cursor.skip_value(bytes)?,
            }

            if let ScanMode::Ascending { wanted, .. } = mode {
                if filled >= wanted {
                    break;
                }
            }
        }
        Ok(())
    }
}
