//! Purpose: Format rows into fixed-width text cells.
//! Exports: `FixedWidthFormatter`, `TooLongBehavior`, `LINE_WIDTH_PROP`.
//! Role: `RowTransform` used directly or behind the auto-sizing stage.
//! Invariants: Output rows hold one `Value::String` per width column, padded to its width
//! Invariants: unless the behaviour is `PrintAll` and the value overflows.
//! Invariants: Nulls render as blank cells.
use std::fmt;
use std::str::FromStr;

use serde_json::json;

use crate::core::error::{Error, ErrorKind};
use crate::core::row::Row;
use crate::core::value::Value;
use crate::fwt::schema::FixedWidthSchema;
use crate::fwt::width::{display_width, truncate_to_width};
use crate::pipeline::props::PropMap;
use crate::pipeline::stage::{RowTransform, TransformedRow};

/// Property set on every formatted row: the line width the schema produces.
pub const LINE_WIDTH_PROP: &str = "fwt.line_width";

/// What to do with a value wider than its column.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TooLongBehavior {
    /// Reject the row as a transform failure.
    Error,
    /// Drop the row without reporting it.
    SkipRow,
    #[default]
    Truncate,
    /// Replace the value with `#` across the column.
    HashFill,
    /// Print the whole value and let the line run long.
    PrintAll,
}

impl TooLongBehavior {
    pub fn name(self) -> &'static str {
        match self {
            TooLongBehavior::Error => "error",
            TooLongBehavior::SkipRow => "skip",
            TooLongBehavior::Truncate => "truncate",
            TooLongBehavior::HashFill => "hash",
            TooLongBehavior::PrintAll => "print-all",
        }
    }
}

impl fmt::Display for TooLongBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TooLongBehavior {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(TooLongBehavior::Error),
            "skip" => Ok(TooLongBehavior::SkipRow),
            "truncate" => Ok(TooLongBehavior::Truncate),
            "hash" => Ok(TooLongBehavior::HashFill),
            "print-all" => Ok(TooLongBehavior::PrintAll),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown too-long behavior '{other}'"))
                .with_hint("use one of: error, skip, truncate, hash, print-all")),
        }
    }
}

enum Cell {
    Text(String),
    Skip,
}

#[derive(Clone, Debug)]
pub struct FixedWidthFormatter {
    schema: FixedWidthSchema,
    too_long: TooLongBehavior,
}

impl FixedWidthFormatter {
    pub fn new(schema: FixedWidthSchema, too_long: TooLongBehavior) -> Self {
        Self { schema, too_long }
    }

    pub fn schema(&self) -> &FixedWidthSchema {
        &self.schema
    }

    pub fn too_long(&self) -> TooLongBehavior {
        self.too_long
    }

    /// Formats one row. `Ok(None)` means the row is skipped; `Err` carries the
    /// failure detail.
    pub fn format_row(&self, row: &Row) -> Result<Option<Row>, String> {
        if row.len() != self.schema.len() {
            return Err(format!(
                "row has {} values but the width schema has {} columns",
                row.len(),
                self.schema.len()
            ));
        }
        let mut cells = Vec::with_capacity(row.len());
        for (value, column) in row.iter().zip(self.schema.columns()) {
            let text = match value {
                Value::Null => String::new(),
                other => other.to_string(),
            };
            match self.fit(text, column.width, column.max_chars, &column.name)? {
                Cell::Text(cell) => cells.push(Value::String(cell)),
                Cell::Skip => return Ok(None),
            }
        }
        Ok(Some(Row::new(cells)))
    }

    fn fit(
        &self,
        text: String,
        width: usize,
        max_chars: usize,
        column: &str,
    ) -> Result<Cell, String> {
        let text_width = display_width(&text);
        if text_width <= width {
            return Ok(Cell::Text(pad(&text, text_width, width, max_chars)));
        }
        match self.too_long {
            TooLongBehavior::Error => Err(format!(
                "value in column '{column}' is {text_width} columns wide; limit is {width}"
            )),
            TooLongBehavior::SkipRow => Ok(Cell::Skip),
            TooLongBehavior::Truncate => {
                let kept = truncate_to_width(&text, width);
                Ok(Cell::Text(pad(kept, display_width(kept), width, max_chars)))
            }
            TooLongBehavior::HashFill => Ok(Cell::Text("#".repeat(width))),
            TooLongBehavior::PrintAll => Ok(Cell::Text(text)),
        }
    }
}

fn pad(text: &str, text_width: usize, width: usize, max_chars: usize) -> String {
    let mut cell = String::with_capacity(max_chars.max(width));
    cell.push_str(text);
    cell.extend(std::iter::repeat_n(' ', width.saturating_sub(text_width)));
    cell
}

impl RowTransform for FixedWidthFormatter {
    fn transform(&mut self, row: &Row, _props: &PropMap) -> Result<Vec<TransformedRow>, String> {
        Ok(self
            .format_row(row)?
            .map(|formatted| {
                TransformedRow::new(formatted)
                    .with_prop(LINE_WIDTH_PROP, json!(self.schema.line_width()))
            })
            .into_iter()
            .collect())
    }
}
