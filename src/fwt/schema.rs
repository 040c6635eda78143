//! Purpose: Per-column width limits for fixed-width output.
//! Exports: `FixedWidthSchema`, `FixedWidthColumn`.
//! Invariants: Column `i` of the width schema formats slot `i` of a row.
//! Invariants: Columns with no observed non-null value have width 0.
use std::collections::BTreeMap;

use crate::core::schema::Schema;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FixedWidthColumn {
    pub tag: u64,
    pub name: String,
    /// Display columns reserved for the value.
    pub width: usize,
    /// Most characters seen in one value; used to presize cells.
    pub max_chars: usize,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FixedWidthSchema {
    columns: Vec<FixedWidthColumn>,
}

impl FixedWidthSchema {
    pub fn new(columns: Vec<FixedWidthColumn>) -> Self {
        Self { columns }
    }

    /// Builds limits from widths learned per column tag.
    pub fn from_learned(
        schema: &Schema,
        widths: &BTreeMap<u64, usize>,
        max_chars: &BTreeMap<u64, usize>,
    ) -> Self {
        let columns = schema
            .columns()
            .iter()
            .map(|column| FixedWidthColumn {
                tag: column.tag,
                name: column.name.clone(),
                width: widths.get(&column.tag).copied().unwrap_or(0),
                max_chars: max_chars.get(&column.tag).copied().unwrap_or(0),
            })
            .collect();
        Self { columns }
    }

    pub fn columns(&self) -> &[FixedWidthColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn width_of(&self, tag: u64) -> Option<usize> {
        self.columns
            .iter()
            .find(|column| column.tag == tag)
            .map(|column| column.width)
    }

    /// Width of a formatted line, separators included.
    pub fn line_width(&self) -> usize {
        let cells: usize = self.columns.iter().map(|column| column.width).sum();
        let separators = self.columns.len().saturating_sub(1) * super::COLUMN_SEPARATOR.len();
        cells + separators
    }
}
