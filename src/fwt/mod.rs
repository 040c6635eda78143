//! Purpose: Fixed-width text output for rows.
//! Exports: width measurement, `FixedWidthSchema`, `FixedWidthFormatter`, `AutoSizingStage`.
//! Role: Terminal presentation layer fed by the pipeline.
pub mod auto;
pub mod formatter;
pub mod schema;
pub mod width;

use crate::core::row::Row;

pub use auto::{AUTO_SIZE_STAGE_NAME, AutoSizeConfig, AutoSizingStage};
pub use formatter::{FixedWidthFormatter, LINE_WIDTH_PROP, TooLongBehavior};
pub use schema::{FixedWidthColumn, FixedWidthSchema};

pub const COLUMN_SEPARATOR: &str = "  ";

/// Joins a formatted row into one output line.
pub fn join_line(row: &Row) -> String {
    let mut line = String::new();
    for (i, value) in row.iter().enumerate() {
        if i > 0 {
            line.push_str(COLUMN_SEPARATOR);
        }
        line.push_str(&value.to_string());
    }
    line
}
