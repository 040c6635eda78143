//! Purpose: Flat public API boundary for embedding hosts, the CLI, and integration tests.
//! Exports: The types needed to encode tuples, project rows, and run pipelines.
//! Role: Additive-only surface over `core`, `pipeline`, and `fwt`.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::cursor::{CursorPool, PooledCursor, TupleCursor};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::kv::KvMap;
pub use crate::core::projector::RowProjector;
pub use crate::core::row::Row;
pub use crate::core::row_iter::{KvClose, KvPair, KvPull, RowIter};
pub use crate::core::schema::{Column, ColumnType, Schema, TypeConverter};
pub use crate::core::tuple::{StoredValue, TupleBuf, TupleBuilder};
pub use crate::core::value::{RawValue, Value};
pub use crate::fwt::{
    AUTO_SIZE_STAGE_NAME, AutoSizeConfig, AutoSizingStage, FixedWidthFormatter, FixedWidthSchema,
    LINE_WIDTH_PROP, TooLongBehavior, join_line,
};
pub use crate::pipeline::{
    Pipeline, PipelineConfig, PipelineOutputs, PipelineResult, PropMap, RowTransform,
    RowWithProps, RunningPipeline, Stage, StageIo, TransformFailure, TransformStage,
    TransformedRow,
};
