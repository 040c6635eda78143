// Core modules implementing the tuple format, decoding, and row projection.
pub mod cursor;
pub mod error;
pub mod kv;
pub mod projector;
pub mod row;
pub mod row_iter;
pub mod schema;
pub mod tuple;
pub mod value;
