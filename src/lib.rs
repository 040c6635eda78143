//! Purpose: Row materialization from tagged tuples plus cancellable row transform pipelines.
//! Exports: `api` (flat public boundary), `core` (tuple codec, cursor pool, projector,
//! Exports: row iterator), `pipeline` (stage engine, runner), `fwt` (fixed-width output).
//! Role: Library backing the `tuplerow` binary and embedding hosts.
//! Invariants: Decode errors abort one call only; stage failures never abort a pipeline.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod fwt;
pub mod pipeline;
