//! Session lifecycle and the guest-facing label/query protocol.
//!
//! A [`TaintSession`] is the explicit owner of everything process-wide in
//! the engine: the interning table, the (lazily allocated) shadow memory,
//! the auto-label counter, and the query log's deduplication state. The
//! state machine is `Disabled → Enabled → Disabling → Disabled`, where
//! `Disabling` is the one-step window that lets the embedder flush
//! translated-code caches and unhook instrumentation before shadow state is
//! torn down.

pub mod controller;
pub mod log;

pub use controller::{
    LabelMode, QuerySummary, SessionConfig, SessionState, TaintSession,
};
pub use log::{JsonLinesSink, RecordSink, TaintRecord, VecSink};
