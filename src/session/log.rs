//! Structured query-result emission.
//!
//! Query results leave the engine as two record types: one carrying a
//! set's contents, keyed by its interning identity and emitted at most once
//! per distinct live instance, and one per queried location referencing
//! that identity. Since identical sets are physically shared, this is what
//! keeps the log linear when thousands of addresses carry one set: the
//! contents go out once, and every subsequent hit is a short reference.

use std::io::Write;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::label::{Label, LabelSet, SetId};
use crate::shadow::TaintAddr;

/// One record in the query log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaintRecord {
    /// First sighting of a distinct label-set instance: its full contents.
    UniqueLabelSet { set: SetId, labels: Vec<Label> },
    /// One queried location, referencing a previously emitted
    /// `UniqueLabelSet` by identity.
    Query {
        set: SetId,
        addr: TaintAddr,
        cardinality: u32,
    },
}

/// The external logging collaborator boundary.
pub trait RecordSink {
    fn emit(&mut self, record: TaintRecord);
}

/// Buffering sink; used by tests and embedders that post-process records.
#[derive(Debug, Default)]
pub struct VecSink {
    pub records: Vec<TaintRecord>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordSink for VecSink {
    fn emit(&mut self, record: TaintRecord) {
        self.records.push(record);
    }
}

/// Sink writing one JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn emit(&mut self, record: TaintRecord) {
        match serde_json::to_string(&record) {
            Ok(line) => {
                if let Err(err) = writeln!(self.writer, "{line}") {
                    warn!("failed to write taint record: {err}");
                }
            }
            Err(err) => warn!("failed to serialize taint record: {err}"),
        }
    }
}

/// Per-session dedup state for the two-record scheme.
#[derive(Debug, Default)]
pub(crate) struct QueryLog {
    seen: FxHashSet<SetId>,
}

impl QueryLog {
    /// Emit the records for one tainted location: the contents record if
    /// this instance has not been reported yet, then the query record.
    pub(crate) fn record(&mut self, set: &LabelSet, addr: TaintAddr, sink: &mut dyn RecordSink) {
        let id = set.id();
        if self.seen.insert(id) {
            sink.emit(TaintRecord::UniqueLabelSet {
                set: id,
                labels: set.render(),
            });
        }
        sink.emit(TaintRecord::Query {
            set: id,
            addr,
            cardinality: set.cardinality() as u32,
        });
    }

    /// Forget every reported identity. Identities are only stable while
    /// their sets are live, so this must accompany shadow teardown.
    pub(crate) fn clear(&mut self) {
        self.seen.clear();
    }
}
