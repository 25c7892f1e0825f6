//! Byte-granular dynamic taint tracking for a whole-system instruction
//! emulator.
//!
//! This crate is the taint *engine*: the data structures and algebra that an
//! external instrumentation layer calls into on every modeled memory access
//! and ALU operation. It tracks which input-derived labels influence every
//! byte of simulated RAM, every CPU register byte, and every JIT temporary,
//! and answers queries about which labels currently reach a location.
//!
//! # Architecture
//!
//! The engine consists of four components, leaves first:
//!
//! 1. **Label sets** ([`label`]): immutable, reference-counted sets of small
//!    integer labels. Structurally identical sets are physically shared
//!    through the [`label::InternTable`], so a million bytes carrying the
//!    same provenance cost one allocation.
//!
//! 2. **Shadow memory** ([`shadow`]): one sparse multi-level directory per
//!    storage region (RAM, register file, JIT temporaries) mapping addresses
//!    to shared label sets. Absence of an entry means untainted; large
//!    never-labeled regions cost no memory.
//!
//! 3. **Propagation** ([`propagate`]): the contract instrumentation invokes
//!    per modeled primitive. A copy shares the source's exact set instance;
//!    a computation takes the conservative union of its operands' sets.
//!    Untainted-to-untainted operations allocate nothing.
//!
//! 4. **Session** ([`session`]): the enable/disable lifecycle, the
//!    label/query request surface driven by the guest, and the deduplicated
//!    structured log of query results.
//!
//! # What lives elsewhere
//!
//! Instruction translation, the emulator's own semantics, hypercall register
//! decoding, and plugin lifecycle glue are external collaborators. The engine
//! assumes addresses handed to it are already validated for their region and
//! performs no defensive checks on the hot path.
//!
//! # Example
//!
//! ```
//! use taintshade::{SessionConfig, TaintSession, VecSink};
//!
//! let mut session = TaintSession::new(SessionConfig::default());
//! let mut sink = VecSink::new();
//!
//! // Guest asks for bytes 0x1000..0x1004 to be labeled 7.
//! session.request_label(0x1000, 4, Some(7)).unwrap();
//!
//! // Later, a query reports every label reaching 0x1002.
//! let card = session.request_query(0x1002, &mut sink).unwrap();
//! assert_eq!(card, 1);
//! ```

pub mod label;
pub mod propagate;
pub mod session;
pub mod shadow;

pub use label::{InternTable, Label, LabelSet, SetId};
pub use session::{
    JsonLinesSink, LabelMode, QuerySummary, RecordSink, SessionConfig, SessionState,
    TaintRecord, TaintSession, VecSink,
};
pub use shadow::{Region, ShadowMemory, TaintAddr};

/// Errors surfaced by the taint engine.
///
/// Contract violations (out-of-range addresses, labels wider than the
/// configured label space) are deliberately *not* represented here: they are
/// the instrumentation layer's responsibility to reject before calling in.
#[derive(Debug, thiserror::Error)]
pub enum TaintError {
    /// Session activation failed; the session remains disabled.
    #[error("taint activation failed: {0}")]
    Activation(String),

    /// The operation requires an enabled (or disabling) session.
    #[error("taint tracking is not enabled")]
    NotEnabled,
}
