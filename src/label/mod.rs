//! Label sets and their canonicalization.
//!
//! A [`Label`] identifies one unit of tracked input provenance (one byte of
//! an untrusted file, one network packet byte, ...). A [`LabelSet`] is an
//! immutable set of labels describing all provenance reaching one storage
//! location.
//!
//! Sets are **interned**: the [`InternTable`] guarantees at most one live
//! instance per distinct membership, so the thousands of shadow slots that
//! end up carrying identical taint all point at the same allocation, and
//! structural equality degrades to pointer equality. The empty set is not a
//! [`LabelSet`] at all: untainted is `Option<LabelSet>::None`, exempt from
//! interning and from the reference-count lifecycle.

pub mod intern;
pub mod set;

pub use intern::InternTable;
pub use set::{Label, LabelSet, SetId};
