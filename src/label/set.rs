//! The immutable, shared label set.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One unit of tracked input provenance.
///
/// Labels are opaque non-negative integers. The engine enforces no upper
/// bound beyond the label-space width the embedder configures at enable
/// time; staying inside that width is the caller's contract.
pub type Label = u32;

/// Interning identity of a live [`LabelSet`].
///
/// Two handles compare equal here iff they share the same allocation, which
/// by the interning invariant means identical membership. The identity is
/// stable for as long as the set is live and is what the structured query
/// log uses to avoid re-reporting one set's contents for thousands of
/// addresses that share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SetId(pub u64);

/// Backing storage for one interned set: sorted, deduplicated, non-empty.
#[derive(Debug)]
pub(crate) struct SetStorage {
    labels: Box<[Label]>,
}

impl SetStorage {
    /// Caller guarantees `labels` is sorted, deduplicated, and non-empty.
    pub(crate) fn new(labels: Box<[Label]>) -> Self {
        debug_assert!(!labels.is_empty());
        debug_assert!(labels.windows(2).all(|w| w[0] < w[1]));
        Self { labels }
    }

    #[inline]
    pub(crate) fn labels(&self) -> &[Label] {
        &self.labels
    }
}

/// An immutable, reference-counted set of labels.
///
/// `LabelSet` is a cheap handle (`Arc` clone) to interned storage. It is
/// never mutated in place: every union produces a (possibly newly interned)
/// result through the [`InternTable`](crate::label::InternTable). Untainted
/// locations carry no `LabelSet`: the empty set is `Option::None`
/// everywhere in the engine.
#[derive(Clone)]
pub struct LabelSet {
    inner: Arc<SetStorage>,
}

impl LabelSet {
    pub(crate) fn from_storage(inner: Arc<SetStorage>) -> Self {
        Self { inner }
    }

    pub(crate) fn storage(&self) -> &Arc<SetStorage> {
        &self.inner
    }

    /// Number of distinct labels in the set. O(1).
    #[inline]
    pub fn cardinality(&self) -> usize {
        self.inner.labels().len()
    }

    /// Whether `label` is a member. O(log n).
    #[inline]
    pub fn contains(&self, label: Label) -> bool {
        self.inner.labels().binary_search(&label).is_ok()
    }

    /// Whether every member of `self` is also a member of `other`.
    ///
    /// Linear merge walk over the two sorted memberships.
    pub fn is_subset_of(&self, other: &LabelSet) -> bool {
        if LabelSet::ptr_eq(self, other) {
            return true;
        }
        let mine = self.inner.labels();
        let theirs = other.inner.labels();
        if mine.len() > theirs.len() {
            return false;
        }
        let mut it = theirs.iter();
        'outer: for &l in mine {
            for &t in it.by_ref() {
                if t == l {
                    continue 'outer;
                }
                if t > l {
                    return false;
                }
            }
            return false;
        }
        true
    }

    /// Lazy iterator over members in ascending label order.
    ///
    /// The order is stable for a given set. The iterator borrows the set
    /// read-only, so it is safe to hold while other handles to the same set
    /// exist, and it may be dropped early or restarted at will.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = Label> + '_ {
        self.inner.labels().iter().copied()
    }

    /// Materialize the members, sorted, for deterministic external output.
    #[inline]
    pub fn render(&self) -> Vec<Label> {
        self.inner.labels().to_vec()
    }

    /// Interning identity of this set. See [`SetId`].
    #[inline]
    pub fn id(&self) -> SetId {
        SetId(Arc::as_ptr(&self.inner) as usize as u64)
    }

    /// Whether two handles share one allocation.
    ///
    /// Under the interning invariant this is full structural equality.
    #[inline]
    pub fn ptr_eq(a: &LabelSet, b: &LabelSet) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl PartialEq for LabelSet {
    fn eq(&self, other: &Self) -> bool {
        LabelSet::ptr_eq(self, other) || self.inner.labels() == other.inner.labels()
    }
}

impl Eq for LabelSet {}

impl Serialize for LabelSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use crate::label::InternTable;
    use super::*;

    #[test]
    fn test_cardinality_and_membership() {
        let table = InternTable::new();
        let s = table.intern([3, 1, 2, 1]).unwrap();
        assert_eq!(s.cardinality(), 3);
        assert!(s.contains(1));
        assert!(s.contains(3));
        assert!(!s.contains(4));
    }

    #[test]
    fn test_iter_sorted_and_restartable() {
        let table = InternTable::new();
        let s = table.intern([9, 4, 7]).unwrap();
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![4, 7, 9]);
        // Early termination and restart observe the same order.
        assert_eq!(s.iter().next(), Some(4));
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![4, 7, 9]);
    }

    #[test]
    fn test_render_sorted() {
        let table = InternTable::new();
        let s = table.intern([10, 2, 5]).unwrap();
        assert_eq!(s.render(), vec![2, 5, 10]);
    }

    #[test]
    fn test_subset() {
        let table = InternTable::new();
        let small = table.intern([2, 5]).unwrap();
        let big = table.intern([1, 2, 5, 9]).unwrap();
        let other = table.intern([2, 6]).unwrap();
        assert!(small.is_subset_of(&big));
        assert!(small.is_subset_of(&small));
        assert!(!big.is_subset_of(&small));
        assert!(!other.is_subset_of(&big));
    }

    #[test]
    fn test_identity_matches_interning() {
        let table = InternTable::new();
        let a = table.intern([1, 2]).unwrap();
        let b = table.intern([2, 1]).unwrap();
        assert!(LabelSet::ptr_eq(&a, &b));
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_serialize_as_sorted_seq() {
        let table = InternTable::new();
        let s = table.intern([8, 3]).unwrap();
        assert_eq!(serde_json::to_string(&s).unwrap(), "[3,8]");
    }
}
