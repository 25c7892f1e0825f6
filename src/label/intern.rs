//! Process-wide canonicalization of label sets.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::set::{Label, LabelSet, SetStorage};

/// Label values below this get a direct-indexed singleton cache slot; the
/// rest take the general interning path.
const SINGLETON_CACHE: usize = 256;

/// Registry guaranteeing at most one live [`LabelSet`] per distinct
/// membership.
///
/// The table holds [`Weak`] references: ownership of a set belongs entirely
/// to the shadow slots and transient holders pointing at it, and when the
/// last handle drops the entry is dead. Dead entries are evicted lazily:
/// on the next interning of the same membership, or wholesale by
/// [`purge`](InternTable::purge) at session teardown. This replaces manual
/// per-set reference counting with `Arc`'s, removing the double-free /
/// use-after-free class entirely.
///
/// Thread safety: interior `RwLock`s support one concurrent mutator plus any
/// number of read-only lookups, which is all the emulator's dispatch/JIT
/// split requires.
pub struct InternTable {
    registry: RwLock<FxHashMap<Box<[Label]>, Weak<SetStorage>>>,
    singletons: RwLock<Vec<Option<Weak<SetStorage>>>>,
    allocations: AtomicU64,
}

impl InternTable {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(FxHashMap::default()),
            singletons: RwLock::new(vec![None; SINGLETON_CACHE]),
            allocations: AtomicU64::new(0),
        }
    }

    /// The canonical set containing exactly `label`.
    ///
    /// O(1) amortized for the first 256 label values via a direct-indexed
    /// cache; general interning beyond that.
    pub fn singleton(&self, label: Label) -> LabelSet {
        let idx = label as usize;
        if idx < SINGLETON_CACHE {
            if let Some(weak) = &self.singletons.read()[idx] {
                if let Some(inner) = weak.upgrade() {
                    return LabelSet::from_storage(inner);
                }
            }
            let set = self.intern_sorted(&[label]);
            self.singletons.write()[idx] = Some(Arc::downgrade(set.storage()));
            return set;
        }
        self.intern_sorted(&[label])
    }

    /// Canonicalize an arbitrary membership.
    ///
    /// Returns `None` for an empty membership: the empty set is the
    /// distinguished untainted constant and is never interned.
    pub fn intern(&self, labels: impl IntoIterator<Item = Label>) -> Option<LabelSet> {
        let mut labels: Vec<Label> = labels.into_iter().collect();
        if labels.is_empty() {
            return None;
        }
        labels.sort_unstable();
        labels.dedup();
        Some(self.intern_sorted(&labels))
    }

    /// The canonical union of `a` and `b`.
    ///
    /// Identity fast paths avoid both allocation and table access: the same
    /// instance unions to itself, and a subset relation returns the superset
    /// unchanged. Only a genuinely mixed pair pays for a sorted merge and an
    /// interning lookup.
    pub fn union(&self, a: &LabelSet, b: &LabelSet) -> LabelSet {
        if LabelSet::ptr_eq(a, b) {
            return a.clone();
        }
        if b.is_subset_of(a) {
            return a.clone();
        }
        if a.is_subset_of(b) {
            return b.clone();
        }
        let lhs = a.storage().labels();
        let rhs = b.storage().labels();
        let mut merged = Vec::with_capacity(lhs.len() + rhs.len());
        let (mut i, mut j) = (0, 0);
        while i < lhs.len() && j < rhs.len() {
            match lhs[i].cmp(&rhs[j]) {
                std::cmp::Ordering::Less => {
                    merged.push(lhs[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(rhs[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    merged.push(lhs[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&lhs[i..]);
        merged.extend_from_slice(&rhs[j..]);
        self.intern_sorted(&merged)
    }

    /// Look up or create the canonical instance for a sorted, deduplicated,
    /// non-empty membership.
    fn intern_sorted(&self, labels: &[Label]) -> LabelSet {
        debug_assert!(!labels.is_empty());
        // Fast path: read-only lookup.
        if let Some(weak) = self.registry.read().get(labels) {
            if let Some(inner) = weak.upgrade() {
                return LabelSet::from_storage(inner);
            }
        }
        // Slow path: re-check under the write lock, then allocate. A dead
        // weak entry found here is the lazy eviction point.
        let mut registry = self.registry.write();
        if let Some(weak) = registry.get(labels) {
            if let Some(inner) = weak.upgrade() {
                return LabelSet::from_storage(inner);
            }
        }
        let inner = Arc::new(SetStorage::new(labels.into()));
        registry.insert(labels.into(), Arc::downgrade(&inner));
        self.allocations.fetch_add(1, Ordering::Relaxed);
        LabelSet::from_storage(inner)
    }

    /// Drop every dead registry entry.
    ///
    /// Called at session teardown, after the shadow directories have
    /// released their references, so the table does not accumulate tombstones
    /// across sessions.
    pub fn purge(&self) {
        self.registry
            .write()
            .retain(|_, weak| weak.strong_count() > 0);
        for slot in self.singletons.write().iter_mut() {
            if matches!(slot, Some(weak) if weak.strong_count() == 0) {
                *slot = None;
            }
        }
    }

    /// Number of currently live distinct sets. Diagnostic; O(table size).
    pub fn live_sets(&self) -> usize {
        self.registry
            .read()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Monotonic count of set allocations since construction.
    ///
    /// Interning hits, identity unions, and untainted fast paths do not
    /// advance this, which makes it the observable for "no set was built"
    /// properties.
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }
}

impl Default for InternTable {
    fn default() -> Self {
        Self::new()
    }
}
