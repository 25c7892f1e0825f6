//! The shadow-memory aggregate.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::label::{InternTable, Label, LabelSet};

use super::addr::{Region, TaintAddr};
use super::directory::{ShadowDir32, ShadowDir64};

/// One shadow directory per tracked region, plus the bookkeeping the query
/// protocol needs.
///
/// Exactly one `ShadowMemory` exists per analysis session: it is allocated
/// when taint tracking is activated and dropped at teardown, which releases
/// every label-set reference its directories hold. Side effects of every
/// operation are confined to the directory the address routes to.
pub struct ShadowMemory {
    ram: ShadowDir64,
    reg: ShadowDir32,
    temp: ShadowDir32,
    interner: Arc<InternTable>,
    /// Every distinct label ever applied through [`label`](ShadowMemory::label),
    /// in ascending order.
    applied: RwLock<BTreeSet<Label>>,
}

impl ShadowMemory {
    pub fn new(interner: Arc<InternTable>) -> Self {
        Self {
            ram: ShadowDir64::new(),
            reg: ShadowDir32::new(),
            temp: ShadowDir32::new(),
            interner,
            applied: RwLock::new(BTreeSet::new()),
        }
    }

    /// The interning table label sets in this shadow are drawn from.
    #[inline]
    pub fn interner(&self) -> &Arc<InternTable> {
        &self.interner
    }

    /// Set the slot at `addr` to the singleton set for `label` and record
    /// the label as applied.
    pub fn label(&self, addr: TaintAddr, label: Label) {
        debug!(?addr, label, "labeling shadow slot");
        let set = self.interner.singleton(label);
        self.set(addr, Some(set));
        self.applied.write().insert(label);
    }

    /// The set shadowing `addr`, if any.
    #[inline]
    pub fn get(&self, addr: TaintAddr) -> Option<LabelSet> {
        match addr.region() {
            Region::Ram => self.ram.get(addr.key()),
            Region::Reg => self.reg.get(addr.key()),
            Region::Temp => self.temp.get(addr.key()),
        }
    }

    /// Replace the slot at `addr`. `None` clears it.
    #[inline]
    pub fn set(&self, addr: TaintAddr, set: Option<LabelSet>) {
        match addr.region() {
            Region::Ram => self.ram.set(addr.key(), set),
            Region::Reg => self.reg.set(addr.key(), set),
            Region::Temp => self.temp.set(addr.key(), set),
        }
    }

    /// Cardinality of the set at `addr`; 0 if untainted.
    #[inline]
    pub fn query(&self, addr: TaintAddr) -> u32 {
        self.get(addr).map_or(0, |s| s.cardinality() as u32)
    }

    /// Full set at `addr`, for callers that need more than a cardinality
    /// (logging, rendering).
    #[inline]
    pub fn query_set(&self, addr: TaintAddr) -> Option<LabelSet> {
        self.get(addr)
    }

    /// Clear the slot at `addr`; no-op if untainted.
    #[inline]
    pub fn delete(&self, addr: TaintAddr) {
        match addr.region() {
            Region::Ram => self.ram.delete(addr.key()),
            Region::Reg => self.reg.delete(addr.key()),
            Region::Temp => self.temp.delete(addr.key()),
        }
    }

    /// Number of addresses in `region` currently holding a set.
    pub fn occupancy(&self, region: Region) -> u64 {
        match region {
            Region::Ram => self.ram.occupancy(),
            Region::Reg => self.reg.occupancy(),
            Region::Temp => self.temp.occupancy(),
        }
    }

    /// Occupancy summed over every region.
    pub fn total_occupancy(&self) -> u64 {
        self.ram.occupancy() + self.reg.occupancy() + self.temp.occupancy()
    }

    /// Every distinct label ever applied, ascending.
    pub fn labels_applied(&self) -> Vec<Label> {
        self.applied.read().iter().copied().collect()
    }

    /// How many distinct labels have ever been applied.
    ///
    /// Zero means no label has entered the system: queries may answer
    /// "untainted" without touching any directory.
    pub fn num_labels_applied(&self) -> usize {
        self.applied.read().len()
    }
}
