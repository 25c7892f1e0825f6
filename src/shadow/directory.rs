//! Sparse multi-level shadow directory.
//!
//! A radix tree over address bits: leaf pages cover the low 12 bits with one
//! slot per byte address, interior levels consume 10 bits each, and the root
//! takes whatever remains for the instantiated width. Nodes and pages live
//! in arena `Vec`s and refer to each other by stable `u32` indices, never by
//! pointer, so a reader can walk the structure under the read lock while a
//! single mutator extends it.
//!
//! RAM in a whole-system emulator is sparse in *taint*, not in address
//! range: trading one indirection per level against O(address-space) dense
//! arrays is what keeps gigabytes of mostly untainted guest RAM cheap to
//! shadow.

use parking_lot::RwLock;

use crate::label::LabelSet;

const PAGE_BITS: u32 = 12;
const PAGE_SLOTS: usize = 1 << PAGE_BITS;
const PAGE_MASK: u64 = (PAGE_SLOTS as u64) - 1;
const NODE_BITS: u32 = 10;

/// Arena sentinel for "no child".
const NIL: u32 = u32::MAX;

/// One interior radix level: which address bits index it.
#[derive(Debug, Clone, Copy)]
struct Level {
    shift: u32,
    mask: u64,
}

struct Node {
    children: Box<[u32]>,
}

impl Node {
    fn new(fanout: usize) -> Self {
        Self {
            children: vec![NIL; fanout].into_boxed_slice(),
        }
    }
}

struct Page {
    slots: Box<[Option<LabelSet>]>,
    live: u32,
}

impl Page {
    fn new() -> Self {
        Self {
            slots: vec![None; PAGE_SLOTS].into_boxed_slice(),
            live: 0,
        }
    }
}

struct DirInner {
    /// Interior nodes; index 0 is the root.
    nodes: Vec<Node>,
    pages: Vec<Page>,
    occupancy: u64,
}

/// Sparse address-to-label-set index for one storage region, instantiated
/// per address width (`BITS`).
///
/// Absence of an entry means untainted. Entries hold one shared reference
/// each; replacing or deleting a slot releases the previous occupant's
/// reference, and dropping the directory releases them all.
pub struct ShadowDir<const BITS: u32> {
    levels: Vec<Level>,
    inner: RwLock<DirInner>,
}

/// Directory over the 32-bit slot-address space (registers, temporaries).
pub type ShadowDir32 = ShadowDir<32>;
/// Directory over 64-bit physical addresses (RAM).
pub type ShadowDir64 = ShadowDir<64>;

impl<const BITS: u32> ShadowDir<BITS> {
    pub fn new() -> Self {
        assert!(BITS > PAGE_BITS && BITS <= 64);
        let upper = BITS - PAGE_BITS;
        let count = upper.div_ceil(NODE_BITS);
        let root_bits = upper - NODE_BITS * (count - 1);
        let levels = (0..count)
            .map(|i| {
                let bits = if i == 0 { root_bits } else { NODE_BITS };
                Level {
                    shift: PAGE_BITS + NODE_BITS * (count - 1 - i),
                    mask: (1u64 << bits) - 1,
                }
            })
            .collect::<Vec<_>>();
        let root = Node::new((1u64 << root_bits) as usize);
        Self {
            levels,
            inner: RwLock::new(DirInner {
                nodes: vec![root],
                pages: Vec::new(),
                occupancy: 0,
            }),
        }
    }

    /// The set currently shadowing `addr`, if any.
    pub fn get(&self, addr: u64) -> Option<LabelSet> {
        debug_assert!(BITS == 64 || addr >> BITS == 0);
        let inner = self.inner.read();
        let mut node = 0usize;
        let last = self.levels.len() - 1;
        for (depth, level) in self.levels.iter().enumerate() {
            let slot = ((addr >> level.shift) & level.mask) as usize;
            let child = inner.nodes[node].children[slot];
            if child == NIL {
                return None;
            }
            if depth == last {
                let page = &inner.pages[child as usize];
                return page.slots[(addr & PAGE_MASK) as usize].clone();
            }
            node = child as usize;
        }
        unreachable!("directory has at least one level");
    }

    /// Replace the slot at `addr`, acquiring a reference on `set` and
    /// releasing the previous occupant's. `None` is equivalent to
    /// [`delete`](ShadowDir::delete).
    pub fn set(&self, addr: u64, set: Option<LabelSet>) {
        let Some(set) = set else {
            self.delete(addr);
            return;
        };
        debug_assert!(BITS == 64 || addr >> BITS == 0);
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let mut node = 0usize;
        let last = self.levels.len() - 1;
        for (depth, level) in self.levels.iter().enumerate() {
            let slot = ((addr >> level.shift) & level.mask) as usize;
            let mut child = inner.nodes[node].children[slot];
            if child == NIL {
                child = if depth == last {
                    inner.pages.push(Page::new());
                    (inner.pages.len() - 1) as u32
                } else {
                    inner.nodes.push(Node::new(1 << NODE_BITS));
                    (inner.nodes.len() - 1) as u32
                };
                inner.nodes[node].children[slot] = child;
            }
            if depth == last {
                let page = &mut inner.pages[child as usize];
                let fresh = page.slots[(addr & PAGE_MASK) as usize]
                    .replace(set)
                    .is_none();
                if fresh {
                    page.live += 1;
                    inner.occupancy += 1;
                }
                return;
            }
            node = child as usize;
        }
    }

    /// Remove the slot at `addr`, releasing its reference. No-op if the
    /// address was never labeled.
    pub fn delete(&self, addr: u64) {
        debug_assert!(BITS == 64 || addr >> BITS == 0);
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let mut node = 0usize;
        let last = self.levels.len() - 1;
        for (depth, level) in self.levels.iter().enumerate() {
            let slot = ((addr >> level.shift) & level.mask) as usize;
            let child = inner.nodes[node].children[slot];
            if child == NIL {
                return;
            }
            if depth == last {
                let page = &mut inner.pages[child as usize];
                if page.slots[(addr & PAGE_MASK) as usize].take().is_some() {
                    page.live -= 1;
                    inner.occupancy -= 1;
                }
                return;
            }
            node = child as usize;
        }
    }

    /// Number of addresses currently holding a set. O(1).
    ///
    /// A zero here lets callers answer "untainted" without any lookup.
    pub fn occupancy(&self) -> u64 {
        self.inner.read().occupancy
    }

    /// Drop every entry and every directory node, releasing all held
    /// references.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let root_fanout = inner.nodes[0].children.len();
        inner.pages.clear();
        inner.nodes.clear();
        inner.nodes.push(Node::new(root_fanout));
        inner.occupancy = 0;
    }
}

impl<const BITS: u32> Default for ShadowDir<BITS> {
    fn default() -> Self {
        Self::new()
    }
}
