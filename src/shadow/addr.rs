//! Region addressing.

use serde::{Deserialize, Serialize};

/// Bytes reserved per register / temporary slot in the 32-bit directory
/// space. Wide enough for the widest vector register the emulator models.
pub const SLOT_BYTES: u32 = 64;

const SLOT_SHIFT: u32 = SLOT_BYTES.trailing_zeros();

/// One tracked storage region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    /// Simulated guest RAM, addressed by physical address.
    Ram,
    /// The CPU register file.
    Reg,
    /// The JIT intermediate-value space.
    Temp,
}

/// A byte location in one of the tracked regions.
///
/// Register and temporary addresses carry a byte offset so partial-slot
/// tainting (one byte of a register) is expressible. Offsets are the
/// caller's contract: they must stay below [`SLOT_BYTES`] and are not
/// checked on the hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaintAddr {
    Ram(u64),
    Reg { index: u32, offset: u32 },
    Temp { index: u32, offset: u32 },
}

impl TaintAddr {
    #[inline]
    pub fn ram(pa: u64) -> Self {
        TaintAddr::Ram(pa)
    }

    #[inline]
    pub fn reg(index: u32, offset: u32) -> Self {
        debug_assert!(offset < SLOT_BYTES);
        TaintAddr::Reg { index, offset }
    }

    #[inline]
    pub fn temp(index: u32, offset: u32) -> Self {
        debug_assert!(offset < SLOT_BYTES);
        TaintAddr::Temp { index, offset }
    }

    #[inline]
    pub fn region(self) -> Region {
        match self {
            TaintAddr::Ram(_) => Region::Ram,
            TaintAddr::Reg { .. } => Region::Reg,
            TaintAddr::Temp { .. } => Region::Temp,
        }
    }

    /// The location `i` bytes past this one, within the same slot for
    /// register/temporary addresses.
    #[inline]
    pub fn byte(self, i: u64) -> Self {
        match self {
            TaintAddr::Ram(pa) => TaintAddr::Ram(pa + i),
            TaintAddr::Reg { index, offset } => TaintAddr::reg(index, offset + i as u32),
            TaintAddr::Temp { index, offset } => TaintAddr::temp(index, offset + i as u32),
        }
    }

    /// Directory key within the region's address width.
    #[inline]
    pub(crate) fn key(self) -> u64 {
        match self {
            TaintAddr::Ram(pa) => pa,
            TaintAddr::Reg { index, offset } | TaintAddr::Temp { index, offset } => {
                ((index as u64) << SLOT_SHIFT) | offset as u64
            }
        }
    }
}
