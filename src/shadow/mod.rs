//! Shadow state: sparse address-to-label-set indexes per storage region.
//!
//! A [`ShadowDir`](directory::ShadowDir) maps addresses of one fixed width
//! to shared label sets through a multi-level radix structure, so only
//! addresses that have ever been labeled occupy memory. [`ShadowMemory`]
//! aggregates one directory per tracked region: RAM (64-bit physical
//! addresses), the CPU register file, and the JIT temporary value space,
//! the latter two addressed as (slot index, byte offset) pairs. It routes
//! [`TaintAddr`]s to the right one.

pub mod addr;
pub mod directory;
pub mod memory;

pub use addr::{Region, TaintAddr};
pub use directory::{ShadowDir, ShadowDir32, ShadowDir64};
pub use memory::ShadowMemory;
