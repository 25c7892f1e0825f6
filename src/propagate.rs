//! The propagation contract consumed by instruction-level instrumentation.
//!
//! These are the operations an external translation/instrumentation layer
//! injects around every modeled primitive: loads and stores become
//! [`copy`], arithmetic and logic become [`mix2`]/[`mix`], block moves
//! become [`copy_range`]. The model is conservative and byte-granular (a
//! bitwise AND unions both operands' provenance rather than reasoning about
//! bit-level masking), and the engine never decides *what* propagates; that
//! policy lives in the handlers choosing which of these to call.
//!
//! Two contract points matter for performance and correctness:
//!
//! - **Untainted fast path.** Operand emptiness is checked before any union,
//!   so the overwhelmingly common untainted-to-untainted operation allocates
//!   no label set and touches no interning state.
//! - **Pre-translated addresses.** Mixed-region operations (a temporary
//!   spilling into RAM, a load into a register) must resolve address
//!   translation *before* calling in; a [`TaintAddr`] is already final.
//!   Out-of-range addresses are a caller contract violation and are not
//!   checked here.

use crate::label::LabelSet;
use crate::shadow::{ShadowMemory, TaintAddr};

/// Pure copy: the destination shares the source's exact set instance.
///
/// An untainted source clears the destination.
#[inline]
pub fn copy(shad: &ShadowMemory, dst: TaintAddr, src: TaintAddr) {
    shad.set(dst, shad.get(src));
}

/// Two-operand computation: the destination receives the union of both
/// operands' sets.
///
/// This is the handler for every binary ALU op, including ones like AND/OR
/// where only some bits of an operand structurally reach the result, and
/// for mux/select where either operand may be chosen.
pub fn mix2(shad: &ShadowMemory, dst: TaintAddr, a: TaintAddr, b: TaintAddr) {
    match (shad.get(a), shad.get(b)) {
        (None, None) => shad.delete(dst),
        (Some(s), None) | (None, Some(s)) => shad.set(dst, Some(s)),
        (Some(sa), Some(sb)) => {
            let union = shad.interner().union(&sa, &sb);
            shad.set(dst, Some(union));
        }
    }
}

/// N-operand computation: union of every operand's set.
pub fn mix(shad: &ShadowMemory, dst: TaintAddr, srcs: &[TaintAddr]) {
    let mut acc: Option<LabelSet> = None;
    for &src in srcs {
        if let Some(s) = shad.get(src) {
            acc = Some(match acc {
                None => s,
                Some(prev) => shad.interner().union(&prev, &s),
            });
        }
    }
    match acc {
        None => shad.delete(dst),
        set => shad.set(dst, set),
    }
}

/// Block copy, expressed as the required bounded per-byte sequence.
///
/// Each destination byte shares the corresponding source byte's instance;
/// untainted source bytes clear their destinations. Overlapping
/// same-region ranges follow the emulator's own copy semantics and are the
/// caller's concern.
pub fn copy_range(shad: &ShadowMemory, dst: TaintAddr, src: TaintAddr, len: u64) {
    for i in 0..len {
        copy(shad, dst.byte(i), src.byte(i));
    }
}

/// Clear a run of byte slots.
pub fn delete_range(shad: &ShadowMemory, base: TaintAddr, len: u64) {
    for i in 0..len {
        shad.delete(base.byte(i));
    }
}
