//! Propagation contract scenarios: what instrumentation handlers observe
//! when they drive the shadow through modeled instruction sequences.

use std::sync::Arc;

use taintshade::propagate::{copy, copy_range, delete_range, mix, mix2};
use taintshade::{InternTable, LabelSet, ShadowMemory, TaintAddr};

fn shadow() -> ShadowMemory {
    ShadowMemory::new(Arc::new(InternTable::new()))
}

#[test]
fn test_load_compute_store_sequence() {
    let shad = shadow();
    // Two tainted input bytes in RAM.
    shad.label(TaintAddr::ram(0x1000), 1);
    shad.label(TaintAddr::ram(0x1001), 2);

    // load r0 <- [0x1000]; load r1 <- [0x1001]
    copy(&shad, TaintAddr::reg(0, 0), TaintAddr::ram(0x1000));
    copy(&shad, TaintAddr::reg(1, 0), TaintAddr::ram(0x1001));

    // add t0 <- r0, r1 (through a JIT temporary)
    mix2(
        &shad,
        TaintAddr::temp(0, 0),
        TaintAddr::reg(0, 0),
        TaintAddr::reg(1, 0),
    );

    // store [0x2000] <- t0
    copy(&shad, TaintAddr::ram(0x2000), TaintAddr::temp(0, 0));

    let result = shad.query_set(TaintAddr::ram(0x2000)).unwrap();
    assert_eq!(result.render(), vec![1, 2]);
}

#[test]
fn test_overwrite_with_untainted_clears_destination() {
    let shad = shadow();
    shad.label(TaintAddr::ram(0x10), 5);
    copy(&shad, TaintAddr::reg(0, 0), TaintAddr::ram(0x10));
    assert_eq!(shad.query(TaintAddr::reg(0, 0)), 1);

    // A later load of clean data through the same register.
    copy(&shad, TaintAddr::reg(0, 0), TaintAddr::ram(0x9000));
    assert_eq!(shad.query(TaintAddr::reg(0, 0)), 0);
}

#[test]
fn test_memcpy_preserves_sharing() {
    let shad = shadow();
    for i in 0..64 {
        shad.label(TaintAddr::ram(0x3000 + i), 7);
    }
    copy_range(&shad, TaintAddr::ram(0x5000), TaintAddr::ram(0x3000), 64);

    let src = shad.query_set(TaintAddr::ram(0x3000)).unwrap();
    for i in 0..64 {
        let dst = shad.query_set(TaintAddr::ram(0x5000 + i)).unwrap();
        assert!(LabelSet::ptr_eq(&src, &dst));
    }
    assert_eq!(shad.total_occupancy(), 128);
}

#[test]
fn test_accumulating_mix_grows_conservatively() {
    let shad = shadow();
    for (i, label) in [10, 20, 30].iter().enumerate() {
        shad.label(TaintAddr::ram(i as u64), *label);
    }

    // acc = b0; acc |= b1; acc |= b2: a checksum-style loop.
    copy(&shad, TaintAddr::reg(0, 0), TaintAddr::ram(0));
    for i in 1..3u64 {
        mix2(
            &shad,
            TaintAddr::reg(0, 0),
            TaintAddr::reg(0, 0),
            TaintAddr::ram(i),
        );
    }
    assert_eq!(
        shad.query_set(TaintAddr::reg(0, 0)).unwrap().render(),
        vec![10, 20, 30]
    );
}

#[test]
fn test_mixed_width_gather() {
    let shad = shadow();
    shad.label(TaintAddr::ram(0x100), 1);
    shad.label(TaintAddr::reg(5, 2), 2);
    shad.label(TaintAddr::temp(9, 0), 3);

    let operands = [
        TaintAddr::ram(0x100),
        TaintAddr::reg(5, 2),
        TaintAddr::temp(9, 0),
    ];
    mix(&shad, TaintAddr::ram(0x200), &operands);
    assert_eq!(
        shad.query_set(TaintAddr::ram(0x200)).unwrap().render(),
        vec![1, 2, 3]
    );
}

#[test]
fn test_interning_collapses_equal_results() {
    let shad = shadow();
    shad.label(TaintAddr::ram(0), 1);
    shad.label(TaintAddr::ram(1), 2);

    // The same union computed via different destinations is one instance.
    mix2(&shad, TaintAddr::reg(0, 0), TaintAddr::ram(0), TaintAddr::ram(1));
    mix2(&shad, TaintAddr::reg(1, 0), TaintAddr::ram(1), TaintAddr::ram(0));

    let a = shad.query_set(TaintAddr::reg(0, 0)).unwrap();
    let b = shad.query_set(TaintAddr::reg(1, 0)).unwrap();
    assert!(LabelSet::ptr_eq(&a, &b));
}

#[test]
fn test_clearing_scratch_slot_between_blocks() {
    let shad = shadow();
    // A 16-byte value lives in temp slot 0; taint every byte.
    for i in 0..16 {
        shad.label(TaintAddr::temp(0, i), i);
    }
    delete_range(&shad, TaintAddr::temp(0, 0), 16);
    for i in 0..16 {
        assert_eq!(shad.query(TaintAddr::temp(0, i)), 0);
    }
    assert_eq!(shad.total_occupancy(), 0);
}
