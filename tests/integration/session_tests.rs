//! End-to-end session scenarios: labeling, querying, log deduplication,
//! lifecycle conservation.

use taintshade::{
    LabelSet, SessionConfig, SessionState, TaintAddr, TaintRecord, TaintSession, VecSink,
};

// =============================================================================
// Query Log Deduplication
// =============================================================================

#[test]
fn test_query_dedup_over_shared_set() {
    let mut session = TaintSession::new(SessionConfig::default());
    let mut sink = VecSink::new();

    // Bytes 0..1000 all labeled 5: one singleton set shared by 1000 slots.
    session.request_label(0, 1000, Some(5)).unwrap();

    for pa in 0..1000 {
        assert_eq!(session.request_query(pa, &mut sink).unwrap(), 1);
    }

    let unique: Vec<_> = sink
        .records
        .iter()
        .filter_map(|r| match r {
            TaintRecord::UniqueLabelSet { set, labels } => Some((*set, labels.clone())),
            _ => None,
        })
        .collect();
    let queries: Vec<_> = sink
        .records
        .iter()
        .filter_map(|r| match r {
            TaintRecord::Query { set, .. } => Some(*set),
            _ => None,
        })
        .collect();

    // Exactly one contents record, 1000 query records, all one identity.
    assert_eq!(unique.len(), 1);
    assert_eq!(unique[0].1, vec![5]);
    assert_eq!(queries.len(), 1000);
    assert!(queries.iter().all(|id| *id == unique[0].0));
}

#[test]
fn test_range_query_emits_same_scheme() {
    let mut session = TaintSession::new(SessionConfig::default());
    let mut sink = VecSink::new();
    session.request_label(0x4000, 256, Some(9)).unwrap();

    let summary = session
        .request_query_range(0x4000, 256, &mut sink)
        .unwrap();
    assert_eq!(summary.tainted_bytes, 256);
    assert_eq!(summary.distinct_sets, 1);
    assert_eq!(summary.labels, vec![9]);

    let unique = sink
        .records
        .iter()
        .filter(|r| matches!(r, TaintRecord::UniqueLabelSet { .. }))
        .count();
    assert_eq!(unique, 1);
}

#[test]
fn test_dedup_spans_queries_within_session() {
    let mut session = TaintSession::new(SessionConfig::default());
    let mut sink = VecSink::new();
    session.request_label(0, 4, Some(1)).unwrap();

    session.request_query(0, &mut sink).unwrap();
    session.request_query_range(0, 4, &mut sink).unwrap();
    session.request_query(3, &mut sink).unwrap();

    // One shared set across every query style: contents reported once.
    let unique = sink
        .records
        .iter()
        .filter(|r| matches!(r, TaintRecord::UniqueLabelSet { .. }))
        .count();
    assert_eq!(unique, 1);
}

// =============================================================================
// Fast Paths
// =============================================================================

#[test]
fn test_zero_labels_query_is_free() {
    let mut session = TaintSession::new(SessionConfig::default());
    session.enable().unwrap();
    let mut sink = VecSink::new();

    for pa in [0u64, 0x1000, u64::MAX] {
        assert_eq!(session.request_query(pa, &mut sink).unwrap(), 0);
    }
    assert_eq!(session.interner().allocations(), 0);
    assert!(sink.records.is_empty());
}

// =============================================================================
// Auto-Increment Labeling
// =============================================================================

#[test]
fn test_auto_labels_are_distinct_per_byte() {
    let mut session = TaintSession::new(SessionConfig::default());
    session.request_label(0x7000, 64, None).unwrap();

    assert_eq!(session.num_labels_applied(), 64);
    let mut seen = Vec::new();
    for i in 0..64 {
        let labels = session.labels_at(TaintAddr::ram(0x7000 + i));
        assert_eq!(labels.len(), 1);
        seen.push(labels[0]);
    }
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 64);
}

// =============================================================================
// Lifecycle & Conservation
// =============================================================================

#[test]
fn test_teardown_conserves_references() {
    let mut session = TaintSession::new(SessionConfig::default());

    // A spread of distinct sets across regions.
    session.request_label(0, 128, None).unwrap();
    session
        .label_range(TaintAddr::reg(3, 0), 8, Some(1000))
        .unwrap();
    session
        .label_range(TaintAddr::temp(7, 0), 8, Some(1001))
        .unwrap();
    assert!(session.interner().live_sets() > 0);

    session.disable();
    assert_eq!(session.state(), SessionState::Disabling);
    session.step_completed();

    // Every reference the shadow held has been released.
    assert_eq!(session.interner().live_sets(), 0);
    assert_eq!(session.state(), SessionState::Disabled);
}

#[test]
fn test_reenable_starts_clean() {
    let mut session = TaintSession::new(SessionConfig::default());
    session.request_label(0, 4, Some(7)).unwrap();
    session.disable();
    session.step_completed();

    session.request_label(0x100, 1, Some(8)).unwrap();
    assert!(session.is_enabled());
    assert_eq!(session.labels_at(TaintAddr::ram(0)), Vec::<u32>::new());
    assert_eq!(session.labels_applied(), vec![8]);
}

#[test]
fn test_shared_set_instance_across_regions() {
    let mut session = TaintSession::new(SessionConfig::default());
    session.request_label(0x100, 1, Some(3)).unwrap();

    let shadow = session.propagation_shadow().unwrap().clone();
    taintshade::propagate::copy(&shadow, TaintAddr::reg(0, 0), TaintAddr::ram(0x100));
    taintshade::propagate::copy(&shadow, TaintAddr::temp(0, 0), TaintAddr::reg(0, 0));

    let ram = shadow.query_set(TaintAddr::ram(0x100)).unwrap();
    let reg = shadow.query_set(TaintAddr::reg(0, 0)).unwrap();
    let tmp = shadow.query_set(TaintAddr::temp(0, 0)).unwrap();
    assert!(LabelSet::ptr_eq(&ram, &reg));
    assert!(LabelSet::ptr_eq(&reg, &tmp));
}
