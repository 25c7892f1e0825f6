//! The taint session state machine and request surface.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::label::{InternTable, Label, LabelSet};
use crate::shadow::{Region, ShadowMemory, TaintAddr};
use crate::TaintError;

use super::log::{QueryLog, RecordSink};

/// Lifecycle of taint tracking within one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No shadow state exists; all tracking is off.
    Disabled,
    /// Shadow memory is live and propagation is active.
    Enabled,
    /// Teardown has been requested; one more emulated step may complete.
    ///
    /// During this window propagation is a no-op while queries still see
    /// the prior shadow state, so the embedder can flush translated code
    /// and unhook instrumentation without racing an in-flight handler.
    Disabling,
}

/// How labeling requests assign labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelMode {
    /// Explicit labels are honored; auto requests get one fresh label per
    /// byte.
    PerByte,
    /// Every labeling request collapses to the single label 0: tracks
    /// *whether* data is tainted, not which input byte it came from.
    Binary,
}

/// Embedder-supplied configuration, fixed at session construction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub label_mode: LabelMode,
    /// Width of the label space in bits; labels the embedder passes in must
    /// fit (that contract is not checked per-operation). Validated at
    /// activation.
    pub label_bits: u32,
    /// First label handed out by auto-increment labeling.
    pub auto_label_start: Label,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            label_mode: LabelMode::PerByte,
            label_bits: 32,
            auto_label_start: 0,
        }
    }
}

/// Result of a whole-buffer query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuerySummary {
    /// How many of the queried bytes carried any taint.
    pub tainted_bytes: u64,
    /// Distinct label-set instances touched by this query.
    pub distinct_sets: usize,
    /// Union of every label reaching the buffer, sorted.
    pub labels: Vec<Label>,
}

type StateCallback = Box<dyn Fn(SessionState) + Send + Sync>;

/// The explicit owner of all per-session taint state.
///
/// Exactly one `TaintSession` exists per analysis run. It owns the interning
/// table, the lazily allocated [`ShadowMemory`], the auto-label counter, and
/// the query log's deduplication state; every collaborator receives it by
/// reference rather than reaching for globals.
pub struct TaintSession {
    config: SessionConfig,
    state: SessionState,
    interner: Arc<InternTable>,
    shadow: Option<Arc<ShadowMemory>>,
    next_auto_label: Label,
    log: QueryLog,
    subscribers: Vec<StateCallback>,
}

impl TaintSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            next_auto_label: config.auto_label_start,
            config,
            state: SessionState::Disabled,
            interner: Arc::new(InternTable::new()),
            shadow: None,
            log: QueryLog::default(),
            subscribers: Vec::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.state == SessionState::Enabled
    }

    /// The interning table backing this session's label sets.
    #[inline]
    pub fn interner(&self) -> &Arc<InternTable> {
        &self.interner
    }

    /// Register a callback fired on every state transition.
    ///
    /// This is how instruction-level trackers and other collaborators react
    /// to taint coming and going.
    pub fn subscribe(&mut self, f: impl Fn(SessionState) + Send + Sync + 'static) {
        self.subscribers.push(Box::new(f));
    }

    /// Shadow memory for propagation handlers: `Some` only while `Enabled`.
    ///
    /// Returning `None` during `Disabling` is what makes propagation a no-op
    /// in the one-step teardown window.
    #[inline]
    pub fn propagation_shadow(&self) -> Option<&Arc<ShadowMemory>> {
        match self.state {
            SessionState::Enabled => self.shadow.as_ref(),
            _ => None,
        }
    }

    /// Shadow memory for queries: `Some` while `Enabled` or `Disabling`.
    #[inline]
    pub fn query_shadow(&self) -> Option<&Arc<ShadowMemory>> {
        match self.state {
            SessionState::Enabled | SessionState::Disabling => self.shadow.as_ref(),
            SessionState::Disabled => None,
        }
    }

    /// Activate taint tracking: allocate shadow memory and transition to
    /// `Enabled`.
    ///
    /// Idempotent when already enabled. Fails, leaving the session
    /// `Disabled`, on invalid configuration, or if called mid-`Disabling`
    /// (the deferred teardown must run to completion first).
    pub fn enable(&mut self) -> Result<(), TaintError> {
        match self.state {
            SessionState::Enabled => Ok(()),
            SessionState::Disabling => Err(TaintError::Activation(
                "deactivation in progress; complete the step first".into(),
            )),
            SessionState::Disabled => {
                if self.config.label_bits == 0 || self.config.label_bits > 32 {
                    return Err(TaintError::Activation(format!(
                        "label space width must be 1..=32 bits, got {}",
                        self.config.label_bits
                    )));
                }
                info!("enabling taint tracking");
                self.shadow = Some(Arc::new(ShadowMemory::new(Arc::clone(&self.interner))));
                self.transition(SessionState::Enabled);
                Ok(())
            }
        }
    }

    /// Request deactivation: `Enabled → Disabling`.
    ///
    /// The embedder must call [`step_completed`](TaintSession::step_completed)
    /// once the current emulated step finishes to reach `Disabled`.
    pub fn disable(&mut self) {
        if self.state == SessionState::Enabled {
            info!("disabling taint tracking after current step");
            self.transition(SessionState::Disabling);
        }
    }

    /// The emulated step following a [`disable`](TaintSession::disable) has
    /// finished: tear down shadow state and return to `Disabled`.
    pub fn step_completed(&mut self) {
        if self.state != SessionState::Disabling {
            return;
        }
        info!("tearing down shadow memory");
        self.shadow = None;
        self.interner.purge();
        self.log.clear();
        self.next_auto_label = self.config.auto_label_start;
        self.transition(SessionState::Disabled);
    }

    /// Guest request: label `len` bytes of RAM starting at physical address
    /// `addr`.
    ///
    /// `Some(l)` applies `l` to every byte; `None` assigns one fresh
    /// auto-incremented label per byte. The first labeling request activates
    /// tracking.
    pub fn request_label(
        &mut self,
        addr: u64,
        len: u64,
        label: Option<Label>,
    ) -> Result<(), TaintError> {
        self.label_range(TaintAddr::ram(addr), len, label)
    }

    /// Label any region's bytes; see
    /// [`request_label`](TaintSession::request_label).
    pub fn label_range(
        &mut self,
        base: TaintAddr,
        len: u64,
        label: Option<Label>,
    ) -> Result<(), TaintError> {
        if self.state == SessionState::Disabling {
            return Err(TaintError::NotEnabled);
        }
        self.enable()?;
        debug!(?base, len, ?label, "label request");
        let shadow = Arc::clone(self.shadow.as_ref().ok_or(TaintError::NotEnabled)?);
        for i in 0..len {
            let l = match (self.config.label_mode, label) {
                (LabelMode::Binary, _) => 0,
                (LabelMode::PerByte, Some(l)) => l,
                (LabelMode::PerByte, None) => {
                    let l = self.next_auto_label;
                    self.next_auto_label += 1;
                    l
                }
            };
            shadow.label(base.byte(i), l);
        }
        Ok(())
    }

    /// Guest request: how many labels reach the RAM byte at `addr`?
    ///
    /// Emits the two-record log scheme for tainted locations.
    pub fn request_query(
        &mut self,
        addr: u64,
        sink: &mut dyn RecordSink,
    ) -> Result<u32, TaintError> {
        self.query_loc(TaintAddr::ram(addr), sink)
    }

    /// Query one location in any region.
    pub fn query_loc(
        &mut self,
        addr: TaintAddr,
        sink: &mut dyn RecordSink,
    ) -> Result<u32, TaintError> {
        let shadow = Arc::clone(self.query_shadow().ok_or(TaintError::NotEnabled)?);
        // Nothing has ever been labeled, or this region holds nothing:
        // answer without touching the directory.
        if shadow.num_labels_applied() == 0 || shadow.occupancy(addr.region()) == 0 {
            return Ok(0);
        }
        match shadow.query_set(addr) {
            None => Ok(0),
            Some(set) => {
                debug!(?addr, cardinality = set.cardinality(), "query hit");
                self.log.record(&set, addr, sink);
                Ok(set.cardinality() as u32)
            }
        }
    }

    /// Guest request: query a whole RAM buffer.
    ///
    /// Every tainted byte produces a query record; each distinct set's
    /// contents are emitted at most once per session, so a buffer of
    /// thousands of bytes sharing one set stays cheap to report.
    pub fn request_query_range(
        &mut self,
        addr: u64,
        len: u64,
        sink: &mut dyn RecordSink,
    ) -> Result<QuerySummary, TaintError> {
        let shadow = Arc::clone(self.query_shadow().ok_or(TaintError::NotEnabled)?);
        let mut summary = QuerySummary {
            tainted_bytes: 0,
            distinct_sets: 0,
            labels: Vec::new(),
        };
        if shadow.num_labels_applied() == 0 || shadow.occupancy(Region::Ram) == 0 {
            return Ok(summary);
        }
        let mut touched = FxHashSet::default();
        let mut union: Option<LabelSet> = None;
        for i in 0..len {
            let loc = TaintAddr::ram(addr + i);
            let Some(set) = shadow.query_set(loc) else {
                continue;
            };
            summary.tainted_bytes += 1;
            touched.insert(set.id());
            self.log.record(&set, loc, sink);
            union = Some(match union {
                None => set,
                Some(prev) => self.interner.union(&prev, &set),
            });
        }
        summary.distinct_sets = touched.len();
        if let Some(u) = union {
            summary.labels = u.render();
        }
        Ok(summary)
    }

    /// Labels reaching one location, sorted; empty if untainted or the
    /// session holds no shadow state.
    pub fn labels_at(&self, addr: TaintAddr) -> Vec<Label> {
        self.query_shadow()
            .and_then(|shadow| shadow.query_set(addr))
            .map(|set| set.render())
            .unwrap_or_default()
    }

    /// Every distinct label ever applied this session, ascending.
    pub fn labels_applied(&self) -> Vec<Label> {
        self.query_shadow()
            .map(|shadow| shadow.labels_applied())
            .unwrap_or_default()
    }

    /// How many distinct labels have ever been applied this session.
    pub fn num_labels_applied(&self) -> usize {
        self.query_shadow()
            .map(|shadow| shadow.num_labels_applied())
            .unwrap_or(0)
    }

    fn transition(&mut self, state: SessionState) {
        self.state = state;
        for subscriber in &self.subscribers {
            subscriber(state);
        }
    }
}
