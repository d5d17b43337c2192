use actiontree_core::{NodeKind, TraceId};

use crate::graph::layout::{Direction, LayoutConfig};
use crate::graph::model::{IngestStats, NodeStore};
use crate::graph::view::{assemble, FeedStatus, ViewFrame, ViewOptions};
use crate::net::{Incoming, IncomingKind};

#[derive(Debug, Default)]
pub struct PerfState {
    pub frames: u64,
    pub merged: u64,
    pub stale_dropped: u64,
}

/// Everything the assembler needs for the active trace. Mutations report
/// whether the view has to be recomputed; they never recompute themselves.
pub struct GraphState {
    pub store: NodeStore,
    pub options: ViewOptions,
    pub layout: LayoutConfig,
    pub status: FeedStatus,
    pub perf: PerfState,
    dirty: bool,
}

impl GraphState {
    pub fn new(trace_id: TraceId, options: ViewOptions, layout: LayoutConfig) -> Self {
        Self {
            store: NodeStore::new(trace_id),
            options,
            layout,
            status: FeedStatus::Connecting,
            perf: PerfState::default(),
            dirty: true,
        }
    }

    pub fn trace_id(&self) -> &TraceId {
        self.store.trace_id()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Hard reset onto another trace; nothing carries over.
    pub fn switch_trace(&mut self, trace_id: TraceId) {
        tracing::info!(from = %self.trace_id(), to = %trace_id, "switching trace");
        self.store = NodeStore::new(trace_id);
        self.status = FeedStatus::Connecting;
        self.perf = PerfState::default();
        self.dirty = true;
    }

    // ----- Apply incoming feed data -----
    pub fn apply(&mut self, inc: Incoming) -> bool {
        if &inc.trace_id != self.trace_id() {
            self.perf.stale_dropped += 1;
            tracing::debug!(stale = %inc.trace_id, active = %self.trace_id(), "dropping message for inactive trace");
            return false;
        }
        let changed = match inc.kind {
            IncomingKind::Connected => {
                tracing::info!(trace_id = %inc.trace_id, "feed connected");
                false
            }
            IncomingKind::Tree(roots) => {
                let IngestStats {
                    accepted, dropped, ..
                } = self.store.initialize(roots);
                tracing::info!(trace_id = %inc.trace_id, accepted, dropped, "initial tree loaded");
                self.set_status(FeedStatus::Live);
                true
            }
            IncomingKind::Node(record) => {
                let outcome = self.store.merge(record);
                if outcome.changed() {
                    self.perf.merged += 1;
                }
                outcome.changed()
            }
            IncomingKind::Traces(traces) => {
                for t in &traces {
                    tracing::info!(trace_id = %t.id, name = %t.name, "trace available");
                }
                false
            }
            IncomingKind::Error(msg) => {
                tracing::warn!(trace_id = %inc.trace_id, error = %msg, "feed error");
                // Once live, only a lost transport changes the status.
                if self.status == FeedStatus::Live {
                    false
                } else {
                    self.set_status(FeedStatus::Unavailable(msg))
                }
            }
            IncomingKind::Disconnected => {
                tracing::warn!(trace_id = %inc.trace_id, "feed disconnected");
                match self.status {
                    FeedStatus::Live | FeedStatus::Connecting => {
                        self.set_status(FeedStatus::ConnectionLost)
                    }
                    _ => false,
                }
            }
        };
        self.dirty |= changed;
        changed
    }

    fn set_status(&mut self, status: FeedStatus) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        true
    }

    // ----- View options -----
    pub fn set_direction(&mut self, direction: Direction) -> bool {
        let changed = self.options.direction != direction;
        self.options.direction = direction;
        self.dirty |= changed;
        changed
    }

    pub fn set_type_filter(&mut self, type_filter: Option<NodeKind>) -> bool {
        let changed = self.options.type_filter != type_filter;
        self.options.type_filter = type_filter;
        self.dirty |= changed;
        changed
    }

    pub fn set_search(&mut self, search: &str) -> bool {
        let changed = self.options.search != search;
        if changed {
            self.options.search = search.to_string();
        }
        self.dirty |= changed;
        changed
    }

    /// Build a fresh frame and clear the dirty flag.
    pub fn take_frame(&mut self) -> ViewFrame {
        let frame = assemble(&self.store, &self.options, &self.layout, &self.status);
        self.dirty = false;
        self.perf.frames += 1;
        frame
    }
}
