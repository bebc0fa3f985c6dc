//! In-process monitor backend driven by the host
//!
//! `ScriptedBackend` computes nothing: the host (or a test) tells it which
//! entries to emit. It records every call the registry makes, which makes it
//! the reference backend for tests and a fallback for headless hosts that
//! compute visibility themselves.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use rustc_hash::FxHashMap;

use crate::dom::NodeId;
use crate::error::MonitorError;
use crate::identity::MonitorConfig;
use crate::monitor::{IntersectionEntry, MonitorBackend, MonitorHandle};
use crate::registry::NotificationSink;

/// Torn-down monitors whose sinks are kept for late deliveries
const RETIRED_SINK_LIMIT: usize = 16;

/// Running totals of backend calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendCounters {
    pub created: usize,
    pub watched: usize,
    pub unwatched: usize,
    pub torn_down: usize,
}

struct ScriptedMonitor {
    config: MonitorConfig,
    sink: NotificationSink,
    /// Watched elements in watch order
    watched: Vec<NodeId>,
}

#[derive(Default)]
struct ScriptedState {
    next_handle: u64,
    monitors: FxHashMap<MonitorHandle, ScriptedMonitor>,
    /// Sinks of the most recently torn-down monitors, oldest first
    retired: VecDeque<(MonitorHandle, NotificationSink)>,
    counters: BackendCounters,
    fail_next_create: Option<MonitorError>,
}

/// Host-scripted [`MonitorBackend`]
#[derive(Default)]
pub struct ScriptedBackend {
    state: Mutex<ScriptedState>,
}

impl std::fmt::Debug for ScriptedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ScriptedBackend")
            .field("live_monitors", &state.monitors.len())
            .field("counters", &state.counters)
            .finish()
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ScriptedState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next `create` fail with `error`
    pub fn fail_next_create(&self, error: MonitorError) {
        self.state().fail_next_create = Some(error);
    }

    pub fn counters(&self) -> BackendCounters {
        self.state().counters
    }

    pub fn live_monitors(&self) -> usize {
        self.state().monitors.len()
    }

    /// Live monitor handles in creation order
    pub fn monitors(&self) -> Vec<MonitorHandle> {
        let mut handles: Vec<_> = self.state().monitors.keys().copied().collect();
        handles.sort();
        handles
    }

    pub fn config(&self, monitor: MonitorHandle) -> Option<MonitorConfig> {
        self.state().monitors.get(&monitor).map(|m| m.config.clone())
    }

    /// Elements `monitor` watches, in watch order
    pub fn watched(&self, monitor: MonitorHandle) -> Vec<NodeId> {
        self.state()
            .monitors
            .get(&monitor)
            .map(|m| m.watched.clone())
            .unwrap_or_default()
    }

    /// Live monitors watching `element`, in creation order
    pub fn monitors_watching(&self, element: NodeId) -> Vec<MonitorHandle> {
        let mut handles: Vec<_> = self
            .state()
            .monitors
            .iter()
            .filter(|(_, m)| m.watched.contains(&element))
            .map(|(handle, _)| *handle)
            .collect();
        handles.sort();
        handles
    }

    /// Whether the registry side of `monitor` is still listening
    pub fn is_connected(&self, monitor: MonitorHandle) -> bool {
        let sink = self.state().monitors.get(&monitor).map(|m| m.sink.clone());
        sink.is_some_and(|sink| sink.is_connected())
    }

    /// Number of torn-down monitors that [`emit`](Self::emit) still reaches
    pub fn retired_monitors(&self) -> usize {
        self.state().retired.len()
    }

    /// Drop the sinks kept for torn-down monitors
    pub fn forget_retired(&self) {
        self.state().retired.clear();
    }

    /// Deliver a batch through `monitor`'s sink as-is
    ///
    /// Entries reach the registry even for recently torn-down monitors, the
    /// way a late native callback would. Only the last few torn-down
    /// monitors are remembered.
    pub fn emit(&self, monitor: MonitorHandle, entries: Vec<IntersectionEntry>) {
        let sink = {
            let state = self.state();
            state
                .monitors
                .get(&monitor)
                .map(|m| m.sink.clone())
                .or_else(|| {
                    state
                        .retired
                        .iter()
                        .find(|(handle, _)| *handle == monitor)
                        .map(|(_, sink)| sink.clone())
                })
        };
        if let Some(sink) = sink {
            sink.deliver(&entries);
        }
    }

    /// Deliver `entry` through every live monitor watching its target
    pub fn report(&self, entry: IntersectionEntry) {
        let sinks: Vec<NotificationSink> = self
            .state()
            .monitors
            .values()
            .filter(|m| m.watched.contains(&entry.target))
            .map(|m| m.sink.clone())
            .collect();

        let batch = [entry];
        for sink in sinks {
            sink.deliver(&batch);
        }
    }
}

impl MonitorBackend for ScriptedBackend {
    fn create(
        &self,
        config: &MonitorConfig,
        sink: NotificationSink,
    ) -> Result<MonitorHandle, MonitorError> {
        let mut state = self.state();
        if let Some(error) = state.fail_next_create.take() {
            return Err(error);
        }

        state.next_handle += 1;
        let handle = MonitorHandle(state.next_handle);
        state.monitors.insert(
            handle,
            ScriptedMonitor {
                config: config.clone(),
                sink,
                watched: Vec::new(),
            },
        );
        state.counters.created += 1;
        Ok(handle)
    }

    fn watch(&self, monitor: MonitorHandle, element: NodeId) {
        let mut state = self.state();
        let Some(m) = state.monitors.get_mut(&monitor) else {
            tracing::warn!("watch on unknown monitor {:?}", monitor);
            return;
        };
        if !m.watched.contains(&element) {
            m.watched.push(element);
        }
        state.counters.watched += 1;
    }

    fn unwatch(&self, monitor: MonitorHandle, element: NodeId) {
        let mut state = self.state();
        if let Some(m) = state.monitors.get_mut(&monitor) {
            m.watched.retain(|e| *e != element);
        }
        state.counters.unwatched += 1;
    }

    fn teardown(&self, monitor: MonitorHandle) {
        let mut state = self.state();
        if let Some(m) = state.monitors.remove(&monitor) {
            if state.retired.len() == RETIRED_SINK_LIMIT {
                state.retired.pop_front();
            }
            state.retired.push_back((monitor, m.sink));
        }
        state.counters.torn_down += 1;
    }
}
