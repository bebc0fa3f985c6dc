//! Sentinel component
//!
//! A sentinel watches one target element through a shared
//! [`ObserverRegistry`] and turns its visibility changes into
//! [`SentinelEvent`]s for subscribed listeners. Typical uses are lazy
//! loading (`block`: keep slot content unrendered until first visible) and
//! infinite scrolling (`once`: fire a single `enter` when the end of a list
//! comes into view).
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use blinc_observer::{ElementSpec, IntersectionEntry, NodeTree, ObserverRegistry, ScriptedBackend};
//! use blinc_sentinel::{Sentinel, SentinelEvent, SentinelProps};
//!
//! let tree = Arc::new(NodeTree::new());
//! let backend = Arc::new(ScriptedBackend::new());
//! let registry = ObserverRegistry::new(backend.clone(), tree.clone());
//! let target = tree.append(tree.root(), ElementSpec::new("div")).unwrap();
//!
//! let props = SentinelProps::from_json(r#"{ "once": true }"#).unwrap();
//! let sentinel = Sentinel::attach(registry, target, props).unwrap();
//! sentinel.subscribe(|event| {
//!     if let SentinelEvent::Enter(_) = event {
//!         println!("load next page");
//!     }
//! });
//!
//! backend.report(IntersectionEntry::entering(target));
//! assert!(sentinel.is_visible());
//! ```

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use blinc_observer::{
    IntersectionEntry, NodeId, ObserverOptions, ObserverRegistry, VisibilityCallback,
};

use crate::config::{ContainerAttributes, SentinelProps};
use crate::error::Result;
use crate::registration::{Registration, RegistrationTable};

/// Visibility transition of a sentinel's target
#[derive(Debug, Clone, PartialEq)]
pub enum SentinelEvent {
    Enter(IntersectionEntry),
    Exit(IntersectionEntry),
}

impl SentinelEvent {
    pub fn entry(&self) -> &IntersectionEntry {
        match self {
            SentinelEvent::Enter(entry) | SentinelEvent::Exit(entry) => entry,
        }
    }
}

/// Listener for sentinel events
pub type SentinelListener = Arc<dyn Fn(&SentinelEvent) + Send + Sync>;

#[derive(Default)]
struct SentinelState {
    is_visible: bool,
    /// Sticky: set by the first enter and never cleared
    has_entered: bool,
    listeners: Vec<SentinelListener>,
}

fn lock(state: &Mutex<SentinelState>) -> MutexGuard<'_, SentinelState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn handle_enter(state: &Weak<Mutex<SentinelState>>, once: bool, entry: &IntersectionEntry) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let listeners = {
        let mut state = lock(&state);
        state.is_visible = true;
        if once && state.has_entered {
            return;
        }
        state.has_entered = true;
        state.listeners.clone()
    };

    let event = SentinelEvent::Enter(entry.clone());
    for listener in listeners {
        listener(&event);
    }
}

fn handle_exit(state: &Weak<Mutex<SentinelState>>, entry: &IntersectionEntry) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let listeners = {
        let mut state = lock(&state);
        state.is_visible = false;
        state.listeners.clone()
    };

    let event = SentinelEvent::Exit(entry.clone());
    for listener in listeners {
        listener(&event);
    }
}

/// Emits enter/exit events for one target element
///
/// Detaches from the registry when dropped.
pub struct Sentinel {
    registry: ObserverRegistry,
    props: SentinelProps,
    target: NodeId,
    registrations: RegistrationTable,
    state: Arc<Mutex<SentinelState>>,
}

impl std::fmt::Debug for Sentinel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("Sentinel")
            .field("target", &self.target)
            .field("props", &self.props)
            .field("is_visible", &state.is_visible)
            .field("has_entered", &state.has_entered)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl Sentinel {
    /// Start observing `target` with the options in `props.config_options`
    ///
    /// Fails with [`ObserverError::AlreadyObserved`] if `target` is already
    /// observed with equal options, e.g. by another sentinel; that
    /// observation keeps its callbacks.
    ///
    /// [`ObserverError::AlreadyObserved`]: blinc_observer::ObserverError::AlreadyObserved
    pub fn attach(registry: ObserverRegistry, target: NodeId, props: SentinelProps) -> Result<Self> {
        let options = props.config_options.observer_options();
        Self::attach_with_options(registry, target, props, options)
    }

    /// Start observing `target` with explicit options
    ///
    /// For roots that cannot be expressed as a selector, e.g.
    /// `ObserverOptions::new().root(scroller_node)`.
    pub fn attach_with_options(
        registry: ObserverRegistry,
        target: NodeId,
        props: SentinelProps,
        options: ObserverOptions,
    ) -> Result<Self> {
        let state = Arc::new(Mutex::new(SentinelState::default()));

        let on_enter: VisibilityCallback = {
            let state = Arc::downgrade(&state);
            let once = props.once;
            Arc::new(move |entry: &IntersectionEntry| handle_enter(&state, once, entry))
        };
        let on_exit: VisibilityCallback = {
            let state = Arc::downgrade(&state);
            Arc::new(move |entry: &IntersectionEntry| handle_exit(&state, entry))
        };

        let identity = registry.try_observe(target, &options, Some(on_enter), Some(on_exit))?;

        let mut registrations = RegistrationTable::new();
        registrations.insert(target, Registration { options, identity });
        tracing::debug!("sentinel attached to {:?}", target);

        Ok(Self {
            registry,
            props,
            target,
            registrations,
            state,
        })
    }

    /// Stop observing; no events are emitted afterwards
    ///
    /// Only this sentinel's observation is removed. Other observations on the
    /// shared registry are untouched.
    pub fn detach(&mut self) {
        if let Some(registration) = self.registrations.remove(self.target) {
            self.registry
                .unobserve_identity(self.target, &registration.identity);
            tracing::debug!("sentinel detached from {:?}", self.target);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.registrations.contains(self.target)
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&SentinelEvent) + Send + Sync + 'static,
    {
        lock(&self.state).listeners.push(Arc::new(listener));
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn props(&self) -> &SentinelProps {
        &self.props
    }

    /// Options the target was observed with, while attached
    pub fn options(&self) -> Option<&ObserverOptions> {
        self.registrations
            .get(self.target, &**self.registry.document())
            .map(|r| &r.options)
    }

    /// Whether the target is currently visible
    pub fn is_visible(&self) -> bool {
        lock(&self.state).is_visible
    }

    /// Whether the target has ever been visible
    pub fn has_entered(&self) -> bool {
        lock(&self.state).has_entered
    }

    /// Whether a host should render the slot content now
    ///
    /// Always true without `block`; with `block`, true from the first time
    /// the target became visible.
    pub fn should_render_content(&self) -> bool {
        !self.props.block || self.has_entered()
    }

    /// Container a host renders around the slot content; `None` with `block`
    pub fn container_attributes(&self) -> Option<ContainerAttributes> {
        self.props.container_attributes()
    }
}

impl Drop for Sentinel {
    fn drop(&mut self) {
        self.detach();
    }
}
