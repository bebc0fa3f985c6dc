//! Observation registry
//!
//! Multiplexes many element observations onto a few shared monitors. Each
//! distinct [`ConfigIdentity`] gets one bucket holding the backend monitor
//! and the element → callbacks map routed through it. Buckets are created on
//! the first `observe` for their identity and retired (monitor torn down) as
//! soon as their last element is unobserved.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use blinc_observer::{
//!     ElementSpec, IntersectionEntry, NodeTree, ObserverOptions, ObserverRegistry,
//!     ScriptedBackend,
//! };
//!
//! let tree = Arc::new(NodeTree::new());
//! let backend = Arc::new(ScriptedBackend::new());
//! let registry = ObserverRegistry::new(backend.clone(), tree.clone());
//!
//! let item = tree.append(tree.root(), ElementSpec::new("li")).unwrap();
//! let options = ObserverOptions::new().threshold(0.5);
//!
//! registry
//!     .observe(item, &options, Some(Arc::new(|entry: &IntersectionEntry| {
//!         println!("{:?} entered", entry.target);
//!     })), None)
//!     .unwrap();
//!
//! backend.report(IntersectionEntry::entering(item));
//! registry.unobserve(item, &options);
//! assert_eq!(registry.bucket_count(), 0);
//! ```
//!
//! # Delivery rules
//!
//! Entries are routed one at a time and looked up at delivery time. An
//! element unobserved before its entry is routed (including by a callback
//! earlier in the same batch) never receives it. The registry lock is never
//! held while a callback or backend method runs, so callbacks may call back
//! into the registry.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use rustc_hash::FxHashMap;

use crate::dom::{Document, NodeId};
use crate::error::{ObserverError, ObserverResult};
use crate::identity::{ConfigIdentity, ObserverOptions};
use crate::monitor::{IntersectionEntry, MonitorBackend, MonitorHandle};

/// Callback invoked with the entry that triggered it
pub type VisibilityCallback = Arc<dyn Fn(&IntersectionEntry) + Send + Sync>;

/// Registry-assigned key for a bucket; never reused within one registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorId(u64);

#[derive(Clone)]
struct Callbacks {
    on_enter: Option<VisibilityCallback>,
    on_exit: Option<VisibilityCallback>,
}

struct Bucket {
    identity: ConfigIdentity,
    monitor: MonitorHandle,
    min_threshold: f64,
    elements: FxHashMap<NodeId, Callbacks>,
}

enum Inserted {
    /// New to the bucket; the monitor must watch it
    Added,
    Replaced,
    /// Already present and left as is
    Kept,
}

impl Bucket {
    fn insert(&mut self, element: NodeId, callbacks: Callbacks, replace: bool) -> Inserted {
        match self.elements.get_mut(&element) {
            Some(existing) if replace => {
                *existing = callbacks;
                Inserted::Replaced
            }
            Some(_) => Inserted::Kept,
            None => {
                self.elements.insert(element, callbacks);
                Inserted::Added
            }
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    buckets: FxHashMap<MonitorId, Bucket>,
    by_identity: FxHashMap<ConfigIdentity, MonitorId>,
    next_id: u64,
}

impl RegistryInner {
    fn bucket_for(&mut self, identity: &ConfigIdentity) -> Option<&mut Bucket> {
        let id = self.by_identity.get(identity)?;
        self.buckets.get_mut(id)
    }

    fn allocate_id(&mut self) -> MonitorId {
        self.next_id += 1;
        MonitorId(self.next_id)
    }

    /// Drop `element` from the bucket; retire the bucket if it emptied
    ///
    /// Returns the backend calls the caller must make after unlocking.
    fn detach(&mut self, id: MonitorId, element: NodeId) -> Option<Detached> {
        let bucket = self.buckets.get_mut(&id)?;
        bucket.elements.remove(&element)?;
        let monitor = bucket.monitor;
        let retire = bucket.elements.is_empty();
        if retire {
            if let Some(bucket) = self.buckets.remove(&id) {
                self.by_identity.remove(&bucket.identity);
            }
        }
        Some(Detached {
            monitor,
            element,
            retire,
        })
    }
}

fn lock(inner: &Mutex<RegistryInner>) -> MutexGuard<'_, RegistryInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Detached {
    monitor: MonitorHandle,
    element: NodeId,
    retire: bool,
}

/// Snapshot of registry occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    /// Live buckets, equal to live monitors
    pub bucket_count: usize,
    /// (element, identity) pairs currently observed
    pub observation_count: usize,
}

/// Route from one monitor back into the registry
///
/// Handed to [`MonitorBackend::create`]. Holds the registry weakly, so a
/// backend keeping sinks around does not keep the registry alive.
#[derive(Clone)]
pub struct NotificationSink {
    inner: Weak<Mutex<RegistryInner>>,
    monitor: MonitorId,
}

impl std::fmt::Debug for NotificationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSink")
            .field("monitor", &self.monitor)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl NotificationSink {
    pub fn monitor_id(&self) -> MonitorId {
        self.monitor
    }

    /// Whether the bucket this sink feeds is still live
    pub fn is_connected(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| lock(&inner).buckets.contains_key(&self.monitor))
    }

    /// Route a batch of entries to their elements' callbacks
    pub fn deliver(&self, entries: &[IntersectionEntry]) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        for entry in entries {
            let callback = {
                let guard = lock(&inner);
                let Some(bucket) = guard.buckets.get(&self.monitor) else {
                    tracing::trace!(
                        "dropping {} entries for retired monitor {:?}",
                        entries.len(),
                        self.monitor
                    );
                    return;
                };
                let Some(callbacks) = bucket.elements.get(&entry.target) else {
                    tracing::trace!(
                        "dropping entry for unobserved element {:?}",
                        entry.target
                    );
                    continue;
                };
                if entry.is_visible(bucket.min_threshold) {
                    callbacks.on_enter.clone()
                } else {
                    callbacks.on_exit.clone()
                }
            };

            if let Some(callback) = callback {
                callback(entry);
            }
        }
    }
}

/// Shares one monitor per configuration identity across many elements
///
/// Cheap to clone; clones share state. Construct one per hosting context and
/// pass it to whatever needs to observe.
#[derive(Clone)]
pub struct ObserverRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    backend: Arc<dyn MonitorBackend>,
    document: Arc<dyn Document>,
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("stats", &self.stats())
            .finish()
    }
}

impl ObserverRegistry {
    pub fn new(backend: Arc<dyn MonitorBackend>, document: Arc<dyn Document>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::default())),
            backend,
            document,
        }
    }

    pub fn document(&self) -> &Arc<dyn Document> {
        &self.document
    }

    /// Start routing visibility changes of `element` to the given callbacks
    ///
    /// Returns the identity the options resolved to; pass it to
    /// [`unobserve_identity`](Self::unobserve_identity) to undo exactly this
    /// registration. Re-observing an element under the same identity replaces
    /// its callbacks without watching it twice. Fails without registering
    /// anything if the element is detached, the options are invalid, or the
    /// backend cannot create a monitor.
    pub fn observe(
        &self,
        element: NodeId,
        options: &ObserverOptions,
        on_enter: Option<VisibilityCallback>,
        on_exit: Option<VisibilityCallback>,
    ) -> ObserverResult<ConfigIdentity> {
        self.register(element, options, Callbacks { on_enter, on_exit }, true)
    }

    /// [`observe`](Self::observe) that never replaces callbacks
    ///
    /// Fails with [`ObserverError::AlreadyObserved`] when `element` is already
    /// registered under the identity `options` resolve to, leaving that
    /// registration untouched.
    pub fn try_observe(
        &self,
        element: NodeId,
        options: &ObserverOptions,
        on_enter: Option<VisibilityCallback>,
        on_exit: Option<VisibilityCallback>,
    ) -> ObserverResult<ConfigIdentity> {
        self.register(element, options, Callbacks { on_enter, on_exit }, false)
    }

    fn register(
        &self,
        element: NodeId,
        options: &ObserverOptions,
        callbacks: Callbacks,
        replace: bool,
    ) -> ObserverResult<ConfigIdentity> {
        if !self.document.contains(element) {
            return Err(ObserverError::InvalidElement(element));
        }
        let identity = ConfigIdentity::resolve(options, &*self.document)?;

        {
            let mut inner = lock(&self.inner);
            if let Some(bucket) = inner.bucket_for(&identity) {
                let monitor = bucket.monitor;
                let outcome = bucket.insert(element, callbacks, replace);
                drop(inner);

                self.settle(monitor, element, outcome)?;
                return Ok(identity);
            }
        }

        self.create_bucket(&identity, element, callbacks, replace)?;
        Ok(identity)
    }

    /// Backend follow-up of a bucket insert, made outside the lock
    fn settle(
        &self,
        monitor: MonitorHandle,
        element: NodeId,
        outcome: Inserted,
    ) -> ObserverResult<()> {
        match outcome {
            Inserted::Added => {
                self.backend.watch(monitor, element);
                Ok(())
            }
            Inserted::Replaced => {
                tracing::trace!("replaced callbacks for {:?} on {:?}", element, monitor);
                Ok(())
            }
            Inserted::Kept => Err(ObserverError::AlreadyObserved(element)),
        }
    }

    fn create_bucket(
        &self,
        identity: &ConfigIdentity,
        element: NodeId,
        callbacks: Callbacks,
        replace: bool,
    ) -> ObserverResult<()> {
        let id = lock(&self.inner).allocate_id();
        let sink = NotificationSink {
            inner: Arc::downgrade(&self.inner),
            monitor: id,
        };

        let config = identity.monitor_config();
        let monitor = self.backend.create(&config, sink).map_err(|err| {
            tracing::warn!("monitor creation failed for {:?}: {}", config, err);
            ObserverError::from(err)
        })?;

        let raced = {
            let mut inner = lock(&self.inner);
            match inner.bucket_for(identity) {
                // Another observe created this identity while the backend ran
                Some(bucket) => Some((bucket.monitor, bucket.insert(element, callbacks, replace))),
                None => {
                    let mut elements = FxHashMap::default();
                    elements.insert(element, callbacks);
                    tracing::debug!(
                        "created monitor {:?} ({:?}) for root={:?} margin='{}' thresholds={:?}",
                        id,
                        monitor,
                        identity.root(),
                        identity.root_margin(),
                        identity.thresholds()
                    );
                    inner.by_identity.insert(identity.clone(), id);
                    inner.buckets.insert(
                        id,
                        Bucket {
                            identity: identity.clone(),
                            monitor,
                            min_threshold: identity.min_threshold(),
                            elements,
                        },
                    );
                    None
                }
            }
        };

        match raced {
            Some((winner, outcome)) => {
                self.backend.teardown(monitor);
                self.settle(winner, element, outcome)
            }
            None => {
                self.backend.watch(monitor, element);
                Ok(())
            }
        }
    }

    /// Stop routing visibility changes of `element` under these options
    ///
    /// `options` must resolve to the identity used in `observe`. Unknown
    /// pairs (and options that no longer resolve) are ignored. When the
    /// element was the bucket's last, its monitor is torn down.
    pub fn unobserve(&self, element: NodeId, options: &ObserverOptions) {
        if let Ok(identity) = ConfigIdentity::resolve(options, &*self.document) {
            self.unobserve_identity(element, &identity);
        }
    }

    /// [`unobserve`](Self::unobserve) with an identity resolved earlier
    ///
    /// Unaffected by document changes since resolution, e.g. a selector
    /// root that has since been removed.
    pub fn unobserve_identity(&self, element: NodeId, identity: &ConfigIdentity) {
        let detached = {
            let mut inner = lock(&self.inner);
            inner
                .by_identity
                .get(identity)
                .copied()
                .and_then(|id| inner.detach(id, element))
        };

        if let Some(detached) = detached {
            self.release(detached);
        }
    }

    /// Resolve options against this registry's document
    pub fn resolve(&self, options: &ObserverOptions) -> ObserverResult<ConfigIdentity> {
        ConfigIdentity::resolve(options, &*self.document)
    }

    fn release(&self, detached: Detached) {
        self.backend.unwatch(detached.monitor, detached.element);
        if detached.retire {
            tracing::debug!("retiring monitor {:?}: no elements left", detached.monitor);
            self.backend.teardown(detached.monitor);
        }
    }

    /// Unobserve every element that is no longer attached to the document
    ///
    /// Returns the number of (element, identity) pairs removed.
    pub fn prune_detached(&self) -> usize {
        let detached: Vec<Detached> = {
            let mut inner = lock(&self.inner);
            let stale: Vec<(MonitorId, NodeId)> = inner
                .buckets
                .iter()
                .flat_map(|(id, bucket)| {
                    bucket
                        .elements
                        .keys()
                        .filter(|element| !self.document.contains(**element))
                        .map(move |element| (*id, *element))
                })
                .collect();
            stale
                .into_iter()
                .filter_map(|(id, element)| inner.detach(id, element))
                .collect()
        };

        let count = detached.len();
        if count > 0 {
            tracing::debug!("pruned {} detached observations", count);
        }
        for d in detached {
            self.release(d);
        }
        count
    }

    /// Tear down every monitor and forget every observation
    ///
    /// The registry stays usable afterwards.
    pub fn destroy_all(&self) {
        let monitors: Vec<MonitorHandle> = {
            let mut inner = lock(&self.inner);
            inner.by_identity.clear();
            inner
                .buckets
                .drain()
                .map(|(_, bucket)| bucket.monitor)
                .collect()
        };

        if !monitors.is_empty() {
            tracing::debug!("destroying {} monitors", monitors.len());
        }
        for monitor in monitors {
            self.backend.teardown(monitor);
        }
    }

    /// Whether `element` is currently observed under these options
    pub fn is_observing(&self, element: NodeId, options: &ObserverOptions) -> bool {
        let Ok(identity) = ConfigIdentity::resolve(options, &*self.document) else {
            return false;
        };
        lock(&self.inner)
            .bucket_for(&identity)
            .is_some_and(|bucket| bucket.elements.contains_key(&element))
    }

    /// Number of live buckets (and monitors)
    pub fn bucket_count(&self) -> usize {
        lock(&self.inner).buckets.len()
    }

    /// Number of (element, identity) pairs currently observed
    pub fn observed_count(&self) -> usize {
        lock(&self.inner)
            .buckets
            .values()
            .map(|bucket| bucket.elements.len())
            .sum()
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = lock(&self.inner);
        RegistryStats {
            bucket_count: inner.buckets.len(),
            observation_count: inner.buckets.values().map(|b| b.elements.len()).sum(),
        }
    }
}
