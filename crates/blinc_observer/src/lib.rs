//! Blinc Observer
//!
//! Shared visibility observation for Blinc hosts. Many elements can ask to
//! be told when they scroll into or out of a viewport (or a scrollable
//! ancestor); this crate keeps the number of native monitors down to one per
//! distinct root/margin/threshold combination and routes each monitor's
//! notifications to the right element's callbacks.
//!
//! - **Identity**: [`ObserverOptions`] resolve to a [`ConfigIdentity`] that
//!   decides which observations share a monitor
//! - **Registry**: [`ObserverRegistry`] owns the identity → bucket map and
//!   the monitor lifecycle
//! - **Backend**: [`MonitorBackend`] is the native capability being
//!   multiplexed; [`ScriptedBackend`] is the in-process implementation
//! - **Document**: [`NodeId`] handles and the [`Document`] lookup trait,
//!   with [`NodeTree`] as an in-memory element tree
//!
//! # Example
//!
//! ```rust
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
//! let a = tree.append(tree.root(), ElementSpec::new("img")).unwrap();
//! let b = tree.append(tree.root(), ElementSpec::new("img")).unwrap();
//! let options = ObserverOptions::new().threshold(0.5);
//!
//! registry.observe(a, &options, None, None).unwrap();
//! registry.observe(b, &options, None, None).unwrap();
//!
//! // Both elements share a single monitor
//! assert_eq!(backend.counters().created, 1);
//! backend.report(IntersectionEntry::entering(a));
//!
//! registry.destroy_all();
//! assert_eq!(backend.live_monitors(), 0);
//! ```

pub mod dom;
pub mod error;
pub mod identity;
pub mod monitor;
pub mod registry;
pub mod scripted;

pub use dom::{Document, ElementSpec, NodeId, NodeTree};
pub use error::{MonitorError, ObserverError, ObserverResult};
pub use identity::{
    ConfigIdentity, MonitorConfig, ObserverOptions, RootKey, RootMargin, RootSpec, Threshold,
};
pub use monitor::{IntersectionEntry, MonitorBackend, MonitorHandle, Rect};
pub use registry::{
    MonitorId, NotificationSink, ObserverRegistry, RegistryStats, VisibilityCallback,
};
pub use scripted::{BackendCounters, ScriptedBackend};
