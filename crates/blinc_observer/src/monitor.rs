//! Visibility monitor capability
//!
//! A monitor watches a set of elements against one root/margin/threshold
//! configuration and reports, per element, whenever its visibility crosses a
//! threshold. The registry drives monitors through [`MonitorBackend`] and
//! never looks inside them.
//!
//! ```text
//! ObserverRegistry ──create/watch/unwatch/teardown──▶ MonitorBackend
//!        ▲                                                  │
//!        └────── NotificationSink::deliver(&[entries]) ◀────┘
//! ```
//!
//! Backends may deliver from any point of the host's event loop; the sink
//! tolerates deliveries for monitors that were already torn down.

use crate::dom::NodeId;
use crate::error::MonitorError;
use crate::identity::MonitorConfig;
use crate::registry::NotificationSink;

/// Backend-chosen handle for one live monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorHandle(pub u64);

/// Host capability the registry multiplexes
///
/// Implemented by platform glue (e.g. a browser `IntersectionObserver`
/// binding) and by [`ScriptedBackend`](crate::ScriptedBackend) for tests.
pub trait MonitorBackend: Send + Sync {
    /// Create a monitor that reports through `sink`
    fn create(
        &self,
        config: &MonitorConfig,
        sink: NotificationSink,
    ) -> Result<MonitorHandle, MonitorError>;

    /// Start reporting on `element`
    fn watch(&self, monitor: MonitorHandle, element: NodeId);

    /// Stop reporting on `element`
    fn unwatch(&self, monitor: MonitorHandle, element: NodeId);

    /// Release the monitor and everything it watches
    fn teardown(&self, monitor: MonitorHandle);
}

/// Axis-aligned rectangle in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One visibility change reported by a monitor
///
/// Passed unchanged to the element's enter/exit callback.
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionEntry {
    pub target: NodeId,
    pub is_intersecting: bool,
    /// Visible fraction of the target, `0.0..=1.0`
    pub intersection_ratio: f64,
    /// Host timestamp in milliseconds
    pub time: f64,
    pub bounding_client_rect: Rect,
    pub intersection_rect: Rect,
    /// `None` when the root is not reachable from the target
    pub root_bounds: Option<Rect>,
}

impl IntersectionEntry {
    pub fn new(target: NodeId, is_intersecting: bool, intersection_ratio: f64) -> Self {
        Self {
            target,
            is_intersecting,
            intersection_ratio,
            time: 0.0,
            bounding_client_rect: Rect::default(),
            intersection_rect: Rect::default(),
            root_bounds: None,
        }
    }

    /// Entry for a target that became fully visible
    pub fn entering(target: NodeId) -> Self {
        Self::new(target, true, 1.0)
    }

    /// Entry for a target that left the root entirely
    pub fn exiting(target: NodeId) -> Self {
        Self::new(target, false, 0.0)
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    pub fn with_bounds(mut self, bounding: Rect, intersection: Rect, root: Option<Rect>) -> Self {
        self.bounding_client_rect = bounding;
        self.intersection_rect = intersection;
        self.root_bounds = root;
        self
    }

    /// Whether this entry counts as "entered" for a monitor whose lowest
    /// threshold is `min_threshold`
    pub fn is_visible(&self, min_threshold: f64) -> bool {
        self.is_intersecting && self.intersection_ratio >= min_threshold
    }
}
