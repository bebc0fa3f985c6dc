//! Observation options and their canonical identity
//!
//! Two `observe` calls share one monitor when their options resolve to the
//! same [`ConfigIdentity`]:
//!
//! - the root compares by node identity (the viewport is its own key),
//! - the margin compares by its canonical `"{top}px {right}px {bottom}px {left}px"`
//!   form, independent of how the offsets were supplied,
//! - the threshold compares element by element, in order.
//!
//! A single ratio and the one-element list holding it produce the same
//! identity since they configure an identical monitor.

use std::fmt;

use smallvec::{smallvec, SmallVec};

use crate::dom::{Document, NodeId};
use crate::error::{ObserverError, ObserverResult};

/// Where visibility is measured against
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RootSpec {
    /// The top-level viewport
    #[default]
    Viewport,
    /// First element matching this selector when `observe` is called
    Selector(String),
    /// An explicit scrollable ancestor
    Node(NodeId),
}

impl From<NodeId> for RootSpec {
    fn from(node: NodeId) -> Self {
        RootSpec::Node(node)
    }
}

impl From<&str> for RootSpec {
    fn from(selector: &str) -> Self {
        RootSpec::Selector(selector.to_string())
    }
}

impl From<String> for RootSpec {
    fn from(selector: String) -> Self {
        RootSpec::Selector(selector)
    }
}

/// Pixel offsets that grow (or, negative, shrink) the root's box
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RootMargin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl RootMargin {
    pub fn new(top: f64, right: f64, bottom: f64, left: f64) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub fn uniform(offset: f64) -> Self {
        Self::new(offset, offset, offset, offset)
    }

    pub fn is_finite(&self) -> bool {
        [self.top, self.right, self.bottom, self.left]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Canonical CSS form, always in top/right/bottom/left order
    pub fn to_css(&self) -> String {
        // `+ 0.0` folds -0.0 into 0.0 so both print as "0px"
        format!(
            "{}px {}px {}px {}px",
            self.top + 0.0,
            self.right + 0.0,
            self.bottom + 0.0,
            self.left + 0.0
        )
    }
}

impl fmt::Display for RootMargin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css())
    }
}

/// Visible-area ratio(s) at which notifications are produced
#[derive(Debug, Clone, PartialEq)]
pub enum Threshold {
    Single(f64),
    /// Ordered list of ratios; an empty list behaves like `[0.0]`
    Multiple(Vec<f64>),
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold::Single(0.0)
    }
}

impl From<f64> for Threshold {
    fn from(ratio: f64) -> Self {
        Threshold::Single(ratio)
    }
}

impl From<Vec<f64>> for Threshold {
    fn from(ratios: Vec<f64>) -> Self {
        Threshold::Multiple(ratios)
    }
}

impl From<&[f64]> for Threshold {
    fn from(ratios: &[f64]) -> Self {
        Threshold::Multiple(ratios.to_vec())
    }
}

impl Threshold {
    /// Ratios in canonical form: never empty, `-0.0` folded into `0.0`
    pub fn ratios(&self) -> SmallVec<[f64; 4]> {
        match self {
            Threshold::Single(r) => smallvec![*r + 0.0],
            Threshold::Multiple(list) if list.is_empty() => smallvec![0.0],
            Threshold::Multiple(list) => list.iter().map(|r| *r + 0.0).collect(),
        }
    }

    fn validate(&self) -> ObserverResult<SmallVec<[f64; 4]>> {
        let ratios = self.ratios();
        if let Some(bad) = ratios
            .iter()
            .find(|r| r.is_nan() || **r < 0.0 || **r > 1.0)
        {
            return Err(ObserverError::InvalidThreshold(*bad));
        }
        Ok(ratios)
    }
}

/// Options accepted by `observe`/`unobserve`, with every default explicit
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObserverOptions {
    pub root: RootSpec,
    pub margin: RootMargin,
    pub threshold: Threshold,
}

impl ObserverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(mut self, root: impl Into<RootSpec>) -> Self {
        self.root = root.into();
        self
    }

    pub fn margin(mut self, margin: RootMargin) -> Self {
        self.margin = margin;
        self
    }

    pub fn top(mut self, offset: f64) -> Self {
        self.margin.top = offset;
        self
    }

    pub fn right(mut self, offset: f64) -> Self {
        self.margin.right = offset;
        self
    }

    pub fn bottom(mut self, offset: f64) -> Self {
        self.margin.bottom = offset;
        self
    }

    pub fn left(mut self, offset: f64) -> Self {
        self.margin.left = offset;
        self
    }

    pub fn threshold(mut self, threshold: impl Into<Threshold>) -> Self {
        self.threshold = threshold.into();
        self
    }
}

/// Resolved root of an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKey {
    Viewport,
    Node(NodeId),
}

impl RootKey {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            RootKey::Viewport => None,
            RootKey::Node(node) => Some(*node),
        }
    }
}

/// Canonical key deciding which observations share a monitor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigIdentity {
    root: RootKey,
    root_margin: String,
    /// Threshold ratios stored as bits so the key is `Eq + Hash`
    thresholds: SmallVec<[u64; 4]>,
}

impl ConfigIdentity {
    /// Resolve raw options against the document
    ///
    /// Selector roots are looked up once, here. A selector with no match
    /// falls back to the viewport.
    pub fn resolve(options: &ObserverOptions, document: &dyn Document) -> ObserverResult<Self> {
        let root = match &options.root {
            RootSpec::Viewport => RootKey::Viewport,
            RootSpec::Node(node) => {
                if !document.contains(*node) {
                    return Err(ObserverError::InvalidRoot(*node));
                }
                RootKey::Node(*node)
            }
            RootSpec::Selector(selector) => match document.query_selector(selector) {
                Some(node) => RootKey::Node(node),
                None => {
                    tracing::warn!(
                        "root selector '{}' matched no element, observing against the viewport",
                        selector
                    );
                    RootKey::Viewport
                }
            },
        };

        if !options.margin.is_finite() {
            return Err(ObserverError::InvalidMargin(format!("{:?}", options.margin)));
        }

        let thresholds = options.threshold.validate()?;

        Ok(Self {
            root,
            root_margin: options.margin.to_css(),
            thresholds: thresholds.iter().map(|r| r.to_bits()).collect(),
        })
    }

    pub fn root(&self) -> RootKey {
        self.root
    }

    pub fn root_margin(&self) -> &str {
        &self.root_margin
    }

    pub fn thresholds(&self) -> SmallVec<[f64; 4]> {
        self.thresholds.iter().map(|bits| f64::from_bits(*bits)).collect()
    }

    /// Lowest configured ratio; an entry must reach it to count as visible
    pub fn min_threshold(&self) -> f64 {
        self.thresholds().into_iter().fold(1.0, f64::min)
    }

    /// Configuration handed to the monitor backend
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            root: self.root.node(),
            root_margin: self.root_margin.clone(),
            thresholds: self.thresholds().to_vec(),
        }
    }
}

/// What a backend needs to create one native monitor
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// `None` means the viewport
    pub root: Option<NodeId>,
    pub root_margin: String,
    pub thresholds: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{ElementSpec, NodeTree};

    fn tree_with_scroller() -> (NodeTree, NodeId) {
        let tree = NodeTree::new();
        let scroller = tree
            .append(tree.root(), ElementSpec::new("div").id("scroller"))
            .unwrap();
        (tree, scroller)
    }

    #[test]
    fn test_defaults_resolve_to_viewport() {
        let (tree, _) = tree_with_scroller();
        let identity = ConfigIdentity::resolve(&ObserverOptions::default(), &tree).unwrap();

        assert_eq!(identity.root(), RootKey::Viewport);
        assert_eq!(identity.root_margin(), "0px 0px 0px 0px");
        assert_eq!(identity.thresholds().as_slice(), &[0.0]);
    }

    #[test]
    fn test_margin_order_is_canonical() {
        let (tree, _) = tree_with_scroller();
        let a = ObserverOptions::new().bottom(5.0).top(10.0);
        let b = ObserverOptions::new().margin(RootMargin::new(10.0, 0.0, 5.0, 0.0));

        let a = ConfigIdentity::resolve(&a, &tree).unwrap();
        let b = ConfigIdentity::resolve(&b, &tree).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.root_margin(), "10px 0px 5px 0px");
    }

    #[test]
    fn test_negative_zero_margin_matches_zero() {
        let (tree, _) = tree_with_scroller();
        let a = ConfigIdentity::resolve(&ObserverOptions::new().left(-0.0), &tree).unwrap();
        let b = ConfigIdentity::resolve(&ObserverOptions::new(), &tree).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_selector_and_node_roots_share_identity() {
        let (tree, scroller) = tree_with_scroller();
        let by_selector = ConfigIdentity::resolve(&ObserverOptions::new().root("#scroller"), &tree).unwrap();
        let by_node = ConfigIdentity::resolve(&ObserverOptions::new().root(scroller), &tree).unwrap();

        assert_eq!(by_selector, by_node);
        assert_eq!(by_selector.root(), RootKey::Node(scroller));
    }

    #[test]
    fn test_unmatched_selector_falls_back_to_viewport() {
        let (tree, _) = tree_with_scroller();
        let identity = ConfigIdentity::resolve(&ObserverOptions::new().root("#nope"), &tree).unwrap();
        assert_eq!(identity.root(), RootKey::Viewport);
    }

    #[test]
    fn test_detached_root_node_is_rejected() {
        let (tree, scroller) = tree_with_scroller();
        tree.remove(scroller);

        let result = ConfigIdentity::resolve(&ObserverOptions::new().root(scroller), &tree);
        assert_eq!(result, Err(ObserverError::InvalidRoot(scroller)));
    }

    #[test]
    fn test_threshold_equality_is_ordered() {
        let (tree, _) = tree_with_scroller();
        let resolve = |t: Threshold| {
            ConfigIdentity::resolve(&ObserverOptions::new().threshold(t), &tree).unwrap()
        };

        assert_eq!(resolve(0.5.into()), resolve(vec![0.5].into()));
        assert_eq!(resolve(vec![0.0, 0.5].into()), resolve(vec![0.0, 0.5].into()));
        assert_ne!(resolve(vec![0.0, 0.5].into()), resolve(vec![0.5, 0.0].into()));
        assert_ne!(resolve(0.5.into()), resolve(0.25.into()));
        assert_eq!(resolve(Threshold::Multiple(Vec::new())), resolve(0.0.into()));
    }

    #[test]
    fn test_invalid_threshold_and_margin() {
        let (tree, _) = tree_with_scroller();

        let result = ConfigIdentity::resolve(&ObserverOptions::new().threshold(1.5), &tree);
        assert_eq!(result, Err(ObserverError::InvalidThreshold(1.5)));

        let result = ConfigIdentity::resolve(&ObserverOptions::new().threshold(vec![0.2, -0.1]), &tree);
        assert_eq!(result, Err(ObserverError::InvalidThreshold(-0.1)));

        let result = ConfigIdentity::resolve(&ObserverOptions::new().top(f64::NAN), &tree);
        assert!(matches!(result, Err(ObserverError::InvalidMargin(_))));
    }

    #[test]
    fn test_monitor_config_and_min_threshold() {
        let (tree, scroller) = tree_with_scroller();
        let options = ObserverOptions::new()
            .root(scroller)
            .top(20.0)
            .threshold(vec![0.75, 0.25, 1.0]);
        let identity = ConfigIdentity::resolve(&options, &tree).unwrap();

        assert_eq!(identity.min_threshold(), 0.25);
        assert_eq!(
            identity.monitor_config(),
            MonitorConfig {
                root: Some(scroller),
                root_margin: "20px 0px 0px 0px".to_string(),
                thresholds: vec![0.75, 0.25, 1.0],
            }
        );
    }
}
