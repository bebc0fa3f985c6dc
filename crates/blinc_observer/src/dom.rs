//! Node handles and document lookup
//!
//! The registry never owns elements. It refers to them through [`NodeId`],
//! a generation-checked slotmap key: once a node is removed its handle stops
//! resolving, and a later node that reuses the slot gets a different key.
//! That lets bookkeeping keyed by `NodeId` detect reclaimed elements without
//! keeping them alive.
//!
//! [`Document`] is the only thing the registry needs from the host: selector
//! lookup for `root` resolution and a liveness check. [`NodeTree`] is a small
//! in-memory implementation for hosts without a real element tree.

use std::sync::RwLock;

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

new_key_type! {
    /// Generation-checked handle to an element
    pub struct NodeId;
}

/// Host element tree as seen by the observer registry
pub trait Document: Send + Sync {
    /// First element in document order matching `selector`
    fn query_selector(&self, selector: &str) -> Option<NodeId>;

    /// Whether `node` is currently attached
    fn contains(&self, node: NodeId) -> bool;
}

/// Description of an element to insert into a [`NodeTree`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSpec {
    tag: String,
    id: Option<String>,
    classes: SmallVec<[String; 2]>,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }
}

#[derive(Debug)]
struct NodeData {
    spec: ElementSpec,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
struct TreeInner {
    nodes: SlotMap<NodeId, NodeData>,
    root: NodeId,
}

impl TreeInner {
    /// Pre-order walk from the root, stopping at the first node `f` accepts
    fn find(&self, mut f: impl FnMut(&NodeData) -> bool) -> Option<NodeId> {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if f(node) {
                return Some(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }
}

/// In-memory element tree implementing [`Document`]
///
/// Interior mutability follows the element registry pattern: the tree is
/// shared behind an `Arc` between the host (which mutates it) and the
/// observer registry (which only reads).
#[derive(Debug)]
pub struct NodeTree {
    inner: RwLock<TreeInner>,
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTree {
    /// Create a tree holding a single `html` root element
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(NodeData {
            spec: ElementSpec::new("html"),
            parent: None,
            children: Vec::new(),
        });
        Self {
            inner: RwLock::new(TreeInner { nodes, root }),
        }
    }

    /// The document element
    pub fn root(&self) -> NodeId {
        self.inner
            .read()
            .map(|inner| inner.root)
            .unwrap_or_default()
    }

    /// Append a new element as the last child of `parent`
    ///
    /// Returns `None` if `parent` is not attached.
    pub fn append(&self, parent: NodeId, spec: ElementSpec) -> Option<NodeId> {
        let mut inner = self.inner.write().ok()?;
        if !inner.nodes.contains_key(parent) {
            return None;
        }
        let id = inner.nodes.insert(NodeData {
            spec,
            parent: Some(parent),
            children: Vec::new(),
        });
        inner.nodes[parent].children.push(id);
        Some(id)
    }

    /// Remove `node` and its whole subtree
    ///
    /// The document element cannot be removed. Returns whether anything was
    /// removed.
    pub fn remove(&self, node: NodeId) -> bool {
        let Ok(mut inner) = self.inner.write() else {
            return false;
        };
        if node == inner.root {
            return false;
        }
        let Some(parent) = inner.nodes.get(node).and_then(|n| n.parent) else {
            return false;
        };
        if let Some(parent) = inner.nodes.get_mut(parent) {
            parent.children.retain(|child| *child != node);
        }

        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(data) = inner.nodes.remove(id) {
                stack.extend(data.children);
            }
        }
        true
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.read().ok()?.nodes.get(node)?.parent
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.nodes.get(node).map(|n| n.children.clone()))
            .unwrap_or_default()
    }

    /// Set (or replace) the `id` attribute of `node`
    pub fn set_id(&self, node: NodeId, id: impl Into<String>) -> bool {
        let Ok(mut inner) = self.inner.write() else {
            return false;
        };
        match inner.nodes.get_mut(node) {
            Some(data) => {
                data.spec.id = Some(id.into());
                true
            }
            None => false,
        }
    }

    /// Number of attached elements, the document element included
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.nodes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Document for NodeTree {
    fn query_selector(&self, selector: &str) -> Option<NodeId> {
        let selector = SimpleSelector::parse(selector)?;
        let inner = self.inner.read().ok()?;
        inner.find(|node| selector.matches(&node.spec))
    }

    fn contains(&self, node: NodeId) -> bool {
        self.inner
            .read()
            .is_ok_and(|inner| inner.nodes.contains_key(node))
    }
}

/// Compound selector: optional tag, optional `#id`, any number of `.class`
///
/// Combinators and attribute selectors are not supported; such selectors
/// parse to `None` and match nothing.
#[derive(Debug, Default, PartialEq)]
struct SimpleSelector<'a> {
    tag: Option<&'a str>,
    id: Option<&'a str>,
    classes: SmallVec<[&'a str; 2]>,
}

impl<'a> SimpleSelector<'a> {
    fn parse(selector: &'a str) -> Option<Self> {
        let selector = selector.trim();
        if selector.is_empty() {
            return None;
        }

        let mut parsed = SimpleSelector::default();
        let tag_end = selector.find(['#', '.']).unwrap_or(selector.len());
        let tag = &selector[..tag_end];
        if !tag.is_empty() && tag != "*" {
            if !is_ident(tag) {
                return None;
            }
            parsed.tag = Some(tag);
        }

        let mut rest = &selector[tag_end..];
        while !rest.is_empty() {
            let (sigil, body) = rest.split_at(1);
            let end = body.find(['#', '.']).unwrap_or(body.len());
            let name = &body[..end];
            if !is_ident(name) {
                return None;
            }
            match sigil {
                "#" => parsed.id = Some(name),
                "." => parsed.classes.push(name),
                _ => return None,
            }
            rest = &body[end..];
        }
        Some(parsed)
    }

    fn matches(&self, spec: &ElementSpec) -> bool {
        if let Some(tag) = self.tag {
            if !spec.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = self.id {
            if spec.id.as_deref() != Some(id) {
                return false;
            }
        }
        self.classes
            .iter()
            .all(|class| spec.classes.iter().any(|c| c == class))
    }
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (NodeTree, NodeId, NodeId, NodeId) {
        let tree = NodeTree::new();
        let body = tree.append(tree.root(), ElementSpec::new("body")).unwrap();
        let scroller = tree
            .append(body, ElementSpec::new("div").id("scroller").class("list"))
            .unwrap();
        let item = tree
            .append(scroller, ElementSpec::new("li").class("item").class("lazy"))
            .unwrap();
        (tree, body, scroller, item)
    }

    #[test]
    fn test_query_by_id_class_and_tag() {
        let (tree, body, scroller, item) = sample();

        assert_eq!(tree.query_selector("#scroller"), Some(scroller));
        assert_eq!(tree.query_selector(".list"), Some(scroller));
        assert_eq!(tree.query_selector("div#scroller.list"), Some(scroller));
        assert_eq!(tree.query_selector("li.item.lazy"), Some(item));
        assert_eq!(tree.query_selector("BODY"), Some(body));
        assert_eq!(tree.query_selector("#missing"), None);
        assert_eq!(tree.query_selector("li.item.other"), None);
    }

    #[test]
    fn test_query_returns_first_in_document_order() {
        let tree = NodeTree::new();
        let first = tree
            .append(tree.root(), ElementSpec::new("div").class("pane"))
            .unwrap();
        let nested = tree
            .append(first, ElementSpec::new("div").class("pane"))
            .unwrap();
        let second = tree
            .append(tree.root(), ElementSpec::new("div").class("pane"))
            .unwrap();

        assert_eq!(tree.query_selector(".pane"), Some(first));
        tree.remove(first);
        assert!(!tree.contains(nested));
        assert_eq!(tree.query_selector(".pane"), Some(second));
    }

    #[test]
    fn test_unsupported_selectors_match_nothing() {
        let (tree, ..) = sample();

        assert_eq!(tree.query_selector(""), None);
        assert_eq!(tree.query_selector("div > li"), None);
        assert_eq!(tree.query_selector("[data-x]"), None);
        assert_eq!(tree.query_selector("#"), None);
    }

    #[test]
    fn test_remove_invalidates_subtree_handles() {
        let (tree, body, scroller, item) = sample();
        let before = tree.len();

        assert!(tree.remove(scroller));
        assert!(!tree.contains(scroller));
        assert!(!tree.contains(item));
        assert!(tree.contains(body));
        assert_eq!(tree.len(), before - 2);
        assert!(tree.children(body).is_empty());

        // Removing twice is a no-op
        assert!(!tree.remove(scroller));
    }

    #[test]
    fn test_stale_handle_never_aliases_new_node() {
        let (tree, body, scroller, _) = sample();
        tree.remove(scroller);

        let replacement = tree.append(body, ElementSpec::new("div")).unwrap();
        assert_ne!(replacement, scroller);
        assert!(!tree.contains(scroller));
        assert!(tree.contains(replacement));
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let tree = NodeTree::new();
        assert!(!tree.remove(tree.root()));
        assert!(tree.contains(tree.root()));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_set_id_and_navigation() {
        let (tree, body, scroller, item) = sample();

        assert!(tree.set_id(item, "hero"));
        assert_eq!(tree.query_selector("#hero"), Some(item));
        assert_eq!(tree.parent(item), Some(scroller));
        assert_eq!(tree.children(body), vec![scroller]);
        assert_eq!(tree.append(NodeId::default(), ElementSpec::new("p")), None);
    }
}
