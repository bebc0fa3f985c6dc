//! Caller-side record of what each element was observed with
//!
//! Keyed by generation-checked [`NodeId`]s, so the table never keeps an
//! element alive and never hands back a record for a reclaimed one: once a
//! node leaves the document its record stops resolving and [`prune`] drops it.
//!
//! [`prune`]: RegistrationTable::prune

use blinc_observer::{ConfigIdentity, Document, NodeId, ObserverOptions};
use slotmap::SecondaryMap;

/// Options an element was observed with, plus the identity they resolved to
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub options: ObserverOptions,
    pub identity: ConfigIdentity,
}

#[derive(Debug, Default)]
pub struct RegistrationTable {
    entries: SecondaryMap<NodeId, Registration>,
}

impl RegistrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `registration` for `element`, returning the one it replaces
    pub fn insert(&mut self, element: NodeId, registration: Registration) -> Option<Registration> {
        self.entries.insert(element, registration)
    }

    /// Record for `element`, if it is still attached to `document`
    pub fn get(&self, element: NodeId, document: &dyn Document) -> Option<&Registration> {
        if !document.contains(element) {
            return None;
        }
        self.entries.get(element)
    }

    pub fn remove(&mut self, element: NodeId) -> Option<Registration> {
        self.entries.remove(element)
    }

    pub fn contains(&self, element: NodeId) -> bool {
        self.entries.contains_key(element)
    }

    /// Drop records of elements no longer attached; returns how many
    pub fn prune(&mut self, document: &dyn Document) -> usize {
        let before = self.entries.len();
        self.entries.retain(|element, _| document.contains(element));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blinc_observer::{ElementSpec, NodeTree};

    fn registration(tree: &NodeTree, options: ObserverOptions) -> Registration {
        Registration {
            identity: ConfigIdentity::resolve(&options, tree).unwrap(),
            options,
        }
    }

    #[test]
    fn test_insert_get_remove() {
        let tree = NodeTree::new();
        let el = tree.append(tree.root(), ElementSpec::new("div")).unwrap();
        let mut table = RegistrationTable::new();

        let first = registration(&tree, ObserverOptions::new().threshold(0.5));
        assert!(table.insert(el, first.clone()).is_none());
        assert_eq!(table.get(el, &tree), Some(&first));

        let second = registration(&tree, ObserverOptions::new().top(5.0));
        assert_eq!(table.insert(el, second.clone()), Some(first));
        assert_eq!(table.remove(el), Some(second));
        assert!(table.is_empty());
    }

    #[test]
    fn test_records_of_removed_elements_do_not_resolve() {
        let tree = NodeTree::new();
        let kept = tree.append(tree.root(), ElementSpec::new("div")).unwrap();
        let gone = tree.append(tree.root(), ElementSpec::new("div")).unwrap();
        let mut table = RegistrationTable::new();
        table.insert(kept, registration(&tree, ObserverOptions::default()));
        table.insert(gone, registration(&tree, ObserverOptions::default()));

        tree.remove(gone);
        assert!(table.get(gone, &tree).is_none());
        assert!(table.get(kept, &tree).is_some());

        assert_eq!(table.prune(&tree), 1);
        assert_eq!(table.len(), 1);
        assert!(!table.contains(gone));
    }

    #[test]
    fn test_reused_slot_does_not_inherit_record() {
        let tree = NodeTree::new();
        let old = tree.append(tree.root(), ElementSpec::new("div")).unwrap();
        let mut table = RegistrationTable::new();
        table.insert(old, registration(&tree, ObserverOptions::default()));

        tree.remove(old);
        let new = tree.append(tree.root(), ElementSpec::new("div")).unwrap();
        assert!(table.get(new, &tree).is_none());
        assert!(!table.contains(new));
    }
}
