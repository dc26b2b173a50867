//! Expanded-node set, keyed by id and persisted apart from the tree.

use std::collections::BTreeSet;

/// Ids whose children are shown. Not validated against the current tree,
/// so ids of deleted nodes stay until collapsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandedSet {
    ids: BTreeSet<String>,
}

impl ExpandedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the node's state; returns true if it is now expanded
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.to_string());
            true
        }
    }

    pub fn expand(&mut self, id: &str) {
        self.ids.insert(id.to_string());
    }

    pub fn collapse(&mut self, id: &str) {
        self.ids.remove(id);
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Sorted list, the persisted form
    pub fn to_vec(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }
}

impl FromIterator<String> for ExpandedSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
