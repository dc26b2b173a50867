//! Flat id -> node index, rebuilt from scratch on every tree replacement.

use std::collections::HashMap;

use super::node::{NodeType, TreeNode};

/// Flattened view of a single tree node.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedNode {
    pub id: String,
    pub name: String,
    pub node_type: NodeType,
    pub locked: bool,
    /// Parent id, `None` for the root
    pub parent: Option<String>,
    /// Slash-joined path of names below the root, `/` for the root itself
    pub path: String,
    pub depth: usize,
    /// Child ids in presentation order
    pub children: Vec<String>,
}

/// Lookup table over every node reachable from a root.
#[derive(Debug, Default, Clone)]
pub struct NodeIndex {
    /// All nodes by ID
    nodes: HashMap<String, IndexedNode>,
    root: Option<String>,
    /// IDs seen more than once while building
    duplicates: Vec<String>,
}

impl NodeIndex {
    /// Build the index by walking the whole tree
    pub fn build(root: &TreeNode) -> Self {
        let mut index = Self {
            root: Some(root.id.clone()),
            ..Self::default()
        };
        index.visit(root, None, 0);

        if !index.duplicates.is_empty() {
            tracing::warn!(
                duplicates = ?index.duplicates,
                "Tree contains duplicate node ids, keeping first occurrence"
            );
        }

        index
    }

    fn visit(&mut self, node: &TreeNode, parent: Option<&IndexedNode>, depth: usize) {
        if self.nodes.contains_key(&node.id) {
            self.duplicates.push(node.id.clone());
            return;
        }

        let path = match parent {
            None => "/".to_string(),
            Some(p) if p.parent.is_none() => format!("/{}", node.name),
            Some(p) => format!("{}/{}", p.path, node.name),
        };

        let entry = IndexedNode {
            id: node.id.clone(),
            name: node.name.clone(),
            node_type: node.node_type,
            locked: node.locked,
            parent: parent.map(|p| p.id.clone()),
            path,
            depth,
            children: node.children.iter().map(|c| c.id.clone()).collect(),
        };

        self.nodes.insert(node.id.clone(), entry.clone());
        for child in &node.children {
            self.visit(child, Some(&entry), depth + 1);
        }
    }

    pub fn root_id(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<&IndexedNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|k| k.as_str())
    }

    pub fn path_of(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).map(|n| n.path.as_str())
    }

    /// Path of the node's parent, `/` for top-level nodes
    pub fn parent_path_of(&self, id: &str) -> Option<&str> {
        let parent = self.nodes.get(id)?.parent.as_deref()?;
        self.path_of(parent)
    }

    /// True if `ancestor` is a strict ancestor of `id`
    pub fn is_ancestor(&self, ancestor: &str, id: &str) -> bool {
        let mut current = self.nodes.get(id).and_then(|n| n.parent.as_deref());
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes.get(parent).and_then(|n| n.parent.as_deref());
        }
        false
    }

    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn sample() -> TreeNode {
        TreeNode::new("root", "/", NodeType::Universe).with_children(vec![
            TreeNode::new("work", "work", NodeType::Context).with_children(vec![
                TreeNode::new("p1", "project", NodeType::Context)
                    .with_children(vec![TreeNode::new("c1", "notes", NodeType::Canvas)]),
            ]),
            TreeNode::new("home", "home", NodeType::Workspace),
        ])
    }

    fn collect_ids(node: &TreeNode, out: &mut Vec<String>) {
        out.push(node.id.clone());
        for child in &node.children {
            collect_ids(child, out);
        }
    }

    #[test]
    fn index_covers_exactly_the_reachable_ids() {
        let tree = sample();
        let index = NodeIndex::build(&tree);

        let mut reachable = Vec::new();
        collect_ids(&tree, &mut reachable);
        let reachable: HashSet<&str> = reachable.iter().map(|s| s.as_str()).collect();
        let indexed: HashSet<&str> = index.ids().collect();

        assert_eq!(indexed, reachable);
        assert_eq!(index.len(), tree.count());
        assert!(index.duplicates().is_empty());
    }

    #[test]
    fn paths_follow_ancestry() {
        let index = NodeIndex::build(&sample());

        assert_eq!(index.path_of("root"), Some("/"));
        assert_eq!(index.path_of("work"), Some("/work"));
        assert_eq!(index.path_of("c1"), Some("/work/project/notes"));
        assert_eq!(index.parent_path_of("c1"), Some("/work/project"));
        assert_eq!(index.parent_path_of("work"), Some("/"));
        assert_eq!(index.get("c1").unwrap().depth, 3);
        assert_eq!(index.get("root").unwrap().children, vec!["work", "home"]);
    }

    #[test]
    fn ancestry_checks() {
        let index = NodeIndex::build(&sample());

        assert!(index.is_ancestor("work", "c1"));
        assert!(index.is_ancestor("root", "home"));
        assert!(!index.is_ancestor("c1", "work"));
        assert!(!index.is_ancestor("work", "work"));
        assert!(!index.is_ancestor("home", "c1"));
    }

    #[test]
    fn duplicate_ids_are_reported_once_indexed() {
        let tree = TreeNode::new("root", "/", NodeType::Universe).with_children(vec![
            TreeNode::new("x", "first", NodeType::Context),
            TreeNode::new("x", "second", NodeType::Context),
        ]);
        let index = NodeIndex::build(&tree);

        assert_eq!(index.len(), 2);
        assert_eq!(index.get("x").unwrap().name, "first");
        assert_eq!(index.duplicates(), ["x".to_string()]);
    }
}
