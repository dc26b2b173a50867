//! Tree node model - a single entry of a workspace tree.

use serde::{Deserialize, Serialize};

/// A node of the workspace tree as served by the Canvas server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Stable identifier, unique within the tree
    pub id: String,

    /// Entry kind, drives the icon and available actions
    #[serde(rename = "type", default)]
    pub node_type: NodeType,

    /// Display label, also the path segment
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Display hint, locked nodes are dimmed
    #[serde(default)]
    pub locked: bool,

    /// Ordered children (insertion order)
    #[serde(default)]
    pub children: Vec<TreeNode>,

    /// Copy of `id` stamped when the tree is prepared for display
    #[serde(
        rename = "_originalId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub original_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    #[default]
    Context,
    Canvas,
    Workspace,
    Universe,
    #[serde(other)]
    Unknown,
}

impl NodeType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Canvas => "canvas",
            Self::Workspace => "workspace",
            Self::Universe => "universe",
            Self::Unknown => "unknown",
        }
    }

    /// Short icon tag used by the text renderer
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Context => "[ctx]",
            Self::Canvas => "[cnv]",
            Self::Workspace => "[ws]",
            Self::Universe => "[uni]",
            Self::Unknown => "[?]",
        }
    }
}

impl TreeNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            name: name.into(),
            label: None,
            description: None,
            color: None,
            locked: false,
            children: Vec::new(),
            original_id: None,
        }
    }

    pub fn with_children(mut self, children: Vec<TreeNode>) -> Self {
        self.children = children;
        self
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Depth-first search by id
    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Total number of nodes in this subtree
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::count).sum::<usize>()
    }
}

/// Deep copy of `tree` with every node annotated with `_originalId`.
pub fn prepare_for_ui(tree: &TreeNode) -> TreeNode {
    let mut prepared = tree.clone();
    stamp_original_ids(&mut prepared);
    prepared
}

fn stamp_original_ids(node: &mut TreeNode) {
    node.original_id = Some(node.id.clone());
    for child in &mut node.children {
        stamp_original_ids(child);
    }
}
