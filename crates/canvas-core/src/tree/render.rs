//! Text rendering of a tree with disclosure markers and type icons.

use std::fmt::Write;

use super::expanded::ExpandedSet;
use super::node::TreeNode;

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Show every level regardless of the expanded set
    pub expand_all: bool,
    /// Append node ids, needed to address nodes from the command line
    pub show_ids: bool,
}

/// Render the visible part of the tree, one line per node.
pub fn render_tree(root: &TreeNode, expanded: &ExpandedSet, options: RenderOptions) -> String {
    let mut out = String::new();
    render_node(root, expanded, options, 0, &mut out);
    out
}

fn render_node(
    node: &TreeNode,
    expanded: &ExpandedSet,
    options: RenderOptions,
    level: usize,
    out: &mut String,
) {
    let open = options.expand_all || expanded.is_expanded(&node.id);
    let marker = match (node.has_children(), open) {
        (false, _) => " ",
        (true, true) => "▾",
        (true, false) => "▸",
    };

    let _ = write!(
        out,
        "{}{} {} {}",
        "  ".repeat(level),
        marker,
        node.node_type.icon(),
        node.name
    );
    if node.locked {
        out.push_str(" (locked)");
    }
    if options.show_ids {
        let _ = write!(out, "  #{}", node.id);
    }
    out.push('\n');

    if open {
        for child in &node.children {
            render_node(child, expanded, options, level + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeType;

    fn sample() -> TreeNode {
        let mut locked = TreeNode::new("c1", "notes", NodeType::Canvas);
        locked.locked = true;
        TreeNode::new("root", "universe", NodeType::Universe).with_children(vec![
            TreeNode::new("work", "work", NodeType::Context).with_children(vec![locked]),
            TreeNode::new("home", "home", NodeType::Workspace),
        ])
    }

    #[test]
    fn collapsed_children_are_hidden() {
        let mut expanded = ExpandedSet::new();
        expanded.expand("root");

        let text = render_tree(&sample(), &expanded, RenderOptions::default());
        assert_eq!(
            text,
            "▾ [uni] universe\n  ▸ [ctx] work\n    [ws] home\n"
        );
    }

    #[test]
    fn expand_all_shows_locked_and_ids() {
        let text = render_tree(
            &sample(),
            &ExpandedSet::new(),
            RenderOptions {
                expand_all: true,
                show_ids: true,
            },
        );
        assert!(text.contains("      [cnv] notes (locked)  #c1\n"));
        assert_eq!(text.lines().count(), 4);
    }
}
