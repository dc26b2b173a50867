//! Workspace tree model - nodes, flat index, expanded set, text rendering.

mod expanded;
mod index;
mod node;
pub mod render;
mod ticket;

pub use expanded::ExpandedSet;
pub use index::{IndexedNode, NodeIndex};
pub use node::{prepare_for_ui, NodeType, TreeNode};
pub use ticket::TicketSource;
