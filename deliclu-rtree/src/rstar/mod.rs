//! R*-tree with handled/unhandled propagation.
//!
//! The tree stores points in leaf nodes and bounding boxes in directory
//! nodes, each node in one page of a [`PageFile`](crate::page::PageFile):
//! - Insertion chooses subtrees by least enlargement (least overlap
//!   enlargement above the leaves) and splits with the R* topological split
//! - Deletion dissolves underfull nodes and reinserts their entries
//! - Bulk loading packs sorted entries bottom-up
//! - Every directory entry summarizes whether its subtree holds handled
//!   and unhandled objects

mod bulk;
mod deliclu;
mod split;
mod tree_impl;
pub mod tree_types;

pub use split::topological_split;
pub use tree_impl::RStarTree;
pub use tree_types::{
    DirectoryEntry, Entry, HandledState, IndexTreePath, IntegrityReport, LeafEntry, Node,
    ObjectId, PageId, PathStep, SpatialError, SpatialResult, TreeEntry, TreeHeader, NO_PAGE,
};
