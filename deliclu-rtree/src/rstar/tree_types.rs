//! Core types of the R*-tree.
//!
//! This module defines:
//! - Error types and result types
//! - Entries (leaf and directory) with their handled/unhandled state
//! - Nodes as they are stored in pages
//! - The tree header and root-to-entry paths

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

use crate::bounding_box::{union_all, BoundingBox, SpatialComparable};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in spatial index operations
#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Page {0} does not exist")]
    PageNotFound(PageId),

    #[error("Corrupted page file: {0}")]
    Corrupted(String),

    #[error("Object {0} not found in the index")]
    ObjectNotFound(ObjectId),

    #[error("Dimensionality mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Tree integrity violated: {0}")]
    Integrity(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Page file is closed")]
    Closed,
}

/// Result type for spatial index operations
pub type SpatialResult<T> = Result<T, SpatialError>;

/// Identifier of an indexed object.
pub type ObjectId = u64;

/// Page ID - unique identifier for a node/page in a page file
pub type PageId = u64;

/// Page id 0 is never handed out; it marks "no page" (and holds the file
/// header in persistent page files).
pub const NO_PAGE: PageId = 0;

// ============================================================================
// Handled / Unhandled State
// ============================================================================

/// The two DeLiClu bookkeeping bits of an entry.
///
/// For a leaf entry exactly one of the bits is set. For a directory entry
/// each bit is the OR of the same bit over all entries of the child node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandledState {
    pub has_handled: bool,
    pub has_unhandled: bool,
}

impl HandledState {
    /// State of a freshly inserted object.
    pub const UNHANDLED: HandledState = HandledState {
        has_handled: false,
        has_unhandled: true,
    };

    /// State of an object consumed by the ordering traversal.
    pub const HANDLED: HandledState = HandledState {
        has_handled: true,
        has_unhandled: false,
    };

    /// Aggregate of an empty set of entries.
    pub const NONE: HandledState = HandledState {
        has_handled: false,
        has_unhandled: false,
    };

    pub fn merge(self, other: HandledState) -> HandledState {
        HandledState {
            has_handled: self.has_handled || other.has_handled,
            has_unhandled: self.has_unhandled || other.has_unhandled,
        }
    }
}

impl Default for HandledState {
    fn default() -> Self {
        HandledState::UNHANDLED
    }
}

// ============================================================================
// Entries
// ============================================================================

/// Capability shared by both entry kinds, used by split and packing code.
pub trait TreeEntry: SpatialComparable + Clone {
    fn state(&self) -> HandledState;
}

/// An entry in a leaf node: one indexed point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafEntry {
    pub id: ObjectId,
    pub point: Vec<f64>,
    pub state: HandledState,
}

impl LeafEntry {
    /// A new, unhandled entry.
    pub fn new(id: ObjectId, point: Vec<f64>) -> Self {
        Self {
            id,
            point,
            state: HandledState::UNHANDLED,
        }
    }

    pub fn is_handled(&self) -> bool {
        self.state.has_handled
    }
}

impl SpatialComparable for LeafEntry {
    fn dim(&self) -> usize {
        self.point.len()
    }

    fn min(&self, d: usize) -> f64 {
        self.point[d]
    }

    fn max(&self, d: usize) -> f64 {
        self.point[d]
    }
}

impl TreeEntry for LeafEntry {
    fn state(&self) -> HandledState {
        self.state
    }
}

/// An entry in a directory node: a child page and the summary of its subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub page_id: PageId,
    pub bbox: BoundingBox,
    pub state: HandledState,
}

impl DirectoryEntry {
    /// The entry that exactly summarizes `node` stored at `page_id`.
    pub fn for_node(page_id: PageId, node: &Node) -> Self {
        Self {
            page_id,
            bbox: node.compute_bbox(),
            state: node.compute_state(),
        }
    }
}

impl SpatialComparable for DirectoryEntry {
    fn dim(&self) -> usize {
        self.bbox.dim()
    }

    fn min(&self, d: usize) -> f64 {
        self.bbox.min(d)
    }

    fn max(&self, d: usize) -> f64 {
        self.bbox.max(d)
    }
}

impl TreeEntry for DirectoryEntry {
    fn state(&self) -> HandledState {
        self.state
    }
}

/// Either kind of entry, used where both can travel the same code path
/// (insertion at a level, reinsertion after underflow).
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Leaf(LeafEntry),
    Directory(DirectoryEntry),
}

impl Entry {
    pub fn bbox(&self) -> BoundingBox {
        match self {
            Entry::Leaf(e) => BoundingBox::from_point(&e.point),
            Entry::Directory(e) => e.bbox.clone(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Entry::Leaf(_))
    }
}

// ============================================================================
// Node Types
// ============================================================================

/// Node types of the tree, as stored in one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Leaf node containing the indexed points
    Leaf { entries: Vec<LeafEntry> },
    /// Directory node containing child references
    Directory {
        entries: Vec<DirectoryEntry>,
        level: u32, // Height above the leaves (leaves are 0)
    },
}

impl Node {
    pub fn new_leaf(entries: Vec<LeafEntry>) -> Self {
        Node::Leaf { entries }
    }

    pub fn new_directory(entries: Vec<DirectoryEntry>, level: u32) -> Self {
        debug_assert!(level > 0, "directory nodes live above the leaves");
        Node::Directory { entries, level }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub fn level(&self) -> u32 {
        match self {
            Node::Leaf { .. } => 0,
            Node::Directory { level, .. } => *level,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Node::Leaf { entries } => entries.len(),
            Node::Directory { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimensionality of the entries, `None` for an empty node.
    pub fn dim(&self) -> Option<usize> {
        match self {
            Node::Leaf { entries } => entries.first().map(|e| e.dim()),
            Node::Directory { entries, .. } => entries.first().map(|e| e.dim()),
        }
    }

    /// The box enclosing all entries of this node.
    pub fn compute_bbox(&self) -> BoundingBox {
        let dim = self.dim().unwrap_or(0);
        match self {
            Node::Leaf { entries } => union_all(dim, entries),
            Node::Directory { entries, .. } => union_all(dim, entries),
        }
    }

    /// OR of the handled/unhandled bits over all entries of this node.
    pub fn compute_state(&self) -> HandledState {
        match self {
            Node::Leaf { entries } => entries
                .iter()
                .fold(HandledState::NONE, |acc, e| acc.merge(e.state)),
            Node::Directory { entries, .. } => entries
                .iter()
                .fold(HandledState::NONE, |acc, e| acc.merge(e.state)),
        }
    }

    /// Appends an entry of the matching kind.
    pub fn push(&mut self, entry: Entry) -> SpatialResult<()> {
        match (self, entry) {
            (Node::Leaf { entries }, Entry::Leaf(e)) => entries.push(e),
            (Node::Directory { entries, .. }, Entry::Directory(e)) => entries.push(e),
            (node, entry) => {
                return Err(SpatialError::InvalidOperation(format!(
                    "cannot store a {} entry in a level {} node",
                    if entry.is_leaf() { "leaf" } else { "directory" },
                    node.level()
                )))
            }
        }
        Ok(())
    }

    /// Removes and returns the entry at `index`.
    pub fn remove(&mut self, index: usize) -> Entry {
        match self {
            Node::Leaf { entries } => Entry::Leaf(entries.remove(index)),
            Node::Directory { entries, .. } => Entry::Directory(entries.remove(index)),
        }
    }

    /// Consumes the node, yielding its entries.
    pub fn into_entries(self) -> Vec<Entry> {
        match self {
            Node::Leaf { entries } => entries.into_iter().map(Entry::Leaf).collect(),
            Node::Directory { entries, .. } => entries.into_iter().map(Entry::Directory).collect(),
        }
    }

    /// The directory entry at `index`, if this is a directory node.
    pub fn directory_entry(&self, index: usize) -> Option<&DirectoryEntry> {
        match self {
            Node::Directory { entries, .. } => entries.get(index),
            Node::Leaf { .. } => None,
        }
    }

    pub fn directory_entry_mut(&mut self, index: usize) -> Option<&mut DirectoryEntry> {
        match self {
            Node::Directory { entries, .. } => entries.get_mut(index),
            Node::Leaf { .. } => None,
        }
    }

    pub fn leaf_entry_mut(&mut self, index: usize) -> Option<&mut LeafEntry> {
        match self {
            Node::Leaf { entries } => entries.get_mut(index),
            Node::Directory { .. } => None,
        }
    }
}

// ============================================================================
// Tree Header
// ============================================================================

/// The logical shape of a tree: what a page file must remember besides nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeHeader {
    pub root_page: PageId,
    /// Number of node levels, 0 for an empty tree and 1 for a single leaf.
    pub height: u32,
    /// Number of indexed objects.
    pub size: u64,
    pub dim: u32,
}

impl TreeHeader {
    pub fn empty(dim: usize) -> Self {
        Self {
            root_page: NO_PAGE,
            height: 0,
            size: 0,
            dim: dim as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root_page == NO_PAGE
    }
}

// ============================================================================
// Index Tree Path
// ============================================================================

/// One step of an [`IndexTreePath`]: an entry slot within a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStep {
    pub page_id: PageId,
    pub index: usize,
}

/// The entry slots from the root down to one target entry.
///
/// The first step addresses an entry of the root node; the last one
/// addresses the target entry itself. Paths are rebuilt per operation and
/// become stale with the next mutation of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTreePath {
    steps: Vec<PathStep>,
}

impl IndexTreePath {
    pub fn new(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step addressing the target entry.
    pub fn target(&self) -> Option<&PathStep> {
        self.steps.last()
    }

    /// The path to the directory entry referencing the target's node.
    pub fn parent_path(&self) -> Option<IndexTreePath> {
        if self.steps.len() < 2 {
            return None;
        }
        Some(IndexTreePath {
            steps: self.steps[..self.steps.len() - 1].to_vec(),
        })
    }
}

// ============================================================================
// Integrity Report
// ============================================================================

/// Result of a full structural verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Total pages visited
    pub pages_checked: u64,
    pub leaf_nodes: u64,
    pub directory_nodes: u64,
    /// Leaf entries found, equal to the tree size
    pub entries: u64,
    pub height: u32,
}
