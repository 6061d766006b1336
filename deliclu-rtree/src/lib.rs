//! # DeLiClu R*-Tree
//!
//! A disk-pageable R*-tree over fixed-dimensional points that tracks, for
//! every subtree, whether it still holds objects not yet processed by a
//! DeLiClu-style nearest neighbor ordering.
//!
//! ## Features
//!
//! - **Page Store**: nodes live in pages of an in-memory arena or a
//!   checksummed file with an LRU cache, loaded on demand
//! - **R\* Insertion**: overlap-aware subtree choice and topological splits
//! - **Bulk Loading**: Sort-Tile-Recursive or Hilbert packing
//! - **Handled Propagation**: marking an object refreshes the summaries of
//!   all its ancestors so searches can skip fully handled subtrees
//! - **Searches**: exact kNN, range, and lazy best-first ordering
//! - **Thread Safe**: the index facade serializes mutations and shares reads
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use deliclu_rtree::{DeLiCluTreeIndex, RTreeSettings, VectorRelation};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let relation = VectorRelation::from_vectors(vec![
//!     vec![0.0, 0.0],
//!     vec![1.0, 1.0],
//!     vec![5.0, 5.0],
//! ])?;
//! let index = DeLiCluTreeIndex::in_memory(Arc::new(relation), RTreeSettings::default())?;
//! index.initialize()?;
//!
//! index.set_handled(0)?;
//! let mut unhandled = index.priority_search(&[0.0, 0.0], true)?;
//! assert_eq!(unhandled.next().transpose()?.map(|n| n.id), Some(1));
//! # Ok(())
//! # }
//! ```

// Geometry and distances
pub mod bounding_box;
pub mod distance;
pub mod hilbert;

// Storage and tree core
pub mod page;
pub mod rstar;
pub mod settings;

// Searches and the facade
pub mod index;
pub mod query;
pub mod relation;

pub use bounding_box::{BoundingBox, SpatialComparable};
pub use distance::{CosineDistance, Distance, LpNormDistance, MaximumDistance, SpatialDistance};
pub use index::{DeLiCluTreeIndex, KnnSearcher, PrioritySearch, PrioritySearcher, RangeSearcher};
pub use page::{MemoryPageFile, PageFile, PageFileStats, PersistentPageFile};
pub use query::{knn_search, range_search, Neighbor, PriorityIter};
pub use relation::{Relation, VectorRelation};
pub use rstar::{
    HandledState, IndexTreePath, IntegrityReport, ObjectId, PageId, RStarTree, SpatialError,
    SpatialResult,
};
pub use settings::{BulkSplit, OverlapPolicy, RTreeSettings};

#[cfg(test)]
#[ctor::ctor]
fn init() {
    colog::init();
}
