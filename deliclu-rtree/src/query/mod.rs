//! Search engines over an [`RStarTree`](crate::rstar::RStarTree).
//!
//! All three prune with [`SpatialDistance::min_dist`](crate::distance::SpatialDistance::min_dist),
//! the lower bound from the query to anything inside a directory entry's box:
//! - [`knn_search`]: exact k nearest neighbors, best-first
//! - [`range_search`]: everything within a radius
//! - [`PriorityIter`]: lazy best-first ordering, optionally restricted to
//!   unhandled objects

use std::cmp::Ordering;

use crate::rstar::{ObjectId, SpatialError, SpatialResult};

mod knn;
mod priority;
mod range;

pub use knn::knn_search;
pub use priority::PriorityIter;
pub use range::range_search;

/// A search result: an object and its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: ObjectId,
    pub distance: f64,
}

impl Neighbor {
    pub fn new(id: ObjectId, distance: f64) -> Self {
        Self { id, distance }
    }
}

/// Heap element ordered by key, then by insertion sequence.
#[derive(Debug)]
pub(crate) struct Keyed<T> {
    pub key: f64,
    pub seq: u64,
    pub item: T,
}

impl<T> PartialEq for Keyed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Keyed<T> {}

impl<T> PartialOrd for Keyed<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Keyed<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .total_cmp(&other.key)
            .then(self.seq.cmp(&other.seq))
    }
}

pub(crate) fn check_query(query: &[f64], dim: usize) -> SpatialResult<()> {
    if query.len() != dim {
        return Err(SpatialError::DimensionMismatch {
            expected: dim,
            actual: query.len(),
        });
    }
    Ok(())
}
