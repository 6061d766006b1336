use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::ops::Deref;

use super::{check_query, Keyed, Neighbor};
use crate::distance::SpatialDistance;
use crate::rstar::{Node, ObjectId, PageId, RStarTree, SpatialResult};

#[derive(Debug)]
enum Pending {
    Page(PageId),
    Object(ObjectId),
}

/// Lazy best-first search yielding objects in non-decreasing distance order.
///
/// Only as much of the tree is expanded as the consumer pulls. The iterator
/// keeps `tree` borrowed for its whole lifetime; when `tree` is a lock guard,
/// drop the iterator before mutating the tree from the same thread.
///
/// With `unhandled_only`, handled objects are skipped and so is every
/// subtree whose entry reports no unhandled objects.
pub struct PriorityIter<'a, T: Deref<Target = RStarTree>> {
    tree: T,
    distance: &'a dyn SpatialDistance,
    query: Vec<f64>,
    heap: BinaryHeap<Reverse<Keyed<Pending>>>,
    seq: u64,
    unhandled_only: bool,
    max_radius: f64,
}

impl<'a, T: Deref<Target = RStarTree>> PriorityIter<'a, T> {
    /// Starts a search around `query`.
    ///
    /// Objects farther than `max_radius` are never produced; pass
    /// `f64::INFINITY` for an unbounded search.
    pub fn new(
        tree: T,
        distance: &'a dyn SpatialDistance,
        query: Vec<f64>,
        unhandled_only: bool,
        max_radius: f64,
    ) -> SpatialResult<Self> {
        check_query(&query, tree.dim())?;
        let mut heap = BinaryHeap::new();
        if !tree.is_empty() {
            heap.push(Reverse(Keyed {
                key: 0.0,
                seq: 0,
                item: Pending::Page(tree.root_page()),
            }));
        }
        Ok(Self {
            tree,
            distance,
            query,
            heap,
            seq: 0,
            unhandled_only,
            max_radius,
        })
    }

    /// Lower bound on the distance of every object not returned yet, `None`
    /// once the search is exhausted.
    pub fn lower_bound(&self) -> Option<f64> {
        self.heap
            .peek()
            .map(|Reverse(next)| next.key)
            .filter(|key| *key <= self.max_radius)
    }

    fn push(&mut self, key: f64, item: Pending) {
        if key <= self.max_radius {
            self.seq += 1;
            self.heap.push(Reverse(Keyed {
                key,
                seq: self.seq,
                item,
            }));
        }
    }

    fn expand(&mut self, page_id: PageId) -> SpatialResult<()> {
        match self.tree.read_node(page_id)? {
            Node::Leaf { entries } => {
                for e in entries {
                    if self.unhandled_only && e.is_handled() {
                        continue;
                    }
                    let d = self.distance.distance(&self.query, &e.point);
                    self.push(d, Pending::Object(e.id));
                }
            }
            Node::Directory { entries, .. } => {
                for e in entries {
                    if self.unhandled_only && !e.state.has_unhandled {
                        continue;
                    }
                    let md = self.distance.min_dist(&e.bbox, &self.query);
                    self.push(md, Pending::Page(e.page_id));
                }
            }
        }
        Ok(())
    }
}

impl<T: Deref<Target = RStarTree>> Iterator for PriorityIter<'_, T> {
    type Item = SpatialResult<Neighbor>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Reverse(next) = self.heap.pop()?;
            if next.key > self.max_radius {
                self.heap.clear();
                return None;
            }
            match next.item {
                Pending::Object(id) => return Some(Ok(Neighbor::new(id, next.key))),
                Pending::Page(page_id) => {
                    if let Err(e) = self.expand(page_id) {
                        self.heap.clear();
                        return Some(Err(e));
                    }
                }
            }
        }
    }
}
