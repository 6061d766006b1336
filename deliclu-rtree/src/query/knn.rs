use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::{check_query, Keyed, Neighbor};
use crate::distance::SpatialDistance;
use crate::rstar::{Node, ObjectId, PageId, RStarTree, SpatialResult};

/// The `k` objects nearest to `query`, sorted by ascending distance.
///
/// Returns fewer than `k` results only when the tree holds fewer objects.
/// Among equally distant candidates the one encountered first is kept.
pub fn knn_search(
    tree: &RStarTree,
    distance: &dyn SpatialDistance,
    query: &[f64],
    k: usize,
) -> SpatialResult<Vec<Neighbor>> {
    check_query(query, tree.dim())?;
    if k == 0 || tree.is_empty() {
        return Ok(Vec::new());
    }

    let mut seq = 0u64;
    let mut pending: BinaryHeap<Reverse<Keyed<PageId>>> = BinaryHeap::new();
    // Max-heap: the current k-th nearest sits on top
    let mut results: BinaryHeap<Keyed<ObjectId>> = BinaryHeap::with_capacity(k + 1);
    pending.push(Reverse(Keyed {
        key: 0.0,
        seq,
        item: tree.root_page(),
    }));

    let kth = |results: &BinaryHeap<Keyed<ObjectId>>| {
        if results.len() < k {
            f64::INFINITY
        } else {
            results.peek().map_or(f64::INFINITY, |r| r.key)
        }
    };

    while let Some(Reverse(next)) = pending.pop() {
        if next.key > kth(&results) {
            break;
        }
        match tree.read_node(next.item)? {
            Node::Leaf { entries } => {
                for e in entries {
                    let d = distance.distance(query, &e.point);
                    seq += 1;
                    if results.len() < k {
                        results.push(Keyed { key: d, seq, item: e.id });
                    } else if d < kth(&results) {
                        results.pop();
                        results.push(Keyed { key: d, seq, item: e.id });
                    }
                }
            }
            Node::Directory { entries, .. } => {
                let bound = kth(&results);
                for e in entries {
                    let md = distance.min_dist(&e.bbox, query);
                    if md <= bound {
                        seq += 1;
                        pending.push(Reverse(Keyed {
                            key: md,
                            seq,
                            item: e.page_id,
                        }));
                    }
                }
            }
        }
    }

    Ok(results
        .into_sorted_vec()
        .into_iter()
        .map(|r| Neighbor::new(r.item, r.key))
        .collect())
}
