//! R*-tree topological split.
//!
//! The overflowing entry list is sorted along every axis, once by lower and
//! once by upper bound. For every sort all distributions that keep at least
//! `min_entries` entries on both sides are evaluated. The axis with the least
//! summed margin wins; on that axis the distribution with the least overlap
//! (then least total volume) is taken.

use std::cmp::Ordering;

use super::tree_types::TreeEntry;
use crate::bounding_box::BoundingBox;

/// A candidate ordering of the entries of one axis.
struct AxisSort {
    order: Vec<usize>,
    /// `prefix[i]` bounds `order[..=i]`
    prefix: Vec<BoundingBox>,
    /// `suffix[i]` bounds `order[i..]`
    suffix: Vec<BoundingBox>,
}

impl AxisSort {
    fn new<E: TreeEntry>(entries: &[E], axis: usize, by_upper: bool) -> Self {
        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by(|&a, &b| {
            let (ea, eb) = (&entries[a], &entries[b]);
            let (first, second) = if by_upper {
                (ea.max(axis).total_cmp(&eb.max(axis)), ea.min(axis).total_cmp(&eb.min(axis)))
            } else {
                (ea.min(axis).total_cmp(&eb.min(axis)), ea.max(axis).total_cmp(&eb.max(axis)))
            };
            first.then(second)
        });

        let dim = entries[0].dim();
        let mut prefix = Vec::with_capacity(order.len());
        let mut acc = BoundingBox::empty(dim);
        for &i in &order {
            acc.extend(&entries[i]);
            prefix.push(acc.clone());
        }
        let mut suffix = vec![BoundingBox::empty(dim); order.len()];
        let mut acc = BoundingBox::empty(dim);
        for (pos, &i) in order.iter().enumerate().rev() {
            acc.extend(&entries[i]);
            suffix[pos] = acc.clone();
        }

        Self { order, prefix, suffix }
    }

    /// Boxes of the groups `order[..k]` and `order[k..]`.
    fn groups(&self, k: usize) -> (&BoundingBox, &BoundingBox) {
        (&self.prefix[k - 1], &self.suffix[k])
    }
}

/// Splits `entries` into two groups of at least `min_entries` entries each.
///
/// # Panics
///
/// Panics if there are fewer than two entries.
pub fn topological_split<E: TreeEntry>(entries: Vec<E>, min_entries: usize) -> (Vec<E>, Vec<E>) {
    let n = entries.len();
    assert!(n >= 2, "cannot split fewer than two entries");
    let m = min_entries.clamp(1, n / 2);
    let dim = entries[0].dim();

    // Choose the split axis
    let mut best_axis: Option<(f64, [AxisSort; 2])> = None;
    for axis in 0..dim {
        let sorts = [
            AxisSort::new(&entries, axis, false),
            AxisSort::new(&entries, axis, true),
        ];
        let margin: f64 = sorts
            .iter()
            .flat_map(|s| {
                (m..=n - m).map(move |k| {
                    let (a, b) = s.groups(k);
                    a.margin() + b.margin()
                })
            })
            .sum();
        if best_axis.as_ref().map_or(true, |(best, _)| margin < *best) {
            best_axis = Some((margin, sorts));
        }
    }
    let sorts = match best_axis {
        Some((_, sorts)) => sorts,
        None => {
            // Zero-dimensional entries: any even cut will do
            let mut first = entries;
            let second = first.split_off(n / 2);
            return (first, second);
        }
    };

    // Choose the distribution on that axis
    let mut best: Option<(f64, f64, usize, usize)> = None;
    for (s, sort) in sorts.iter().enumerate() {
        for k in m..=n - m {
            let (a, b) = sort.groups(k);
            let overlap = a.overlap(b);
            let volume = a.volume() + b.volume();
            let better = match best {
                None => true,
                Some((bo, bv, _, _)) => match overlap.total_cmp(&bo) {
                    Ordering::Less => true,
                    Ordering::Equal => volume < bv,
                    Ordering::Greater => false,
                },
            };
            if better {
                best = Some((overlap, volume, s, k));
            }
        }
    }
    let (_, _, s, k) = best.unwrap_or((0.0, 0.0, 0, m));

    let mut slots: Vec<Option<E>> = entries.into_iter().map(Some).collect();
    let mut take = |i: &usize| slots[*i].take();
    let order = &sorts[s].order;
    let first: Vec<E> = order[..k].iter().filter_map(&mut take).collect();
    let second: Vec<E> = order[k..].iter().filter_map(&mut take).collect();
    (first, second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rstar::tree_types::{DirectoryEntry, HandledState, LeafEntry};

    fn leaves(points: &[[f64; 2]]) -> Vec<LeafEntry> {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| LeafEntry::new(i as u64, p.to_vec()))
            .collect()
    }

    #[test]
    fn test_split_separates_clusters() {
        let entries = leaves(&[
            [10.0, 10.0],
            [0.0, 0.0],
            [10.0, 11.0],
            [0.0, 1.0],
            [11.0, 10.0],
            [1.0, 0.0],
        ]);
        let (a, b) = topological_split(entries, 2);
        assert_eq!(a.len() + b.len(), 6);
        for group in [&a, &b] {
            let low = group.iter().all(|e| e.point[0] < 5.0);
            let high = group.iter().all(|e| e.point[0] > 5.0);
            assert!(low || high, "group mixes clusters: {:?}", group);
        }
    }

    #[test]
    fn test_split_respects_min_entries() {
        // One far outlier would prefer a 1/4 split
        let entries = leaves(&[
            [0.0, 0.0],
            [0.1, 0.0],
            [0.2, 0.0],
            [0.3, 0.0],
            [100.0, 0.0],
        ]);
        let (a, b) = topological_split(entries, 2);
        assert!(a.len() >= 2 && b.len() >= 2);
        assert_eq!(a.len() + b.len(), 5);
    }

    #[test]
    fn test_split_keeps_every_entry_once() {
        let entries = leaves(&[
            [3.0, 1.0],
            [4.0, 1.0],
            [1.0, 5.0],
            [9.0, 2.0],
            [6.0, 6.0],
            [2.0, 7.0],
            [5.0, 3.0],
        ]);
        let (a, b) = topological_split(entries, 3);
        let mut ids: Vec<u64> = a.iter().chain(&b).map(|e| e.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_directory_entries() {
        let dir = |x: f64, page_id: u64| DirectoryEntry {
            page_id,
            bbox: BoundingBox::new(vec![x, 0.0], vec![x + 1.0, 1.0]),
            state: HandledState::UNHANDLED,
        };
        let entries = vec![dir(0.0, 1), dir(20.0, 2), dir(1.5, 3), dir(21.5, 4)];
        let (a, b) = topological_split(entries, 2);
        let mut pages: Vec<Vec<u64>> = [a, b]
            .iter()
            .map(|g| {
                let mut p: Vec<u64> = g.iter().map(|e| e.page_id).collect();
                p.sort_unstable();
                p
            })
            .collect();
        pages.sort();
        assert_eq!(pages, vec![vec![1, 3], vec![2, 4]]);
    }
}
