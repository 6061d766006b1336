//! Orderings and partitioning for bottom-up bulk loading.

use super::tree_types::TreeEntry;
use crate::bounding_box::BoundingBox;
use crate::hilbert::{hilbert_index_bounded, order_for};
use crate::settings::BulkSplit;

/// Sorts `entries` so that consecutive runs of `capacity` entries are
/// spatially compact.
pub fn sort_for_packing<E: TreeEntry>(entries: &mut [E], strategy: BulkSplit, capacity: usize) {
    if entries.is_empty() {
        return;
    }
    let dim = entries[0].dim();
    match strategy {
        BulkSplit::SortTileRecursive => sort_tile_recursive(entries, capacity, 0, dim),
        BulkSplit::Hilbert => hilbert_sort(entries, dim),
    }
}

/// Sort-tile-recursive: sort by the first dimension, cut into slabs of whole
/// pages, and order each slab by the remaining dimensions.
fn sort_tile_recursive<E: TreeEntry>(entries: &mut [E], capacity: usize, axis: usize, dim: usize) {
    if axis >= dim {
        return;
    }
    entries.sort_by(|a, b| a.center(axis).total_cmp(&b.center(axis)));
    if entries.len() <= capacity || axis + 1 == dim {
        return;
    }

    let pages = entries.len().div_ceil(capacity);
    let remaining = (dim - axis) as f64;
    let slabs = (pages as f64).powf(1.0 / remaining).ceil().max(1.0) as usize;
    let slab_len = pages.div_ceil(slabs) * capacity;
    for slab in entries.chunks_mut(slab_len) {
        sort_tile_recursive(slab, capacity, axis + 1, dim);
    }
}

fn hilbert_sort<E: TreeEntry>(entries: &mut [E], dim: usize) {
    let mut bounds = BoundingBox::empty(dim);
    let centers: Vec<Vec<f64>> = entries
        .iter()
        .map(|e| (0..dim).map(|d| e.center(d)).collect())
        .collect();
    for c in &centers {
        bounds.extend(c.as_slice());
    }
    let order = order_for(dim);
    let mut keyed: Vec<(u128, usize)> = centers
        .iter()
        .enumerate()
        .map(|(i, c)| (hilbert_index_bounded(c, &bounds, order), i))
        .collect();
    keyed.sort_unstable();

    let mut slots: Vec<Option<E>> = entries.iter().cloned().map(Some).collect();
    for (dst, (_, src)) in entries.iter_mut().zip(keyed) {
        if let Some(e) = slots[src].take() {
            *dst = e;
        }
    }
}

/// Sizes of the chunks `n` entries are packed into: the fewest chunks of at
/// most `capacity` entries, balanced so that no chunk falls below half the
/// capacity when there is more than one.
pub fn chunk_sizes(n: usize, capacity: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let groups = n.div_ceil(capacity);
    let base = n / groups;
    let extra = n % groups;
    (0..groups).map(|g| base + usize::from(g < extra)).collect()
}

/// Cuts ordered `entries` into node-sized groups.
pub fn partition<E>(entries: Vec<E>, capacity: usize) -> Vec<Vec<E>> {
    let sizes = chunk_sizes(entries.len(), capacity);
    let mut rest = entries.into_iter();
    sizes
        .into_iter()
        .map(|size| rest.by_ref().take(size).collect())
        .collect()
}
