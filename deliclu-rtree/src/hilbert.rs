//! Hilbert curve keys for spatial locality ordering.
//!
//! The Hilbert curve maps a d-dimensional grid to a line while keeping grid
//! neighbors close on the line. Bulk loading sorts entries by the key of
//! their center so that consecutive runs of entries form compact pages.
//!
//! Keys are computed with Skilling's transposition algorithm ("Programming
//! the Hilbert curve", AIP Conf. Proc. 707, 2004) and packed into a `u128`,
//! so `order * dim` bits of precision are kept (high bits are dropped beyond
//! 128).

use crate::bounding_box::{BoundingBox, SpatialComparable};

/// Maximum number of bits per dimension.
const MAX_HILBERT_ORDER: u32 = 32;

/// The largest order whose key still fits into 128 bits for `dim` dimensions.
pub fn order_for(dim: usize) -> u32 {
    let dim = dim.max(1) as u32;
    (128 / dim).clamp(1, MAX_HILBERT_ORDER)
}

/// Hilbert key of a point whose coordinates are normalized to `[0, 1]`.
///
/// # Example
/// ```rust
/// use deliclu_rtree::hilbert::hilbert_index;
///
/// assert_eq!(hilbert_index(&[0.0, 0.0], 4), 0);
/// assert!(hilbert_index(&[0.5, 0.5, 0.5], 8) < 1u128 << 24);
/// ```
pub fn hilbert_index(normalized: &[f64], order: u32) -> u128 {
    debug_assert!(order > 0 && order <= MAX_HILBERT_ORDER, "order must be 1-32");
    let cells = 1u64 << order;
    let mut axes: Vec<u32> = normalized
        .iter()
        .map(|&t| {
            debug_assert!((0.0..=1.0).contains(&t), "coordinate must be in [0,1]");
            ((t * cells as f64) as u64).min(cells - 1) as u32
        })
        .collect();
    axes_to_transpose(&mut axes, order);
    interleave(&axes, order)
}

/// Hilbert key of `point`, normalized against `bounds` first.
///
/// Dimensions in which `bounds` has zero extent map to the middle of the
/// unit interval; coordinates outside `bounds` are clamped.
pub fn hilbert_index_bounded(point: &[f64], bounds: &BoundingBox, order: u32) -> u128 {
    let normalized: Vec<f64> = (0..point.len())
        .map(|d| {
            let range = bounds.max(d) - bounds.min(d);
            if range > 0.0 {
                ((point[d] - bounds.min(d)) / range).clamp(0.0, 1.0)
            } else {
                0.5
            }
        })
        .collect();
    hilbert_index(&normalized, order)
}

/// Converts grid coordinates into the transposed Hilbert representation in place.
fn axes_to_transpose(x: &mut [u32], order: u32) {
    let n = x.len();
    if n == 0 {
        return;
    }
    let m = 1u32 << (order - 1);

    // Inverse undo excess work
    let mut q = m;
    while q > 1 {
        let p = q - 1;
        for i in 0..n {
            if x[i] & q != 0 {
                x[0] ^= p;
            } else {
                let t = (x[0] ^ x[i]) & p;
                x[0] ^= t;
                x[i] ^= t;
            }
        }
        q >>= 1;
    }

    // Gray encode
    for i in 1..n {
        x[i] ^= x[i - 1];
    }
    let mut t = 0;
    let mut q = m;
    while q > 1 {
        if x[n - 1] & q != 0 {
            t ^= q - 1;
        }
        q >>= 1;
    }
    for v in x.iter_mut() {
        *v ^= t;
    }
}

/// Reads the transposed representation most significant bit first.
fn interleave(x: &[u32], order: u32) -> u128 {
    let mut key = 0u128;
    for bit in (0..order).rev() {
        for &v in x {
            key = (key << 1) | u128::from((v >> bit) & 1);
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell_center(index: u64, order: u32) -> f64 {
        (index as f64 + 0.5) / (1u64 << order) as f64
    }

    /// Walks every cell in key order and checks that consecutive cells are
    /// grid neighbors, which is the defining property of the curve.
    fn assert_curve_is_continuous(dim: usize, order: u32) {
        let side = 1u64 << order;
        let total = side.pow(dim as u32);
        let mut cells: Vec<(u128, Vec<u64>)> = (0..total)
            .map(|mut flat| {
                let coords: Vec<u64> = (0..dim)
                    .map(|_| {
                        let c = flat % side;
                        flat /= side;
                        c
                    })
                    .collect();
                let normalized: Vec<f64> = coords.iter().map(|&c| cell_center(c, order)).collect();
                (hilbert_index(&normalized, order), coords)
            })
            .collect();
        cells.sort_by_key(|(key, _)| *key);

        for (i, (key, _)) in cells.iter().enumerate() {
            assert_eq!(*key, i as u128, "keys must be a permutation of 0..cells");
        }
        for pair in cells.windows(2) {
            let steps: u64 = pair[0]
                .1
                .iter()
                .zip(&pair[1].1)
                .map(|(a, b)| a.abs_diff(*b))
                .sum();
            assert_eq!(steps, 1, "consecutive cells must be adjacent");
        }
    }

    #[test]
    fn test_curve_continuous_2d() {
        assert_curve_is_continuous(2, 1);
        assert_curve_is_continuous(2, 3);
    }

    #[test]
    fn test_curve_continuous_3d() {
        assert_curve_is_continuous(3, 2);
    }

    #[test]
    fn test_curve_continuous_4d() {
        assert_curve_is_continuous(4, 2);
    }

    #[test]
    fn test_origin_is_zero() {
        assert_eq!(hilbert_index(&[0.0, 0.0], 8), 0);
        assert_eq!(hilbert_index(&[0.0, 0.0, 0.0, 0.0, 0.0], 4), 0);
    }

    #[test]
    fn test_spatial_locality() {
        let center = hilbert_index(&[0.3, 0.3], 16);
        let nearby = hilbert_index(&[0.300001, 0.300001], 16);
        assert!(center.abs_diff(nearby) < 1000, "nearby points should have close keys");
    }

    #[test]
    fn test_key_fits_order() {
        for order in [1, 2, 4, 8, 16, 32] {
            let key = hilbert_index(&[0.99, 0.7], order);
            assert!(key < 1u128 << (2 * order), "order {}", order);
        }
    }

    #[test]
    fn test_order_for() {
        assert_eq!(order_for(2), 32);
        assert_eq!(order_for(8), 16);
        assert_eq!(order_for(64), 2);
        assert_eq!(order_for(500), 1);
    }

    #[test]
    fn test_bounded_normalization() {
        let bounds = BoundingBox::new(vec![-100.0, -100.0], vec![100.0, 100.0]);
        assert_eq!(
            hilbert_index_bounded(&[0.0, 0.0], &bounds, 8),
            hilbert_index(&[0.5, 0.5], 8)
        );
        // clamped
        assert_eq!(
            hilbert_index_bounded(&[500.0, -500.0], &bounds, 8),
            hilbert_index(&[1.0, 0.0], 8)
        );
    }

    #[test]
    fn test_bounded_zero_range() {
        let bounds = BoundingBox::from_point(&[50.0, 50.0]);
        assert_eq!(
            hilbert_index_bounded(&[50.0, 50.0], &bounds, 8),
            hilbert_index(&[0.5, 0.5], 8)
        );
    }
}
