//! Axis-aligned bounding volumes of arbitrary dimensionality.
//!
//! Every operation here is pure and linear in the dimensionality. Mixing
//! operands of different dimensionality is a contract violation and panics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Anything that can be described by a per-dimension `[min, max]` interval.
///
/// Bounding boxes, leaf entries (degenerate point boxes) and directory
/// entries all implement this, so split and packing heuristics can work on
/// either entry kind without materializing boxes first.
pub trait SpatialComparable {
    /// Number of dimensions.
    fn dim(&self) -> usize;

    /// Lower bound in dimension `d`.
    fn min(&self, d: usize) -> f64;

    /// Upper bound in dimension `d`.
    fn max(&self, d: usize) -> f64;

    /// Center in dimension `d`.
    fn center(&self, d: usize) -> f64 {
        (self.min(d) + self.max(d)) / 2.0
    }
}

impl SpatialComparable for [f64] {
    fn dim(&self) -> usize {
        self.len()
    }

    fn min(&self, d: usize) -> f64 {
        self[d]
    }

    fn max(&self, d: usize) -> f64 {
        self[d]
    }
}

/// An axis-aligned hyper-rectangle.
///
/// # Examples
///
/// ```rust
/// use deliclu_rtree::BoundingBox;
///
/// let a = BoundingBox::from_point(&[0.0, 0.0]);
/// let b = BoundingBox::from_point(&[2.0, 1.0]);
/// let u = a.union(&b);
/// assert_eq!(u.volume(), 2.0);
/// assert_eq!(u.margin(), 3.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl BoundingBox {
    /// Creates a box from its lower and upper corners.
    ///
    /// # Panics
    ///
    /// Panics if the corners differ in length or `min[i] > max[i]` for some `i`.
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> Self {
        assert_eq!(min.len(), max.len(), "corner dimensionality mismatch");
        assert!(
            min.iter().zip(&max).all(|(lo, hi)| lo <= hi),
            "lower corner exceeds upper corner"
        );
        Self { min, max }
    }

    /// Creates a degenerate box covering exactly one point.
    pub fn from_point(point: &[f64]) -> Self {
        Self {
            min: point.to_vec(),
            max: point.to_vec(),
        }
    }

    /// Creates the box spanned by any spatially comparable value.
    pub fn from_spatial<S: SpatialComparable + ?Sized>(value: &S) -> Self {
        let dim = value.dim();
        Self {
            min: (0..dim).map(|d| value.min(d)).collect(),
            max: (0..dim).map(|d| value.max(d)).collect(),
        }
    }

    /// The neutral element of `union`: inverted infinite bounds.
    pub fn empty(dim: usize) -> Self {
        Self {
            min: vec![f64::INFINITY; dim],
            max: vec![f64::NEG_INFINITY; dim],
        }
    }

    /// True for the `empty` box (or any box extended by nothing yet).
    pub fn is_empty(&self) -> bool {
        self.min.iter().zip(&self.max).any(|(lo, hi)| lo > hi)
    }

    pub fn min_corner(&self) -> &[f64] {
        &self.min
    }

    pub fn max_corner(&self) -> &[f64] {
        &self.max
    }

    /// Smallest box enclosing both operands.
    pub fn union<S: SpatialComparable + ?Sized>(&self, other: &S) -> BoundingBox {
        let mut merged = self.clone();
        merged.extend(other);
        merged
    }

    /// Grows this box in place to enclose `other`.
    pub fn extend<S: SpatialComparable + ?Sized>(&mut self, other: &S) {
        assert_eq!(self.dim(), other.dim(), "dimensionality mismatch");
        for d in 0..self.min.len() {
            self.min[d] = self.min[d].min(other.min(d));
            self.max[d] = self.max[d].max(other.max(d));
        }
    }

    /// True if the closed boxes share at least one point.
    pub fn intersects<S: SpatialComparable + ?Sized>(&self, other: &S) -> bool {
        assert_eq!(self.dim(), other.dim(), "dimensionality mismatch");
        (0..self.min.len()).all(|d| self.min[d] <= other.max(d) && self.max[d] >= other.min(d))
    }

    /// True if `other` lies completely inside this box.
    pub fn contains<S: SpatialComparable + ?Sized>(&self, other: &S) -> bool {
        assert_eq!(self.dim(), other.dim(), "dimensionality mismatch");
        (0..self.min.len()).all(|d| self.min[d] <= other.min(d) && self.max[d] >= other.max(d))
    }

    pub fn contains_point(&self, point: &[f64]) -> bool {
        self.contains(point)
    }

    /// Product of the side lengths.
    pub fn volume(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.min
            .iter()
            .zip(&self.max)
            .map(|(lo, hi)| hi - lo)
            .product()
    }

    /// Sum of the side lengths, the perimeter-like measure used by the R* split.
    pub fn margin(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.min.iter().zip(&self.max).map(|(lo, hi)| hi - lo).sum()
    }

    /// Volume of the intersection, zero if the boxes are disjoint.
    pub fn overlap<S: SpatialComparable + ?Sized>(&self, other: &S) -> f64 {
        assert_eq!(self.dim(), other.dim(), "dimensionality mismatch");
        let mut volume = 1.0;
        for d in 0..self.min.len() {
            let lo = self.min[d].max(other.min(d));
            let hi = self.max[d].min(other.max(d));
            if lo > hi {
                return 0.0;
            }
            volume *= hi - lo;
        }
        volume
    }

    /// Volume increase needed to also cover `other`.
    pub fn enlargement<S: SpatialComparable + ?Sized>(&self, other: &S) -> f64 {
        self.union(other).volume() - self.volume()
    }
}

impl SpatialComparable for BoundingBox {
    fn dim(&self) -> usize {
        self.min.len()
    }

    fn min(&self, d: usize) -> f64 {
        self.min[d]
    }

    fn max(&self, d: usize) -> f64 {
        self.max[d]
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoundingBox({:?} .. {:?})", self.min, self.max)
    }
}

/// Union of the boxes of all `items`; `BoundingBox::empty(dim)` when there are none.
pub fn union_all<'a, S, I>(dim: usize, items: I) -> BoundingBox
where
    S: SpatialComparable + 'a,
    I: IntoIterator<Item = &'a S>,
{
    let mut bbox = BoundingBox::empty(dim);
    for item in items {
        bbox.extend(item);
    }
    bbox
}
