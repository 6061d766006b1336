//! Distance functions consumed by the searchers.
//!
//! The tree itself only stores rectangles; it can answer queries for a
//! distance exactly when that distance also provides a lower bound from a
//! point to a rectangle. Such distances expose themselves through
//! [`Distance::as_spatial`]. Everything else is rejected by the searcher
//! factories so callers can fall back to a linear scan.

use crate::bounding_box::{BoundingBox, SpatialComparable};

/// A non-negative dissimilarity between two vectors.
pub trait Distance: Send + Sync {
    /// Distance between two vectors of equal dimensionality.
    fn distance(&self, a: &[f64], b: &[f64]) -> f64;

    /// Returns the rectangle-aware view of this distance, if it has one.
    fn as_spatial(&self) -> Option<&dyn SpatialDistance> {
        None
    }

    /// Short name used in logs.
    fn name(&self) -> String;
}

/// A distance that can lower-bound the distance from a point to any point
/// inside a rectangle.
///
/// `min_dist` must never exceed `distance(point, x)` for any `x` inside
/// `bbox`, otherwise pruning drops valid results.
pub trait SpatialDistance: Distance {
    fn min_dist(&self, bbox: &BoundingBox, point: &[f64]) -> f64;
}

/// Per-dimension gap between `point` and the interval `[lo, hi]`.
#[inline]
fn gap(point: f64, lo: f64, hi: f64) -> f64 {
    if point < lo {
        lo - point
    } else if point > hi {
        point - hi
    } else {
        0.0
    }
}

/// Minkowski (Lp) norm distance for `p >= 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LpNormDistance {
    p: f64,
}

impl LpNormDistance {
    /// Manhattan distance.
    pub const MANHATTAN: LpNormDistance = LpNormDistance { p: 1.0 };
    /// Euclidean distance.
    pub const EUCLIDEAN: LpNormDistance = LpNormDistance { p: 2.0 };

    /// Creates an Lp norm, or `None` when `p < 1` (not a metric, so the
    /// rectangle lower bound would be unsound) or not finite.
    pub fn new(p: f64) -> Option<Self> {
        if p.is_finite() && p >= 1.0 {
            Some(Self { p })
        } else {
            None
        }
    }

    pub fn p(&self) -> f64 {
        self.p
    }

    fn norm<I: Iterator<Item = f64>>(&self, deltas: I) -> f64 {
        if self.p == 1.0 {
            deltas.sum()
        } else if self.p == 2.0 {
            deltas.map(|d| d * d).sum::<f64>().sqrt()
        } else {
            deltas.map(|d| d.powf(self.p)).sum::<f64>().powf(1.0 / self.p)
        }
    }
}

impl Distance for LpNormDistance {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len(), "dimensionality mismatch");
        self.norm(a.iter().zip(b).map(|(x, y)| (x - y).abs()))
    }

    fn as_spatial(&self) -> Option<&dyn SpatialDistance> {
        Some(self)
    }

    fn name(&self) -> String {
        if self.p == 2.0 {
            "euclidean".to_string()
        } else if self.p == 1.0 {
            "manhattan".to_string()
        } else {
            format!("L{}", self.p)
        }
    }
}

impl SpatialDistance for LpNormDistance {
    fn min_dist(&self, bbox: &BoundingBox, point: &[f64]) -> f64 {
        debug_assert_eq!(bbox.dim(), point.len(), "dimensionality mismatch");
        self.norm((0..point.len()).map(|d| gap(point[d], bbox.min(d), bbox.max(d))))
    }
}

/// Chebyshev (L-infinity) distance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MaximumDistance;

impl Distance for MaximumDistance {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max)
    }

    fn as_spatial(&self) -> Option<&dyn SpatialDistance> {
        Some(self)
    }

    fn name(&self) -> String {
        "maximum".to_string()
    }
}

impl SpatialDistance for MaximumDistance {
    fn min_dist(&self, bbox: &BoundingBox, point: &[f64]) -> f64 {
        (0..point.len())
            .map(|d| gap(point[d], bbox.min(d), bbox.max(d)))
            .fold(0.0, f64::max)
    }
}

/// Cosine distance, `1 - cos(a, b)`.
///
/// Angles are not bounded by axis-aligned rectangles, so this distance has
/// no spatial view and cannot be answered by the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CosineDistance;

impl Distance for CosineDistance {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let mut dot = 0.0;
        let mut na = 0.0;
        let mut nb = 0.0;
        for (x, y) in a.iter().zip(b) {
            dot += x * y;
            na += x * x;
            nb += y * y;
        }
        let denom = (na * nb).sqrt();
        if denom == 0.0 {
            return if na == nb { 0.0 } else { 1.0 };
        }
        (1.0 - dot / denom).max(0.0)
    }

    fn name(&self) -> String {
        "cosine".to_string()
    }
}
