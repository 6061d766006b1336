//! The data relation an index is built over: object identifier -> vector.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::rstar::{ObjectId, SpatialError, SpatialResult};

/// Read access to the indexed objects.
///
/// Identifiers must stay stable while an object is indexed and must never be
/// reused for a different vector while the old one is still in the tree.
pub trait Relation: Send + Sync {
    /// The vector stored under `id`, if any.
    fn get(&self, id: ObjectId) -> Option<Vec<f64>>;

    /// All identifiers, in ascending order.
    fn ids(&self) -> Vec<ObjectId>;

    /// Dimensionality shared by every vector of this relation.
    fn dimensionality(&self) -> usize;

    fn len(&self) -> usize {
        self.ids().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Append-only in-memory relation of fixed-dimensional vectors.
///
/// Identifiers are handed out sequentially starting at zero.
#[derive(Debug)]
pub struct VectorRelation {
    dim: usize,
    vectors: RwLock<BTreeMap<ObjectId, Vec<f64>>>,
}

impl VectorRelation {
    /// Creates an empty relation for vectors of `dim` components.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: RwLock::new(BTreeMap::new()),
        }
    }

    /// Creates a relation holding `vectors`, with ids `0..vectors.len()`.
    ///
    /// # Errors
    ///
    /// Fails with [`SpatialError::DimensionMismatch`] if the vectors do not
    /// all share the dimensionality of the first one, and with
    /// [`SpatialError::InvalidOperation`] if there are none.
    pub fn from_vectors(vectors: Vec<Vec<f64>>) -> SpatialResult<Self> {
        let dim = vectors
            .first()
            .map(Vec::len)
            .ok_or_else(|| SpatialError::InvalidOperation("empty vector set".into()))?;
        let relation = Self::new(dim);
        for v in vectors {
            relation.add(v)?;
        }
        Ok(relation)
    }

    /// Appends a vector and returns its new identifier.
    pub fn add(&self, vector: Vec<f64>) -> SpatialResult<ObjectId> {
        if vector.len() != self.dim {
            return Err(SpatialError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(SpatialError::InvalidOperation(
                "vector components must be finite".into(),
            ));
        }
        let mut vectors = self.vectors.write();
        let id = vectors.keys().next_back().map_or(0, |last| last + 1);
        vectors.insert(id, vector);
        Ok(id)
    }
}

impl Relation for VectorRelation {
    fn get(&self, id: ObjectId) -> Option<Vec<f64>> {
        self.vectors.read().get(&id).cloned()
    }

    fn ids(&self) -> Vec<ObjectId> {
        self.vectors.read().keys().copied().collect()
    }

    fn dimensionality(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.vectors.read().len()
    }
}
