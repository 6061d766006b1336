//! The index facade: an [`RStarTree`] bound to a [`Relation`].

use std::path::Path;
use std::sync::Arc;

use log::{debug, error, info};
use parking_lot::{RwLock, RwLockReadGuard};

use crate::distance::{Distance, LpNormDistance, SpatialDistance};
use crate::page::{PageFileStats, PersistentPageFile};
use crate::query::{knn_search, range_search, Neighbor, PriorityIter};
use crate::relation::Relation;
use crate::rstar::{
    IndexTreePath, IntegrityReport, LeafEntry, ObjectId, RStarTree, SpatialError, SpatialResult,
};
use crate::settings::RTreeSettings;

static EUCLIDEAN: LpNormDistance = LpNormDistance::EUCLIDEAN;

/// Lazy priority search holding the tree's read lock.
pub type PrioritySearch<'a> = PriorityIter<'a, RwLockReadGuard<'a, RStarTree>>;

/// A DeLiClu index over the objects of a relation.
///
/// Cloning is cheap and every clone refers to the same tree. Mutations are
/// serialized by a write lock; searches share a read lock.
pub struct DeLiCluTreeIndex<R: Relation> {
    inner: Arc<IndexInner<R>>,
}

struct IndexInner<R: Relation> {
    relation: Arc<R>,
    tree: RwLock<RStarTree>,
}

impl<R: Relation> Clone for DeLiCluTreeIndex<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Relation> DeLiCluTreeIndex<R> {
    /// Binds `tree` to `relation`. The tree may already hold objects.
    pub fn new(relation: Arc<R>, tree: RStarTree) -> SpatialResult<Self> {
        if relation.dimensionality() != tree.dim() {
            return Err(SpatialError::DimensionMismatch {
                expected: tree.dim(),
                actual: relation.dimensionality(),
            });
        }
        Ok(Self {
            inner: Arc::new(IndexInner {
                relation,
                tree: RwLock::new(tree),
            }),
        })
    }

    /// An empty index kept entirely in memory.
    pub fn in_memory(relation: Arc<R>, settings: RTreeSettings) -> SpatialResult<Self> {
        let tree = RStarTree::in_memory(relation.dimensionality(), settings)?;
        Self::new(relation, tree)
    }

    /// An index stored in the page file at `path`, opened if it exists and
    /// created otherwise.
    pub fn persistent(relation: Arc<R>, path: &Path, settings: RTreeSettings) -> SpatialResult<Self> {
        let file = if path.exists() {
            debug!("Opening existing {} at {:?}", Self::long_name(), path);
            PersistentPageFile::open(path, settings.cache_pages)?
        } else {
            debug!("Creating new {} at {:?}", Self::long_name(), path);
            PersistentPageFile::create(path, settings.page_size, settings.cache_pages)?
        };
        let tree = RStarTree::new(Box::new(file), relation.dimensionality(), settings)?;
        Self::new(relation, tree)
    }

    pub fn long_name() -> &'static str {
        "DeLiClu-Tree"
    }

    pub fn short_name() -> &'static str {
        "deliclutree"
    }

    pub fn relation(&self) -> &Arc<R> {
        &self.inner.relation
    }

    fn vector(&self, id: ObjectId) -> SpatialResult<Vec<f64>> {
        self.inner
            .relation
            .get(id)
            .ok_or(SpatialError::ObjectNotFound(id))
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Inserts every object currently in the relation.
    pub fn initialize(&self) -> SpatialResult<()> {
        let ids = self.inner.relation.ids();
        self.insert_all(&ids)
    }

    pub fn insert(&self, id: ObjectId) -> SpatialResult<()> {
        let point = self.vector(id)?;
        self.inner.tree.write().insert(id, point)
    }

    /// Inserts `ids`, bulk loading when the tree is still empty.
    pub fn insert_all(&self, ids: &[ObjectId]) -> SpatialResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let entries = ids
            .iter()
            .map(|&id| Ok(LeafEntry::new(id, self.vector(id)?)))
            .collect::<SpatialResult<Vec<_>>>()?;

        let mut tree = self.inner.tree.write();
        if tree.settings().bulk_load && tree.is_empty() && entries.len() > 1 {
            tree.bulk_load(entries)?;
        } else {
            for e in entries {
                tree.insert(e.id, e.point)?;
            }
        }
        tree.do_extra_integrity_checks()
    }

    /// Removes object `id`; `false` if it was not indexed.
    pub fn delete(&self, id: ObjectId) -> SpatialResult<bool> {
        let Some(point) = self.inner.relation.get(id) else {
            return Ok(false);
        };
        self.inner.tree.write().delete(id, &point)
    }

    /// Removes every object of `ids` and returns how many were indexed.
    pub fn delete_all(&self, ids: &[ObjectId]) -> SpatialResult<usize> {
        let mut tree = self.inner.tree.write();
        let mut deleted = 0;
        for &id in ids {
            if let Some(point) = self.inner.relation.get(id) {
                if tree.delete(id, &point)? {
                    deleted += 1;
                }
            }
        }
        tree.do_extra_integrity_checks()?;
        Ok(deleted)
    }

    /// Marks object `id` as handled and returns the path to its leaf entry.
    ///
    /// # Errors
    ///
    /// [`SpatialError::ObjectNotFound`] if `id` is not indexed.
    pub fn set_handled(&self, id: ObjectId) -> SpatialResult<IndexTreePath> {
        let Some(point) = self.inner.relation.get(id) else {
            error!("Object {} to be marked handled is not in the relation", id);
            return Err(SpatialError::ObjectNotFound(id));
        };
        self.inner.tree.write().set_handled(id, &point)
    }

    pub fn is_handled(&self, id: ObjectId) -> SpatialResult<bool> {
        let point = self.vector(id)?;
        self.inner.tree.read().is_handled(id, &point)
    }

    pub fn flush(&self) -> SpatialResult<()> {
        self.inner.tree.write().flush()
    }

    // ========================================================================
    // Searches
    // ========================================================================

    /// A kNN searcher for `distance`, `None` if the tree cannot prune for it.
    pub fn knn_searcher<'a>(&'a self, distance: &'a dyn Distance) -> Option<KnnSearcher<'a, R>> {
        let distance = self.spatial(distance)?;
        Some(KnnSearcher {
            index: self,
            distance,
        })
    }

    /// A range searcher for `distance`, `None` if the tree cannot prune for it.
    pub fn range_searcher<'a>(&'a self, distance: &'a dyn Distance) -> Option<RangeSearcher<'a, R>> {
        let distance = self.spatial(distance)?;
        Some(RangeSearcher {
            index: self,
            distance,
        })
    }

    /// A priority searcher for `distance`, `None` if the tree cannot prune
    /// for it.
    pub fn priority_searcher<'a>(
        &'a self,
        distance: &'a dyn Distance,
    ) -> Option<PrioritySearcher<'a, R>> {
        let distance = self.spatial(distance)?;
        Some(PrioritySearcher {
            index: self,
            distance,
        })
    }

    fn spatial<'a>(&self, distance: &'a dyn Distance) -> Option<&'a dyn SpatialDistance> {
        let spatial = distance.as_spatial();
        if spatial.is_none() {
            debug!("No {} searcher for distance {}", Self::short_name(), distance.name());
        }
        spatial
    }

    /// Euclidean k nearest neighbors of `query`.
    pub fn knn_search(&self, query: &[f64], k: usize) -> SpatialResult<Vec<Neighbor>> {
        knn_search(&self.inner.tree.read(), &EUCLIDEAN, query, k)
    }

    /// Every object within Euclidean distance `radius` of `query`.
    pub fn range_search(&self, query: &[f64], radius: f64) -> SpatialResult<Vec<Neighbor>> {
        range_search(&self.inner.tree.read(), &EUCLIDEAN, query, radius)
    }

    /// Lazy Euclidean best-first search from `query`.
    pub fn priority_search(&self, query: &[f64], unhandled_only: bool) -> SpatialResult<PrioritySearch<'_>> {
        PriorityIter::new(
            self.inner.tree.read(),
            &EUCLIDEAN,
            query.to_vec(),
            unhandled_only,
            f64::INFINITY,
        )
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn size(&self) -> u64 {
        self.inner.tree.read().size()
    }

    pub fn height(&self) -> u32 {
        self.inner.tree.read().height()
    }

    pub fn check_integrity(&self) -> SpatialResult<IntegrityReport> {
        self.inner.tree.read().check_integrity()
    }

    pub fn stats(&self) -> PageFileStats {
        self.inner.tree.read().page_stats()
    }

    /// Logs the shape of the tree and the page file counters.
    pub fn log_statistics(&self) -> SpatialResult<()> {
        let tree = self.inner.tree.read();
        let report = tree.check_integrity()?;
        let stats = tree.page_stats();
        info!(
            "{}: height {}, {} objects, {} directory nodes, {} leaf nodes",
            Self::long_name(),
            report.height,
            tree.size(),
            report.directory_nodes,
            report.leaf_nodes
        );
        info!(
            "{}: {} reads, {} writes, {} cache hits, {} cache misses, {} live pages",
            Self::short_name(),
            stats.reads,
            stats.writes,
            stats.cache_hits,
            stats.cache_misses,
            stats.live_pages
        );
        Ok(())
    }
}

/// kNN queries with a fixed distance.
pub struct KnnSearcher<'a, R: Relation> {
    index: &'a DeLiCluTreeIndex<R>,
    distance: &'a dyn SpatialDistance,
}

impl<R: Relation> KnnSearcher<'_, R> {
    pub fn by_object(&self, query: &[f64], k: usize) -> SpatialResult<Vec<Neighbor>> {
        knn_search(&self.index.inner.tree.read(), self.distance, query, k)
    }

    /// The query object itself is part of the result.
    pub fn by_id(&self, id: ObjectId, k: usize) -> SpatialResult<Vec<Neighbor>> {
        let query = self.index.vector(id)?;
        self.by_object(&query, k)
    }
}

/// Range queries with a fixed distance.
pub struct RangeSearcher<'a, R: Relation> {
    index: &'a DeLiCluTreeIndex<R>,
    distance: &'a dyn SpatialDistance,
}

impl<R: Relation> RangeSearcher<'_, R> {
    pub fn by_object(&self, query: &[f64], radius: f64) -> SpatialResult<Vec<Neighbor>> {
        range_search(&self.index.inner.tree.read(), self.distance, query, radius)
    }

    pub fn by_id(&self, id: ObjectId, radius: f64) -> SpatialResult<Vec<Neighbor>> {
        let query = self.index.vector(id)?;
        self.by_object(&query, radius)
    }
}

/// Best-first queries with a fixed distance.
pub struct PrioritySearcher<'a, R: Relation> {
    index: &'a DeLiCluTreeIndex<R>,
    distance: &'a dyn SpatialDistance,
}

impl<'a, R: Relation> PrioritySearcher<'a, R> {
    /// Objects ordered by distance to `query`, none farther than
    /// `max_radius`.
    pub fn by_object(
        &self,
        query: &[f64],
        unhandled_only: bool,
        max_radius: Option<f64>,
    ) -> SpatialResult<PrioritySearch<'a>> {
        PriorityIter::new(
            self.index.inner.tree.read(),
            self.distance,
            query.to_vec(),
            unhandled_only,
            max_radius.unwrap_or(f64::INFINITY),
        )
    }

    pub fn by_id(
        &self,
        id: ObjectId,
        unhandled_only: bool,
        max_radius: Option<f64>,
    ) -> SpatialResult<PrioritySearch<'a>> {
        let query = self.index.vector(id)?;
        self.by_object(&query, unhandled_only, max_radius)
    }
}
