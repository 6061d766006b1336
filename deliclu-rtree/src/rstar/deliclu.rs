//! Handled/unhandled bookkeeping for DeLiClu-style nearest neighbor ordering.
//!
//! Every leaf entry is either handled or unhandled. Directory entries carry
//! the OR of both bits over the entries of their child node, so a search for
//! the nearest unhandled object can skip a subtree whose entry says it has no
//! unhandled objects.

use log::{error, trace};

use super::tree_impl::RStarTree;
use super::tree_types::*;

impl RStarTree {
    /// Marks object `id` stored at `point` as handled and refreshes the
    /// summaries of all its ancestors.
    ///
    /// Returns the path to the object's leaf entry.
    ///
    /// # Errors
    ///
    /// An object that is not in the tree means the index and its relation
    /// disagree; this is reported as [`SpatialError::ObjectNotFound`].
    pub fn set_handled(&mut self, id: ObjectId, point: &[f64]) -> SpatialResult<IndexTreePath> {
        let Some(path) = self.find_path_to_object(id, point)? else {
            error!("Object {} at {:?} to be marked handled is not in the tree", id, point);
            return Err(SpatialError::ObjectNotFound(id));
        };
        trace!("Marking object {} handled", id);

        let steps = path.steps();
        let mut nodes = steps
            .iter()
            .map(|s| self.read_node(s.page_id))
            .collect::<SpatialResult<Vec<Node>>>()?;

        let leaf = steps.len() - 1;
        let entry = nodes[leaf]
            .leaf_entry_mut(steps[leaf].index)
            .ok_or_else(|| SpatialError::Integrity(format!("path to object {} ends above the leaves", id)))?;
        if entry.state == HandledState::HANDLED {
            return Ok(path);
        }
        entry.state = HandledState::HANDLED;
        self.write_node(steps[leaf].page_id, &nodes[leaf])?;

        for depth in (0..leaf).rev() {
            let summary = nodes[depth + 1].compute_state();
            let parent = nodes[depth]
                .directory_entry_mut(steps[depth].index)
                .ok_or_else(|| SpatialError::Integrity(format!("page {} lost an entry", steps[depth].page_id)))?;
            if parent.state == summary {
                // Ancestors above summarize the same bits
                break;
            }
            parent.state = summary;
            self.write_node(steps[depth].page_id, &nodes[depth])?;
        }
        Ok(path)
    }

    /// True if object `id` at `point` is indexed and marked handled.
    pub fn is_handled(&self, id: ObjectId, point: &[f64]) -> SpatialResult<bool> {
        let Some(path) = self.find_path_to_object(id, point)? else {
            return Err(SpatialError::ObjectNotFound(id));
        };
        let Some(target) = path.target() else {
            return Ok(false);
        };
        match self.read_node(target.page_id)? {
            Node::Leaf { entries } => Ok(entries[target.index].is_handled()),
            Node::Directory { .. } => Err(SpatialError::Integrity(format!(
                "path to object {} ends above the leaves",
                id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RTreeSettings;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn tree_with(points: &[Vec<f64>]) -> RStarTree {
        let settings = RTreeSettings::builder()
            .leaf_capacity(4)
            .dir_capacity(4)
            .min_fill(0.5)
            .build()
            .unwrap();
        let mut tree = RStarTree::in_memory(points[0].len(), settings).unwrap();
        for (i, p) in points.iter().enumerate() {
            tree.insert(i as u64, p.clone()).unwrap();
        }
        tree
    }

    fn random_points(n: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| vec![rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0)])
            .collect()
    }

    fn root_state(tree: &RStarTree) -> HandledState {
        tree.read_node(tree.root_page()).unwrap().compute_state()
    }

    #[test]
    fn test_mark_all_handled() {
        let points = random_points(120, 1);
        let mut tree = tree_with(&points);
        assert_eq!(root_state(&tree), HandledState::UNHANDLED);

        for (i, p) in points.iter().enumerate() {
            let path = tree.set_handled(i as u64, p).unwrap();
            assert_eq!(path.len(), tree.height() as usize);
            assert!(tree.is_handled(i as u64, p).unwrap());
            if i % 10 == 0 {
                // Summaries are verified as part of the integrity check
                tree.check_integrity().unwrap();
            }
            if i + 1 < points.len() {
                assert_eq!(
                    root_state(&tree),
                    HandledState {
                        has_handled: true,
                        has_unhandled: true
                    }
                );
            }
        }
        tree.check_integrity().unwrap();
        assert_eq!(root_state(&tree), HandledState::HANDLED);
    }

    #[test]
    fn test_marking_twice_is_harmless() {
        let points = random_points(30, 2);
        let mut tree = tree_with(&points);
        tree.set_handled(3, &points[3]).unwrap();
        let writes = tree.page_stats().writes;
        tree.set_handled(3, &points[3]).unwrap();
        assert_eq!(tree.page_stats().writes, writes);
        tree.check_integrity().unwrap();
    }

    #[test]
    fn test_missing_object_is_an_error() {
        let points = random_points(10, 3);
        let mut tree = tree_with(&points);
        assert!(matches!(
            tree.set_handled(99, &points[0]),
            Err(SpatialError::ObjectNotFound(99))
        ));
        assert!(matches!(
            tree.is_handled(99, &points[0]),
            Err(SpatialError::ObjectNotFound(99))
        ));
    }

    #[test]
    fn test_state_survives_restructuring() {
        let points = random_points(200, 4);
        let mut tree = tree_with(&points);
        for i in (0..200).step_by(3) {
            tree.set_handled(i as u64, &points[i]).unwrap();
        }
        // Deletions dissolve nodes and reinsert entries with their state
        for i in (0..200).step_by(5) {
            tree.delete(i as u64, &points[i]).unwrap();
        }
        // Splits must aggregate the state of both halves
        for (i, p) in random_points(100, 5).into_iter().enumerate() {
            tree.insert(1000 + i as u64, p).unwrap();
        }
        tree.check_integrity().unwrap();

        for i in (0..200).filter(|i| i % 5 != 0) {
            assert_eq!(tree.is_handled(i as u64, &points[i]).unwrap(), i % 3 == 0, "object {}", i);
        }
    }
}
