use super::{check_query, Neighbor};
use crate::distance::SpatialDistance;
use crate::rstar::{Node, RStarTree, SpatialResult};

/// Every object within `radius` of `query` (inclusive), sorted by distance.
pub fn range_search(
    tree: &RStarTree,
    distance: &dyn SpatialDistance,
    query: &[f64],
    radius: f64,
) -> SpatialResult<Vec<Neighbor>> {
    check_query(query, tree.dim())?;
    let mut result = Vec::new();
    if tree.is_empty() || radius < 0.0 {
        return Ok(result);
    }

    let mut stack = vec![tree.root_page()];
    while let Some(page_id) = stack.pop() {
        match tree.read_node(page_id)? {
            Node::Leaf { entries } => {
                for e in entries {
                    let d = distance.distance(query, &e.point);
                    if d <= radius {
                        result.push(Neighbor::new(e.id, d));
                    }
                }
            }
            Node::Directory { entries, .. } => stack.extend(
                entries
                    .iter()
                    .filter(|e| distance.min_dist(&e.bbox, query) <= radius)
                    .map(|e| e.page_id),
            ),
        }
    }

    result.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    Ok(result)
}
