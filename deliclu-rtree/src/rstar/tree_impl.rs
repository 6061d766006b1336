//! The R*-tree core: insertion, deletion, bulk loading and verification.
//!
//! Nodes are never kept between operations. Every operation reads the nodes it
//! needs through the page file, mutates local copies and writes the changed
//! nodes back before returning, so a tree is fully described by its page file
//! and its [`TreeHeader`].

use std::cmp::Ordering;
use std::collections::HashSet;

use log::{debug, trace, warn};

use super::bulk::{partition, sort_for_packing};
use super::split::topological_split;
use super::tree_types::*;
use crate::bounding_box::BoundingBox;
use crate::page::{MemoryPageFile, PageFile, PageFileStats};
use crate::settings::{OverlapPolicy, RTreeSettings};

/// A node on the way from the root to an insertion target.
struct PathNode {
    page_id: PageId,
    node: Node,
    /// Index of the entry that leads to the next node on the path
    child: usize,
}

/// A disk-pageable R*-tree over points with handled/unhandled bookkeeping.
///
/// The tree is not synchronized; wrap it in a lock to share it (the index
/// facade does).
pub struct RStarTree {
    file: Box<dyn PageFile>,
    settings: RTreeSettings,
    header: TreeHeader,
    dim: usize,
    leaf_capacity: usize,
    dir_capacity: usize,
    leaf_min: usize,
    dir_min: usize,
}

impl RStarTree {
    /// Creates a tree on `file`, or reattaches to the tree already stored in it.
    ///
    /// # Errors
    ///
    /// Fails if the stored tree has a different dimensionality, the settings
    /// yield node capacities below two, or an explicit capacity does not fit
    /// a full node into one page of `file`.
    pub fn new(
        file: Box<dyn PageFile>,
        dim: usize,
        settings: RTreeSettings,
    ) -> SpatialResult<Self> {
        if dim == 0 {
            return Err(SpatialError::InvalidConfiguration(
                "dimensionality must be positive".into(),
            ));
        }
        let mut settings = settings;
        settings.page_size = file.page_size();
        let leaf_capacity = settings.leaf_capacity(dim)?;
        let dir_capacity = settings.dir_capacity(dim)?;
        let leaf_min = settings.min_entries(leaf_capacity);
        let dir_min = settings.min_entries(dir_capacity);

        let mut file = file;
        let header = match file.read_header()? {
            Some(header) if header.dim as usize != dim => {
                return Err(SpatialError::DimensionMismatch {
                    expected: header.dim as usize,
                    actual: dim,
                })
            }
            Some(header) => header,
            None => {
                let header = TreeHeader::empty(dim);
                file.write_header(&header)?;
                header
            }
        };

        debug!(
            "R*-tree ready: dim {}, leaf capacity {} (min {}), directory capacity {} (min {}), {} objects",
            dim, leaf_capacity, leaf_min, dir_capacity, dir_min, header.size
        );

        Ok(Self {
            file,
            settings,
            header,
            dim,
            leaf_capacity,
            dir_capacity,
            leaf_min,
            dir_min,
        })
    }

    /// Creates an empty tree backed by a [`MemoryPageFile`].
    pub fn in_memory(dim: usize, settings: RTreeSettings) -> SpatialResult<Self> {
        let file = MemoryPageFile::with_page_size(settings.page_size);
        Self::new(Box::new(file), dim, settings)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of indexed objects.
    pub fn size(&self) -> u64 {
        self.header.size
    }

    /// Number of node levels; 0 for an empty tree.
    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty()
    }

    /// Page of the root node, [`NO_PAGE`] for an empty tree.
    pub fn root_page(&self) -> PageId {
        self.header.root_page
    }

    pub fn settings(&self) -> &RTreeSettings {
        &self.settings
    }

    pub fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    pub fn dir_capacity(&self) -> usize {
        self.dir_capacity
    }

    pub fn page_stats(&self) -> PageFileStats {
        self.file.stats()
    }

    /// Reads a node through the page file.
    pub fn read_node(&self, page_id: PageId) -> SpatialResult<Node> {
        self.file.read_node(page_id)
    }

    pub(crate) fn write_node(&mut self, page_id: PageId, node: &Node) -> SpatialResult<()> {
        self.file.write_node(page_id, node)
    }

    pub fn flush(&mut self) -> SpatialResult<()> {
        self.file.flush()
    }

    fn save_header(&mut self) -> SpatialResult<()> {
        self.file.write_header(&self.header)
    }

    fn capacity_of(&self, node: &Node) -> usize {
        if node.is_leaf() {
            self.leaf_capacity
        } else {
            self.dir_capacity
        }
    }

    fn min_of(&self, node: &Node) -> usize {
        if node.is_leaf() {
            self.leaf_min
        } else {
            self.dir_min
        }
    }

    fn check_point(&self, point: &[f64]) -> SpatialResult<()> {
        if point.len() != self.dim {
            return Err(SpatialError::DimensionMismatch {
                expected: self.dim,
                actual: point.len(),
            });
        }
        if point.iter().any(|v| !v.is_finite()) {
            return Err(SpatialError::InvalidOperation(
                "coordinates must be finite".into(),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Inserts one object as an unhandled leaf entry.
    pub fn insert(&mut self, id: ObjectId, point: Vec<f64>) -> SpatialResult<()> {
        self.check_point(&point)?;
        trace!("Inserting object {} at {:?}", id, point);
        self.insert_entry(Entry::Leaf(LeafEntry::new(id, point)), 0)?;
        self.header.size += 1;
        self.save_header()
    }

    /// Places `entry` into a node of `level`, splitting upwards as needed.
    fn insert_entry(&mut self, entry: Entry, level: u32) -> SpatialResult<()> {
        if self.is_empty() {
            let Entry::Leaf(leaf) = entry else {
                return Err(SpatialError::InvalidOperation(
                    "cannot place a directory entry into an empty tree".into(),
                ));
            };
            let page_id = self.file.allocate_page()?;
            self.file.write_node(page_id, &Node::new_leaf(vec![leaf]))?;
            self.header.root_page = page_id;
            self.header.height = 1;
            return self.save_header();
        }

        let mut path = self.choose_path(&entry.bbox(), level)?;
        let Some(mut target) = path.pop() else {
            return Err(SpatialError::Integrity("empty insertion path".into()));
        };
        target.node.push(entry)?;
        self.adjust_tree(path, target.page_id, target.node)
    }

    /// Descends from the root to the node of `level` best suited for `bbox`.
    fn choose_path(&self, bbox: &BoundingBox, level: u32) -> SpatialResult<Vec<PathNode>> {
        let mut path = Vec::with_capacity(self.header.height as usize);
        let mut page_id = self.header.root_page;
        loop {
            let node = self.read_node(page_id)?;
            let node_level = node.level();
            if node_level == level {
                path.push(PathNode {
                    page_id,
                    node,
                    child: 0,
                });
                return Ok(path);
            }
            let child = match &node {
                Node::Directory { entries, .. } if node_level > level && !entries.is_empty() => {
                    self.choose_subtree(entries, bbox, node_level)
                }
                _ => {
                    return Err(SpatialError::Integrity(format!(
                        "no node of level {} below page {}",
                        level, page_id
                    )))
                }
            };
            let next = node
                .directory_entry(child)
                .map(|e| e.page_id)
                .ok_or_else(|| SpatialError::Integrity("subtree choice out of range".into()))?;
            path.push(PathNode {
                page_id,
                node,
                child,
            });
            page_id = next;
        }
    }

    /// Picks the entry of a directory node of `node_level` to descend into.
    fn choose_subtree(
        &self,
        entries: &[DirectoryEntry],
        bbox: &BoundingBox,
        node_level: u32,
    ) -> usize {
        let use_overlap = match self.settings.overlap_policy {
            OverlapPolicy::LeafParents => node_level == 1,
            OverlapPolicy::AllLevels => true,
            OverlapPolicy::Never => false,
        };

        let key = |i: usize| -> (f64, f64, f64) {
            let current = &entries[i].bbox;
            let enlarged = current.union(bbox);
            let enlargement = enlarged.volume() - current.volume();
            let overlap_growth = if use_overlap {
                entries
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, other)| enlarged.overlap(&other.bbox) - current.overlap(&other.bbox))
                    .sum()
            } else {
                0.0
            };
            (overlap_growth, enlargement, enlarged.volume())
        };
        let cmp = |a: &(f64, f64, f64), b: &(f64, f64, f64)| {
            a.0.total_cmp(&b.0)
                .then(a.1.total_cmp(&b.1))
                .then(a.2.total_cmp(&b.2))
        };

        let mut best = 0;
        let mut best_key = key(0);
        for i in 1..entries.len() {
            let k = key(i);
            if cmp(&k, &best_key) == Ordering::Less {
                best = i;
                best_key = k;
            }
        }
        best
    }

    /// Writes back `node` and its ancestors on `path`, handling overflow by
    /// splitting and refreshing every parent entry that changed.
    fn adjust_tree(
        &mut self,
        mut path: Vec<PathNode>,
        page_id: PageId,
        node: Node,
    ) -> SpatialResult<()> {
        let mut current_page = page_id;
        let mut current = node;
        loop {
            let mut sibling = None;
            if current.len() > self.capacity_of(&current) {
                let (kept, moved) = self.split(current);
                let sibling_page = self.file.allocate_page()?;
                self.file.write_node(sibling_page, &moved)?;
                sibling = Some(DirectoryEntry::for_node(sibling_page, &moved));
                current = kept;
            }
            self.file.write_node(current_page, &current)?;

            let Some(PathNode {
                page_id: parent_page,
                node: mut parent,
                child,
            }) = path.pop()
            else {
                if let Some(sibling) = sibling {
                    self.grow_root(current_page, &current, sibling)?;
                }
                return Ok(());
            };

            let updated = DirectoryEntry::for_node(current_page, &current);
            let unchanged = parent.directory_entry(child) == Some(&updated);
            if unchanged && sibling.is_none() {
                // Every ancestor summary is still exact
                return Ok(());
            }
            let slot = parent.directory_entry_mut(child).ok_or_else(|| {
                SpatialError::Integrity(format!("page {} lost its entry", current_page))
            })?;
            *slot = updated;
            if let Some(sibling) = sibling {
                parent.push(Entry::Directory(sibling))?;
            }
            current_page = parent_page;
            current = parent;
        }
    }

    /// Replaces a split root by a new root over both halves.
    fn grow_root(
        &mut self,
        old_root: PageId,
        old: &Node,
        sibling: DirectoryEntry,
    ) -> SpatialResult<()> {
        let level = old.level() + 1;
        let entries = vec![DirectoryEntry::for_node(old_root, old), sibling];
        let root = Node::new_directory(entries, level);
        let root_page = self.file.allocate_page()?;
        self.file.write_node(root_page, &root)?;
        self.header.root_page = root_page;
        self.header.height += 1;
        debug!("Root split, tree height is now {}", self.header.height);
        self.save_header()
    }

    fn split(&self, node: Node) -> (Node, Node) {
        match node {
            Node::Leaf { entries } => {
                let (a, b) = topological_split(entries, self.leaf_min);
                (Node::new_leaf(a), Node::new_leaf(b))
            }
            Node::Directory { entries, level } => {
                let (a, b) = topological_split(entries, self.dir_min);
                (Node::new_directory(a, level), Node::new_directory(b, level))
            }
        }
    }

    // ========================================================================
    // Bulk Loading
    // ========================================================================

    /// Builds the tree bottom-up from `entries`.
    ///
    /// Only an empty tree is bulk loaded; otherwise the entries are inserted
    /// one at a time.
    pub fn bulk_load(&mut self, entries: Vec<LeafEntry>) -> SpatialResult<()> {
        for e in &entries {
            self.check_point(&e.point)?;
        }
        if !self.is_empty() {
            warn!(
                "Bulk load into a non-empty tree ({} objects), inserting {} entries one by one",
                self.header.size,
                entries.len()
            );
            for e in entries {
                self.insert(e.id, e.point)?;
            }
            return Ok(());
        }
        if entries.is_empty() {
            return Ok(());
        }

        let count = entries.len() as u64;
        let mut leaves = entries;
        sort_for_packing(&mut leaves, self.settings.bulk_split, self.leaf_capacity);
        let mut level_entries = Vec::new();
        for chunk in partition(leaves, self.leaf_capacity) {
            level_entries.push(self.write_new_node(Node::new_leaf(chunk))?);
        }

        let mut level = 0;
        while level_entries.len() > 1 {
            level += 1;
            sort_for_packing(&mut level_entries, self.settings.bulk_split, self.dir_capacity);
            let mut parents = Vec::new();
            for chunk in partition(level_entries, self.dir_capacity) {
                parents.push(self.write_new_node(Node::new_directory(chunk, level))?);
            }
            level_entries = parents;
        }

        self.header.root_page = level_entries[0].page_id;
        self.header.height = level + 1;
        self.header.size = count;
        debug!(
            "Bulk loaded {} objects ({:?}), height {}",
            count, self.settings.bulk_split, self.header.height
        );
        self.save_header()
    }

    fn write_new_node(&mut self, node: Node) -> SpatialResult<DirectoryEntry> {
        let page_id = self.file.allocate_page()?;
        self.file.write_node(page_id, &node)?;
        Ok(DirectoryEntry::for_node(page_id, &node))
    }

    // ========================================================================
    // Lookup and Deletion
    // ========================================================================

    /// Root-to-leaf path to the entry of object `id` stored at `point`.
    ///
    /// Only subtrees whose box contains `point` are searched; several may,
    /// so the leaf entry is matched directly.
    pub fn find_path_to_object(
        &self,
        id: ObjectId,
        point: &[f64],
    ) -> SpatialResult<Option<IndexTreePath>> {
        if self.is_empty() || point.len() != self.dim {
            return Ok(None);
        }
        let mut steps = Vec::with_capacity(self.header.height as usize);
        if self.locate(self.header.root_page, id, point, &mut steps)? {
            steps.reverse();
            Ok(Some(IndexTreePath::new(steps)))
        } else {
            Ok(None)
        }
    }

    /// Depth-first search; on success `steps` holds the path leaf first.
    fn locate(
        &self,
        page_id: PageId,
        id: ObjectId,
        point: &[f64],
        steps: &mut Vec<PathStep>,
    ) -> SpatialResult<bool> {
        match self.read_node(page_id)? {
            Node::Leaf { entries } => {
                if let Some(index) = entries
                    .iter()
                    .position(|e| e.id == id && e.point.as_slice() == point)
                {
                    steps.push(PathStep { page_id, index });
                    return Ok(true);
                }
            }
            Node::Directory { entries, .. } => {
                for (index, entry) in entries.iter().enumerate() {
                    if entry.bbox.contains_point(point) && self.locate(entry.page_id, id, point, steps)? {
                        steps.push(PathStep { page_id, index });
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Removes object `id` stored at `point`. Returns false if it is not indexed.
    pub fn delete(&mut self, id: ObjectId, point: &[f64]) -> SpatialResult<bool> {
        let Some(path) = self.find_path_to_object(id, point)? else {
            trace!("Object {} not in the tree, nothing to delete", id);
            return Ok(false);
        };
        trace!("Deleting object {}", id);
        self.delete_path(&path)?;
        self.header.size -= 1;
        self.save_header()?;
        Ok(true)
    }

    /// Removes the leaf entry addressed by `path`, dissolving underfull
    /// nodes and reinserting their entries.
    fn delete_path(&mut self, path: &IndexTreePath) -> SpatialResult<()> {
        let steps = path.steps();
        let mut nodes = steps
            .iter()
            .map(|s| self.read_node(s.page_id))
            .collect::<SpatialResult<Vec<Node>>>()?;

        let leaf = steps.len() - 1;
        nodes[leaf].remove(steps[leaf].index);

        let mut orphans: Vec<(u32, Entry)> = Vec::new();
        for depth in (1..steps.len()).rev() {
            let page_id = steps[depth].page_id;
            let slot = steps[depth - 1].index;
            if nodes[depth].len() < self.min_of(&nodes[depth]) {
                let underfull = std::mem::replace(&mut nodes[depth], Node::new_leaf(Vec::new()));
                let level = underfull.level();
                orphans.extend(underfull.into_entries().into_iter().map(|e| (level, e)));
                self.file.free_page(page_id)?;
                nodes[depth - 1].remove(slot);
            } else {
                self.file.write_node(page_id, &nodes[depth])?;
                let summary = DirectoryEntry::for_node(page_id, &nodes[depth]);
                if let Some(entry) = nodes[depth - 1].directory_entry_mut(slot) {
                    *entry = summary;
                }
            }
        }
        self.file.write_node(steps[0].page_id, &nodes[0])?;
        self.condense_root()?;

        if !orphans.is_empty() {
            debug!("Underflow: reinserting {} entries", orphans.len());
            self.reinsert(orphans)?;
        }
        Ok(())
    }

    /// Removes empty roots and directory roots with a single child.
    fn condense_root(&mut self) -> SpatialResult<()> {
        while !self.is_empty() {
            let root_page = self.header.root_page;
            let root = self.read_node(root_page)?;
            match (&root, root.len()) {
                (_, 0) => {
                    self.file.free_page(root_page)?;
                    self.header.root_page = NO_PAGE;
                    self.header.height = 0;
                    debug!("Tree is empty");
                }
                (Node::Directory { entries, .. }, 1) => {
                    self.file.free_page(root_page)?;
                    self.header.root_page = entries[0].page_id;
                    self.header.height -= 1;
                    debug!("Root collapsed, tree height is now {}", self.header.height);
                }
                _ => break,
            }
        }
        self.save_header()
    }

    /// Reinserts entries taken from dissolved nodes, each at its own level.
    ///
    /// A directory entry whose level no longer exists (the tree shrank) is
    /// dissolved into its leaf entries instead.
    fn reinsert(&mut self, mut orphans: Vec<(u32, Entry)>) -> SpatialResult<()> {
        orphans.sort_by(|a, b| b.0.cmp(&a.0));
        for (level, entry) in orphans {
            let root_level = self.header.height.checked_sub(1);
            match entry {
                Entry::Directory(dir) if root_level.map_or(true, |root| level > root) => {
                    for leaf in self.dissolve(dir.page_id)? {
                        self.insert_entry(Entry::Leaf(leaf), 0)?;
                    }
                }
                entry => self.insert_entry(entry, level)?,
            }
        }
        Ok(())
    }

    /// Frees the subtree below `page_id` and returns its leaf entries.
    fn dissolve(&mut self, page_id: PageId) -> SpatialResult<Vec<LeafEntry>> {
        let node = self.read_node(page_id)?;
        self.file.free_page(page_id)?;
        match node {
            Node::Leaf { entries } => Ok(entries),
            Node::Directory { entries, .. } => {
                let mut leaves = Vec::new();
                for child in entries {
                    leaves.extend(self.dissolve(child.page_id)?);
                }
                Ok(leaves)
            }
        }
    }

    // ========================================================================
    // Inspection and Integrity
    // ========================================================================

    /// Every leaf entry of the tree, in depth-first order.
    pub fn leaf_entries(&self) -> SpatialResult<Vec<LeafEntry>> {
        let mut out = Vec::with_capacity(self.header.size as usize);
        if self.is_empty() {
            return Ok(out);
        }
        let mut stack = vec![self.header.root_page];
        while let Some(page_id) = stack.pop() {
            match self.read_node(page_id)? {
                Node::Leaf { entries } => out.extend(entries),
                Node::Directory { entries, .. } => stack.extend(entries.iter().map(|e| e.page_id)),
            }
        }
        Ok(out)
    }

    /// Verifies the complete tree.
    ///
    /// Checks node levels against the height, fill bounds of non-root nodes,
    /// exact boxes and handled/unhandled summaries in every directory entry,
    /// leaf entry states and dimensionality, unique pages, and the object
    /// count against the header.
    pub fn check_integrity(&self) -> SpatialResult<IntegrityReport> {
        let mut report = IntegrityReport {
            height: self.header.height,
            ..IntegrityReport::default()
        };
        if self.is_empty() {
            if self.header.size != 0 || self.header.height != 0 {
                return Err(SpatialError::Integrity(format!(
                    "empty tree reports size {} and height {}",
                    self.header.size, self.header.height
                )));
            }
            return Ok(report);
        }
        if self.header.height == 0 {
            return Err(SpatialError::Integrity("non-empty tree with height 0".into()));
        }

        let mut seen = HashSet::new();
        let root_level = self.header.height - 1;
        self.verify_node(self.header.root_page, root_level, None, &mut seen, &mut report)?;
        if report.entries != self.header.size {
            return Err(SpatialError::Integrity(format!(
                "tree holds {} objects, header says {}",
                report.entries, self.header.size
            )));
        }
        Ok(report)
    }

    fn verify_node(
        &self,
        page_id: PageId,
        level: u32,
        parent_entry: Option<&DirectoryEntry>,
        seen: &mut HashSet<PageId>,
        report: &mut IntegrityReport,
    ) -> SpatialResult<()> {
        let fail = |msg: String| Err(SpatialError::Integrity(format!("page {}: {}", page_id, msg)));
        if !seen.insert(page_id) {
            return fail("referenced twice".into());
        }
        let node = self.read_node(page_id)?;
        report.pages_checked += 1;

        if node.level() != level {
            return fail(format!("level {} where {} was expected", node.level(), level));
        }
        let is_root = parent_entry.is_none();
        let (min, max) = (self.min_of(&node), self.capacity_of(&node));
        if node.len() > max {
            return fail(format!("{} entries exceed capacity {}", node.len(), max));
        }
        if !is_root && node.len() < min {
            return fail(format!("{} entries below minimum {}", node.len(), min));
        }
        if is_root && (node.is_empty() || (!node.is_leaf() && node.len() < 2)) {
            return fail(format!("root with {} entries", node.len()));
        }
        if let Some(entry) = parent_entry {
            if entry.bbox != node.compute_bbox() {
                return fail(format!("parent box {} is not tight", entry.bbox));
            }
            if entry.state != node.compute_state() {
                return fail(format!(
                    "parent state {:?} differs from {:?}",
                    entry.state,
                    node.compute_state()
                ));
            }
        }

        match &node {
            Node::Leaf { entries } => {
                report.leaf_nodes += 1;
                report.entries += entries.len() as u64;
                for e in entries {
                    if e.point.len() != self.dim {
                        return fail(format!("object {} has dimensionality {}", e.id, e.point.len()));
                    }
                    if e.state.has_handled == e.state.has_unhandled {
                        return fail(format!("object {} has state {:?}", e.id, e.state));
                    }
                }
            }
            Node::Directory { entries, .. } => {
                report.directory_nodes += 1;
                for e in entries {
                    self.verify_node(e.page_id, level - 1, Some(e), seen, report)?;
                }
            }
        }
        Ok(())
    }

    /// Runs [`check_integrity`](Self::check_integrity) when enabled in the settings.
    pub fn do_extra_integrity_checks(&self) -> SpatialResult<()> {
        if self.settings.integrity_checks {
            self.check_integrity()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PersistentPageFile;
    use crate::settings::BulkSplit;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::tempdir;

    fn small_settings() -> RTreeSettings {
        RTreeSettings::builder()
            .leaf_capacity(4)
            .dir_capacity(4)
            .min_fill(0.5)
            .build()
            .unwrap()
    }

    fn random_points(n: usize, dim: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..dim).map(|_| rng.gen_range(-100.0..100.0)).collect())
            .collect()
    }

    fn ids(tree: &RStarTree) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = tree.leaf_entries().unwrap().iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_empty_tree() {
        let tree = RStarTree::in_memory(2, small_settings()).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.size(), 0);
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.root_page(), NO_PAGE);
        assert_eq!(tree.check_integrity().unwrap(), IntegrityReport::default());
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(RStarTree::in_memory(0, RTreeSettings::default()).is_err());
    }

    #[test]
    fn test_small_tree_grows() {
        let mut tree = RStarTree::in_memory(2, small_settings()).unwrap();
        let points = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [5.0, 5.0], [6.0, 6.0], [7.0, 7.0]];
        for (i, p) in points.iter().enumerate() {
            tree.insert(i as u64, p.to_vec()).unwrap();
            tree.check_integrity().unwrap();
        }
        assert_eq!(tree.size(), 6);
        assert_eq!(tree.height(), 2, "six points overflow a four entry leaf");
        let report = tree.check_integrity().unwrap();
        assert_eq!(report.leaf_nodes, 2);
        assert_eq!(report.directory_nodes, 1);
        assert_eq!(report.entries, 6);
    }

    #[test]
    fn test_insert_many_keeps_invariants() {
        let mut tree = RStarTree::in_memory(3, small_settings()).unwrap();
        for (i, p) in random_points(400, 3, 1).into_iter().enumerate() {
            tree.insert(i as u64, p).unwrap();
            if i % 37 == 0 {
                tree.check_integrity().unwrap();
            }
        }
        let report = tree.check_integrity().unwrap();
        assert_eq!(report.entries, 400);
        assert!(tree.height() >= 4);
        assert_eq!(ids(&tree), (0..400).collect::<Vec<_>>());
    }

    #[test]
    fn test_overlap_policies() {
        for policy in [OverlapPolicy::LeafParents, OverlapPolicy::AllLevels, OverlapPolicy::Never] {
            let settings = RTreeSettings::builder()
                .leaf_capacity(6)
                .dir_capacity(5)
                .overlap_policy(policy)
                .build()
                .unwrap();
            let mut tree = RStarTree::in_memory(2, settings).unwrap();
            for (i, p) in random_points(300, 2, 2).into_iter().enumerate() {
                tree.insert(i as u64, p).unwrap();
            }
            tree.check_integrity().unwrap();
            assert_eq!(tree.size(), 300);
        }
    }

    #[test]
    fn test_find_path_to_object() {
        let mut tree = RStarTree::in_memory(2, small_settings()).unwrap();
        let points = random_points(60, 2, 3);
        for (i, p) in points.iter().enumerate() {
            tree.insert(i as u64, p.clone()).unwrap();
        }
        let path = tree.find_path_to_object(17, &points[17]).unwrap().unwrap();
        assert_eq!(path.len(), tree.height() as usize);
        assert_eq!(path.steps()[0].page_id, tree.root_page());

        let target = path.target().unwrap();
        match tree.read_node(target.page_id).unwrap() {
            Node::Leaf { entries } => assert_eq!(entries[target.index].id, 17),
            other => panic!("expected a leaf, got {:?}", other),
        }

        // Right id, wrong point and the other way around
        assert!(tree.find_path_to_object(17, &points[18]).unwrap().is_none());
        assert!(tree.find_path_to_object(1000, &points[17]).unwrap().is_none());
    }

    #[test]
    fn test_delete() {
        let mut tree = RStarTree::in_memory(2, small_settings()).unwrap();
        let points = random_points(200, 2, 4);
        for (i, p) in points.iter().enumerate() {
            tree.insert(i as u64, p.clone()).unwrap();
        }

        for i in (0..200).step_by(2) {
            assert!(tree.delete(i as u64, &points[i]).unwrap());
            if i % 20 == 0 {
                tree.check_integrity().unwrap();
            }
        }
        tree.check_integrity().unwrap();
        assert_eq!(tree.size(), 100);
        assert_eq!(ids(&tree), (1..200).step_by(2).collect::<Vec<_>>());

        assert!(!tree.delete(0, &points[0]).unwrap(), "already deleted");
        assert!(!tree.delete(1, &points[3]).unwrap(), "wrong point");
    }

    #[test]
    fn test_delete_everything_then_reuse() {
        let mut tree = RStarTree::in_memory(2, small_settings()).unwrap();
        let points = random_points(50, 2, 5);
        for (i, p) in points.iter().enumerate() {
            tree.insert(i as u64, p.clone()).unwrap();
        }
        for (i, p) in points.iter().enumerate().rev() {
            assert!(tree.delete(i as u64, p).unwrap());
            tree.check_integrity().unwrap();
        }
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.page_stats().live_pages, 0, "all pages are released");

        tree.insert(7, vec![1.0, 2.0]).unwrap();
        assert_eq!(tree.size(), 1);
        assert_eq!(tree.height(), 1);
        tree.check_integrity().unwrap();
    }

    #[test]
    fn test_insert_then_delete_restores_members() {
        let mut tree = RStarTree::in_memory(2, small_settings()).unwrap();
        let points = random_points(40, 2, 6);
        for (i, p) in points.iter().enumerate() {
            tree.insert(i as u64, p.clone()).unwrap();
        }
        let before = ids(&tree);
        tree.insert(99, vec![0.5, 0.5]).unwrap();
        assert!(tree.delete(99, &[0.5, 0.5]).unwrap());
        assert_eq!(ids(&tree), before);
        tree.check_integrity().unwrap();
    }

    #[test]
    fn test_bulk_load() {
        for strategy in [BulkSplit::SortTileRecursive, BulkSplit::Hilbert] {
            let settings = RTreeSettings::builder()
                .leaf_capacity(8)
                .dir_capacity(6)
                .bulk_split(strategy)
                .build()
                .unwrap();
            let mut tree = RStarTree::in_memory(2, settings).unwrap();
            let entries: Vec<LeafEntry> = random_points(1000, 2, 7)
                .into_iter()
                .enumerate()
                .map(|(i, p)| LeafEntry::new(i as u64, p))
                .collect();
            tree.bulk_load(entries).unwrap();

            let report = tree.check_integrity().unwrap();
            assert_eq!(report.entries, 1000);
            assert_eq!(tree.size(), 1000);
            // 125 leaves, 21 + 4 + 1 directory nodes
            assert_eq!(report.leaf_nodes, 125);
            assert_eq!(tree.height(), 4);
            assert_eq!(ids(&tree), (0..1000).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_bulk_load_then_update() {
        let mut tree = RStarTree::in_memory(2, small_settings()).unwrap();
        let points = random_points(100, 2, 8);
        let entries = points
            .iter()
            .enumerate()
            .map(|(i, p)| LeafEntry::new(i as u64, p.clone()))
            .collect();
        tree.bulk_load(entries).unwrap();
        for i in 0..50 {
            assert!(tree.delete(i as u64, &points[i]).unwrap());
        }
        for (i, p) in random_points(50, 2, 9).into_iter().enumerate() {
            tree.insert(1000 + i as u64, p).unwrap();
        }
        tree.check_integrity().unwrap();
        assert_eq!(tree.size(), 100);
    }

    #[test]
    fn test_bulk_load_non_empty_falls_back() {
        let mut tree = RStarTree::in_memory(2, small_settings()).unwrap();
        tree.insert(0, vec![0.0, 0.0]).unwrap();
        let entries = (1..20).map(|i| LeafEntry::new(i, vec![i as f64, 1.0])).collect();
        tree.bulk_load(entries).unwrap();
        tree.check_integrity().unwrap();
        assert_eq!(ids(&tree), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_entry_bulk_load() {
        let mut tree = RStarTree::in_memory(2, small_settings()).unwrap();
        tree.bulk_load(vec![LeafEntry::new(5, vec![1.0, 1.0])]).unwrap();
        assert_eq!(tree.height(), 1);
        tree.check_integrity().unwrap();
        tree.bulk_load(Vec::new()).unwrap();
        assert_eq!(tree.size(), 1);
    }

    #[test]
    fn test_rejects_bad_points() {
        let mut tree = RStarTree::in_memory(2, small_settings()).unwrap();
        assert!(matches!(
            tree.insert(0, vec![1.0]),
            Err(SpatialError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(tree.insert(0, vec![f64::NAN, 0.0]).is_err());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_capacity_checked_against_file_page_size() {
        let dir = tempdir().unwrap();
        let settings = RTreeSettings::builder()
            .leaf_capacity(10)
            .dir_capacity(40)
            .build()
            .unwrap();
        let file = PersistentPageFile::create(&dir.path().join("big.dlct"), 512, 64).unwrap();
        assert!(matches!(
            RStarTree::new(Box::new(file), 2, settings.clone()),
            Err(SpatialError::InvalidConfiguration(_))
        ));

        let settings = RTreeSettings {
            dir_capacity: Some(7),
            ..settings
        };
        let file = PersistentPageFile::create(&dir.path().join("fits.dlct"), 512, 64).unwrap();
        let mut tree = RStarTree::new(Box::new(file), 2, settings).unwrap();
        for (i, p) in random_points(400, 2, 12).into_iter().enumerate() {
            tree.insert(i as u64, p).unwrap();
        }
        assert_eq!(tree.size(), 400);
        assert_eq!(tree.check_integrity().unwrap().entries, 400);
    }

    #[test]
    fn test_persistent_tree_reopens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tree.dlct");
        let points = random_points(300, 2, 10);
        {
            let file = PersistentPageFile::create(&path, 512, 16).unwrap();
            let mut tree = RStarTree::new(Box::new(file), 2, RTreeSettings::default()).unwrap();
            for (i, p) in points.iter().enumerate() {
                tree.insert(i as u64, p.clone()).unwrap();
            }
            for i in 0..30 {
                tree.delete(i as u64, &points[i]).unwrap();
            }
            tree.flush().unwrap();
        }

        let file = PersistentPageFile::open(&path, 16).unwrap();
        let tree = RStarTree::new(Box::new(file), 2, RTreeSettings::default()).unwrap();
        assert_eq!(tree.size(), 270);
        tree.check_integrity().unwrap();
        assert_eq!(ids(&tree), (30..300).collect::<Vec<_>>());

        let file = PersistentPageFile::open(&path, 16).unwrap();
        assert!(matches!(
            RStarTree::new(Box::new(file), 3, RTreeSettings::default()),
            Err(SpatialError::DimensionMismatch { .. })
        ));
    }
}
