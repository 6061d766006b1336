use std::collections::{HashMap, HashSet};

use super::{PageCounters, PageFile, PageFileStats};
use crate::rstar::{Node, PageId, SpatialError, SpatialResult, TreeHeader, NO_PAGE};
use crate::settings::DEFAULT_PAGE_SIZE;

/// Volatile page file: an arena of nodes keyed by page id.
#[derive(Debug)]
pub struct MemoryPageFile {
    pages: HashMap<PageId, Node>,
    free_list: Vec<PageId>,
    free_set: HashSet<PageId>,
    next_page_id: PageId,
    header: Option<TreeHeader>,
    page_size: usize,
    counters: PageCounters,
}

impl MemoryPageFile {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// An arena reporting `page_size`, used to derive node capacities.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            pages: HashMap::new(),
            free_list: Vec::new(),
            free_set: HashSet::new(),
            next_page_id: NO_PAGE + 1,
            header: None,
            page_size,
            counters: PageCounters::default(),
        }
    }

    fn check_allocated(&self, page_id: PageId) -> SpatialResult<()> {
        if page_id == NO_PAGE || page_id >= self.next_page_id || self.free_set.contains(&page_id) {
            return Err(SpatialError::PageNotFound(page_id));
        }
        Ok(())
    }
}

impl Default for MemoryPageFile {
    fn default() -> Self {
        Self::new()
    }
}

impl PageFile for MemoryPageFile {
    fn read_node(&self, page_id: PageId) -> SpatialResult<Node> {
        PageCounters::bump(&self.counters.reads);
        self.pages
            .get(&page_id)
            .cloned()
            .ok_or(SpatialError::PageNotFound(page_id))
    }

    fn write_node(&mut self, page_id: PageId, node: &Node) -> SpatialResult<()> {
        self.check_allocated(page_id)?;
        PageCounters::bump(&self.counters.writes);
        self.pages.insert(page_id, node.clone());
        Ok(())
    }

    fn allocate_page(&mut self) -> SpatialResult<PageId> {
        PageCounters::bump(&self.counters.allocations);
        if let Some(page_id) = self.free_list.pop() {
            self.free_set.remove(&page_id);
            return Ok(page_id);
        }
        let page_id = self.next_page_id;
        self.next_page_id += 1;
        Ok(page_id)
    }

    fn free_page(&mut self, page_id: PageId) -> SpatialResult<()> {
        self.check_allocated(page_id)?;
        PageCounters::bump(&self.counters.frees);
        self.pages.remove(&page_id);
        self.free_list.push(page_id);
        self.free_set.insert(page_id);
        Ok(())
    }

    fn read_header(&self) -> SpatialResult<Option<TreeHeader>> {
        Ok(self.header)
    }

    fn write_header(&mut self, header: &TreeHeader) -> SpatialResult<()> {
        self.header = Some(*header);
        Ok(())
    }

    fn flush(&mut self) -> SpatialResult<()> {
        Ok(())
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn stats(&self) -> PageFileStats {
        self.counters.snapshot(self.pages.len() as u64)
    }
}
