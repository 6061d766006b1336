//! LRU cache of decoded node pages.
//!
//! Nodes enter the cache when first read or when written; dirty nodes are
//! written back by the owner when they are evicted or flushed.

use std::collections::{HashMap, VecDeque};

use crate::rstar::{Node, PageId};

struct CachedPage {
    node: Node,
    dirty: bool,
}

/// Least-recently-used page cache.
pub struct PageCache {
    pages: HashMap<PageId, CachedPage>,
    /// Front = least recently used
    lru_order: VecDeque<PageId>,
    max_pages: usize,
}

impl PageCache {
    pub fn new(max_pages: usize) -> Self {
        Self {
            pages: HashMap::new(),
            lru_order: VecDeque::new(),
            max_pages: max_pages.max(1),
        }
    }

    fn touch(&mut self, page_id: PageId) {
        if let Some(pos) = self.lru_order.iter().rposition(|&id| id == page_id) {
            self.lru_order.remove(pos);
        }
        self.lru_order.push_back(page_id);
    }

    /// Returns the cached node, marking it most recently used.
    pub fn get(&mut self, page_id: PageId) -> Option<&Node> {
        if !self.pages.contains_key(&page_id) {
            return None;
        }
        self.touch(page_id);
        self.pages.get(&page_id).map(|c| &c.node)
    }

    /// Stores a node. A page that is already dirty stays dirty.
    pub fn insert(&mut self, page_id: PageId, node: Node, dirty: bool) {
        self.touch(page_id);
        let dirty = dirty || self.pages.get(&page_id).is_some_and(|c| c.dirty);
        self.pages.insert(page_id, CachedPage { node, dirty });
    }

    /// True when inserting a page that is not cached yet requires an eviction.
    pub fn needs_eviction(&self, page_id: PageId) -> bool {
        !self.pages.contains_key(&page_id) && self.pages.len() >= self.max_pages
    }

    /// Removes the least recently used page, returning it with its dirty flag.
    pub fn evict_oldest(&mut self) -> Option<(PageId, Node, bool)> {
        while let Some(page_id) = self.lru_order.pop_front() {
            if let Some(cached) = self.pages.remove(&page_id) {
                return Some((page_id, cached.node, cached.dirty));
            }
        }
        None
    }

    /// Dirty pages in ascending page order.
    pub fn dirty_pages(&self) -> Vec<(PageId, &Node)> {
        let mut dirty: Vec<(PageId, &Node)> = self
            .pages
            .iter()
            .filter(|(_, c)| c.dirty)
            .map(|(id, c)| (*id, &c.node))
            .collect();
        dirty.sort_unstable_by_key(|(id, _)| *id);
        dirty
    }

    pub fn mark_clean(&mut self, page_id: PageId) {
        if let Some(cached) = self.pages.get_mut(&page_id) {
            cached.dirty = false;
        }
    }

    /// Drops a page without writing it back.
    pub fn remove(&mut self, page_id: PageId) -> Option<Node> {
        if let Some(pos) = self.lru_order.iter().position(|&id| id == page_id) {
            self.lru_order.remove(pos);
        }
        self.pages.remove(&page_id).map(|c| c.node)
    }

    /// Drops every page without writing anything back.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.lru_order.clear();
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.contains_key(&page_id)
    }

    pub fn is_dirty(&self, page_id: PageId) -> bool {
        self.pages.get(&page_id).is_some_and(|c| c.dirty)
    }
}
