//! File-backed page file with an LRU cache of decoded nodes.

use std::path::Path;

use log::{debug, warn};
use parking_lot::Mutex;

use super::page_cache::PageCache;
use super::storage::{FileHeader, FreePage, Storage};
use super::{PageCounters, PageFile, PageFileStats};
use crate::rstar::{Node, PageId, SpatialError, SpatialResult, TreeHeader, NO_PAGE};

/// Page file stored on disk.
///
/// Writes go to the cache and reach the file when the page is evicted or on
/// [`flush`](PageFile::flush). Dropping the page file flushes on a best-effort
/// basis; call `flush` to observe errors.
pub struct PersistentPageFile {
    storage: Storage,
    cache: Mutex<PageCache>,
    header: FileHeader,
    header_dirty: bool,
    live_pages: u64,
    counters: PageCounters,
    closed: bool,
}

impl PersistentPageFile {
    /// Creates a new, empty page file at `path`, replacing any existing file.
    pub fn create(path: &Path, page_size: usize, cache_pages: usize) -> SpatialResult<Self> {
        let storage = Storage::create(path, page_size)?;
        let header = FileHeader::new(page_size);
        storage.write_header(&header)?;
        debug!("Created page file {:?} with {} byte pages", path, page_size);

        Ok(Self {
            storage,
            cache: Mutex::new(PageCache::new(cache_pages)),
            header,
            header_dirty: false,
            live_pages: 0,
            counters: PageCounters::default(),
            closed: false,
        })
    }

    /// Opens an existing page file.
    pub fn open(path: &Path, cache_pages: usize) -> SpatialResult<Self> {
        let (storage, header) = Storage::open(path)?;
        let live_pages = header
            .next_page_id
            .saturating_sub(1 + header.free_page_count);
        debug!(
            "Opened page file {:?}: {} pages, root {}, height {}",
            path, header.next_page_id, header.root_page, header.height
        );

        Ok(Self {
            storage,
            cache: Mutex::new(PageCache::new(cache_pages)),
            header,
            header_dirty: false,
            live_pages,
            counters: PageCounters::default(),
            closed: false,
        })
    }

    /// Flushes and releases the page file. Further use fails with
    /// [`SpatialError::Closed`].
    pub fn close(&mut self) -> SpatialResult<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.cache.lock().clear();
        self.closed = true;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    fn check_open(&self) -> SpatialResult<()> {
        if self.closed {
            return Err(SpatialError::Closed);
        }
        Ok(())
    }

    fn check_allocated(&self, page_id: PageId) -> SpatialResult<()> {
        if page_id == NO_PAGE || page_id >= self.header.next_page_id {
            return Err(SpatialError::PageNotFound(page_id));
        }
        Ok(())
    }

    /// Adds a node to the cache, writing back whatever it evicts.
    fn cache_node(
        &self,
        cache: &mut PageCache,
        page_id: PageId,
        node: Node,
        dirty: bool,
    ) -> SpatialResult<()> {
        while cache.needs_eviction(page_id) {
            match cache.evict_oldest() {
                Some((evicted_id, evicted, true)) => {
                    self.storage.write_page(evicted_id, &evicted)?;
                    PageCounters::bump(&self.counters.writes);
                }
                Some(_) => {}
                None => break,
            }
        }
        cache.insert(page_id, node, dirty);
        Ok(())
    }
}

impl PageFile for PersistentPageFile {
    fn read_node(&self, page_id: PageId) -> SpatialResult<Node> {
        self.check_open()?;
        self.check_allocated(page_id)?;
        let mut cache = self.cache.lock();
        if let Some(node) = cache.get(page_id) {
            PageCounters::bump(&self.counters.cache_hits);
            return Ok(node.clone());
        }

        PageCounters::bump(&self.counters.cache_misses);
        PageCounters::bump(&self.counters.reads);
        let node = self.storage.read_page(page_id)?;
        self.cache_node(&mut cache, page_id, node.clone(), false)?;
        Ok(node)
    }

    fn write_node(&mut self, page_id: PageId, node: &Node) -> SpatialResult<()> {
        self.check_open()?;
        self.check_allocated(page_id)?;
        // Reject nodes that could never be written back
        self.storage.encode_page(node)?;
        let mut cache = self.cache.lock();
        self.cache_node(&mut cache, page_id, node.clone(), true)
    }

    fn allocate_page(&mut self) -> SpatialResult<PageId> {
        self.check_open()?;
        PageCounters::bump(&self.counters.allocations);
        self.header_dirty = true;
        self.live_pages += 1;

        if self.header.free_list_head != NO_PAGE {
            let page_id = self.header.free_list_head;
            let free = self.storage.read_free_page(page_id)?;
            self.header.free_list_head = free.next_free;
            self.header.free_page_count = self.header.free_page_count.saturating_sub(1);
            return Ok(page_id);
        }

        let page_id = self.header.next_page_id;
        self.header.next_page_id += 1;
        Ok(page_id)
    }

    fn free_page(&mut self, page_id: PageId) -> SpatialResult<()> {
        self.check_open()?;
        self.check_allocated(page_id)?;
        PageCounters::bump(&self.counters.frees);
        self.cache.lock().remove(page_id);

        let link = FreePage {
            next_free: self.header.free_list_head,
        };
        self.storage.write_free_page(page_id, &link)?;
        self.header.free_list_head = page_id;
        self.header.free_page_count += 1;
        self.header_dirty = true;
        self.live_pages = self.live_pages.saturating_sub(1);
        Ok(())
    }

    fn read_header(&self) -> SpatialResult<Option<TreeHeader>> {
        self.check_open()?;
        if self.header.dim == 0 {
            return Ok(None);
        }
        Ok(Some(TreeHeader {
            root_page: self.header.root_page,
            height: self.header.height,
            size: self.header.size,
            dim: self.header.dim,
        }))
    }

    fn write_header(&mut self, header: &TreeHeader) -> SpatialResult<()> {
        self.check_open()?;
        self.header.root_page = header.root_page;
        self.header.height = header.height;
        self.header.size = header.size;
        self.header.dim = header.dim;
        self.header_dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> SpatialResult<()> {
        self.check_open()?;
        {
            let mut cache = self.cache.lock();
            let mut written = Vec::new();
            for (page_id, node) in cache.dirty_pages() {
                self.storage.write_page(page_id, node)?;
                PageCounters::bump(&self.counters.writes);
                written.push(page_id);
            }
            for page_id in written {
                cache.mark_clean(page_id);
            }
        }
        if self.header_dirty {
            self.storage.write_header(&self.header)?;
            self.header_dirty = false;
        }
        self.storage.sync()
    }

    fn page_size(&self) -> usize {
        self.storage.page_size()
    }

    fn stats(&self) -> PageFileStats {
        self.counters.snapshot(self.live_pages)
    }
}

impl Drop for PersistentPageFile {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.flush() {
                warn!("Failed to flush page file {:?} on drop: {}", self.path(), e);
            }
        }
    }
}
