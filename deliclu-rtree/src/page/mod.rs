//! Page store: maps page ids to nodes.
//!
//! The tree never holds on to nodes across operations. Every node is read
//! through a [`PageFile`], mutated as a local copy and written back, so the
//! boundary between the logical tree and its storage stays explicit:
//! - [`MemoryPageFile`] keeps nodes in a `HashMap` arena
//! - [`PersistentPageFile`] keeps fixed-size pages in a file behind an LRU cache

use std::sync::atomic::{AtomicU64, Ordering};

use crate::rstar::{Node, PageId, SpatialResult, TreeHeader};

mod memory;
mod page_cache;
mod persistent;
mod storage;

pub use memory::MemoryPageFile;
pub use page_cache::PageCache;
pub use persistent::PersistentPageFile;
pub use storage::{FileHeader, FreePage, PageWithChecksum, Storage};

/// Storage backend of a tree.
///
/// Page id 0 is never allocated; it stands for "no page".
pub trait PageFile: Send + Sync {
    /// Reads the node stored in `page_id`.
    fn read_node(&self, page_id: PageId) -> SpatialResult<Node>;

    /// Stores `node` in the previously allocated page `page_id`.
    fn write_node(&mut self, page_id: PageId, node: &Node) -> SpatialResult<()>;

    /// Reserves a fresh page id.
    fn allocate_page(&mut self) -> SpatialResult<PageId>;

    /// Releases `page_id` for reuse.
    fn free_page(&mut self, page_id: PageId) -> SpatialResult<()>;

    /// The stored tree header, `None` if no tree was ever written.
    fn read_header(&self) -> SpatialResult<Option<TreeHeader>>;

    fn write_header(&mut self, header: &TreeHeader) -> SpatialResult<()>;

    /// Makes every written page durable. A no-op for volatile stores.
    fn flush(&mut self) -> SpatialResult<()>;

    fn page_size(&self) -> usize;

    fn stats(&self) -> PageFileStats;
}

/// Snapshot of the I/O counters of a page file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageFileStats {
    pub reads: u64,
    pub writes: u64,
    pub allocations: u64,
    pub frees: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Pages currently holding a node
    pub live_pages: u64,
}

/// Shared atomic counters behind [`PageFileStats`].
#[derive(Debug, Default)]
pub(crate) struct PageCounters {
    pub reads: AtomicU64,
    pub writes: AtomicU64,
    pub allocations: AtomicU64,
    pub frees: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
}

impl PageCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, live_pages: u64) -> PageFileStats {
        PageFileStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            live_pages,
        }
    }
}
