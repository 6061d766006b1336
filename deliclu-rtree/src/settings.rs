//! Tree configuration.

use crate::rstar::{SpatialError, SpatialResult};

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default number of pages kept in the persistent page cache.
pub const DEFAULT_CACHE_PAGES: usize = 1024;

/// Default relative minimum fill of a node.
pub const DEFAULT_MIN_FILL: f64 = 0.4;

/// Bytes of every page reserved for the node envelope (checksum, variant tag,
/// entry count, level).
pub const PAGE_OVERHEAD: usize = 64;

/// Encoded size of a leaf entry without its coordinates (id, length prefix, state).
const LEAF_ENTRY_BASE: usize = 18;

/// Encoded size of a directory entry without its box (page id, two length prefixes, state).
const DIR_ENTRY_BASE: usize = 26;

/// Where `choose_subtree` minimizes overlap enlargement instead of plain
/// volume enlargement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Only when choosing among the parents of leaves (classic R*-tree).
    #[default]
    LeafParents,
    /// At every directory level.
    AllLevels,
    /// Never; always least volume enlargement.
    Never,
}

/// Ordering used to pack entries during bulk loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BulkSplit {
    /// Sort-tile-recursive: slice by one dimension after the other.
    #[default]
    SortTileRecursive,
    /// Sort by the Hilbert key of the entry centers.
    Hilbert,
}

/// Validated configuration of an R*-tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RTreeSettings {
    pub page_size: usize,
    pub leaf_capacity: Option<usize>,
    pub dir_capacity: Option<usize>,
    pub min_fill: f64,
    pub overlap_policy: OverlapPolicy,
    pub bulk_split: BulkSplit,
    pub bulk_load: bool,
    pub cache_pages: usize,
    pub integrity_checks: bool,
}

impl Default for RTreeSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            leaf_capacity: None,
            dir_capacity: None,
            min_fill: DEFAULT_MIN_FILL,
            overlap_policy: OverlapPolicy::default(),
            bulk_split: BulkSplit::default(),
            bulk_load: true,
            cache_pages: DEFAULT_CACHE_PAGES,
            integrity_checks: cfg!(debug_assertions),
        }
    }
}

impl RTreeSettings {
    pub fn builder() -> RTreeSettingsBuilder {
        RTreeSettingsBuilder::default()
    }

    /// Maximum number of entries of a leaf node for `dim` dimensions.
    ///
    /// An explicit capacity must fit a full leaf into one page.
    pub fn leaf_capacity(&self, dim: usize) -> SpatialResult<usize> {
        let entry_size = LEAF_ENTRY_BASE + 8 * dim;
        match self.leaf_capacity {
            Some(cap) => self.check_fits(cap, entry_size, "leaf"),
            None => self.derive_capacity(entry_size, "leaf"),
        }
    }

    /// Maximum number of entries of a directory node for `dim` dimensions.
    ///
    /// An explicit capacity must fit a full directory node into one page.
    pub fn dir_capacity(&self, dim: usize) -> SpatialResult<usize> {
        let entry_size = DIR_ENTRY_BASE + 16 * dim;
        match self.dir_capacity {
            Some(cap) => self.check_fits(cap, entry_size, "directory"),
            None => self.derive_capacity(entry_size, "directory"),
        }
    }

    /// Minimum number of entries of a non-root node with capacity `capacity`.
    pub fn min_entries(&self, capacity: usize) -> usize {
        let m = (capacity as f64 * self.min_fill).floor() as usize;
        m.clamp(1, (capacity / 2).max(1))
    }

    fn check_fits(&self, capacity: usize, entry_size: usize, kind: &str) -> SpatialResult<usize> {
        let needed = capacity * entry_size + PAGE_OVERHEAD;
        if needed > self.page_size {
            return Err(SpatialError::InvalidConfiguration(format!(
                "{} {} entries of {} bytes need {} bytes, page size is {}",
                capacity, kind, entry_size, needed, self.page_size
            )));
        }
        Ok(capacity)
    }

    fn derive_capacity(&self, entry_size: usize, kind: &str) -> SpatialResult<usize> {
        let capacity = self.page_size.saturating_sub(PAGE_OVERHEAD) / entry_size;
        if capacity < 2 {
            return Err(SpatialError::InvalidConfiguration(format!(
                "page size {} holds only {} {} entries of {} bytes",
                self.page_size, capacity, kind, entry_size
            )));
        }
        Ok(capacity)
    }
}

/// Builder for [`RTreeSettings`].
///
/// # Example
/// ```rust
/// use deliclu_rtree::{OverlapPolicy, RTreeSettings};
///
/// let settings = RTreeSettings::builder()
///     .leaf_capacity(4)
///     .dir_capacity(4)
///     .min_fill(0.5)
///     .overlap_policy(OverlapPolicy::AllLevels)
///     .build()
///     .unwrap();
/// assert_eq!(settings.min_entries(4), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RTreeSettingsBuilder {
    settings: RTreeSettings,
}

impl RTreeSettingsBuilder {
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.settings.page_size = page_size;
        self
    }

    pub fn leaf_capacity(mut self, capacity: usize) -> Self {
        self.settings.leaf_capacity = Some(capacity);
        self
    }

    pub fn dir_capacity(mut self, capacity: usize) -> Self {
        self.settings.dir_capacity = Some(capacity);
        self
    }

    pub fn min_fill(mut self, min_fill: f64) -> Self {
        self.settings.min_fill = min_fill;
        self
    }

    pub fn overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.settings.overlap_policy = policy;
        self
    }

    pub fn bulk_split(mut self, strategy: BulkSplit) -> Self {
        self.settings.bulk_split = strategy;
        self
    }

    pub fn bulk_load(mut self, enabled: bool) -> Self {
        self.settings.bulk_load = enabled;
        self
    }

    pub fn cache_pages(mut self, pages: usize) -> Self {
        self.settings.cache_pages = pages;
        self
    }

    pub fn integrity_checks(mut self, enabled: bool) -> Self {
        self.settings.integrity_checks = enabled;
        self
    }

    pub fn build(self) -> SpatialResult<RTreeSettings> {
        let s = self.settings;
        if !(s.min_fill > 0.0 && s.min_fill <= 0.5) {
            return Err(SpatialError::InvalidConfiguration(format!(
                "min_fill must be in (0, 0.5], got {}",
                s.min_fill
            )));
        }
        for (name, cap) in [("leaf", s.leaf_capacity), ("directory", s.dir_capacity)] {
            if let Some(cap) = cap {
                if cap < 2 {
                    return Err(SpatialError::InvalidConfiguration(format!(
                        "{} capacity must be at least 2, got {}",
                        name, cap
                    )));
                }
            }
        }
        if s.page_size <= PAGE_OVERHEAD {
            return Err(SpatialError::InvalidConfiguration(format!(
                "page size {} is too small",
                s.page_size
            )));
        }
        if s.cache_pages == 0 {
            return Err(SpatialError::InvalidConfiguration(
                "cache must hold at least one page".into(),
            ));
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = RTreeSettings::default();
        assert_eq!(settings.page_size, 4096);
        assert_eq!(settings.overlap_policy, OverlapPolicy::LeafParents);
        assert_eq!(settings.bulk_split, BulkSplit::SortTileRecursive);
        assert!(settings.bulk_load);
        assert_eq!(RTreeSettings::builder().build().unwrap(), settings);
    }

    #[test]
    fn test_derived_capacity() {
        let settings = RTreeSettings::default();
        // (4096 - 64) / (18 + 16)
        assert_eq!(settings.leaf_capacity(2).unwrap(), 118);
        // (4096 - 64) / (26 + 32)
        assert_eq!(settings.dir_capacity(2).unwrap(), 69);
    }

    #[test]
    fn test_explicit_capacity_wins() {
        let settings = RTreeSettings::builder().leaf_capacity(7).build().unwrap();
        assert_eq!(settings.leaf_capacity(10).unwrap(), 7);
    }

    #[test]
    fn test_explicit_capacity_must_fit_page() {
        let settings = RTreeSettings::builder()
            .page_size(512)
            .leaf_capacity(10)
            .dir_capacity(40)
            .build()
            .unwrap();
        // 10 * (18 + 16) + 64 bytes
        assert_eq!(settings.leaf_capacity(2).unwrap(), 10);
        // 40 * (26 + 32) + 64 bytes
        assert!(matches!(
            settings.dir_capacity(2),
            Err(SpatialError::InvalidConfiguration(_))
        ));
        // (512 - 64) / 58 = 7 is the largest directory node that fits
        let settings = RTreeSettings { dir_capacity: Some(7), ..settings };
        assert_eq!(settings.dir_capacity(2).unwrap(), 7);
        let settings = RTreeSettings { dir_capacity: Some(8), ..settings };
        assert!(settings.dir_capacity(2).is_err());
    }

    #[test]
    fn test_tiny_page_rejected_for_high_dimensions() {
        let settings = RTreeSettings::builder().page_size(256).build().unwrap();
        assert!(settings.dir_capacity(64).is_err());
        assert!(settings.leaf_capacity(2).is_ok());
    }

    #[test]
    fn test_min_entries() {
        let settings = RTreeSettings::builder().min_fill(0.5).build().unwrap();
        assert_eq!(settings.min_entries(4), 2);
        assert_eq!(settings.min_entries(5), 2);
        assert_eq!(settings.min_entries(2), 1);

        let settings = RTreeSettings::default();
        assert_eq!(settings.min_entries(10), 4);
        assert_eq!(settings.min_entries(3), 1);
    }

    #[test]
    fn test_invalid_settings() {
        assert!(RTreeSettings::builder().min_fill(0.0).build().is_err());
        assert!(RTreeSettings::builder().min_fill(0.7).build().is_err());
        assert!(RTreeSettings::builder().leaf_capacity(1).build().is_err());
        assert!(RTreeSettings::builder().page_size(32).build().is_err());
        assert!(RTreeSettings::builder().cache_pages(0).build().is_err());
    }
}
