//! Ordered storage engine trait.
//!
//! Defines [`StorageEngine`], the innermost storage layer: ordered
//! key-value storage over encoded primary keys. The encoding
//! (`strata_core::key`) guarantees that byte order equals logical
//! (partition, sort) order, so range queries reduce to byte-range scans.

use super::record::VersionedItem;

/// Half-open byte range over encoded keys.
///
/// `lower` is inclusive unless `lower_exclusive` is set (the cursor-resume
/// case, strictly after the last evaluated key). `upper` is always
/// exclusive; `None` means unbounded.
#[derive(Debug, Clone)]
pub struct ScanRange {
    /// Lower bound on encoded keys.
    pub lower: Vec<u8>,
    /// Whether `lower` itself is excluded.
    pub lower_exclusive: bool,
    /// Exclusive upper bound, or `None` for unbounded.
    pub upper: Option<Vec<u8>>,
}

impl ScanRange {
    /// Range covering every key that starts with `prefix`.
    #[must_use]
    pub fn prefix(prefix: Vec<u8>) -> Self {
        let upper = strata_core::key::prefix_successor(&prefix);
        Self {
            lower: prefix,
            lower_exclusive: false,
            upper,
        }
    }

    /// Unbounded range over the whole key space.
    #[must_use]
    pub fn all() -> Self {
        Self {
            lower: Vec::new(),
            lower_exclusive: false,
            upper: None,
        }
    }

    /// Moves the lower bound strictly after `key` (cursor resumption).
    #[must_use]
    pub fn resume_after(mut self, key: Vec<u8>) -> Self {
        self.lower = key;
        self.lower_exclusive = true;
        self
    }

    /// Whether `key` lies inside the range.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        let above_lower = if self.lower_exclusive {
            key > self.lower.as_slice()
        } else {
            key >= self.lower.as_slice()
        };
        above_lower
            && self
                .upper
                .as_deref()
                .is_none_or(|upper| key < upper)
    }
}

/// Ordered key-value storage over encoded primary keys.
///
/// Innermost storage layer. Implementations are in-memory and
/// synchronous; scans are mutation-tolerant (concurrent writes do not
/// fail an in-progress scan, they are simply seen or not seen).
///
/// Wrapped in `Arc<dyn StorageEngine>` for sharing across async
/// boundaries, including the backfill task.
pub trait StorageEngine: Send + Sync + 'static {
    /// Insert or replace a record by encoded key. Returns the previous
    /// record if any.
    fn put(&self, key: &[u8], record: VersionedItem) -> Option<VersionedItem>;

    /// Retrieve a record by encoded key, or `None` if not present.
    fn get(&self, key: &[u8]) -> Option<VersionedItem>;

    /// Remove a record by encoded key, returning the removed record.
    fn remove(&self, key: &[u8]) -> Option<VersionedItem>;

    /// Check if a key exists without returning the record.
    fn contains_key(&self, key: &[u8]) -> bool;

    /// Number of entries.
    fn len(&self) -> usize;

    /// Whether the storage is empty.
    fn is_empty(&self) -> bool;

    /// Up to `limit` entries inside `range`, ascending by encoded key.
    fn scan(&self, range: &ScanRange, limit: usize) -> Vec<(Vec<u8>, VersionedItem)>;

    /// Point-in-time snapshot of all entries, ascending by encoded key.
    fn snapshot_iter(&self) -> Vec<(Vec<u8>, VersionedItem)>;
}
