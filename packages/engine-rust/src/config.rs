//! Engine configuration.

/// Tunables applied per [`TableStore`](crate::storage::TableStore).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of items a backfill pass installs between yield points.
    pub backfill_batch_size: usize,
    /// How many times a backfill compare-and-set may lose to concurrent
    /// writers on one key before surfacing `ConflictRetryExhausted`.
    pub backfill_retry_budget: u32,
    /// Page size used when a query does not specify a limit.
    pub default_page_size: usize,
    /// Hard ceiling on requested page sizes.
    pub max_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backfill_batch_size: 128,
            backfill_retry_budget: 8,
            default_page_size: 100,
            max_page_size: 1000,
        }
    }
}
