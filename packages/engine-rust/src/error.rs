//! Engine error types.

use strata_core::SchemaViolation;

/// Errors surfaced by engine operations.
///
/// Read paths distinguish empty results from failures: a range or index
/// query only ever returns an empty page on success, never to mask a
/// schema or index-name problem.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The requested key does not exist. Surfaced by `get`; `delete`
    /// treats an absent key as success.
    #[error("item not found: {key}")]
    NotFound {
        /// Display form of the requested primary key.
        key: String,
    },

    /// An item or query does not match the declared table/index schema.
    #[error("schema mismatch: {violation}")]
    SchemaMismatch {
        /// The attribute-level failure.
        violation: SchemaViolation,
    },

    /// A query targeted an index that is not registered.
    #[error("index not found: {name}")]
    IndexNotFound {
        /// The requested index name.
        name: String,
    },

    /// `create_index` was called with a name that is already registered.
    #[error("index already exists: {name}")]
    IndexAlreadyExists {
        /// The colliding index name.
        name: String,
    },

    /// Index backfill lost its compare-and-set race against concurrent
    /// writers beyond the retry budget. The backfill may be re-run.
    #[error("backfill conflict retries exhausted for key {key} on index {index}")]
    ConflictRetryExhausted {
        /// The index being backfilled.
        index: String,
        /// Display form of the contended primary key.
        key: String,
    },

    /// A continuation token could not be decoded or belongs to a
    /// different index than the request targets.
    #[error("invalid cursor: {reason}")]
    InvalidCursor {
        /// Why the cursor was rejected.
        reason: String,
    },

    /// Internal failure (persistence backend, task join, etc.).
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SchemaViolation> for EngineError {
    fn from(violation: SchemaViolation) -> Self {
        EngineError::SchemaMismatch { violation }
    }
}
