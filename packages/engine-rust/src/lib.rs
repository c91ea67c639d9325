//! Strata Engine — an embeddable key-value storage engine with
//! partition/sort-key tables, global secondary indexes with background
//! backfill, and cursor-paginated range queries.

pub mod config;
pub mod error;
pub mod index;
pub mod loader;
pub mod query;
pub mod storage;

pub use config::EngineConfig;
pub use error::EngineError;
pub use index::{BackfillHandle, IndexDescription, IndexStatus, SecondaryIndexManager};
pub use loader::BulkLoader;
pub use query::QueryEngine;
pub use storage::{
    JsonLineDataStore, MutationObserver, NullDataStore, TableDataStore, TableStore,
};
