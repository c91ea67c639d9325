//! [`TableDataStore`](super::data_store::TableDataStore) implementations.

pub mod json_line;
pub mod null;

pub use json_line::JsonLineDataStore;
pub use null::NullDataStore;
