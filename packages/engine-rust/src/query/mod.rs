//! Query execution over the primary index and secondary indexes.

pub mod engine;

pub use engine::QueryEngine;
