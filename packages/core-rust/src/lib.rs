//! Strata Core — value model, order-preserving key encoding, table/index
//! schemas, and query types shared between the engine and its callers.

pub mod key;
pub mod query;
pub mod schema;
pub mod types;

pub use key::{CompositeKey, KeyType, KeyValue, PrimaryKey};
pub use query::{Cursor, QueryPage, QueryRequest, RangeCondition, SortPredicate};
pub use schema::{IndexSchema, KeyDefinition, Projection, SchemaViolation, TableSchema};
pub use types::{Item, Value};
