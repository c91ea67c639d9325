//! Bulk loading of JSON documents into a table.

use anyhow::Context as _;
use strata_core::{Item, Value};

use crate::error::EngineError;
use crate::storage::table_store::TableStore;

/// Parses a JSON array document into items and writes them in order.
///
/// Each element must be a JSON object; numbers map to `Int` when they fit
/// an `i64` and `Float` otherwise. Loading stops at the first item the
/// table rejects, leaving earlier items applied.
pub struct BulkLoader<'s> {
    store: &'s TableStore,
}

impl<'s> BulkLoader<'s> {
    /// Wraps a table store.
    #[must_use]
    pub fn new(store: &'s TableStore) -> Self {
        Self { store }
    }

    /// Loads a JSON array document, returning the number of items written.
    ///
    /// # Errors
    ///
    /// `Internal` for malformed JSON or a non-array/non-object shape;
    /// per-item engine errors propagate unchanged.
    pub async fn load_json(&self, document: &str) -> Result<usize, EngineError> {
        let items = parse_document(document).map_err(EngineError::Internal)?;
        let total = items.len();
        let written = self.store.put_batch(items).await?;
        tracing::info!(
            table = %self.store.schema().name,
            written,
            total,
            "bulk load finished"
        );
        Ok(written)
    }
}

fn parse_document(document: &str) -> anyhow::Result<Vec<Item>> {
    let parsed: serde_json::Value =
        serde_json::from_str(document).context("document is not valid JSON")?;
    let serde_json::Value::Array(elements) = parsed else {
        anyhow::bail!("document must be a JSON array of objects");
    };
    elements
        .into_iter()
        .enumerate()
        .map(|(position, element)| {
            item_from_json(element).with_context(|| format!("element {position}"))
        })
        .collect()
}

fn item_from_json(value: serde_json::Value) -> anyhow::Result<Item> {
    match Value::from_json(value) {
        Value::Map(map) => Ok(map),
        other => anyhow::bail!("expected a JSON object, got {}", other.type_name()),
    }
}
