//! Read surface: hash-equality queries with range predicates, and full
//! table scans, both cursor-paginated.

use strata_core::key::prefix_successor;
use strata_core::{
    Cursor, KeyDefinition, KeyValue, QueryPage, QueryRequest, RangeCondition, SortPredicate,
};

use crate::error::EngineError;
use crate::index::keys;
use crate::storage::engine::ScanRange;
use crate::storage::table_store::TableStore;

/// Read-only query surface over a [`TableStore`].
///
/// Pagination is caller-driven: each page carries an opaque token
/// encoding the last evaluated key, and resumption is strictly after
/// that key. The engine holds no continuation state, so cursors survive
/// restarts and interleaved writes; items inserted behind the cursor are
/// simply not revisited.
pub struct QueryEngine<'s> {
    store: &'s TableStore,
}

impl<'s> QueryEngine<'s> {
    /// Wraps a table store.
    #[must_use]
    pub fn new(store: &'s TableStore) -> Self {
        Self { store }
    }

    /// Runs a hash-equality query with an optional range predicate
    /// against the primary index or a named secondary index.
    ///
    /// Items come back ascending by sort/range order. A `Between` whose
    /// lower bound exceeds its upper bound yields an empty final page.
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` when the condition attributes or value types do
    /// not match the selected index's declaration, `IndexNotFound` for an
    /// unregistered index name, and `InvalidCursor` for a malformed token
    /// or one minted by a different index.
    pub fn query(&self, request: &QueryRequest) -> Result<QueryPage, EngineError> {
        let limit = self.effective_limit(request.limit);

        match &request.index {
            None => self.query_primary(request, limit),
            Some(name) => self.query_index(name, request, limit),
        }
    }

    /// Scans the whole table in primary-key order, one page at a time.
    ///
    /// # Errors
    ///
    /// `InvalidCursor` on a malformed token or one minted by an index
    /// query.
    pub fn scan(&self, limit: Option<usize>, cursor: Option<&str>) -> Result<QueryPage, EngineError> {
        let limit = self.effective_limit(limit);
        let mut range = ScanRange::all();
        if let Some(token) = cursor {
            let decoded = decode_cursor(token, None)?;
            range = resume_within(range, decoded.last_key)?;
        }

        let mut rows = self.store.engine().scan(&range, limit + 1);
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = self.cursor_after(&rows, None, has_more)?;
        Ok(QueryPage {
            items: rows.into_iter().map(|(_, record)| record.item).collect(),
            next_cursor,
            has_more,
        })
    }

    fn query_primary(
        &self,
        request: &QueryRequest,
        limit: usize,
    ) -> Result<QueryPage, EngineError> {
        let schema = self.store.schema();
        check_hash_condition(&schema.partition_key, request)?;

        let range = match &request.range {
            None => Some(ScanRange::prefix(keys::hash_prefix(&request.hash_value))),
            Some(condition) => {
                let Some(sort_def) = &schema.sort_key else {
                    return Err(schema_mismatch(
                        &condition.attribute,
                        "table has no sort key to apply a range condition to",
                    ));
                };
                build_range(&request.hash_value, sort_def, condition)?
            }
        };
        let Some(mut range) = range else {
            return Ok(empty_page());
        };

        if let Some(token) = &request.cursor {
            let decoded = decode_cursor(token, None)?;
            range = resume_within(range, decoded.last_key)?;
        }

        let mut rows = self.store.engine().scan(&range, limit + 1);
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = self.cursor_after(&rows, None, has_more)?;
        Ok(QueryPage {
            items: rows.into_iter().map(|(_, record)| record.item).collect(),
            next_cursor,
            has_more,
        })
    }

    fn query_index(
        &self,
        name: &str,
        request: &QueryRequest,
        limit: usize,
    ) -> Result<QueryPage, EngineError> {
        let state = self.store.indexes().get(name)?;
        let schema = state.schema().clone();
        check_hash_condition(&schema.hash_key, request)?;

        let range = match &request.range {
            None => Some(ScanRange::prefix(keys::hash_prefix(&request.hash_value))),
            Some(condition) => {
                let Some(range_def) = &schema.range_key else {
                    return Err(schema_mismatch(
                        &condition.attribute,
                        "index has no range key to apply a range condition to",
                    ));
                };
                build_range(&request.hash_value, range_def, condition)?
            }
        };
        let Some(mut scan_range) = range else {
            return Ok(empty_page());
        };

        if let Some(token) = &request.cursor {
            let decoded = decode_cursor(token, Some(name))?;
            scan_range = resume_within(scan_range, decoded.last_key)?;
        }

        let mut rows = state.scan(&scan_range, limit + 1);
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = match (has_more, rows.last()) {
            (true, Some((last_key, _))) => Some(encode_cursor(Some(name), last_key)?),
            _ => None,
        };
        Ok(QueryPage {
            items: rows.into_iter().map(|(_, entry)| entry.projected).collect(),
            next_cursor,
            has_more,
        })
    }

    fn effective_limit(&self, requested: Option<usize>) -> usize {
        let config = self.store.config();
        requested
            .unwrap_or(config.default_page_size)
            .clamp(1, config.max_page_size)
    }

    fn cursor_after<T>(
        &self,
        rows: &[(Vec<u8>, T)],
        index: Option<&str>,
        has_more: bool,
    ) -> Result<Option<String>, EngineError> {
        match (has_more, rows.last()) {
            (true, Some((last_key, _))) => Ok(Some(encode_cursor(index, last_key)?)),
            _ => Ok(None),
        }
    }
}

fn empty_page() -> QueryPage {
    QueryPage {
        items: Vec::new(),
        next_cursor: None,
        has_more: false,
    }
}

fn schema_mismatch(attribute: &str, reason: &str) -> EngineError {
    EngineError::SchemaMismatch {
        violation: strata_core::SchemaViolation {
            attribute: attribute.to_string(),
            reason: reason.to_string(),
        },
    }
}

fn check_hash_condition(
    declared: &KeyDefinition,
    request: &QueryRequest,
) -> Result<(), EngineError> {
    if request.hash_attribute != declared.name {
        return Err(schema_mismatch(
            &request.hash_attribute,
            &format!("hash condition must target '{}'", declared.name),
        ));
    }
    declared.check_value(&request.hash_value)?;
    Ok(())
}

/// Translates a range predicate into a byte range over encoded keys.
///
/// Returns `Ok(None)` for the inverted-`Between` case, which is an empty
/// result rather than an error.
fn build_range(
    hash: &KeyValue,
    range_def: &KeyDefinition,
    condition: &RangeCondition,
) -> Result<Option<ScanRange>, EngineError> {
    if condition.attribute != range_def.name {
        return Err(schema_mismatch(
            &condition.attribute,
            &format!("range condition must target '{}'", range_def.name),
        ));
    }

    match &condition.predicate {
        SortPredicate::Eq(value) => {
            range_def.check_value(value)?;
            Ok(Some(ScanRange::prefix(keys::hash_range_prefix(hash, value))))
        }
        SortPredicate::BeginsWith(text) => {
            if range_def.key_type != strata_core::KeyType::String {
                return Err(schema_mismatch(
                    &condition.attribute,
                    "begins_with applies only to string range attributes",
                ));
            }
            Ok(Some(ScanRange::prefix(keys::hash_begins_with_prefix(
                hash, text,
            ))))
        }
        SortPredicate::Between(low, high) => {
            range_def.check_value(low)?;
            range_def.check_value(high)?;
            if low > high {
                return Ok(None);
            }
            // Inclusive upper bound: everything starting with the encoded
            // (hash, high) pair is in range, including index entries that
            // append a primary-key suffix.
            Ok(Some(ScanRange {
                lower: keys::hash_range_prefix(hash, low),
                lower_exclusive: false,
                upper: prefix_successor(&keys::hash_range_prefix(hash, high)),
            }))
        }
    }
}

/// Resumes `range` strictly after a cursor's last key, rejecting cursors
/// minted against a different hash value or predicate range.
fn resume_within(range: ScanRange, last_key: Vec<u8>) -> Result<ScanRange, EngineError> {
    if !range.contains(&last_key) {
        return Err(EngineError::InvalidCursor {
            reason: "cursor key lies outside the queried range".to_string(),
        });
    }
    Ok(range.resume_after(last_key))
}

fn encode_cursor(index: Option<&str>, last_key: &[u8]) -> Result<String, EngineError> {
    Cursor {
        index: index.map(str::to_string),
        last_key: last_key.to_vec(),
    }
    .encode_token()
    .map_err(EngineError::Internal)
}

fn decode_cursor(token: &str, expected_index: Option<&str>) -> Result<Cursor, EngineError> {
    let cursor = Cursor::decode_token(token).map_err(|e| EngineError::InvalidCursor {
        reason: e.to_string(),
    })?;
    if cursor.index.as_deref() != expected_index {
        return Err(EngineError::InvalidCursor {
            reason: format!(
                "cursor was issued by index {:?}, not {:?}",
                cursor.index, expected_index
            ),
        });
    }
    Ok(cursor)
}

#[cfg(test)]
mod tests {
    use strata_core::{
        IndexSchema, Item, KeyType, Projection, TableSchema, Value,
    };

    use super::*;

    fn movies_schema() -> TableSchema {
        TableSchema {
            name: "movies".to_string(),
            partition_key: KeyDefinition::new("year", KeyType::Number),
            sort_key: Some(KeyDefinition::new("title", KeyType::String)),
        }
    }

    fn movie(year: i64, title: &str) -> Item {
        let mut item = Item::new();
        item.insert("year".to_string(), Value::Int(year));
        item.insert("title".to_string(), Value::String(title.to_string()));
        item
    }

    async fn seeded_store() -> TableStore {
        let store = TableStore::in_memory(movies_schema());
        for title in ["Alpha", "Beta", "Gamma"] {
            store.put(movie(2004, title)).await.unwrap();
        }
        store.put(movie(2005, "Delta")).await.unwrap();
        store
    }

    fn titles(page: &QueryPage) -> Vec<&str> {
        page.items
            .iter()
            .map(|item| match item.get("title") {
                Some(Value::String(s)) => s.as_str(),
                other => panic!("unexpected title value: {other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn hash_equality_returns_sorted_partition() {
        let store = seeded_store().await;
        let engine = QueryEngine::new(&store);

        let page = engine
            .query(&QueryRequest::primary("year", KeyValue::Number(2004.0)))
            .unwrap();
        assert_eq!(titles(&page), vec!["Alpha", "Beta", "Gamma"]);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn begins_with_narrows_by_prefix() {
        let store = seeded_store().await;
        store.put(movie(2004, "Gallant")).await.unwrap();
        let engine = QueryEngine::new(&store);

        let page = engine
            .query(
                &QueryRequest::primary("year", KeyValue::Number(2004.0))
                    .with_range("title", SortPredicate::BeginsWith("Ga".to_string())),
            )
            .unwrap();
        assert_eq!(titles(&page), vec!["Gallant", "Gamma"]);
    }

    #[tokio::test]
    async fn between_is_inclusive_on_both_bounds() {
        let store = seeded_store().await;
        let engine = QueryEngine::new(&store);

        let page = engine
            .query(
                &QueryRequest::primary("year", KeyValue::Number(2004.0)).with_range(
                    "title",
                    SortPredicate::Between(
                        KeyValue::String("Alpha".to_string()),
                        KeyValue::String("Beta".to_string()),
                    ),
                ),
            )
            .unwrap();
        assert_eq!(titles(&page), vec!["Alpha", "Beta"]);
    }

    #[tokio::test]
    async fn inverted_between_is_empty_not_an_error() {
        let store = seeded_store().await;
        let engine = QueryEngine::new(&store);

        let page = engine
            .query(
                &QueryRequest::primary("year", KeyValue::Number(2004.0)).with_range(
                    "title",
                    SortPredicate::Between(
                        KeyValue::String("Zed".to_string()),
                        KeyValue::String("Alpha".to_string()),
                    ),
                ),
            )
            .unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn pagination_walks_the_partition_without_duplicates() {
        let store = seeded_store().await;
        let engine = QueryEngine::new(&store);

        let mut request =
            QueryRequest::primary("year", KeyValue::Number(2004.0)).with_limit(2);
        let first = engine.query(&request).unwrap();
        assert_eq!(titles(&first), vec!["Alpha", "Beta"]);
        assert!(first.has_more);

        request.cursor = first.next_cursor;
        let second = engine.query(&request).unwrap();
        assert_eq!(titles(&second), vec!["Gamma"]);
        assert!(!second.has_more);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn query_rejects_wrong_attribute_names_and_types() {
        let store = seeded_store().await;
        let engine = QueryEngine::new(&store);

        assert!(matches!(
            engine.query(&QueryRequest::primary("genre", KeyValue::Number(2004.0))),
            Err(EngineError::SchemaMismatch { .. })
        ));
        assert!(matches!(
            engine.query(&QueryRequest::primary(
                "year",
                KeyValue::String("2004".to_string())
            )),
            Err(EngineError::SchemaMismatch { .. })
        ));
        assert!(matches!(
            engine.query(
                &QueryRequest::primary("year", KeyValue::Number(2004.0))
                    .with_range("rating", SortPredicate::Eq(KeyValue::Number(5.0)))
            ),
            Err(EngineError::SchemaMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn begins_with_requires_string_range_type() {
        let schema = TableSchema {
            name: "events".to_string(),
            partition_key: KeyDefinition::new("stream", KeyType::String),
            sort_key: Some(KeyDefinition::new("at", KeyType::Number)),
        };
        let store = TableStore::in_memory(schema);
        let engine = QueryEngine::new(&store);

        let result = engine.query(
            &QueryRequest::primary("stream", KeyValue::String("s1".to_string()))
                .with_range("at", SortPredicate::BeginsWith("20".to_string())),
        );
        assert!(matches!(result, Err(EngineError::SchemaMismatch { .. })));
    }

    #[tokio::test]
    async fn cursor_from_another_index_is_rejected() {
        let store = seeded_store().await;
        store
            .create_index(IndexSchema {
                name: "by-title".to_string(),
                hash_key: KeyDefinition::new("title", KeyType::String),
                range_key: None,
                projection: Projection::All,
            })
            .unwrap()
            .wait()
            .await
            .unwrap();
        let engine = QueryEngine::new(&store);

        let page = engine
            .query(
                &QueryRequest::on_index("by-title", "title", KeyValue::String("Alpha".to_string()))
                    .with_limit(1),
            )
            .unwrap();
        // Single match, so no cursor; mint one by hand off the page shape.
        assert!(page.next_cursor.is_none());

        let foreign = Cursor {
            index: Some("by-title".to_string()),
            last_key: vec![0x21],
        }
        .encode_token()
        .unwrap();
        let result = engine.query(
            &QueryRequest::primary("year", KeyValue::Number(2004.0)).with_cursor(foreign),
        );
        assert!(matches!(result, Err(EngineError::InvalidCursor { .. })));
    }

    #[tokio::test]
    async fn cursor_from_another_partition_is_rejected() {
        let store = seeded_store().await;
        let engine = QueryEngine::new(&store);

        let first = engine
            .query(&QueryRequest::primary("year", KeyValue::Number(2004.0)).with_limit(1))
            .unwrap();
        let cursor = first.next_cursor.unwrap();

        // Replayed against a different hash value the cursor key falls
        // outside the partition's byte range and must not leak items
        // from the one that minted it.
        let result = engine.query(
            &QueryRequest::primary("year", KeyValue::Number(2005.0)).with_cursor(cursor),
        );
        assert!(matches!(result, Err(EngineError::InvalidCursor { .. })));
    }

    #[tokio::test]
    async fn index_cursor_from_another_hash_bucket_is_rejected() {
        let store = seeded_store().await;
        for (title, status) in [("Alpha", "active"), ("Beta", "active"), ("Gamma", "archived")] {
            let mut item = movie(2004, title);
            item.insert("status".to_string(), Value::String(status.to_string()));
            store.put(item).await.unwrap();
        }
        store
            .create_index(IndexSchema {
                name: "by-status".to_string(),
                hash_key: KeyDefinition::new("status", KeyType::String),
                range_key: None,
                projection: Projection::All,
            })
            .unwrap()
            .wait()
            .await
            .unwrap();
        let engine = QueryEngine::new(&store);

        let first = engine
            .query(
                &QueryRequest::on_index(
                    "by-status",
                    "status",
                    KeyValue::String("active".to_string()),
                )
                .with_limit(1),
            )
            .unwrap();
        let cursor = first.next_cursor.unwrap();

        let result = engine.query(
            &QueryRequest::on_index(
                "by-status",
                "status",
                KeyValue::String("archived".to_string()),
            )
            .with_cursor(cursor),
        );
        assert!(matches!(result, Err(EngineError::InvalidCursor { .. })));
    }

    #[tokio::test]
    async fn malformed_cursor_is_rejected() {
        let store = seeded_store().await;
        let engine = QueryEngine::new(&store);
        let result = engine.query(
            &QueryRequest::primary("year", KeyValue::Number(2004.0)).with_cursor("$$$"),
        );
        assert!(matches!(result, Err(EngineError::InvalidCursor { .. })));
    }

    #[tokio::test]
    async fn unknown_index_name_is_surfaced() {
        let store = seeded_store().await;
        let engine = QueryEngine::new(&store);
        let result = engine.query(&QueryRequest::on_index(
            "nope",
            "title",
            KeyValue::String("Alpha".to_string()),
        ));
        assert!(matches!(result, Err(EngineError::IndexNotFound { .. })));
    }

    #[tokio::test]
    async fn scan_pages_through_the_whole_table() {
        let store = seeded_store().await;
        let engine = QueryEngine::new(&store);

        let first = engine.scan(Some(3), None).unwrap();
        assert_eq!(first.items.len(), 3);
        assert!(first.has_more);

        let second = engine
            .scan(Some(3), first.next_cursor.as_deref())
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(!second.has_more);
        assert_eq!(titles(&second), vec!["Delta"]);
    }

    #[tokio::test]
    async fn index_query_returns_projected_items() {
        let store = seeded_store().await;
        let mut tagged = movie(2004, "Beta");
        tagged.insert("status".to_string(), Value::String("active".to_string()));
        tagged.insert("plot".to_string(), Value::String("long".to_string()));
        store.put(tagged).await.unwrap();

        store
            .create_index(IndexSchema {
                name: "by-status".to_string(),
                hash_key: KeyDefinition::new("status", KeyType::String),
                range_key: None,
                projection: Projection::KeysOnly,
            })
            .unwrap()
            .wait()
            .await
            .unwrap();

        let engine = QueryEngine::new(&store);
        let page = engine
            .query(&QueryRequest::on_index(
                "by-status",
                "status",
                KeyValue::String("active".to_string()),
            ))
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(!page.items[0].contains_key("plot"));
        assert!(page.items[0].contains_key("title"));
    }
}
