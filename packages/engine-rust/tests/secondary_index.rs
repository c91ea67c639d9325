//! Secondary index lifecycle: sparse membership, backfill behind live
//! writes, delete cascade, and index-backed queries.

use std::sync::Arc;

use strata_core::{
    IndexSchema, Item, KeyDefinition, KeyType, KeyValue, Projection, QueryRequest, SortPredicate,
    TableSchema, Value,
};
use strata_engine::{EngineError, IndexStatus, QueryEngine, TableStore};

fn orders_schema() -> TableSchema {
    TableSchema {
        name: "orders".to_string(),
        partition_key: KeyDefinition::new("customer", KeyType::String),
        sort_key: Some(KeyDefinition::new("order_id", KeyType::String)),
    }
}

fn order(customer: &str, order_id: &str, status: Option<&str>) -> Item {
    let mut item = Item::new();
    item.insert("customer".to_string(), Value::String(customer.to_string()));
    item.insert("order_id".to_string(), Value::String(order_id.to_string()));
    if let Some(status) = status {
        item.insert("status".to_string(), Value::String(status.to_string()));
    }
    item
}

fn status_index() -> IndexSchema {
    IndexSchema {
        name: "by-status".to_string(),
        hash_key: KeyDefinition::new("status", KeyType::String),
        range_key: Some(KeyDefinition::new("order_id", KeyType::String)),
        projection: Projection::All,
    }
}

fn order_ids(items: &[Item]) -> Vec<String> {
    items
        .iter()
        .map(|item| match item.get("order_id") {
            Some(Value::String(s)) => s.clone(),
            other => panic!("unexpected order_id value: {other:?}"),
        })
        .collect()
}

#[tokio::test]
async fn sparse_index_tracks_attribute_lifecycle() {
    let store = TableStore::in_memory(orders_schema());
    store.create_index(status_index()).unwrap().wait().await.unwrap();

    // No status attribute: not indexed.
    store.put(order("alice", "o-1", None)).await.unwrap();
    let engine = QueryEngine::new(&store);
    let open = QueryRequest::on_index("by-status", "status", KeyValue::String("open".to_string()));
    assert!(engine.query(&open).unwrap().items.is_empty());

    // Attribute appears: the item joins the index.
    store.put(order("alice", "o-1", Some("open"))).await.unwrap();
    assert_eq!(order_ids(&engine.query(&open).unwrap().items), vec!["o-1"]);

    // Attribute changes: the item moves between hash buckets.
    store.put(order("alice", "o-1", Some("shipped"))).await.unwrap();
    assert!(engine.query(&open).unwrap().items.is_empty());
    let shipped =
        QueryRequest::on_index("by-status", "status", KeyValue::String("shipped".to_string()));
    assert_eq!(order_ids(&engine.query(&shipped).unwrap().items), vec!["o-1"]);

    // Attribute removed: the item leaves the index entirely.
    store.put(order("alice", "o-1", None)).await.unwrap();
    assert!(engine.query(&shipped).unwrap().items.is_empty());
    // The base item itself is untouched.
    assert!(store
        .get(
            KeyValue::String("alice".to_string()),
            Some(KeyValue::String("o-1".to_string())),
        )
        .is_ok());
}

#[tokio::test]
async fn backfill_folds_in_preexisting_items() {
    let store = TableStore::in_memory(orders_schema());
    for i in 0..40 {
        let status = if i % 2 == 0 { Some("open") } else { None };
        store
            .put(order("alice", &format!("o-{i:02}"), status))
            .await
            .unwrap();
    }

    let handle = store.create_index(status_index()).unwrap();
    handle.wait().await.unwrap();

    assert_eq!(store.index_status("by-status").unwrap(), IndexStatus::Active);
    let state = store.indexes().get("by-status").unwrap();
    assert_eq!(state.len(), 20, "only items carrying the attribute qualify");

    let engine = QueryEngine::new(&store);
    let page = engine
        .query(
            &QueryRequest::on_index("by-status", "status", KeyValue::String("open".to_string()))
                .with_limit(100),
        )
        .unwrap();
    assert_eq!(page.items.len(), 20);
    // Range order within the hash bucket.
    let ids = order_ids(&page.items);
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[tokio::test]
async fn live_writes_during_backfill_are_never_lost() {
    let store = Arc::new(TableStore::in_memory(orders_schema()));
    for i in 0..200 {
        store
            .put(order("alice", &format!("o-{i:03}"), Some("open")))
            .await
            .unwrap();
    }

    let handle = store.create_index(status_index()).unwrap();

    // Overwrite a slice of the table while the backfill walks it.
    let writer = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            for i in 0..200 {
                if i % 4 == 0 {
                    store
                        .put(order("alice", &format!("o-{i:03}"), Some("shipped")))
                        .await
                        .unwrap();
                }
            }
        })
    };

    writer.await.unwrap();
    handle.wait().await.unwrap();

    let engine = QueryEngine::new(&store);
    let shipped = engine
        .query(
            &QueryRequest::on_index(
                "by-status",
                "status",
                KeyValue::String("shipped".to_string()),
            )
            .with_limit(500),
        )
        .unwrap();
    let open = engine
        .query(
            &QueryRequest::on_index("by-status", "status", KeyValue::String("open".to_string()))
                .with_limit(500),
        )
        .unwrap();

    // The live write always wins over the backfilled snapshot.
    assert_eq!(shipped.items.len(), 50);
    assert_eq!(open.items.len(), 150);
}

#[tokio::test]
async fn delete_cascades_to_every_index() {
    let store = TableStore::in_memory(orders_schema());
    store.create_index(status_index()).unwrap().wait().await.unwrap();
    store
        .create_index(IndexSchema {
            name: "by-customer-status".to_string(),
            hash_key: KeyDefinition::new("status", KeyType::String),
            range_key: None,
            projection: Projection::KeysOnly,
        })
        .unwrap()
        .wait()
        .await
        .unwrap();

    store.put(order("alice", "o-1", Some("open"))).await.unwrap();
    store
        .delete(
            KeyValue::String("alice".to_string()),
            Some(KeyValue::String("o-1".to_string())),
        )
        .await
        .unwrap();

    assert!(store.indexes().get("by-status").unwrap().is_empty());
    assert!(store.indexes().get("by-customer-status").unwrap().is_empty());
}

#[tokio::test]
async fn range_predicates_apply_to_the_index_range_key() {
    let store = TableStore::in_memory(orders_schema());
    store.create_index(status_index()).unwrap().wait().await.unwrap();
    for id in ["o-01", "o-02", "p-01"] {
        store.put(order("alice", id, Some("open"))).await.unwrap();
    }

    let engine = QueryEngine::new(&store);
    let page = engine
        .query(
            &QueryRequest::on_index("by-status", "status", KeyValue::String("open".to_string()))
                .with_range("order_id", SortPredicate::BeginsWith("o-".to_string())),
        )
        .unwrap();
    assert_eq!(order_ids(&page.items), vec!["o-01", "o-02"]);

    // Predicate on an attribute that is not the index range key.
    let result = engine.query(
        &QueryRequest::on_index("by-status", "status", KeyValue::String("open".to_string()))
            .with_range("customer", SortPredicate::Eq(KeyValue::String("alice".to_string()))),
    );
    assert!(matches!(result, Err(EngineError::SchemaMismatch { .. })));
}

#[tokio::test]
async fn drop_index_cancels_backfill_and_unregisters() {
    let store = TableStore::in_memory(orders_schema());
    for i in 0..500 {
        store
            .put(order("alice", &format!("o-{i:04}"), Some("open")))
            .await
            .unwrap();
    }

    let handle = store.create_index(status_index()).unwrap();
    store.drop_index("by-status").unwrap();
    // The task observes the cancel and exits without error.
    handle.wait().await.unwrap();

    assert!(matches!(
        store.indexes().get("by-status"),
        Err(EngineError::IndexNotFound { .. })
    ));
    assert!(matches!(
        store.drop_index("by-status"),
        Err(EngineError::IndexNotFound { .. })
    ));

    // The name is reusable afterwards.
    store.create_index(status_index()).unwrap().wait().await.unwrap();
    assert_eq!(store.index_status("by-status").unwrap(), IndexStatus::Active);
}

#[tokio::test]
async fn index_membership_checks_attribute_types_on_write() {
    let store = TableStore::in_memory(orders_schema());
    store.create_index(status_index()).unwrap().wait().await.unwrap();

    let mut item = order("alice", "o-1", None);
    item.insert("status".to_string(), Value::Int(3));
    assert!(matches!(
        store.put(item).await,
        Err(EngineError::SchemaMismatch { .. })
    ));
    assert!(store.is_empty(), "rejected writes leave no trace");
}
