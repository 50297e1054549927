//! Configuration, pooled stores and shared `Database` handles.

use std::sync::Arc;

use neo4j_ogm::{Database, MemoryStore, NodeClass, OgmConfig, Property, Schema, StorePool, Value};

fn schema() -> Arc<Schema> {
    Schema::builder()
        .node(
            NodeClass::builder("Tag")
                .property("label", Property::string().unique_index())
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_handles_share_a_pooled_store() {
    let pool: StorePool<MemoryStore> = StorePool::new();
    let config = OgmConfig::from_json(r#"{"store_name": "tags", "category_index": "categories"}"#).unwrap();

    let store = pool.open(&config, |_| Ok(MemoryStore::new())).unwrap();
    let writer = Database::with_shared(store, schema(), config.clone());
    let mut tag = writer.node("Tag").unwrap().with("label", "rust").unwrap();
    tag.save(&writer).await.unwrap();

    let again = pool.open(&config, |_| panic!("store is already open")).unwrap();
    let reader = Database::with_shared(again, schema(), config.clone());
    let found = reader.index("Tag").unwrap().get(&[("label", Value::from("rust"))]).await.unwrap();
    assert_eq!(found, tag);

    assert_eq!(reader.store().index_entries("categories").len(), 1);
    assert!(reader.store().index_entries("category").is_empty());

    assert!(pool.close("tags"));
    assert!(pool.get("tags").is_none());
    // Handles outlive the pool entry.
    assert_eq!(reader.category("Tag").await.unwrap().instances(&reader).await.unwrap().len(), 1);
}
