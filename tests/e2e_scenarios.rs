//! End-to-end tests for the mapper against `MemoryStore`.
//!
//! Each test declares a schema, saves instances through the public API and
//! reads them back through relationship managers, traversals and indexes.

use std::sync::Arc;

use neo4j_ogm::{
    props, Cardinality, Database, Direction, Error, GraphStore, MemoryStore, NodeClass, NodeInstance, PropertyMap,
    Property, RelClass, RelationshipDef, Schema, Value,
};
use pretty_assertions::assert_eq;

fn schema() -> Arc<Schema> {
    let person = NodeClass::builder("Person")
        .property("name", Property::string().unique_index().required())
        .property("age", Property::integer().index())
        .relationship("friends", RelationshipDef::outgoing("FRIEND", ["Person"]).model("Friendship"))
        .build()
        .unwrap();
    let employee = NodeClass::builder("Employee")
        .extends(&person)
        .property("title", Property::string())
        .build()
        .unwrap();
    Schema::builder()
        .rel(RelClass::builder("Friendship").property("since", Property::integer()).build().unwrap())
        .node(person)
        .node(employee)
        .node(
            NodeClass::builder("Country")
                .property("name", Property::string())
                .relationship(
                    "capital",
                    RelationshipDef::outgoing("CAPITAL", ["City"]).cardinality(Cardinality::One),
                )
                .build()
                .unwrap(),
        )
        .node(NodeClass::builder("City").property("name", Property::string()).build().unwrap())
        .node(NodeClass::builder("Robot").property("serial", Property::string()).build().unwrap())
        .build()
        .unwrap()
}

fn db() -> Database<MemoryStore> {
    Database::new(MemoryStore::new(), schema())
}

async fn save(db: &Database<MemoryStore>, class: &str, values: &[(&str, Value)]) -> NodeInstance {
    let mut node = db.node(class).unwrap();
    for (k, v) in values {
        node.set(k, v.clone()).unwrap();
    }
    node.save(db).await.unwrap();
    node
}

async fn person(db: &Database<MemoryStore>, name: &str, age: i64) -> NodeInstance {
    save(db, "Person", &[("name", Value::from(name)), ("age", Value::Int(age))]).await
}

fn names(nodes: &[NodeInstance]) -> Vec<String> {
    nodes.iter().map(|n| n.get_as::<String>("name").unwrap()).collect()
}

// ============================================================================
// 1. Unique index rejects a second node with the same value
// ============================================================================

#[tokio::test]
async fn test_unique_property_conflict() {
    let db = db();
    person(&db, "Alice", 36).await;

    let mut twin = db.node("Person").unwrap().with("name", "Alice").unwrap();
    let err = twin.save(&db).await.unwrap_err();
    assert!(matches!(err, Error::UniqueProperty { ref key, .. } if key == "name"));
    assert!(twin.id().is_none());

    let found = db.index("Person").unwrap().search(&[("name", Value::from("Alice"))]).await.unwrap();
    assert_eq!(found.len(), 1);
}

// ============================================================================
// 2. connect / is_connected / disconnect
// ============================================================================

#[tokio::test]
async fn test_connect_and_disconnect() {
    let db = db();
    let alice = person(&db, "Alice", 36).await;
    let bob = person(&db, "Bob", 41).await;
    let friends = alice.rel(&db, "friends").unwrap();

    friends.connect(&bob).await.unwrap();
    assert!(friends.is_connected(&bob).await.unwrap());
    assert_eq!(names(&friends.all().await.unwrap()), vec!["Bob"]);

    friends.disconnect(&bob).await.unwrap();
    assert!(!friends.is_connected(&bob).await.unwrap());
    assert!(!friends.exists().await.unwrap());
}

#[tokio::test]
async fn test_connect_twice_keeps_one_edge() {
    let db = db();
    let alice = person(&db, "Alice", 36).await;
    let bob = person(&db, "Bob", 41).await;
    let friends = alice.rel(&db, "friends").unwrap();

    friends.connect(&bob).await.unwrap();
    friends.connect(&bob).await.unwrap();
    assert_eq!(friends.count().await.unwrap(), 1);
    let edges = db
        .store()
        .relationships(alice.id().unwrap(), "FRIEND", Direction::Outgoing)
        .await
        .unwrap();
    assert_eq!(edges.len(), 1);
}

// ============================================================================
// 3. Exactly-one relationship: reconnect instead of connect
// ============================================================================

#[tokio::test]
async fn test_exactly_one_capital() {
    let db = db();
    let france = save(&db, "Country", &[("name", Value::from("France"))]).await;
    let paris = save(&db, "City", &[("name", Value::from("Paris"))]).await;
    let lyon = save(&db, "City", &[("name", Value::from("Lyon"))]).await;
    let capital = france.rel(&db, "capital").unwrap();

    capital.connect(&paris).await.unwrap();
    let err = capital.connect(&lyon).await.unwrap_err();
    assert!(matches!(err, Error::AttemptedCardinalityViolation { cardinality: Cardinality::One, .. }));

    capital.reconnect(&paris, &lyon).await.unwrap();
    let current = capital.single().await.unwrap().unwrap();
    assert_eq!(current, lyon);
    assert_eq!(current.get_as::<String>("name").unwrap(), "Lyon");
}

// ============================================================================
// 4. Filtered, ordered, limited traversal
// ============================================================================

#[tokio::test]
async fn test_traverse_filter_order_limit() {
    let db = db();
    let alice = person(&db, "Alice", 36).await;
    let friends = alice.rel(&db, "friends").unwrap();
    for (name, age) in [("Dee", 52), ("Bob", 41), ("Cy", 25), ("Eve", 33), ("Abe", 30)] {
        friends.connect(&person(&db, name, age).await).await.unwrap();
    }

    let older = alice
        .traverse(&db, "friends")
        .unwrap()
        .filter("age", ">", 30)
        .unwrap()
        .order_by("name")
        .unwrap()
        .limit(2)
        .run()
        .await
        .unwrap();
    assert_eq!(names(&older), vec!["Bob", "Dee"]);
    assert!(older.iter().all(|p| p.get_as::<i64>("age").unwrap() > 30));

    let count = alice.traverse(&db, "friends").unwrap().filter("age", ">", 30).unwrap().len().await.unwrap();
    assert_eq!(count, 3);
    let paged = alice.traverse(&db, "friends").unwrap().skip(4).limit(3).len().await.unwrap();
    assert_eq!(paged, 1);
}

#[tokio::test]
async fn test_traverse_regex_and_descending() {
    let db = db();
    let alice = person(&db, "Alice", 36).await;
    let friends = alice.rel(&db, "friends").unwrap();
    for (name, age) in [("Bob", 41), ("Bea", 25), ("Cy", 33)] {
        friends.connect(&person(&db, name, age).await).await.unwrap();
    }
    let bs = alice
        .traverse(&db, "friends")
        .unwrap()
        .filter("name", "=~", "B.*")
        .unwrap()
        .order_by_desc("age")
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(names(&bs), vec!["Bob", "Bea"]);
}

#[tokio::test]
async fn test_two_hops_with_relationship_filter() {
    let db = db();
    let alice = person(&db, "Alice", 36).await;
    let bob = person(&db, "Bob", 41).await;
    let cy = person(&db, "Cy", 25).await;
    let dee = person(&db, "Dee", 52).await;
    let fay = person(&db, "Fay", 19).await;
    let friends = alice.rel(&db, "friends").unwrap();
    friends.connect_with(&bob, &[("since", Value::Int(1999))]).await.unwrap();
    friends.connect_with(&cy, &[("since", Value::Int(2015))]).await.unwrap();
    bob.rel(&db, "friends").unwrap().connect(&dee).await.unwrap();
    cy.rel(&db, "friends").unwrap().connect(&fay).await.unwrap();

    // Friends of friends made before 2000.
    let reached = alice
        .traverse_where(&db, "friends", &[("since", "<", Value::Int(2000))])
        .unwrap()
        .traverse("friends")
        .unwrap();
    assert_eq!(reached.alias(), "friends_1");
    assert_eq!(names(&reached.run().await.unwrap()), vec!["Dee"]);

    let with_rels = alice.traverse(&db, "friends").unwrap().order_by("name").unwrap().run_with_rels().await.unwrap();
    let since: Vec<i64> = with_rels
        .iter()
        .map(|(_, rel)| rel.as_ref().unwrap().get_as::<i64>("since").unwrap())
        .collect();
    assert_eq!(since, vec![1999, 2015]);
}

// ============================================================================
// 5. Stale instance fails locally after delete
// ============================================================================

#[tokio::test]
async fn test_deleted_instance_fails_fast() {
    let db = db();
    let mut alice = person(&db, "Alice", 36).await;
    let bob = person(&db, "Bob", 41).await;
    alice.rel(&db, "friends").unwrap().connect(&bob).await.unwrap();
    let mut stale = alice.clone();

    alice.delete(&db).await.unwrap();
    assert_eq!(db.store().relationship_count(), 1); // only Bob's category link

    // A copy still holding the old handle reaches the store, which no longer has the node.
    stale.set("age", 99).unwrap();
    assert!(matches!(stale.save(&db).await, Err(Error::Store(_))));
    assert!(matches!(alice.save(&db).await, Err(Error::Deleted { .. })));
    assert!(matches!(alice.rel(&db, "friends"), Err(Error::Deleted { .. })));
    assert!(matches!(alice.traverse(&db, "friends"), Err(Error::Deleted { .. })));
}

// ============================================================================
// Category nodes
// ============================================================================

#[tokio::test]
async fn test_empty_category_traverses_to_nothing() {
    let db = db();
    let robots = db.category("Robot").await.unwrap();
    assert!(robots.instances(&db).await.unwrap().is_empty());
    assert_eq!(robots.traverse(&db, "instance").unwrap().len().await.unwrap(), 0);

    let again = db.category("Robot").await.unwrap();
    assert_eq!(again.id(), robots.id());
}

#[tokio::test]
async fn test_category_lists_own_instances() {
    let db = db();
    person(&db, "Alice", 36).await;
    person(&db, "Bob", 41).await;
    save(&db, "Employee", &[("name", Value::from("Eve")), ("title", Value::from("CTO"))]).await;

    let people = db.category("Person").await.unwrap().instances(&db).await.unwrap();
    let mut found = names(&people);
    found.sort();
    assert_eq!(found, vec!["Alice", "Bob"]);

    let staff = db.category("Employee").await.unwrap().instances(&db).await.unwrap();
    assert_eq!(staff.len(), 1);
    assert_eq!(staff[0].class().name(), "Employee");
    assert_eq!(staff[0].get_as::<String>("title").unwrap(), "CTO");
}

#[tokio::test]
async fn test_unmapped_nodes_are_never_returned() {
    let db = db();
    let alice = person(&db, "Alice", 36).await;
    let eve = save(&db, "Employee", &[("name", Value::from("Eve")), ("age", Value::Int(40))]).await;
    alice.rel(&db, "friends").unwrap().connect(&eve).await.unwrap();

    // A node written behind the mapper's back has no category link.
    let stray = db
        .store()
        .create_node(vec!["Person".into()], props([("name", Value::from("Stray")), ("age", Value::Int(50))]))
        .await
        .unwrap();
    db.store()
        .create_relationship(alice.id().unwrap(), "FRIEND", stray, PropertyMap::new())
        .await
        .unwrap();

    let friends = alice.traverse(&db, "friends").unwrap().run().await.unwrap();
    assert_eq!(names(&friends), vec!["Eve"]);
    assert_eq!(friends[0].class().name(), "Employee");
}

// ============================================================================
// Batch creation and store errors
// ============================================================================

#[tokio::test]
async fn test_batch_create() {
    let db = db();
    let people = db
        .create(
            "Person",
            vec![
                props([("name", Value::from("Ada")), ("age", Value::Int(36))]),
                props([("name", Value::from("Bob"))]),
            ],
        )
        .await
        .unwrap();
    assert!(people.iter().all(|p| p.id().is_some()));

    let err = db.create("Person", vec![props([("age", Value::Int(3))])]).await.unwrap_err();
    assert!(matches!(err, Error::RequiredProperty { .. }));
}

#[tokio::test]
async fn test_store_error_carries_query() {
    let db = db();
    let err = db.execute("START o=node($missing) RETURN o", &PropertyMap::new()).await.unwrap_err();
    match err {
        Error::Store(exc) => {
            assert_eq!(exc.query.as_deref(), Some("START o=node($missing) RETURN o"));
            assert_eq!(exc.params, Some(PropertyMap::new()));
        }
        other => panic!("unexpected {other:?}"),
    }
}
