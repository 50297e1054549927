//! In-memory graph store.
//!
//! This is the reference implementation of `GraphStore`. The whole graph
//! sits behind one `RwLock`:
//!
//! - **Atomic batches**: a batch is applied to a staged copy of the graph
//!   which replaces the live one only if every op succeeds.
//! - **Create-or-fail**: unique index registration is checked inside the
//!   write lock, so it is race-free. `without_atomic_unique()` switches the
//!   primitive off to model stores that lack it.
//! - **Queries**: `execute` understands the read dialect traversals emit
//!   (see [`crate::cypher`]).
//!
//! Use this store for:
//! - Testing schemas, relationship managers and traversals
//! - Embedding the mapper in applications that don't need persistence

mod eval;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::index::IndexQuery;
use crate::model::*;
use crate::{Error, Result};
use super::{Batch, BatchOp, BatchResult, GraphStore, NodeRef, QueryResult, StoreCapabilities, StoreException};

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory property graph store. Clones share the same graph.
#[derive(Clone)]
pub struct MemoryStore {
    graph: Arc<RwLock<MemoryGraph>>,
    atomic_unique: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct IndexEntry {
    key: String,
    value: Value,
    node: NodeId,
}

#[derive(Debug, Clone)]
struct MemoryGraph {
    nodes: BTreeMap<NodeId, Node>,
    rels: BTreeMap<RelId, Relationship>,
    /// node_id → ids of relationships touching it, ascending
    adjacency: HashMap<NodeId, Vec<RelId>>,
    /// index name → entries
    indexes: HashMap<String, Vec<IndexEntry>>,
    next_node_id: u64,
    next_rel_id: u64,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
            rels: BTreeMap::new(),
            adjacency: HashMap::new(),
            indexes: HashMap::new(),
            next_node_id: 1,
            next_rel_id: 1,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            graph: Arc::new(RwLock::new(MemoryGraph::default())),
            atomic_unique: true,
        }
    }

    /// A store that reports no create-or-fail primitive and rejects
    /// `IndexAddUniqueOrFail` ops.
    pub fn without_atomic_unique() -> Self {
        Self { atomic_unique: false, ..Self::new() }
    }

    pub fn node_count(&self) -> usize {
        self.graph.read().nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.graph.read().rels.len()
    }

    /// Nodes registered in `index`, with the key and value of each entry.
    pub fn index_entries(&self, index: &str) -> Vec<(String, Value, NodeId)> {
        self.graph
            .read()
            .indexes
            .get(index)
            .map(|entries| entries.iter().map(|e| (e.key.clone(), e.value.clone(), e.node)).collect())
            .unwrap_or_default()
    }
}

fn store_error(message: String) -> Error {
    Error::Store(StoreException::new(message))
}

// ============================================================================
// Batch application
// ============================================================================

impl MemoryGraph {
    fn apply(&mut self, ops: &[BatchOp], atomic_unique: bool) -> Result<Vec<BatchResult>> {
        let mut results = Vec::with_capacity(ops.len());
        for (pos, op) in ops.iter().enumerate() {
            let result = self
                .apply_one(op, &results, atomic_unique)
                .map_err(|e| match e {
                    Error::Store(exc) => Error::Store(exc.with_trace(format!("batch op {pos}"))),
                    other => other,
                })?;
            results.push(result);
        }
        Ok(results)
    }

    fn apply_one(&mut self, op: &BatchOp, done: &[BatchResult], atomic_unique: bool) -> Result<BatchResult> {
        match op {
            BatchOp::CreateNode { labels, properties } => {
                let id = NodeId(self.next_node_id);
                self.next_node_id += 1;
                let node = Node {
                    id,
                    labels: labels.clone(),
                    properties: without_nulls(properties),
                };
                self.nodes.insert(id, node);
                self.adjacency.insert(id, Vec::new());
                Ok(BatchResult::Node(id))
            }
            BatchOp::SetNodeProperties { node, properties } => {
                let id = self.resolve(*node, done)?;
                if let Some(n) = self.nodes.get_mut(&id) {
                    n.properties = without_nulls(properties);
                }
                Ok(BatchResult::Done)
            }
            BatchOp::DeleteNode { node } => {
                let id = self.resolve(NodeRef::Id(*node), done)?;
                for rel in self.adjacency.get(&id).cloned().unwrap_or_default() {
                    self.remove_relationship(rel);
                }
                self.adjacency.remove(&id);
                for entries in self.indexes.values_mut() {
                    entries.retain(|e| e.node != id);
                }
                self.nodes.remove(&id);
                Ok(BatchResult::Done)
            }
            BatchOp::CreateRelationship { from, rel_type, to, properties } => {
                let src = self.resolve(*from, done)?;
                let dst = self.resolve(*to, done)?;
                let id = RelId(self.next_rel_id);
                self.next_rel_id += 1;
                let rel = Relationship {
                    id,
                    src,
                    dst,
                    rel_type: rel_type.clone(),
                    properties: without_nulls(properties),
                };
                self.rels.insert(id, rel);
                self.adjacency.entry(src).or_default().push(id);
                if dst != src {
                    self.adjacency.entry(dst).or_default().push(id);
                }
                Ok(BatchResult::Relationship(id))
            }
            BatchOp::SetRelationshipProperties { rel, properties } => {
                let r = self
                    .rels
                    .get_mut(rel)
                    .ok_or_else(|| store_error(format!("Relationship[{rel}] not found")))?;
                r.properties = without_nulls(properties);
                Ok(BatchResult::Done)
            }
            BatchOp::DeleteRelationship { rel } => {
                if !self.rels.contains_key(rel) {
                    return Err(store_error(format!("Relationship[{rel}] not found")));
                }
                self.remove_relationship(*rel);
                Ok(BatchResult::Done)
            }
            BatchOp::IndexAdd { index, key, value, node } => {
                let id = self.resolve(*node, done)?;
                self.add_entry(index, key, value, id);
                Ok(BatchResult::Done)
            }
            BatchOp::IndexAddUniqueOrFail { index, key, value, node } => {
                if !atomic_unique {
                    return Err(store_error("create-or-fail unique index registration is not supported".into()));
                }
                let id = self.resolve(*node, done)?;
                let taken = self
                    .indexes
                    .get(index)
                    .is_some_and(|entries| entries.iter().any(|e| &e.key == key && &e.value == value && e.node != id));
                if taken {
                    return Err(Error::UniqueProperty {
                        index: index.clone(),
                        key: key.clone(),
                        value: value.to_string(),
                    });
                }
                self.add_entry(index, key, value, id);
                Ok(BatchResult::Done)
            }
            BatchOp::IndexRemove { index, node } => {
                if let Some(entries) = self.indexes.get_mut(index) {
                    entries.retain(|e| e.node != *node);
                }
                Ok(BatchResult::Done)
            }
        }
    }

    fn resolve(&self, node: NodeRef, done: &[BatchResult]) -> Result<NodeId> {
        let id = match node {
            NodeRef::Id(id) => id,
            NodeRef::Pending(pos) => done
                .get(pos)
                .and_then(|r| r.node())
                .ok_or_else(|| store_error(format!("batch op {pos} did not create a node")))?,
        };
        if self.nodes.contains_key(&id) {
            Ok(id)
        } else {
            Err(store_error(format!("Node[{id}] not found")))
        }
    }

    fn add_entry(&mut self, index: &str, key: &str, value: &Value, node: NodeId) {
        let entry = IndexEntry { key: key.to_string(), value: value.clone(), node };
        let entries = self.indexes.entry(index.to_string()).or_default();
        if !entries.contains(&entry) {
            entries.push(entry);
        }
    }

    fn remove_relationship(&mut self, id: RelId) {
        if let Some(rel) = self.rels.remove(&id) {
            for end in [rel.src, rel.dst] {
                if let Some(adj) = self.adjacency.get_mut(&end) {
                    adj.retain(|r| *r != id);
                }
            }
        }
    }

    fn nodes_by_id(&self, mut ids: Vec<NodeId>) -> Vec<Node> {
        ids.sort();
        ids.dedup();
        ids.into_iter().filter_map(|id| self.nodes.get(&id).cloned()).collect()
    }
}

fn without_nulls(properties: &PropertyMap) -> PropertyMap {
    properties
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

// ============================================================================
// GraphStore impl
// ============================================================================

#[async_trait]
impl GraphStore for MemoryStore {
    async fn execute(&self, query: &str, params: &PropertyMap) -> Result<QueryResult> {
        let parsed = crate::cypher::parse(query)?;
        let graph = self.graph.read();
        eval::run(&graph, &parsed, params)
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        Ok(self.graph.read().nodes.get(&id).cloned())
    }

    async fn get_relationship(&self, id: RelId) -> Result<Option<Relationship>> {
        Ok(self.graph.read().rels.get(&id).cloned())
    }

    async fn relationships(
        &self,
        node: NodeId,
        rel_type: &str,
        direction: Direction,
    ) -> Result<Vec<Relationship>> {
        let graph = self.graph.read();
        let Some(adj) = graph.adjacency.get(&node) else {
            return Ok(Vec::new());
        };
        Ok(adj
            .iter()
            .filter_map(|id| graph.rels.get(id))
            .filter(|r| r.rel_type == rel_type && direction.matches(r, node))
            .cloned()
            .collect())
    }

    async fn index_search(&self, index: &str, key: &str, value: &Value) -> Result<Vec<Node>> {
        let graph = self.graph.read();
        let ids = graph
            .indexes
            .get(index)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.key == key && &e.value == value)
                    .map(|e| e.node)
                    .collect()
            })
            .unwrap_or_default();
        Ok(graph.nodes_by_id(ids))
    }

    async fn index_query(&self, index: &str, query: &IndexQuery) -> Result<Vec<Node>> {
        let graph = self.graph.read();
        let Some(entries) = graph.indexes.get(index) else {
            return Ok(Vec::new());
        };
        let ids = entries
            .iter()
            .map(|e| e.node)
            .filter(|node| {
                query.matches(&|key: &str, value: &Value| {
                    entries.iter().any(|e| e.node == *node && e.key == key && &e.value == value)
                })
            })
            .collect();
        Ok(graph.nodes_by_id(ids))
    }

    async fn submit(&self, batch: Batch) -> Result<Vec<BatchResult>> {
        let mut graph = self.graph.write();
        let mut staged = graph.clone();
        let results = staged.apply(batch.ops(), self.atomic_unique)?;
        *graph = staged;
        debug!(ops = batch.len(), "applied batch");
        Ok(results)
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            atomic_unique_index: self.atomic_unique,
            max_batch_size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, Value)]) -> PropertyMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_batch_creates_and_links() {
        let store = MemoryStore::new();
        let mut batch = Batch::new();
        let a = batch.create_node(vec!["Person".into()], props(&[("name", Value::from("Ada"))]));
        let b = batch.create_node(vec!["Person".into()], props(&[("name", Value::from("Bob"))]));
        batch.push(BatchOp::CreateRelationship {
            from: a,
            rel_type: "FRIEND".into(),
            to: b,
            properties: PropertyMap::new(),
        });
        let results = store.submit(batch).await.unwrap();
        let ada = results[0].node().unwrap();
        let bob = results[1].node().unwrap();

        let out = store.relationships(ada, "FRIEND", Direction::Outgoing).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].dst, bob);
        assert!(store.relationships(ada, "FRIEND", Direction::Incoming).await.unwrap().is_empty());
        assert_eq!(store.relationships(bob, "FRIEND", Direction::Either).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_no_trace() {
        let store = MemoryStore::new();
        let ada = store.create_node(vec![], PropertyMap::new()).await.unwrap();
        store.index_add_unique_or_fail("Person", "name", Value::from("Ada"), ada).await.unwrap();

        let mut batch = Batch::new();
        let n = batch.create_node(vec![], PropertyMap::new());
        batch.push(BatchOp::IndexAddUniqueOrFail {
            index: "Person".into(),
            key: "name".into(),
            value: Value::from("Ada"),
            node: n,
        });
        let err = store.submit(batch).await.unwrap_err();
        assert!(matches!(err, Error::UniqueProperty { .. }));
        assert_eq!(store.node_count(), 1);
        assert_eq!(store.index_entries("Person").len(), 1);
    }

    #[tokio::test]
    async fn test_unique_allows_same_node() {
        let store = MemoryStore::new();
        let ada = store.create_node(vec![], PropertyMap::new()).await.unwrap();
        store.index_add_unique_or_fail("Person", "name", Value::from("Ada"), ada).await.unwrap();
        store.index_add_unique_or_fail("Person", "name", Value::from("Ada"), ada).await.unwrap();
        assert_eq!(store.index_entries("Person").len(), 1);
    }

    #[tokio::test]
    async fn test_without_atomic_unique_rejects_primitive() {
        let store = MemoryStore::without_atomic_unique();
        assert!(!store.capabilities().atomic_unique_index);
        let n = store.create_node(vec![], PropertyMap::new()).await.unwrap();
        let err = store.index_add_unique_or_fail("Person", "name", Value::from("x"), n).await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[tokio::test]
    async fn test_delete_node_detaches() {
        let store = MemoryStore::new();
        let a = store.create_node(vec![], PropertyMap::new()).await.unwrap();
        let b = store.create_node(vec![], PropertyMap::new()).await.unwrap();
        store.create_relationship(a, "KNOWS", b, PropertyMap::new()).await.unwrap();
        store.index_add("Person", "name", Value::from("a"), a).await.unwrap();

        store.submit(vec![BatchOp::DeleteNode { node: a }].into()).await.unwrap();
        assert_eq!(store.relationship_count(), 0);
        assert!(store.index_entries("Person").is_empty());
        assert!(store.relationships(b, "KNOWS", Direction::Either).await.unwrap().is_empty());
        assert!(store.get_node(a).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_index_query() {
        let store = MemoryStore::new();
        let a = store.create_node(vec![], PropertyMap::new()).await.unwrap();
        let b = store.create_node(vec![], PropertyMap::new()).await.unwrap();
        store.index_add("Person", "name", Value::from("Ada"), a).await.unwrap();
        store.index_add("Person", "age", Value::Int(36), a).await.unwrap();
        store.index_add("Person", "name", Value::from("Bob"), b).await.unwrap();
        store.index_add("Person", "age", Value::Int(36), b).await.unwrap();

        let q = IndexQuery::term("age", 36) & !IndexQuery::term("name", "Ada");
        let found = store.index_query("Person", &q).await.unwrap();
        assert_eq!(found.iter().map(|n| n.id).collect::<Vec<_>>(), vec![b]);

        let found = store.index_search("Person", "age", &Value::Int(36)).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_node_reference() {
        let store = MemoryStore::new();
        let err = store
            .create_relationship(NodeId(41), "X", NodeId(42), PropertyMap::new())
            .await
            .unwrap_err();
        match err {
            Error::Store(exc) => {
                assert!(exc.message.contains("Node[41]"));
                assert_eq!(exc.trace, vec!["batch op 0".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
