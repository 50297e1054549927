//! # Graph Store Trait
//!
//! This is THE contract between the mapper and any graph store.
//! Everything the entity, relationship, traversal and index layers need
//! from storage is defined here.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory reference store for testing/embedding |
//!
//! Writes go through [`Batch`]es: an ordered list of [`BatchOp`]s a store
//! applies atomically in one round-trip. Later ops may refer to nodes
//! created earlier in the same batch through [`NodeRef::Pending`].

pub mod memory;
mod pool;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::index::IndexQuery;
use crate::model::*;
use crate::{Error, Result};

pub use memory::MemoryStore;
pub use pool::StorePool;

// ============================================================================
// Store capabilities
// ============================================================================

/// What a store can do. All fields default to false / empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// The store implements create-or-fail unique index registration.
    /// Without it, unique values are guarded by a pre-check and a
    /// post-check around the write.
    pub atomic_unique_index: bool,
    /// Largest batch the store accepts in one round-trip.
    pub max_batch_size: Option<usize>,
}

// ============================================================================
// Store exception
// ============================================================================

/// Server-side failure, passed through unchanged and never retried.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct StoreException {
    pub message: String,
    pub query: Option<String>,
    pub params: Option<PropertyMap>,
    pub cause: Option<String>,
    pub trace: Vec<String>,
}

impl StoreException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            query: None,
            params: None,
            cause: None,
            trace: Vec::new(),
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>, params: PropertyMap) -> Self {
        self.query = Some(query.into());
        self.params = Some(params);
        self
    }

    pub fn with_trace(mut self, frame: impl Into<String>) -> Self {
        self.trace.push(frame.into());
        self
    }
}

// ============================================================================
// Query results
// ============================================================================

/// Result of a query execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A single row in the result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRow {
    pub values: HashMap<String, Value>,
}

impl ResultRow {
    /// Get a typed value from the row.
    pub fn get<T: FromValue>(&self, key: &str) -> Result<T> {
        let val = self
            .values
            .get(key)
            .ok_or_else(|| Error::InvalidQuery(format!("no column '{key}' in result row")))?;
        T::from_value(val)
    }
}

// ============================================================================
// Batches
// ============================================================================

/// A node that either exists or is created by an earlier op of the same batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Id(NodeId),
    /// Index of the `CreateNode` op in the enclosing batch.
    Pending(usize),
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        NodeRef::Id(id)
    }
}

/// One write operation. All property maps are deflated.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    CreateNode { labels: Vec<String>, properties: PropertyMap },
    /// Replace the node's whole property map.
    SetNodeProperties { node: NodeRef, properties: PropertyMap },
    /// Remove the node together with its relationships and index entries.
    DeleteNode { node: NodeId },
    CreateRelationship { from: NodeRef, rel_type: String, to: NodeRef, properties: PropertyMap },
    SetRelationshipProperties { rel: RelId, properties: PropertyMap },
    DeleteRelationship { rel: RelId },
    IndexAdd { index: String, key: String, value: Value, node: NodeRef },
    /// Fails the batch with `UniqueProperty` if another node already holds
    /// `key = value` in `index`.
    IndexAddUniqueOrFail { index: String, key: String, value: Value, node: NodeRef },
    /// Remove every entry of `node` from `index`.
    IndexRemove { index: String, node: NodeId },
}

/// Per-op outcome, positionally matching the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchResult {
    Node(NodeId),
    Relationship(RelId),
    Done,
}

impl BatchResult {
    pub fn node(self) -> Option<NodeId> {
        match self {
            BatchResult::Node(id) => Some(id),
            _ => None,
        }
    }

    pub fn relationship(self) -> Option<RelId> {
        match self {
            BatchResult::Relationship(id) => Some(id),
            _ => None,
        }
    }
}

/// Ordered list of writes applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an op and return its position.
    pub fn push(&mut self, op: BatchOp) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    /// Append a `CreateNode` and return a reference later ops can use.
    pub fn create_node(&mut self, labels: Vec<String>, properties: PropertyMap) -> NodeRef {
        NodeRef::Pending(self.push(BatchOp::CreateNode { labels, properties }))
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl From<Vec<BatchOp>> for Batch {
    fn from(ops: Vec<BatchOp>) -> Self {
        Self { ops }
    }
}

fn single_result(mut results: Vec<BatchResult>) -> Result<BatchResult> {
    results
        .pop()
        .ok_or_else(|| Error::Store(StoreException::new("store returned no result for a one-op batch")))
}

// ============================================================================
// GraphStore Trait
// ============================================================================

/// The storage contract.
///
/// Calls are awaited one after another by the mapper; nothing is spawned.
/// Single-op writes default to one-op batches, so a store only has to
/// implement `submit` to support every write.
#[async_trait]
pub trait GraphStore: Send + Sync + 'static {
    // ========================================================================
    // Queries
    // ========================================================================

    /// Run a read query with named parameters.
    async fn execute(&self, query: &str, params: &PropertyMap) -> Result<QueryResult>;

    /// Get a node by id. Returns None if not found.
    async fn get_node(&self, id: NodeId) -> Result<Option<Node>>;

    /// Get a relationship by id. Returns None if not found.
    async fn get_relationship(&self, id: RelId) -> Result<Option<Relationship>>;

    /// Relationships of `node` with the given type, seen in `direction`,
    /// ordered by id.
    async fn relationships(
        &self,
        node: NodeId,
        rel_type: &str,
        direction: Direction,
    ) -> Result<Vec<Relationship>>;

    // ========================================================================
    // Index
    // ========================================================================

    /// Nodes registered in `index` under `key = value`, ordered by id.
    async fn index_search(&self, index: &str, key: &str, value: &Value) -> Result<Vec<Node>>;

    /// Nodes in `index` matching a boolean expression, ordered by id.
    async fn index_query(&self, index: &str, query: &IndexQuery) -> Result<Vec<Node>>;

    // ========================================================================
    // Writes
    // ========================================================================

    /// Apply a batch atomically. Either every op takes effect or none does.
    async fn submit(&self, batch: Batch) -> Result<Vec<BatchResult>>;

    async fn create_node(&self, labels: Vec<String>, properties: PropertyMap) -> Result<NodeId> {
        let result = single_result(self.submit(vec![BatchOp::CreateNode { labels, properties }].into()).await?)?;
        result
            .node()
            .ok_or_else(|| Error::Store(StoreException::new("create_node returned no node")))
    }

    async fn create_relationship(
        &self,
        from: NodeId,
        rel_type: &str,
        to: NodeId,
        properties: PropertyMap,
    ) -> Result<RelId> {
        let op = BatchOp::CreateRelationship {
            from: from.into(),
            rel_type: rel_type.to_string(),
            to: to.into(),
            properties,
        };
        let result = single_result(self.submit(vec![op].into()).await?)?;
        result
            .relationship()
            .ok_or_else(|| Error::Store(StoreException::new("create_relationship returned no relationship")))
    }

    async fn set_relationship_properties(&self, rel: RelId, properties: PropertyMap) -> Result<()> {
        self.submit(vec![BatchOp::SetRelationshipProperties { rel, properties }].into()).await?;
        Ok(())
    }

    async fn delete_relationship(&self, rel: RelId) -> Result<()> {
        self.submit(vec![BatchOp::DeleteRelationship { rel }].into()).await?;
        Ok(())
    }

    async fn index_add(&self, index: &str, key: &str, value: Value, node: NodeId) -> Result<()> {
        let op = BatchOp::IndexAdd {
            index: index.to_string(),
            key: key.to_string(),
            value,
            node: node.into(),
        };
        self.submit(vec![op].into()).await?;
        Ok(())
    }

    /// Register `node` under `key = value`, failing with `UniqueProperty`
    /// if another node holds it. Stores without the primitive report
    /// `atomic_unique_index: false` and should not be called here.
    async fn index_add_unique_or_fail(&self, index: &str, key: &str, value: Value, node: NodeId) -> Result<NodeId> {
        let op = BatchOp::IndexAddUniqueOrFail {
            index: index.to_string(),
            key: key.to_string(),
            value,
            node: node.into(),
        };
        self.submit(vec![op].into()).await?;
        Ok(node)
    }

    async fn index_remove(&self, index: &str, node: NodeId) -> Result<()> {
        self.submit(vec![BatchOp::IndexRemove { index: index.to_string(), node }].into()).await?;
        Ok(())
    }

    // ========================================================================
    // Capability negotiation
    // ========================================================================

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_pending_refs() {
        let mut batch = Batch::new();
        let a = batch.create_node(vec!["Person".into()], PropertyMap::new());
        let b = batch.create_node(vec!["Person".into()], PropertyMap::new());
        batch.push(BatchOp::CreateRelationship {
            from: a,
            rel_type: "FRIEND".into(),
            to: b,
            properties: PropertyMap::new(),
        });
        assert_eq!(a, NodeRef::Pending(0));
        assert_eq!(b, NodeRef::Pending(1));
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_result_row_get() {
        let mut row = ResultRow::default();
        row.values.insert("n".into(), Value::Int(3));
        assert_eq!(row.get::<i64>("n").unwrap(), 3);
        assert!(matches!(row.get::<i64>("m"), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_store_exception_display() {
        let exc = StoreException::new("boom").with_cause("disk full");
        assert_eq!(Error::Store(exc).to_string(), "Store error: boom");
    }
}
