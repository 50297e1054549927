//! # neo4j-ogm — Object-Graph Mapping for Neo4j-style stores
//!
//! Typed node and relationship schemas on top of a property graph, with
//! cardinality-checked relationship managers, traversals compiled into one
//! parameterised query, and unique indexes that stay consistent even on
//! stores without an atomic create-or-fail primitive.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `GraphStore` is the contract between the mapper and storage
//! 2. **Explicit schema**: classes are declared once through builders and frozen into a `Schema`
//! 3. **Fail fast**: local validation (required, cardinality, indexes) runs before any store call
//! 4. **One query per traversal**: chained calls accumulate instructions, rendered once
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use neo4j_ogm::{Database, MemoryStore, NodeClass, Property, RelationshipDef, Schema};
//!
//! # async fn example() -> neo4j_ogm::Result<()> {
//! let schema = Schema::builder()
//!     .node(
//!         NodeClass::builder("Person")
//!             .property("name", Property::string().unique_index())
//!             .property("age", Property::integer().index())
//!             .relationship("friends", RelationshipDef::outgoing("FRIEND", ["Person"]))
//!             .build()?,
//!     )
//!     .build()?;
//! let db = Database::new(MemoryStore::new(), schema);
//!
//! let mut alice = db.node("Person")?.with("name", "Alice")?.with("age", 36)?;
//! alice.save(&db).await?;
//! let mut bob = db.node("Person")?.with("name", "Bob")?.with("age", 41)?;
//! bob.save(&db).await?;
//!
//! alice.rel(&db, "friends")?.connect(&bob).await?;
//! let older = alice
//!     .traverse(&db, "friends")?
//!     .filter("age", ">", 30)?
//!     .order_by("name")?
//!     .limit(2)
//!     .run()
//!     .await?;
//! # let _ = older;
//! # Ok(())
//! # }
//! ```
//!
//! ## Stores
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `storage::memory` | In-memory graph for testing/embedding |
//! | (yours) | — | Implement `GraphStore` over a remote server |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod config;
pub mod properties;
pub mod schema;
pub mod entity;
pub mod relationship;
pub mod traversal;
pub mod index;
pub mod cypher;
pub mod storage;

use std::sync::Arc;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Node, Relationship, Value, PropertyMap, FromValue,
    NodeId, RelId, Direction, props,
};

// ============================================================================
// Re-exports: Schema & entities
// ============================================================================

pub use config::OgmConfig;
pub use properties::{Property, PropertyKind, PropertyDef};
pub use schema::{
    Cardinality, NodeClass, NodeClassBuilder, RelClass, RelationshipDef, Schema,
};
pub use entity::{CategoryNode, EntityState, NodeInstance, RelInstance};
pub use relationship::{Relation, RelationshipManager};
pub use traversal::{Op, Traversal};
pub use index::{IndexManager, IndexQuery};

// ============================================================================
// Re-exports: Storage
// ============================================================================

pub use storage::{
    GraphStore, StoreCapabilities, StoreException, StorePool, QueryResult,
    ResultRow, Batch, BatchOp, BatchResult, NodeRef, MemoryStore,
};

// ============================================================================
// Top-level Database handle
// ============================================================================

/// The primary entry point. A `Database` binds a store to a frozen schema.
///
/// Cloning is cheap: the store and schema are shared.
pub struct Database<S: GraphStore> {
    store: Arc<S>,
    schema: Arc<Schema>,
    config: OgmConfig,
}

impl<S: GraphStore> Clone for Database<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            schema: Arc::clone(&self.schema),
            config: self.config.clone(),
        }
    }
}

impl<S: GraphStore> Database<S> {
    /// Bind a store to a schema with default configuration.
    pub fn new(store: S, schema: Arc<Schema>) -> Self {
        Self::with_shared(Arc::new(store), schema, OgmConfig::default())
    }

    /// Bind a shared store (for instance one handed out by a `StorePool`).
    pub fn with_shared(store: Arc<S>, schema: Arc<Schema>, config: OgmConfig) -> Self {
        Self { store, schema, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &OgmConfig {
        &self.config
    }

    /// A fresh, unsaved instance of the named node class.
    pub fn node(&self, class: &str) -> Result<NodeInstance> {
        Ok(NodeInstance::new(self.schema.node_class(class)?))
    }

    /// Index lookups for the named node class.
    pub fn index(&self, class: &str) -> Result<IndexManager<'_, S>> {
        Ok(IndexManager::new(self, self.schema.node_class(class)?))
    }

    /// The category node of a class, created on first use.
    pub async fn category(&self, class: &str) -> Result<CategoryNode> {
        let class = self.schema.node_class(class)?;
        CategoryNode::get_or_create(self, class).await
    }

    /// Create many nodes of one class in a single batch.
    ///
    /// All property maps are validated and deflated before the store is
    /// contacted; unique-indexed values are guarded as described on
    /// [`index::batch`].
    pub async fn create(&self, class: &str, rows: Vec<PropertyMap>) -> Result<Vec<NodeInstance>> {
        let class = self.schema.node_class(class)?;
        let mut instances = Vec::with_capacity(rows.len());
        for row in rows {
            let mut instance = NodeInstance::new(Arc::clone(&class));
            for (key, value) in row {
                instance.set(&key, value)?;
            }
            instances.push(instance);
        }
        NodeInstance::save_all(self, &mut instances).await?;
        Ok(instances)
    }

    /// Run a query against the store, attaching the query text and
    /// parameters to any store-side failure.
    pub async fn execute(&self, query: &str, params: &PropertyMap) -> Result<QueryResult> {
        self.store.execute(query, params).await.map_err(|e| match e {
            Error::Store(mut exc) => {
                exc.query.get_or_insert_with(|| query.to_string());
                exc.params.get_or_insert_with(|| params.clone());
                Error::Store(exc)
            }
            other => other,
        })
    }
}

// ============================================================================
// Error Types
// ============================================================================

fn on_node(node: &Option<NodeId>) -> String {
    node.map(|n| format!(" (node {n})")).unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Query syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("{class} has no property '{property}'")]
    UnknownProperty { class: String, property: String },

    #[error("{class} has no relationship '{relation}'")]
    UnknownRelationship { class: String, relation: String },

    #[error("Relationship '{relation}' is declared differently on {classes:?}")]
    AmbiguousRelationship { relation: String, classes: Vec<String> },

    #[error("Property '{property}' has conflicting types across {classes:?}")]
    AmbiguousProperty { property: String, classes: Vec<String> },

    #[error("{class}.{property} is required")]
    RequiredProperty { class: String, property: String },

    #[error("Failed to deflate {class}.{property}{}: {reason}", on_node(.node))]
    DeflateError { property: String, class: String, reason: String, node: Option<NodeId> },

    #[error("Failed to inflate {class}.{property}{}: {reason}", on_node(.node))]
    InflateError { property: String, class: String, reason: String, node: Option<NodeId> },

    #[error("Unique property conflict in index '{index}': {key} = {value}")]
    UniqueProperty { index: String, key: String, value: String },

    #[error("Data inconsistency in index '{index}': {key} = {value} now held by nodes {nodes:?}")]
    DataInconsistency { index: String, key: String, value: String, nodes: Vec<NodeId> },

    #[error("Cardinality violation on {class}.{relation} ({cardinality}): found {found}")]
    CardinalityViolation { class: String, relation: String, cardinality: Cardinality, found: usize },

    #[error("Attempted cardinality violation on {class}.{relation} ({cardinality}): {reason}")]
    AttemptedCardinalityViolation { class: String, relation: String, cardinality: Cardinality, reason: String },

    #[error("{relation} is not connected to node {node}")]
    NotConnected { relation: String, node: NodeId },

    #[error("{class}.{property} is not indexed")]
    PropertyNotIndexed { class: String, property: String },

    #[error("Both alias '{alias}' and property '{property}' were supplied")]
    ConflictingFilter { alias: String, property: String },

    #[error("{class} matching query does not exist")]
    DoesNotExist { class: String },

    #[error("Expected one {class}, found {count}")]
    MultipleResults { class: String, count: usize },

    #[error("{class} instance has not been saved")]
    Unsaved { class: String },

    #[error("{class} instance has been deleted")]
    Deleted { class: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreException),
}

pub type Result<T> = std::result::Result<T, Error>;
