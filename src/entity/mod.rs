//! # Entities
//!
//! In-memory instances of schema classes.
//!
//! ```text
//!             save()                    delete()
//!  Unsaved ───────────► Persisted(id) ───────────► Deleted
//!                        │      ▲
//!                        └──────┘ save() / refresh()
//! ```
//!
//! An instance owns its remote handle: `Persisted(id)` identifies exactly
//! one stored node. Every operation that needs the handle checks the state
//! first and fails locally on `Unsaved` or `Deleted`.

mod category;
mod rel;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::index::batch;
use crate::model::{FromValue, Node, NodeId, Value};
use crate::relationship::{Relation, RelationshipManager};
use crate::schema::{NodeClass, Schema};
use crate::storage::{Batch, BatchOp, GraphStore};
use crate::traversal::Traversal;
use crate::{Database, Error, Result};

pub use category::CategoryNode;
pub use rel::RelInstance;

static NULL: Value = Value::Null;

/// Where an instance stands relative to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Never persisted.
    Unsaved,
    Persisted(NodeId),
    /// Removed from the store. Terminal.
    Deleted,
}

/// A node-class instance with materialised property values.
#[derive(Debug, Clone)]
pub struct NodeInstance {
    class: Arc<NodeClass>,
    values: HashMap<String, Value>,
    state: EntityState,
}

impl NodeInstance {
    pub fn new(class: Arc<NodeClass>) -> Self {
        Self { class, values: HashMap::new(), state: EntityState::Unsaved }
    }

    /// Inflate a stored node.
    pub(crate) fn from_node(class: Arc<NodeClass>, node: &Node) -> Result<Self> {
        let values = class.properties().inflate_all(&node.properties, class.name(), Some(node.id))?;
        Ok(Self { class, values, state: EntityState::Persisted(node.id) })
    }

    /// Inflate a stored node as its own class when that class is one of
    /// `candidates` or derives from one; otherwise as the first candidate
    /// the node is labelled with.
    pub(crate) fn from_stored(schema: &Schema, candidates: &[Arc<NodeClass>], node: &Node) -> Result<Self> {
        let own = node
            .class_label()
            .and_then(|label| schema.node_class(label).ok())
            .filter(|class| candidates.iter().any(|c| class.is_a(c.name())));
        let class = match own {
            Some(class) => class,
            None => candidates
                .iter()
                .find(|c| node.has_label(c.name()))
                .or_else(|| candidates.first())
                .cloned()
                .ok_or_else(|| Error::SchemaError(format!("no class to inflate node {}", node.id)))?,
        };
        Self::from_node(class, node)
    }

    pub fn class(&self) -> &Arc<NodeClass> {
        &self.class
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn id(&self) -> Option<NodeId> {
        match self.state {
            EntityState::Persisted(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.state == EntityState::Deleted
    }

    /// The remote handle, or the error explaining why there is none.
    pub fn require_persisted(&self) -> Result<NodeId> {
        match self.state {
            EntityState::Persisted(id) => Ok(id),
            EntityState::Unsaved => Err(Error::Unsaved { class: self.class.name().to_string() }),
            EntityState::Deleted => Err(Error::Deleted { class: self.class.name().to_string() }),
        }
    }

    fn stored_name<'n>(&'n self, name: &'n str) -> Result<&'n str> {
        self.class
            .properties()
            .resolve(name)
            .map(|(real, _)| real)
            .ok_or_else(|| Error::UnknownProperty {
                class: self.class.name().to_string(),
                property: name.to_string(),
            })
    }

    /// Current value of a property or alias; `Null` when unset.
    pub fn get(&self, name: &str) -> Result<&Value> {
        let real = self.stored_name(name)?;
        Ok(self.values.get(real).unwrap_or(&NULL))
    }

    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T> {
        T::from_value(self.get(name)?)
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let real = self.stored_name(name)?.to_string();
        self.values.insert(real, value.into());
        Ok(())
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Stored property values; aliases are not included.
    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.values
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create the node, or write changed values back to it.
    pub async fn save<S: GraphStore>(&mut self, db: &Database<S>) -> Result<()> {
        match self.state {
            EntityState::Deleted => Err(Error::Deleted { class: self.class.name().to_string() }),
            EntityState::Unsaved => Self::save_all(db, std::slice::from_mut(self)).await,
            EntityState::Persisted(_) => batch::update_node(db, self).await,
        }
    }

    /// Create every instance in one batch. All must be unsaved and of the
    /// same class.
    pub(crate) async fn save_all<S: GraphStore>(db: &Database<S>, instances: &mut [NodeInstance]) -> Result<()> {
        let Some(first) = instances.first() else {
            return Ok(());
        };
        let class = Arc::clone(&first.class);
        for inst in instances.iter() {
            match inst.state {
                EntityState::Unsaved => {}
                EntityState::Deleted => return Err(Error::Deleted { class: inst.class.name().to_string() }),
                EntityState::Persisted(id) => {
                    return Err(Error::InvalidQuery(format!(
                        "{} instance is already saved as node {id}",
                        inst.class.name()
                    )));
                }
            }
            if !Arc::ptr_eq(&inst.class, &class) {
                return Err(Error::InvalidQuery(format!(
                    "cannot create {} and {} in one batch",
                    class.name(),
                    inst.class.name()
                )));
            }
        }

        let ids = batch::create_nodes(db, &class, instances).await?;
        for (inst, id) in instances.iter_mut().zip(ids) {
            inst.state = EntityState::Persisted(id);
        }
        if let Some(hook) = class.post_create_hook() {
            for inst in instances.iter() {
                hook(inst);
            }
        }
        Ok(())
    }

    /// Remove the node, its relationships and its index entries.
    pub async fn delete<S: GraphStore>(&mut self, db: &Database<S>) -> Result<()> {
        let id = self.require_persisted()?;
        let mut batch = Batch::new();
        batch.push(BatchOp::IndexRemove { index: self.class.index_name().to_string(), node: id });
        batch.push(BatchOp::DeleteNode { node: id });
        db.store().submit(batch).await?;
        self.state = EntityState::Deleted;
        debug!(class = self.class.name(), node = %id, "deleted node");
        Ok(())
    }

    /// Re-read property values from the store. Relationships are untouched.
    pub async fn refresh<S: GraphStore>(&mut self, db: &Database<S>) -> Result<()> {
        let id = self.require_persisted()?;
        let node = db
            .store()
            .get_node(id)
            .await?
            .ok_or_else(|| Error::DoesNotExist { class: self.class.name().to_string() })?;
        self.values = self.class.properties().inflate_all(&node.properties, self.class.name(), Some(id))?;
        Ok(())
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// The cardinality-checked manager of a declared relationship.
    pub fn rel<'a, S: GraphStore>(&'a self, db: &'a Database<S>, name: &str) -> Result<Relation<'a, S>> {
        Ok(Relation::new(RelationshipManager::new(db, self, name)?))
    }

    /// Start a traversal at this node with its first hop.
    pub fn traverse<'d, S: GraphStore>(&self, db: &'d Database<S>, name: &str) -> Result<Traversal<'d, S>> {
        let id = self.require_persisted()?;
        Traversal::from_node(db, Arc::clone(&self.class), id).traverse(name)
    }

    /// Like [`traverse`](Self::traverse), constraining the properties of
    /// the first hop's relationship model.
    pub fn traverse_where<'d, S: GraphStore>(
        &self,
        db: &'d Database<S>,
        name: &str,
        filters: &[(&str, &str, Value)],
    ) -> Result<Traversal<'d, S>> {
        let id = self.require_persisted()?;
        Traversal::from_node(db, Arc::clone(&self.class), id).traverse_where(name, filters)
    }
}

/// Identity is the remote handle; unsaved or deleted instances equal nothing.
impl PartialEq for NodeInstance {
    fn eq(&self, other: &Self) -> bool {
        match (self.state, other.state) {
            (EntityState::Persisted(a), EntityState::Persisted(b)) => a == b,
            _ => false,
        }
    }
}
