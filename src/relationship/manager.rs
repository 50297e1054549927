use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::entity::{NodeInstance, RelInstance};
use crate::model::{Direction, NodeId, PropertyMap, Relationship, Value};
use crate::schema::{NodeClass, RelClass, RelationshipDef};
use crate::storage::{Batch, BatchOp, GraphStore};
use crate::traversal::Traversal;
use crate::{Database, Error, Result};

/// Edges of one declared relationship, seen from one origin node.
pub struct RelationshipManager<'a, S: GraphStore> {
    db: &'a Database<S>,
    origin: &'a NodeInstance,
    origin_id: NodeId,
    name: String,
    def: RelationshipDef,
    targets: Vec<Arc<NodeClass>>,
    model: Option<Arc<RelClass>>,
}

impl<'a, S: GraphStore> RelationshipManager<'a, S> {
    pub fn new(db: &'a Database<S>, origin: &'a NodeInstance, name: &str) -> Result<Self> {
        let origin_id = origin.require_persisted()?;
        let def = origin
            .class()
            .relationship(name)
            .cloned()
            .ok_or_else(|| Error::UnknownRelationship {
                class: origin.class().name().to_string(),
                relation: name.to_string(),
            })?;
        let targets = db.schema().targets(&def)?;
        let model = db.schema().model(&def)?;
        Ok(Self { db, origin, origin_id, name: name.to_string(), def, targets, model })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &RelationshipDef {
        &self.def
    }

    pub fn origin(&self) -> &NodeInstance {
        self.origin
    }

    pub fn targets(&self) -> &[Arc<NodeClass>] {
        &self.targets
    }

    pub fn model(&self) -> Option<&Arc<RelClass>> {
        self.model.as_ref()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// One-hop traversal over this relationship, ready for more filters.
    pub fn traversal(&self) -> Result<Traversal<'a, S>> {
        Traversal::from_node(self.db, Arc::clone(self.origin.class()), self.origin_id).traverse(&self.name)
    }

    pub async fn all(&self) -> Result<Vec<NodeInstance>> {
        self.traversal()?.run().await
    }

    pub async fn count(&self) -> Result<usize> {
        self.traversal()?.len().await
    }

    pub async fn exists(&self) -> Result<bool> {
        self.traversal()?.exists().await
    }

    pub async fn single(&self) -> Result<Option<NodeInstance>> {
        self.traversal()?.single().await
    }

    /// Far ends whose properties equal every filter.
    pub async fn search(&self, filters: &[(&str, Value)]) -> Result<Vec<NodeInstance>> {
        let mut traversal = self.traversal()?;
        for (prop, value) in filters {
            traversal = traversal.filter(prop, "=", value.clone())?;
        }
        traversal.run().await
    }

    /// Exactly one far end matching `filters`.
    pub async fn get(&self, filters: &[(&str, Value)]) -> Result<NodeInstance> {
        let mut found = self.search(filters).await?;
        match found.len() {
            1 => found.pop().ok_or_else(|| self.does_not_exist()),
            0 => Err(self.does_not_exist()),
            count => Err(Error::MultipleResults { class: self.target_names(), count }),
        }
    }

    fn does_not_exist(&self) -> Error {
        Error::DoesNotExist { class: self.target_names() }
    }

    fn target_names(&self) -> String {
        self.targets.iter().map(|t| t.name()).collect::<Vec<_>>().join("|")
    }

    /// Is there a direct edge to `target`?
    pub async fn is_connected(&self, target: &NodeInstance) -> Result<bool> {
        let target_id = self.check_target(target)?;
        Ok(!self.edges_to(target_id).await?.is_empty())
    }

    /// The relationship-value instance of the edge to `target`. `None` when
    /// not connected or when the relationship declares no model.
    pub async fn relationship(&self, target: &NodeInstance) -> Result<Option<RelInstance>> {
        let target_id = self.check_target(target)?;
        let Some(model) = &self.model else {
            return Ok(None);
        };
        match self.edges_to(target_id).await?.first() {
            Some(rel) => Ok(Some(RelInstance::from_relationship(Arc::clone(model), rel)?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Connect to `target` unless already connected.
    pub async fn connect(&self, target: &NodeInstance) -> Result<Option<RelInstance>> {
        self.connect_with(target, &[]).await
    }

    /// Connect to `target`, populating the relationship model with
    /// `properties`. On an existing edge the given properties are written
    /// to it and no new edge is created.
    pub async fn connect_with(&self, target: &NodeInstance, properties: &[(&str, Value)]) -> Result<Option<RelInstance>> {
        let target_id = self.check_target(target)?;
        let wire = self.deflate_properties(properties)?;

        if let Some(existing) = self.edges_to(target_id).await?.into_iter().next() {
            let Some(model) = &self.model else {
                return Ok(None);
            };
            let mut rel = RelInstance::from_relationship(Arc::clone(model), &existing)?;
            if !properties.is_empty() {
                for (key, value) in properties {
                    rel.set(key, value.clone())?;
                }
                rel.save(self.db).await?;
            }
            return Ok(Some(rel));
        }

        let (from, to) = self.ends(target_id);
        let properties = wire.unwrap_or_default();
        let id = self
            .db
            .store()
            .create_relationship(from, &self.def.rel_type, to, properties.clone())
            .await?;
        debug!(relation = %self.name, rel_type = %self.def.rel_type, %from, %to, "connected");

        match &self.model {
            Some(model) => {
                let mut rel = Relationship::new(id, from, to, self.def.rel_type.clone());
                rel.properties = properties;
                Ok(Some(RelInstance::from_relationship(Arc::clone(model), &rel)?))
            }
            None => Ok(None),
        }
    }

    /// Move the edge to `old` over to `new`, keeping its properties. One
    /// batch: either both the removal and the creation happen or neither.
    pub async fn reconnect(&self, old: &NodeInstance, new: &NodeInstance) -> Result<()> {
        let old_id = self.check_target(old)?;
        let new_id = self.check_target(new)?;
        if old_id == new_id {
            return Ok(());
        }
        let edges = self.edges_to(old_id).await?;
        let Some(first) = edges.first() else {
            return Err(Error::NotConnected { relation: self.name.clone(), node: old_id });
        };
        let already = !self.edges_to(new_id).await?.is_empty();

        let mut batch = Batch::new();
        for edge in &edges {
            batch.push(BatchOp::DeleteRelationship { rel: edge.id });
        }
        if !already {
            let (from, to) = if first.src == self.origin_id { (self.origin_id, new_id) } else { (new_id, self.origin_id) };
            batch.push(BatchOp::CreateRelationship {
                from: from.into(),
                rel_type: self.def.rel_type.clone(),
                to: to.into(),
                properties: first.properties.clone(),
            });
        }
        self.db.store().submit(batch).await?;
        debug!(relation = %self.name, old = %old_id, new = %new_id, "reconnected");
        Ok(())
    }

    /// Remove every edge to `target`. Nothing happens when there is none.
    pub async fn disconnect(&self, target: &NodeInstance) -> Result<()> {
        let target_id = self.check_target(target)?;
        let edges = self.edges_to(target_id).await?;
        if edges.is_empty() {
            return Ok(());
        }
        let batch: Batch = edges.iter().map(|e| BatchOp::DeleteRelationship { rel: e.id }).collect::<Vec<_>>().into();
        self.db.store().submit(batch).await?;
        debug!(relation = %self.name, target = %target_id, edges = edges.len(), "disconnected");
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// The target must be saved and an instance of a declared target class.
    fn check_target(&self, target: &NodeInstance) -> Result<NodeId> {
        let id = target.require_persisted()?;
        if !self.targets.iter().any(|t| target.class().is_a(t.name())) {
            return Err(Error::TypeError { expected: self.target_names(), got: target.class().name().to_string() });
        }
        Ok(id)
    }

    async fn edges_to(&self, target: NodeId) -> Result<Vec<Relationship>> {
        let edges = self
            .db
            .store()
            .relationships(self.origin_id, &self.def.rel_type, self.def.direction)
            .await?;
        Ok(edges.into_iter().filter(|r| r.other_node(self.origin_id) == Some(target)).collect())
    }

    /// Edge ends for a new connection to `target`.
    fn ends(&self, target: NodeId) -> (NodeId, NodeId) {
        match self.def.direction {
            Direction::Incoming => (target, self.origin_id),
            Direction::Outgoing | Direction::Either => (self.origin_id, target),
        }
    }

    fn deflate_properties(&self, properties: &[(&str, Value)]) -> Result<Option<PropertyMap>> {
        let Some(model) = &self.model else {
            if properties.is_empty() {
                return Ok(None);
            }
            return Err(Error::InvalidQuery(format!(
                "{}.{} declares no relationship model to hold properties",
                self.origin.class().name(),
                self.name
            )));
        };
        let mut values = HashMap::new();
        for (key, value) in properties {
            let (real, _) = model.properties().resolve(key).ok_or_else(|| Error::UnknownProperty {
                class: model.name().to_string(),
                property: key.to_string(),
            })?;
            values.insert(real.to_string(), value.clone());
        }
        model.properties().deflate_all(&mut values, model.name(), None).map(Some)
    }
}
