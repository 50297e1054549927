use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{FromValue, NodeId, RelId, Relationship, Value};
use crate::schema::RelClass;
use crate::storage::GraphStore;
use crate::{Database, Error, Result};

use super::NULL;

/// Properties of one stored edge, typed by its relationship-value class.
#[derive(Debug, Clone)]
pub struct RelInstance {
    class: Arc<RelClass>,
    values: HashMap<String, Value>,
    id: RelId,
    start: NodeId,
    end: NodeId,
}

impl RelInstance {
    pub(crate) fn from_relationship(class: Arc<RelClass>, rel: &Relationship) -> Result<Self> {
        let values = class.properties().inflate_all(&rel.properties, class.name(), None)?;
        Ok(Self { class, values, id: rel.id, start: rel.src, end: rel.dst })
    }

    pub fn class(&self) -> &Arc<RelClass> {
        &self.class
    }

    pub fn id(&self) -> RelId {
        self.id
    }

    /// Node the edge leaves.
    pub fn start(&self) -> NodeId {
        self.start
    }

    /// Node the edge enters.
    pub fn end(&self) -> NodeId {
        self.end
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

    /// Write the edge properties back.
    pub async fn save<S: GraphStore>(&mut self, db: &Database<S>) -> Result<()> {
        let wire = self
            .class
            .properties()
            .deflate_all(&mut self.values, self.class.name(), None)?;
        db.store().set_relationship_properties(self.id, wire).await
    }
}

/// Same edge.
impl PartialEq for RelInstance {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
