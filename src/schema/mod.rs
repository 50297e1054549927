//! # Entity Schema
//!
//! Node classes, relationship-value classes and relationship definitions,
//! declared once through builders and frozen into a [`Schema`] registry.
//!
//! ```text
//! NodeClass::builder("Person")      ─┐
//! NodeClass::builder("Country")     ─┼─► Schema::builder().node(..).build() ─► Arc<Schema>
//! RelClass::builder("FriendshipRel") ─┘          (targets resolved, collisions rejected)
//! ```
//!
//! Every node class owns an implicit category relationship (`instance`)
//! whose edge type is the class name in upper snake case.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use indexmap::IndexMap;

use crate::entity::NodeInstance;
use crate::model::Direction;
use crate::properties::{Property, PropertyDef, PropertySet};
use crate::{Error, Result};

/// Hop name that leads from a category node to its instances.
pub const CATEGORY_RELATION: &str = "instance";

// ============================================================================
// Cardinality
// ============================================================================

/// Declared arity of a relationship, seen from its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cardinality {
    #[default]
    ZeroOrMore,
    ZeroOrOne,
    OneOrMore,
    One,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Cardinality::ZeroOrMore => "zero or more",
            Cardinality::ZeroOrOne => "zero or one",
            Cardinality::OneOrMore => "one or more",
            Cardinality::One => "exactly one",
        })
    }
}

// ============================================================================
// RelationshipDef
// ============================================================================

/// One declared edge type between node classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipDef {
    pub rel_type: String,
    pub direction: Direction,
    /// Target class names, resolved through the `Schema`.
    pub targets: Vec<String>,
    pub cardinality: Cardinality,
    /// Relationship-value class describing edge properties.
    pub model: Option<String>,
}

impl RelationshipDef {
    pub fn new<I, T>(rel_type: impl Into<String>, direction: Direction, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            rel_type: rel_type.into(),
            direction,
            targets: targets.into_iter().map(Into::into).collect(),
            cardinality: Cardinality::ZeroOrMore,
            model: None,
        }
    }

    /// `(origin)-[:TYPE]->(target)`
    pub fn outgoing<I, T>(rel_type: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::new(rel_type, Direction::Outgoing, targets)
    }

    /// `(origin)<-[:TYPE]-(target)`
    pub fn incoming<I, T>(rel_type: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::new(rel_type, Direction::Incoming, targets)
    }

    /// `(origin)-[:TYPE]-(target)`
    pub fn either<I, T>(rel_type: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::new(rel_type, Direction::Either, targets)
    }

    pub fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn model(mut self, rel_class: impl Into<String>) -> Self {
        self.model = Some(rel_class.into());
        self
    }
}

// ============================================================================
// NodeClass
// ============================================================================

/// Invoked once after an instance is first persisted.
pub type PostCreateHook = Arc<dyn Fn(&NodeInstance) + Send + Sync>;

/// Immutable descriptor of a node class.
pub struct NodeClass {
    name: String,
    index_name: String,
    labels: Vec<String>,
    properties: PropertySet,
    relationships: IndexMap<String, RelationshipDef>,
    post_create: Option<PostCreateHook>,
}

impl fmt::Debug for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeClass")
            .field("name", &self.name)
            .field("index_name", &self.index_name)
            .field("labels", &self.labels)
            .field("properties", &self.properties)
            .field("relationships", &self.relationships)
            .finish_non_exhaustive()
    }
}

impl NodeClass {
    pub fn builder(name: impl Into<String>) -> NodeClassBuilder {
        NodeClassBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index holding this class's indexed property values.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// The class name followed by its ancestors, most derived first.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Is this class `name` or one of its subclasses?
    pub fn is_a(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l == name)
    }

    pub fn properties(&self) -> &PropertySet {
        &self.properties
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.get(name)
    }

    pub fn relationships(&self) -> impl Iterator<Item = (&str, &RelationshipDef)> {
        self.relationships.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Edge type linking the category node to each instance.
    pub fn category_rel_type(&self) -> String {
        upper_snake(&self.name)
    }

    /// The implicit `instance` relationship of this class's category node.
    pub fn category_relationship(&self) -> RelationshipDef {
        RelationshipDef::outgoing(self.category_rel_type(), [self.name.clone()])
    }

    pub(crate) fn post_create_hook(&self) -> Option<&PostCreateHook> {
        self.post_create.as_ref()
    }
}

/// Builder for [`NodeClass`].
pub struct NodeClassBuilder {
    name: String,
    index_name: Option<String>,
    ancestors: Vec<String>,
    properties: PropertySet,
    relationships: IndexMap<String, RelationshipDef>,
    post_create: Option<PostCreateHook>,
}

impl NodeClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index_name: None,
            ancestors: Vec::new(),
            properties: PropertySet::new(),
            relationships: IndexMap::new(),
            post_create: None,
        }
    }

    /// Inherit everything `base` declares. Declarations made on this
    /// builder afterwards override the inherited ones.
    pub fn extends(mut self, base: &NodeClass) -> Self {
        for (name, def) in base.properties.iter() {
            self.properties.insert(name, def.clone());
        }
        for (name, def) in &base.relationships {
            self.relationships.insert(name.clone(), def.clone());
        }
        self.ancestors = base.labels.clone();
        if self.post_create.is_none() {
            self.post_create = base.post_create.clone();
        }
        self
    }

    pub fn property(mut self, name: impl Into<String>, property: Property) -> Self {
        self.properties.insert(name, PropertyDef::Stored(property));
        self
    }

    /// Declare `name` as a non-stored alias of the property `to`.
    pub fn alias(mut self, name: impl Into<String>, to: impl Into<String>) -> Self {
        self.properties.insert(name, PropertyDef::Alias { to: to.into() });
        self
    }

    pub fn relationship(mut self, name: impl Into<String>, def: RelationshipDef) -> Self {
        self.relationships.insert(name.into(), def);
        self
    }

    pub fn index_name(mut self, index: impl Into<String>) -> Self {
        self.index_name = Some(index.into());
        self
    }

    pub fn post_create<F>(mut self, hook: F) -> Self
    where
        F: Fn(&NodeInstance) + Send + Sync + 'static,
    {
        self.post_create = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<NodeClass> {
        if self.name.is_empty() || !self.name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(Error::SchemaError(format!("invalid class name '{}'", self.name)));
        }
        self.properties.validate(&self.name)?;
        for (name, _) in self.properties.iter() {
            if self.relationships.contains_key(name) {
                return Err(Error::SchemaError(format!(
                    "{}.{name} is declared both as property and relationship",
                    self.name
                )));
            }
        }
        if self.relationships.contains_key(CATEGORY_RELATION) {
            return Err(Error::SchemaError(format!(
                "{}: '{CATEGORY_RELATION}' is reserved for category traversal",
                self.name
            )));
        }

        let mut labels = vec![self.name.clone()];
        labels.extend(self.ancestors);
        Ok(NodeClass {
            index_name: self.index_name.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            labels,
            properties: self.properties,
            relationships: self.relationships,
            post_create: self.post_create,
        })
    }
}

// ============================================================================
// RelClass
// ============================================================================

/// Descriptor of the properties stored on an edge. No identity, no
/// category node.
#[derive(Debug)]
pub struct RelClass {
    name: String,
    properties: PropertySet,
}

impl RelClass {
    pub fn builder(name: impl Into<String>) -> RelClassBuilder {
        RelClassBuilder { name: name.into(), properties: PropertySet::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &PropertySet {
        &self.properties
    }
}

pub struct RelClassBuilder {
    name: String,
    properties: PropertySet,
}

impl RelClassBuilder {
    pub fn property(mut self, name: impl Into<String>, property: Property) -> Self {
        self.properties.insert(name, PropertyDef::Stored(property));
        self
    }

    pub fn alias(mut self, name: impl Into<String>, to: impl Into<String>) -> Self {
        self.properties.insert(name, PropertyDef::Alias { to: to.into() });
        self
    }

    pub fn build(self) -> Result<RelClass> {
        self.properties.validate(&self.name)?;
        if let Some((name, _)) = self.properties.stored().find(|(_, p)| p.is_indexed()) {
            return Err(Error::SchemaError(format!(
                "{}.{name}: relationship properties cannot be indexed",
                self.name
            )));
        }
        Ok(RelClass { name: self.name, properties: self.properties })
    }
}

// ============================================================================
// Schema registry
// ============================================================================

/// Frozen name → class registry.
#[derive(Debug, Default)]
pub struct Schema {
    nodes: HashMap<String, Arc<NodeClass>>,
    rels: HashMap<String, Arc<RelClass>>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn node_class(&self, name: &str) -> Result<Arc<NodeClass>> {
        self.nodes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownClass(name.to_string()))
    }

    pub fn rel_class(&self, name: &str) -> Result<Arc<RelClass>> {
        self.rels
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownClass(name.to_string()))
    }

    pub fn node_classes(&self) -> impl Iterator<Item = &Arc<NodeClass>> {
        self.nodes.values()
    }

    /// Target classes of a relationship, in declaration order.
    pub fn targets(&self, def: &RelationshipDef) -> Result<Vec<Arc<NodeClass>>> {
        def.targets.iter().map(|t| self.node_class(t)).collect()
    }

    /// The relationship-value class of a relationship, if it declares one.
    pub fn model(&self, def: &RelationshipDef) -> Result<Option<Arc<RelClass>>> {
        def.model.as_deref().map(|m| self.rel_class(m)).transpose()
    }
}

#[derive(Default)]
pub struct SchemaBuilder {
    nodes: Vec<NodeClass>,
    rels: Vec<RelClass>,
}

impl SchemaBuilder {
    pub fn node(mut self, class: NodeClass) -> Self {
        self.nodes.push(class);
        self
    }

    pub fn rel(mut self, class: RelClass) -> Self {
        self.rels.push(class);
        self
    }

    /// Resolve every cross-class reference and freeze the registry.
    pub fn build(self) -> Result<Arc<Schema>> {
        let mut schema = Schema::default();
        for class in self.rels {
            let name = class.name.clone();
            if schema.rels.insert(name.clone(), Arc::new(class)).is_some() {
                return Err(Error::SchemaError(format!("relationship class '{name}' registered twice")));
            }
        }
        for class in self.nodes {
            let name = class.name.clone();
            if schema.nodes.insert(name.clone(), Arc::new(class)).is_some() {
                return Err(Error::SchemaError(format!("node class '{name}' registered twice")));
            }
        }

        let mut category_types: HashMap<String, String> = HashMap::new();
        for class in schema.nodes.values() {
            let rel_type = class.category_rel_type();
            if let Some(other) = category_types.get(&rel_type) {
                return Err(Error::SchemaError(format!(
                    "classes '{other}' and '{}' share the category type '{rel_type}'",
                    class.name
                )));
            }
            category_types.insert(rel_type, class.name.clone());
        }

        for class in schema.nodes.values() {
            for (rel_name, def) in class.relationships() {
                if def.targets.is_empty() {
                    return Err(Error::SchemaError(format!(
                        "{}.{rel_name} declares no target class",
                        class.name
                    )));
                }
                for target in &def.targets {
                    if !schema.nodes.contains_key(target) {
                        return Err(Error::SchemaError(format!(
                            "{}.{rel_name} targets unknown class '{target}'",
                            class.name
                        )));
                    }
                }
                if let Some(model) = &def.model {
                    if !schema.rels.contains_key(model) {
                        return Err(Error::SchemaError(format!(
                            "{}.{rel_name} uses unknown relationship class '{model}'",
                            class.name
                        )));
                    }
                }
                if let Some(owner) = category_types.get(&def.rel_type) {
                    return Err(Error::SchemaError(format!(
                        "{}.{rel_name}: type '{}' is reserved for the {owner} category",
                        class.name, def.rel_type
                    )));
                }
            }
        }
        tracing::debug!(
            node_classes = schema.nodes.len(),
            rel_classes = schema.rels.len(),
            "schema registered"
        );
        Ok(Arc::new(schema))
    }
}

/// `FooBar` → `FOO_BAR`
pub fn upper_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        out.extend(c.to_uppercase());
    }
    out
}
