//! # Traversals
//!
//! A traversal starts at one persisted node (or a class's category node)
//! and accumulates [`Instruction`]s through chained calls. Nothing reaches
//! the store until a terminal call (`run`, `single`, `len`, `exists`)
//! renders the instructions into one parameterised query.
//!
//! ```text
//! alice.traverse(&db, "friends")?          START origin=node($origin_id)
//!     .filter("age", ">", 30)?             MATCH (origin)-[:FRIEND]->(friends),
//!     .order_by("name")?                         (friends)<-[:PERSON]-()
//!     .limit(2)                            WHERE friends.age > $friends_age
//!     .run().await?                        ORDER BY friends.name RETURN friends
//!                                          LIMIT $limit
//! ```
//!
//! Every hop after the first from a category node also requires the node it
//! reaches to be linked to a category node of a declared class, so only
//! mapped instances are ever returned. Literal values are always bound
//! through parameters.

pub mod ast;
pub mod render;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::{smallvec, SmallVec};
use tracing::debug;

use crate::entity::{NodeInstance, RelInstance};
use crate::model::{Direction, Node, NodeId, PropertyMap, Relationship, Value};
use crate::properties::{Property, PropertyContext};
use crate::schema::{NodeClass, RelClass, RelationshipDef, CATEGORY_RELATION};
use crate::storage::GraphStore;
use crate::{Database, Error, Result};

pub use ast::{Instruction, Leg};

const ORIGIN: &str = "origin";
const ORIGIN_PARAM: &str = "origin_id";
const SKIP_PARAM: &str = "skip";
const LIMIT_PARAM: &str = "limit";

// ============================================================================
// Operators
// ============================================================================

/// Comparison operators accepted by [`Traversal::filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Gt,
    /// Whole-string regular expression match.
    Regex,
}

impl FromStr for Op {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" => Ok(Op::Eq),
            "<>" => Ok(Op::Ne),
            "<" => Ok(Op::Lt),
            ">" => Ok(Op::Gt),
            "=~" => Ok(Op::Regex),
            other => Err(Error::InvalidQuery(format!("unsupported operator '{other}'"))),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Op::Eq => "=",
            Op::Ne => "<>",
            Op::Lt => "<",
            Op::Gt => ">",
            Op::Regex => "=~",
        })
    }
}

// ============================================================================
// Traversal
// ============================================================================

/// What a bound alias may hold. Earlier hops stay addressable through
/// `alias.property` filters.
#[derive(Debug, Clone)]
struct Hop {
    classes: Vec<Arc<NodeClass>>,
    rel_alias: Option<String>,
    model: Option<Arc<RelClass>>,
}

/// A query under construction. Consumed by its terminal call.
pub struct Traversal<'d, S: GraphStore> {
    db: &'d Database<S>,
    ast: Vec<Instruction>,
    params: PropertyMap,
    hops: IndexMap<String, Hop>,
    from_category: bool,
    ordered: bool,
}

impl<'d, S: GraphStore> Traversal<'d, S> {
    fn start(db: &'d Database<S>, class: Arc<NodeClass>, id: NodeId, from_category: bool) -> Self {
        let mut params = PropertyMap::new();
        params.insert(ORIGIN_PARAM.to_string(), Value::Int(i64::try_from(id.0).unwrap_or(i64::MAX)));
        let mut hops = IndexMap::new();
        hops.insert(ORIGIN.to_string(), Hop { classes: vec![class], rel_alias: None, model: None });
        Self {
            db,
            ast: vec![Instruction::Start { alias: ORIGIN.to_string(), param: ORIGIN_PARAM.to_string() }],
            params,
            hops,
            from_category,
            ordered: false,
        }
    }

    pub(crate) fn from_node(db: &'d Database<S>, class: Arc<NodeClass>, id: NodeId) -> Self {
        Self::start(db, class, id, false)
    }

    /// Start at the category node of `class`; the only hop available from
    /// there is `instance`.
    pub(crate) fn from_category(db: &'d Database<S>, class: Arc<NodeClass>, id: NodeId) -> Self {
        Self::start(db, class, id, true)
    }

    /// Alias of the most recently traversed node.
    pub fn alias(&self) -> &str {
        self.live_match().map_or(ORIGIN, |(alias, _)| alias)
    }

    /// Alias and class names of the live `Match`, once the first hop is taken.
    fn live_match(&self) -> Option<(&str, &[String])> {
        self.ast.iter().find_map(|instruction| match instruction {
            Instruction::Match { alias, classes, .. } => Some((alias.as_str(), classes.as_slice())),
            _ => None,
        })
    }

    /// Classes the current node may hold.
    fn current_classes(&self) -> Result<Vec<Arc<NodeClass>>> {
        match self.live_match() {
            Some((_, classes)) => classes.iter().map(|name| self.db.schema().node_class(name)).collect(),
            None => Ok(self.current_hop()?.classes.clone()),
        }
    }

    pub fn params(&self) -> &PropertyMap {
        &self.params
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.ast
    }

    fn current_hop(&self) -> Result<&Hop> {
        let alias = self.alias();
        self.hops
            .get(alias)
            .ok_or_else(|| Error::InvalidQuery(format!("unknown alias '{alias}'")))
    }

    fn at_category(&self) -> bool {
        self.from_category && self.live_match().is_none()
    }

    // ========================================================================
    // Hops
    // ========================================================================

    /// Follow a declared relationship of the current node.
    pub fn traverse(self, name: &str) -> Result<Self> {
        self.traverse_where(name, &[])
    }

    /// Follow a declared relationship, constraining properties of its
    /// relationship model with `(property, op, value)` triples.
    pub fn traverse_where(mut self, name: &str, filters: &[(&str, &str, Value)]) -> Result<Self> {
        let def = self.resolve_relationship(name)?;
        let targets = self.db.schema().targets(&def)?;
        let model = self.db.schema().model(&def)?;
        if !filters.is_empty() && model.is_none() {
            return Err(Error::InvalidQuery(format!(
                "relationship '{name}' declares no model to filter on"
            )));
        }

        let alias = self.fresh_alias(name);
        let rel_alias = (model.is_some() || !filters.is_empty()).then(|| format!("{alias}_r"));
        let first_from_category = self.at_category();

        let mut legs: SmallVec<[Leg; 4]> = smallvec![Leg {
            from: self.alias().to_string(),
            rel_alias: rel_alias.clone(),
            rel_types: smallvec![def.rel_type.clone()],
            direction: def.direction,
            to: Some(alias.clone()),
        }];
        if !first_from_category {
            legs.push(Leg {
                from: alias.clone(),
                rel_alias: None,
                rel_types: self.category_types(&targets),
                direction: Direction::Incoming,
                to: None,
            });
        }
        let class_map: Vec<String> = targets.iter().map(|c| c.name().to_string()).collect();
        let live = self.ast.iter_mut().find_map(|instruction| match instruction {
            Instruction::Match { legs, alias, classes } => Some((legs, alias, classes)),
            _ => None,
        });
        match live {
            Some((live_legs, live_alias, live_classes)) => {
                live_legs.extend(legs);
                *live_alias = alias.clone();
                *live_classes = class_map;
            }
            None => self.ast.push(Instruction::Match { legs, alias: alias.clone(), classes: class_map }),
        }

        if let (Some(model), Some(rel_alias)) = (&model, &rel_alias) {
            for (prop, op, value) in filters {
                let op: Op = op.parse()?;
                let (real, property) = match model.properties().resolve(prop) {
                    Some((real, property)) => (real.to_string(), property.clone()),
                    None => {
                        return Err(Error::UnknownProperty {
                            class: model.name().to_string(),
                            property: prop.to_string(),
                        });
                    }
                };
                let wire = bind_value(model.name(), &real, &property, op, value.clone())?;
                self.push_predicate(rel_alias, &real, op, wire);
            }
        }

        self.hops.insert(alias, Hop { classes: targets, rel_alias, model });
        Ok(self)
    }

    /// The single definition `name` has across the current classes.
    fn resolve_relationship(&self, name: &str) -> Result<RelationshipDef> {
        let classes = self.current_classes()?;
        if self.at_category() {
            return match (name, classes.first()) {
                (CATEGORY_RELATION, Some(class)) => Ok(class.category_relationship()),
                _ => Err(Error::UnknownRelationship {
                    class: format!("{} category", class_names(&classes)),
                    relation: name.to_string(),
                }),
            };
        }

        let mut found: Option<&RelationshipDef> = None;
        for class in &classes {
            let Some(def) = class.relationship(name) else { continue };
            match found {
                None => found = Some(def),
                Some(prev) if prev == def => {}
                Some(_) => {
                    return Err(Error::AmbiguousRelationship {
                        relation: name.to_string(),
                        classes: classes.iter().map(|c| c.name().to_string()).collect(),
                    });
                }
            }
        }
        found.cloned().ok_or_else(|| Error::UnknownRelationship {
            class: class_names(&classes),
            relation: name.to_string(),
        })
    }

    /// An unused node alias whose `_r` relationship alias is unused too.
    fn fresh_alias(&self, name: &str) -> String {
        let free = |candidate: &str| !self.alias_taken(candidate) && !self.alias_taken(&format!("{candidate}_r"));
        if free(name) {
            return name.to_string();
        }
        (1..)
            .map(|n| format!("{name}_{n}"))
            .find(|candidate| free(candidate))
            .unwrap_or_else(|| name.to_string())
    }

    fn alias_taken(&self, alias: &str) -> bool {
        self.hops.contains_key(alias) || self.hops.values().any(|hop| hop.rel_alias.as_deref() == Some(alias))
    }

    /// Category edge types of every class that is, or derives from, one of
    /// `targets`. Sorted so rendering is deterministic.
    fn category_types(&self, targets: &[Arc<NodeClass>]) -> SmallVec<[String; 2]> {
        let mut types: SmallVec<[String; 2]> = self
            .db
            .schema()
            .node_classes()
            .filter(|class| targets.iter().any(|t| class.is_a(t.name())))
            .map(|class| class.category_rel_type())
            .collect();
        types.sort();
        types.dedup();
        types
    }

    // ========================================================================
    // Predicates
    // ========================================================================

    /// Constrain a property of the current node, or of an earlier one with
    /// `alias.property`.
    pub fn filter(mut self, prop: &str, op: &str, value: impl Into<Value>) -> Result<Self> {
        let op: Op = op.parse()?;
        let (alias, name) = self.qualify(prop);
        let (real, property, class) = self.resolve_property(&alias, name)?;
        let wire = bind_value(&class, &real, &property, op, value.into())?;
        self.push_predicate(&alias, &real, op, wire);
        Ok(self)
    }

    fn push_predicate(&mut self, alias: &str, real: &str, op: Op, wire: Value) {
        let param = self.fresh_param(&format!("{alias}_{real}"));
        self.ast.push(Instruction::Where(format!("{alias}.{real} {op} ${param}")));
        self.params.insert(param, wire);
    }

    fn fresh_param(&self, base: &str) -> String {
        if !self.params.contains_key(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.params.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    fn qualify<'p>(&self, prop: &'p str) -> (String, &'p str) {
        match prop.split_once('.') {
            Some((alias, name)) => (alias.to_string(), name),
            None => (self.alias().to_string(), prop),
        }
    }

    /// The stored name and declaration of `prop` on the classes bound to
    /// `alias`. Every class declaring it must agree.
    fn resolve_property(&self, alias: &str, prop: &str) -> Result<(String, Property, String)> {
        let hop = self
            .hops
            .get(alias)
            .ok_or_else(|| Error::InvalidQuery(format!("unknown alias '{alias}'")))?;
        let mut found: Option<(&str, &Property, &str)> = None;
        for class in &hop.classes {
            let Some((real, property)) = class.properties().resolve(prop) else { continue };
            match found {
                None => found = Some((real, property, class.name())),
                Some((prev_real, prev, _)) if prev_real == real && prev.kind() == property.kind() => {}
                Some(_) => {
                    return Err(Error::AmbiguousProperty {
                        property: prop.to_string(),
                        classes: hop.classes.iter().map(|c| c.name().to_string()).collect(),
                    });
                }
            }
        }
        let (real, property, class) = found.ok_or_else(|| Error::UnknownProperty {
            class: class_names(&hop.classes),
            property: prop.to_string(),
        })?;
        Ok((real.to_string(), property.clone(), class.to_string()))
    }

    // ========================================================================
    // Ordering and paging
    // ========================================================================

    pub fn order_by(self, prop: &str) -> Result<Self> {
        self.order(prop, false)
    }

    pub fn order_by_desc(self, prop: &str) -> Result<Self> {
        self.order(prop, true)
    }

    fn order(mut self, prop: &str, descending: bool) -> Result<Self> {
        if self.ordered {
            return Err(Error::InvalidQuery("a traversal takes a single ordering key".into()));
        }
        let (alias, name) = self.qualify(prop);
        let (real, _, _) = self.resolve_property(&alias, name)?;
        self.ast.push(Instruction::Order { expr: format!("{alias}.{real}"), descending });
        self.ordered = true;
        Ok(self)
    }

    pub fn skip(mut self, n: usize) -> Self {
        if self.params.insert(SKIP_PARAM.to_string(), Value::Int(i64::try_from(n).unwrap_or(i64::MAX))).is_none() {
            self.ast.push(Instruction::Skip(SKIP_PARAM.to_string()));
        }
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        if self.params.insert(LIMIT_PARAM.to_string(), Value::Int(i64::try_from(n).unwrap_or(i64::MAX))).is_none() {
            self.ast.push(Instruction::Limit(LIMIT_PARAM.to_string()));
        }
        self
    }

    fn paging(&self, param: &str) -> Option<usize> {
        self.params
            .get(param)
            .and_then(Value::as_int)
            .and_then(|n| usize::try_from(n).ok())
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Query text and parameters for fetching the current node.
    pub fn to_query(&self) -> Result<(String, PropertyMap)> {
        let hop = self.current_hop()?;
        let mut items = vec![self.alias().to_string()];
        if hop.model.is_some() {
            items.extend(hop.rel_alias.clone());
        }
        Ok((self.render_with(Instruction::Return { items, count: false }), self.params.clone()))
    }

    /// Query text and parameters for counting the current node.
    pub fn to_count_query(&self) -> (String, PropertyMap) {
        let mut params = self.params.clone();
        params.remove(SKIP_PARAM);
        params.remove(LIMIT_PARAM);
        let ret = Instruction::Return { items: vec![self.alias().to_string()], count: true };
        (self.render_with(ret), params)
    }

    fn render_with(&self, ret: Instruction) -> String {
        let mut instructions = self.ast.clone();
        instructions.push(ret);
        render::render(&instructions)
    }

    // ========================================================================
    // Terminals
    // ========================================================================

    /// Every node the traversal reaches, inflated.
    pub async fn run(self) -> Result<Vec<NodeInstance>> {
        Ok(self.run_with_rels().await?.into_iter().map(|(node, _)| node).collect())
    }

    /// Every node reached, paired with the relationship-value instance of
    /// the last hop's edge when that relationship declares a model.
    pub async fn run_with_rels(self) -> Result<Vec<(NodeInstance, Option<RelInstance>)>> {
        let (query, params) = self.to_query()?;
        let hop = self.current_hop()?;
        debug!(query = %query, params = params.len(), "running traversal");
        let result = self.db.execute(&query, &params).await?;

        let mut out = Vec::with_capacity(result.len());
        for row in &result.rows {
            let node = row.get::<Node>(self.alias())?;
            let instance = NodeInstance::from_stored(self.db.schema(), &hop.classes, &node)?;
            let rel = match (&hop.model, &hop.rel_alias) {
                (Some(model), Some(alias)) => {
                    let rel = row.get::<Relationship>(alias)?;
                    Some(RelInstance::from_relationship(Arc::clone(model), &rel)?)
                }
                _ => None,
            };
            out.push((instance, rel));
        }
        Ok(out)
    }

    /// The first node reached, if any. Adds `LIMIT 1` unless a limit was set.
    pub async fn single(self) -> Result<Option<NodeInstance>> {
        let traversal = if self.params.contains_key(LIMIT_PARAM) { self } else { self.limit(1) };
        Ok(traversal.run().await?.into_iter().next())
    }

    /// Number of nodes reached, after skip and limit.
    pub async fn len(self) -> Result<usize> {
        let (query, params) = self.to_count_query();
        let column = format!("count({})", self.alias());
        debug!(query = %query, "counting traversal");
        let result = self.db.execute(&query, &params).await?;
        let total = match result.rows.first() {
            Some(row) => row.get::<i64>(&column)?,
            None => 0,
        };
        let total = usize::try_from(total).unwrap_or(0);
        let after_skip = total.saturating_sub(self.paging(SKIP_PARAM).unwrap_or(0));
        Ok(self.paging(LIMIT_PARAM).map_or(after_skip, |limit| after_skip.min(limit)))
    }

    pub async fn exists(self) -> Result<bool> {
        Ok(self.len().await? > 0)
    }
}

/// Deflate a filter value for `property`. Regular expressions are matched
/// against the stored text and pass through as strings.
fn bind_value(class: &str, real: &str, property: &Property, op: Op, value: Value) -> Result<Value> {
    if op == Op::Regex {
        return match value {
            Value::String(_) => Ok(value),
            other => Err(Error::TypeError { expected: "STRING".into(), got: other.type_name().into() }),
        };
    }
    property.deflate(&value, PropertyContext { class, property: real, node: None })
}

fn class_names(classes: &[Arc<NodeClass>]) -> String {
    classes.iter().map(|c| c.name()).collect::<Vec<_>>().join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::Property;
    use crate::schema::{RelClass, Schema};
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;

    fn schema() -> Arc<crate::schema::Schema> {
        let person = NodeClass::builder("Person")
            .property("name", Property::string().unique_index())
            .property("age", Property::integer())
            .relationship("friends", RelationshipDef::outgoing("FRIEND", ["Person"]).model("Friendship"))
            .relationship("employer", RelationshipDef::outgoing("WORKS_AT", ["Company"]))
            .relationship("friends_r", RelationshipDef::outgoing("RIVAL", ["Person"]))
            .build()
            .unwrap();
        let employee = NodeClass::builder("Employee")
            .extends(&person)
            .property("salary", Property::float())
            .build()
            .unwrap();
        Schema::builder()
            .rel(RelClass::builder("Friendship").property("since", Property::integer()).build().unwrap())
            .node(person)
            .node(employee)
            .node(
                NodeClass::builder("Company")
                    .property("name", Property::string())
                    .property("age", Property::string())
                    .relationship("staff", RelationshipDef::incoming("WORKS_AT", ["Person"]))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    fn db() -> Database<MemoryStore> {
        Database::new(MemoryStore::new(), schema())
    }

    fn origin(db: &Database<MemoryStore>) -> Traversal<'_, MemoryStore> {
        let class = db.schema().node_class("Person").unwrap();
        Traversal::from_node(db, class, NodeId(7))
    }

    #[test]
    fn test_renders_hop_filter_order_paging() {
        let db = db();
        let t = origin(&db)
            .traverse("friends")
            .unwrap()
            .filter("age", ">", 30)
            .unwrap()
            .order_by("name")
            .unwrap()
            .skip(1)
            .limit(2);
        let (query, params) = t.to_query().unwrap();
        assert_eq!(
            query,
            "START origin=node($origin_id) \
             MATCH (origin)-[friends_r:FRIEND]->(friends), (friends)<-[:EMPLOYEE|PERSON]-() \
             WHERE friends.age > $friends_age \
             ORDER BY friends.name RETURN friends, friends_r SKIP $skip LIMIT $limit"
        );
        assert_eq!(params.get("origin_id"), Some(&Value::Int(7)));
        assert_eq!(params.get("friends_age"), Some(&Value::Int(30)));
        assert_eq!(params.get("limit"), Some(&Value::Int(2)));

        let (count, count_params) = t.to_count_query();
        assert!(count.ends_with("RETURN count(friends)"));
        assert!(!count_params.contains_key("limit"));
    }

    #[test]
    fn test_same_calls_render_the_same() {
        let db = db();
        let build = || {
            origin(&db)
                .traverse("friends")
                .unwrap()
                .filter("age", ">", 30)
                .unwrap()
                .filter("age", "<", 60)
                .unwrap()
                .traverse("friends")
                .unwrap()
                .filter("friends.age", "=", 40)
                .unwrap()
        };
        let (q1, p1) = build().to_query().unwrap();
        let (q2, p2) = build().to_query().unwrap();
        assert_eq!(q1, q2);
        assert_eq!(p1, p2);
        assert!(q1.contains("(friends)-[friends_1_r:FRIEND]->(friends_1)"));
        assert!(q1.contains("friends.age > $friends_age AND friends.age < $friends_age_1 AND friends.age = $friends_age_2"));
    }

    #[test]
    fn test_hops_extend_one_live_match() {
        let db = db();
        let t = origin(&db)
            .traverse("friends")
            .unwrap()
            .traverse("friends")
            .unwrap()
            .traverse("employer")
            .unwrap();
        let matches: Vec<&Instruction> =
            t.instructions().iter().filter(|i| matches!(i, Instruction::Match { .. })).collect();
        assert_eq!(matches.len(), 1);
        match matches[0] {
            Instruction::Match { legs, alias, classes } => {
                assert_eq!(legs.len(), 6);
                assert_eq!(alias, "employer");
                assert_eq!(classes, &vec!["Company".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(t.alias(), "employer");
        // Earlier hops stay addressable.
        assert!(t.filter("friends_1.age", ">", 30).is_ok());
    }

    #[test]
    fn test_aliases_avoid_relationship_variables() {
        let db = db();
        let t = origin(&db).traverse("friends").unwrap().traverse("friends_r").unwrap();
        assert_eq!(t.alias(), "friends_r_1");
        let (query, _) = t.to_query().unwrap();
        assert!(query.contains("(origin)-[friends_r:FRIEND]->(friends)"));
        assert!(query.contains("(friends)-[:RIVAL]->(friends_r_1)"));

        let t = origin(&db).traverse("friends_r").unwrap().traverse("friends").unwrap();
        assert_eq!(t.alias(), "friends_1");
        let (query, _) = t.to_query().unwrap();
        assert!(query.contains("(friends_r)-[friends_1_r:FRIEND]->(friends_1)"));
    }

    #[test]
    fn test_paging_saturates() {
        let db = db();
        let t = origin(&db).traverse("friends").unwrap().skip(usize::MAX).limit(usize::MAX);
        assert_eq!(t.params().get("skip"), Some(&Value::Int(i64::MAX)));
        assert_eq!(t.params().get("limit"), Some(&Value::Int(i64::MAX)));
    }

    #[test]
    fn test_relationship_filters() {
        let db = db();
        let t = origin(&db).traverse_where("friends", &[("since", "<", Value::Int(2000))]).unwrap();
        let (query, params) = t.to_query().unwrap();
        assert!(query.contains("WHERE friends_r.since < $friends_r_since"));
        assert_eq!(params.get("friends_r_since"), Some(&Value::Int(2000)));

        let err = origin(&db).traverse_where("employer", &[("since", "<", Value::Int(1))]);
        assert!(matches!(err, Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_errors() {
        let db = db();
        assert!(matches!(origin(&db).traverse("enemies"), Err(Error::UnknownRelationship { .. })));
        assert!(matches!(
            origin(&db).traverse("friends").unwrap().filter("age", "!=", 1),
            Err(Error::InvalidQuery(_))
        ));
        assert!(matches!(
            origin(&db).traverse("friends").unwrap().filter("height", "=", 1),
            Err(Error::UnknownProperty { .. })
        ));
        assert!(matches!(
            origin(&db).traverse("friends").unwrap().filter("name", "=~", 5),
            Err(Error::TypeError { .. })
        ));
        assert!(matches!(
            origin(&db).traverse("friends").unwrap().order_by("name").unwrap().order_by_desc("age"),
            Err(Error::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_conflicting_property_types() {
        let db = db();
        // staff reaches Persons; Person.age is an integer, Company.age a string.
        let company = db.schema().node_class("Company").unwrap();
        let t = Traversal::from_node(&db, company, NodeId(1)).traverse("staff").unwrap();
        assert!(t.filter("age", ">", 3).is_ok());

        let mut multi = origin(&db).traverse("friends").unwrap();
        let company = db.schema().node_class("Company").unwrap();
        multi.hops.insert(
            "mixed".into(),
            Hop { classes: vec![db.schema().node_class("Person").unwrap(), company], rel_alias: None, model: None },
        );
        assert!(matches!(multi.filter("mixed.age", ">", 3), Err(Error::AmbiguousProperty { .. })));
    }

    #[test]
    fn test_category_start() {
        let db = db();
        let class = db.schema().node_class("Person").unwrap();
        let t = Traversal::from_category(&db, Arc::clone(&class), NodeId(1)).traverse("instance").unwrap();
        let (query, _) = t.to_query().unwrap();
        assert_eq!(query, "START origin=node($origin_id) MATCH (origin)-[:PERSON]->(instance) RETURN instance");
        assert!(matches!(
            Traversal::from_category(&db, class, NodeId(1)).traverse("friends"),
            Err(Error::UnknownRelationship { .. })
        ));
    }
}
