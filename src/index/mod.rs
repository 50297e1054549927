//! # Index Manager
//!
//! Lookups over a class's index. Every filter key must name a property
//! declared `index()` or `unique_index()` on the class; aliases are
//! rewritten to the property they forward to. Values are deflated before
//! they reach the store, so `search(&[("born", date)])` matches what
//! `save()` registered.
//!
//! Writes that touch the index live in [`batch`].

pub mod query;
pub(crate) mod batch;

use std::sync::Arc;

use tracing::debug;

use crate::entity::NodeInstance;
use crate::model::{Node, Value};
use crate::properties::{Property, PropertyContext, PropertySet};
use crate::schema::NodeClass;
use crate::storage::GraphStore;
use crate::{Database, Error, Result};

pub use query::IndexQuery;

/// Index lookups for one node class.
pub struct IndexManager<'d, S: GraphStore> {
    db: &'d Database<S>,
    class: Arc<NodeClass>,
}

impl<'d, S: GraphStore> IndexManager<'d, S> {
    pub(crate) fn new(db: &'d Database<S>, class: Arc<NodeClass>) -> Self {
        Self { db, class }
    }

    pub fn class(&self) -> &Arc<NodeClass> {
        &self.class
    }

    /// AND together equality filters into an index query.
    pub fn build_query(&self, filters: &[(&str, Value)]) -> Result<IndexQuery> {
        if filters.is_empty() {
            return Err(Error::InvalidQuery(format!("{} index search needs at least one filter", self.class.name())));
        }
        check_alias_conflicts(self.class.properties(), filters.iter().map(|(k, _)| *k))?;
        let mut terms = Vec::with_capacity(filters.len());
        for (key, value) in filters {
            let (real, prop) = self.indexed(key)?;
            let wire = self.deflate(real, prop, value)?;
            terms.push(IndexQuery::term(real, wire));
        }
        IndexQuery::all(terms).ok_or_else(|| Error::InvalidQuery("empty index query".into()))
    }

    /// Every instance matching all of `filters`.
    pub async fn search(&self, filters: &[(&str, Value)]) -> Result<Vec<NodeInstance>> {
        let nodes = match filters {
            [(key, value)] => {
                let (real, prop) = self.indexed(key)?;
                let wire = self.deflate(real, prop, value)?;
                self.db.store().index_search(self.class.index_name(), real, &wire).await?
            }
            _ => {
                let query = self.build_query(filters)?;
                self.db.store().index_query(self.class.index_name(), &query).await?
            }
        };
        self.inflate(nodes)
    }

    /// Every instance matching a pre-built expression. Keys are validated
    /// and values deflated the same way as for [`search`](Self::search).
    pub async fn search_query(&self, mut query: IndexQuery) -> Result<Vec<NodeInstance>> {
        let props = self.class.properties();
        check_alias_conflicts(props, query.keys().into_iter())?;
        query.map_keys(&|key: &str| {
            props
                .is_alias(key)
                .then(|| props.resolve(key).map(|(real, _)| real.to_string()))
                .flatten()
        });
        query.try_for_each_term(&mut |key: &str, value: &mut Value| -> Result<()> {
            let (real, prop) = self.indexed(key)?;
            *value = self.deflate(real, prop, value)?;
            Ok(())
        })?;
        debug!(class = self.class.name(), query = %query, "index query");
        let nodes = self.db.store().index_query(self.class.index_name(), &query).await?;
        self.inflate(nodes)
    }

    /// Exactly one instance matching `filters`.
    pub async fn get(&self, filters: &[(&str, Value)]) -> Result<NodeInstance> {
        let found = self.search(filters).await?;
        self.exactly_one(found)
    }

    pub async fn get_query(&self, query: IndexQuery) -> Result<NodeInstance> {
        let found = self.search_query(query).await?;
        self.exactly_one(found)
    }

    fn exactly_one(&self, mut found: Vec<NodeInstance>) -> Result<NodeInstance> {
        match found.len() {
            0 => Err(Error::DoesNotExist { class: self.class.name().to_string() }),
            1 => found
                .pop()
                .ok_or_else(|| Error::DoesNotExist { class: self.class.name().to_string() }),
            count => Err(Error::MultipleResults { class: self.class.name().to_string(), count }),
        }
    }

    fn indexed<'k>(&'k self, key: &'k str) -> Result<(&'k str, &'k Property)> {
        let (real, prop) = self.class.properties().resolve(key).ok_or_else(|| Error::UnknownProperty {
            class: self.class.name().to_string(),
            property: key.to_string(),
        })?;
        if !prop.is_indexed() {
            return Err(Error::PropertyNotIndexed {
                class: self.class.name().to_string(),
                property: real.to_string(),
            });
        }
        Ok((real, prop))
    }

    fn deflate(&self, real: &str, prop: &Property, value: &Value) -> Result<Value> {
        prop.deflate(value, PropertyContext { class: self.class.name(), property: real, node: None })
    }

    fn inflate(&self, nodes: Vec<Node>) -> Result<Vec<NodeInstance>> {
        let candidates = [Arc::clone(&self.class)];
        nodes
            .iter()
            .map(|node| NodeInstance::from_stored(self.db.schema(), &candidates, node))
            .collect()
    }
}

/// An alias and the property it forwards to may not both be supplied.
fn check_alias_conflicts<'k>(props: &PropertySet, keys: impl Iterator<Item = &'k str>) -> Result<()> {
    let keys: Vec<&str> = keys.collect();
    for key in &keys {
        if !props.is_alias(key) {
            continue;
        }
        if let Some((real, _)) = props.resolve(key) {
            if keys.contains(&real) {
                return Err(Error::ConflictingFilter { alias: key.to_string(), property: real.to_string() });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::Property;
    use crate::schema::Schema;
    use crate::storage::MemoryStore;
    use chrono::NaiveDate;

    fn db() -> Database<MemoryStore> {
        let schema = Schema::builder()
            .node(
                NodeClass::builder("Person")
                    .property("name", Property::string().unique_index())
                    .property("age", Property::integer().index())
                    .property("born", Property::date().index())
                    .property("bio", Property::string())
                    .alias("full_name", "name")
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        Database::new(MemoryStore::new(), schema)
    }

    async fn seed(db: &Database<MemoryStore>) {
        for (name, age) in [("Ada", 36), ("Bob", 41), ("Cy", 36)] {
            let mut p = db.node("Person").unwrap().with("name", name).unwrap().with("age", age).unwrap();
            p.save(db).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_search_and_get() {
        let db = db();
        seed(&db).await;
        let index = db.index("Person").unwrap();

        let found = index.search(&[("age", Value::Int(36))]).await.unwrap();
        let mut names: Vec<String> = found.iter().map(|p| p.get_as::<String>("name").unwrap()).collect();
        names.sort();
        assert_eq!(names, vec!["Ada", "Cy"]);

        let bob = index.get(&[("full_name", Value::from("Bob"))]).await.unwrap();
        assert_eq!(bob.get_as::<i64>("age").unwrap(), 41);

        let err = index.get(&[("age", Value::Int(36))]).await.unwrap_err();
        assert!(matches!(err, Error::MultipleResults { count: 2, .. }));
        let err = index.get(&[("name", Value::from("Zed"))]).await.unwrap_err();
        assert!(matches!(err, Error::DoesNotExist { .. }));
    }

    #[tokio::test]
    async fn test_filter_validation() {
        let db = db();
        let index = db.index("Person").unwrap();
        assert!(matches!(
            index.search(&[("bio", Value::from("x"))]).await,
            Err(Error::PropertyNotIndexed { .. })
        ));
        assert!(matches!(
            index.search(&[("height", Value::Int(1))]).await,
            Err(Error::UnknownProperty { .. })
        ));
        assert!(matches!(
            index.build_query(&[("name", Value::from("a")), ("full_name", Value::from("b"))]),
            Err(Error::ConflictingFilter { .. })
        ));
        assert!(matches!(index.build_query(&[]), Err(Error::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_query_expression_is_deflated() {
        let db = db();
        let mut p = db
            .node("Person")
            .unwrap()
            .with("name", "Ada")
            .unwrap()
            .with("born", NaiveDate::from_ymd_opt(1815, 12, 10).unwrap())
            .unwrap();
        p.save(&db).await.unwrap();
        seed_other(&db).await;

        let index = db.index("Person").unwrap();
        let q = IndexQuery::term("born", NaiveDate::from_ymd_opt(1815, 12, 10).unwrap())
            & !IndexQuery::term("full_name", "Bob");
        let found = index.get_query(q).await.unwrap();
        assert_eq!(found, p);
    }

    async fn seed_other(db: &Database<MemoryStore>) {
        let mut bob = db
            .node("Person")
            .unwrap()
            .with("name", "Bob")
            .unwrap()
            .with("born", NaiveDate::from_ymd_opt(1815, 12, 10).unwrap())
            .unwrap();
        bob.save(db).await.unwrap();
    }
}
