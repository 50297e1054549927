use crate::entity::{NodeInstance, RelInstance};
use crate::model::Value;
use crate::schema::Cardinality;
use crate::storage::GraphStore;
use crate::traversal::Traversal;
use crate::{Error, Result};

use super::RelationshipManager;

/// A relationship manager that enforces the declared cardinality.
///
/// Reads that find an arity the declaration forbids fail with
/// `CardinalityViolation`; writes that would create one fail with
/// `AttemptedCardinalityViolation` before the store is touched.
pub struct Relation<'a, S: GraphStore> {
    inner: RelationshipManager<'a, S>,
    cardinality: Cardinality,
}

impl<'a, S: GraphStore> Relation<'a, S> {
    pub fn new(inner: RelationshipManager<'a, S>) -> Self {
        let cardinality = inner.definition().cardinality;
        Self { inner, cardinality }
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// The unchecked manager underneath.
    pub fn manager(&self) -> &RelationshipManager<'a, S> {
        &self.inner
    }

    pub fn traversal(&self) -> Result<Traversal<'a, S>> {
        self.inner.traversal()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn all(&self) -> Result<Vec<NodeInstance>> {
        let found = self.inner.all().await?;
        self.check_read(found.len())?;
        Ok(found)
    }

    pub async fn count(&self) -> Result<usize> {
        let count = self.inner.count().await?;
        self.check_read(count)?;
        Ok(count)
    }

    /// Whether any edge exists. Checked like every other read.
    pub async fn exists(&self) -> Result<bool> {
        Ok(self.count().await? > 0)
    }

    /// The far end. Under `ZeroOrMore` this is the first of possibly many.
    pub async fn single(&self) -> Result<Option<NodeInstance>> {
        match self.cardinality {
            Cardinality::ZeroOrMore => self.inner.single().await,
            _ => Ok(self.all().await?.into_iter().next()),
        }
    }

    pub async fn search(&self, filters: &[(&str, Value)]) -> Result<Vec<NodeInstance>> {
        self.inner.search(filters).await
    }

    pub async fn get(&self, filters: &[(&str, Value)]) -> Result<NodeInstance> {
        self.inner.get(filters).await
    }

    pub async fn is_connected(&self, target: &NodeInstance) -> Result<bool> {
        self.inner.is_connected(target).await
    }

    pub async fn relationship(&self, target: &NodeInstance) -> Result<Option<RelInstance>> {
        self.inner.relationship(target).await
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub async fn connect(&self, target: &NodeInstance) -> Result<Option<RelInstance>> {
        self.connect_with(target, &[]).await
    }

    pub async fn connect_with(&self, target: &NodeInstance, properties: &[(&str, Value)]) -> Result<Option<RelInstance>> {
        if matches!(self.cardinality, Cardinality::ZeroOrOne | Cardinality::One) && self.inner.count().await? >= 1 {
            return Err(self.attempted("already connected, use reconnect"));
        }
        self.inner.connect_with(target, properties).await
    }

    pub async fn reconnect(&self, old: &NodeInstance, new: &NodeInstance) -> Result<()> {
        self.inner.reconnect(old, new).await
    }

    pub async fn disconnect(&self, target: &NodeInstance) -> Result<()> {
        match self.cardinality {
            Cardinality::One => return Err(self.attempted("cannot disconnect, use reconnect")),
            Cardinality::OneOrMore if self.inner.count().await? <= 1 => {
                return Err(self.attempted("cannot disconnect the last node"));
            }
            _ => {}
        }
        self.inner.disconnect(target).await
    }

    fn check_read(&self, found: usize) -> Result<()> {
        let ok = match self.cardinality {
            Cardinality::ZeroOrMore => true,
            Cardinality::ZeroOrOne => found <= 1,
            Cardinality::OneOrMore => found >= 1,
            Cardinality::One => found == 1,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::CardinalityViolation {
                class: self.inner.origin().class().name().to_string(),
                relation: self.inner.name().to_string(),
                cardinality: self.cardinality,
                found,
            })
        }
    }

    fn attempted(&self, reason: &str) -> Error {
        Error::AttemptedCardinalityViolation {
            class: self.inner.origin().class().name().to_string(),
            relation: self.inner.name().to_string(),
            cardinality: self.cardinality,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::Property;
    use crate::schema::{NodeClass, RelationshipDef, Schema};
    use crate::storage::MemoryStore;
    use crate::Database;

    fn db() -> Database<MemoryStore> {
        let schema = Schema::builder()
            .node(
                NodeClass::builder("Country")
                    .property("name", Property::string())
                    .relationship(
                        "capital",
                        RelationshipDef::outgoing("CAPITAL", ["City"]).cardinality(Cardinality::One),
                    )
                    .relationship(
                        "cities",
                        RelationshipDef::outgoing("HAS_CITY", ["City"]).cardinality(Cardinality::OneOrMore),
                    )
                    .relationship(
                        "anthem",
                        RelationshipDef::outgoing("ANTHEM", ["City"]).cardinality(Cardinality::ZeroOrOne),
                    )
                    .build()
                    .unwrap(),
            )
            .node(NodeClass::builder("City").property("name", Property::string()).build().unwrap())
            .build()
            .unwrap();
        Database::new(MemoryStore::new(), schema)
    }

    async fn node(db: &Database<MemoryStore>, class: &str, name: &str) -> NodeInstance {
        let mut n = db.node(class).unwrap().with("name", name).unwrap();
        n.save(db).await.unwrap();
        n
    }

    #[tokio::test]
    async fn test_exactly_one() {
        let db = db();
        let france = node(&db, "Country", "France").await;
        let paris = node(&db, "City", "Paris").await;
        let lyon = node(&db, "City", "Lyon").await;
        let capital = france.rel(&db, "capital").unwrap();

        assert!(matches!(capital.single().await, Err(Error::CardinalityViolation { found: 0, .. })));
        assert!(matches!(capital.exists().await, Err(Error::CardinalityViolation { found: 0, .. })));
        capital.connect(&paris).await.unwrap();
        assert!(capital.exists().await.unwrap());
        assert!(matches!(
            capital.connect(&lyon).await,
            Err(Error::AttemptedCardinalityViolation { .. })
        ));
        assert!(matches!(
            capital.disconnect(&paris).await,
            Err(Error::AttemptedCardinalityViolation { .. })
        ));
        capital.reconnect(&paris, &lyon).await.unwrap();
        assert_eq!(capital.single().await.unwrap(), Some(lyon));
    }

    #[tokio::test]
    async fn test_one_or_more() {
        let db = db();
        let france = node(&db, "Country", "France").await;
        let paris = node(&db, "City", "Paris").await;
        let lyon = node(&db, "City", "Lyon").await;
        let cities = france.rel(&db, "cities").unwrap();

        assert!(matches!(cities.all().await, Err(Error::CardinalityViolation { .. })));
        assert!(matches!(cities.exists().await, Err(Error::CardinalityViolation { found: 0, .. })));
        cities.connect(&paris).await.unwrap();
        cities.connect(&lyon).await.unwrap();
        cities.disconnect(&lyon).await.unwrap();
        assert!(matches!(
            cities.disconnect(&paris).await,
            Err(Error::AttemptedCardinalityViolation { .. })
        ));
        assert_eq!(cities.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_zero_or_one() {
        let db = db();
        let france = node(&db, "Country", "France").await;
        let paris = node(&db, "City", "Paris").await;
        let lyon = node(&db, "City", "Lyon").await;
        let anthem = france.rel(&db, "anthem").unwrap();

        assert_eq!(anthem.single().await.unwrap(), None);
        assert!(!anthem.exists().await.unwrap());
        anthem.connect(&paris).await.unwrap();
        assert!(matches!(
            anthem.connect(&lyon).await,
            Err(Error::AttemptedCardinalityViolation { .. })
        ));

        // A second edge written past the manager is caught on read.
        anthem.manager().connect(&lyon).await.unwrap();
        assert!(matches!(anthem.all().await, Err(Error::CardinalityViolation { found: 2, .. })));
        assert!(matches!(anthem.exists().await, Err(Error::CardinalityViolation { found: 2, .. })));
        anthem.disconnect(&lyon).await.unwrap();
        assert_eq!(anthem.count().await.unwrap(), 1);
    }
}
