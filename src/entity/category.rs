use std::sync::Arc;

use tracing::debug;

use crate::model::{props, NodeId, Value};
use crate::schema::{NodeClass, CATEGORY_RELATION};
use crate::storage::{Batch, BatchOp, GraphStore};
use crate::traversal::Traversal;
use crate::{Database, Error, Result};

use super::NodeInstance;

/// Key category nodes are registered under in the category index.
pub const CATEGORY_KEY: &str = "category";

/// The per-class anchor linked to every instance of its class.
#[derive(Debug, Clone)]
pub struct CategoryNode {
    class: Arc<NodeClass>,
    id: NodeId,
}

impl CategoryNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn class(&self) -> &Arc<NodeClass> {
        &self.class
    }

    /// Look the category node up in the category index, creating it on
    /// first use.
    pub(crate) async fn get_or_create<S: GraphStore>(db: &Database<S>, class: Arc<NodeClass>) -> Result<Self> {
        let index = db.config().category_index.as_str();
        let key = Value::from(class.name());
        if let Some(id) = Self::lookup(db, index, &key).await? {
            return Ok(Self { class, id });
        }

        let mut batch = Batch::new();
        let node = batch.create_node(Vec::new(), props([(CATEGORY_KEY, key.clone())]));

        if db.store().capabilities().atomic_unique_index {
            batch.push(BatchOp::IndexAddUniqueOrFail {
                index: index.to_string(),
                key: CATEGORY_KEY.to_string(),
                value: key.clone(),
                node,
            });
            match db.store().submit(batch).await {
                Ok(results) => {
                    let id = results
                        .first()
                        .and_then(|r| r.node())
                        .ok_or_else(|| Error::InvalidQuery("category batch created no node".into()))?;
                    debug!(class = class.name(), node = %id, "created category node");
                    Ok(Self { class, id })
                }
                // Another writer registered it first.
                Err(Error::UniqueProperty { .. }) => {
                    let id = Self::lookup(db, index, &key)
                        .await?
                        .ok_or_else(|| Error::DoesNotExist { class: format!("{} category", class.name()) })?;
                    Ok(Self { class, id })
                }
                Err(e) => Err(e),
            }
        } else {
            batch.push(BatchOp::IndexAdd {
                index: index.to_string(),
                key: CATEGORY_KEY.to_string(),
                value: key.clone(),
                node,
            });
            db.store().submit(batch).await?;
            // Racing creators converge on the oldest registration.
            let id = Self::lookup(db, index, &key)
                .await?
                .ok_or_else(|| Error::DoesNotExist { class: format!("{} category", class.name()) })?;
            debug!(class = class.name(), node = %id, "created category node");
            Ok(Self { class, id })
        }
    }

    async fn lookup<S: GraphStore>(db: &Database<S>, index: &str, key: &Value) -> Result<Option<NodeId>> {
        let found = db.store().index_search(index, CATEGORY_KEY, key).await?;
        Ok(found
            .iter()
            .filter(|n| n.class_label().is_none() && n.wire(CATEGORY_KEY) == key)
            .map(|n| n.id)
            .min())
    }

    /// Start a traversal at the category node. The only hop available
    /// from here is `instance`.
    pub fn traverse<'d, S: GraphStore>(&self, db: &'d Database<S>, name: &str) -> Result<Traversal<'d, S>> {
        Traversal::from_category(db, Arc::clone(&self.class), self.id).traverse(name)
    }

    /// Every stored instance of the class.
    pub async fn instances<S: GraphStore>(&self, db: &Database<S>) -> Result<Vec<NodeInstance>> {
        self.traverse(db, CATEGORY_RELATION)?.run().await
    }
}
