//! Node writes that keep the class index consistent.
//!
//! Unique-indexed values are registered with `IndexAddUniqueOrFail` when
//! the store supports it; the whole batch then fails atomically on a
//! conflict. Stores without the primitive get a pre-check before the batch
//! and a post-check after it. A conflict found by the post-check was lost
//! to a concurrent writer between the two and surfaces as
//! `DataInconsistency`; values are never silently overwritten.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::entity::{CategoryNode, NodeInstance};
use crate::model::{NodeId, PropertyMap, Value};
use crate::schema::NodeClass;
use crate::storage::{Batch, BatchOp, BatchResult, GraphStore, NodeRef};
use crate::{Database, Error, Result};

/// One value to register in the class index.
#[derive(Debug, Clone)]
struct Entry {
    key: String,
    value: Value,
    unique: bool,
}

fn entries(class: &NodeClass, wire: &PropertyMap) -> Vec<Entry> {
    class
        .properties()
        .stored()
        .filter(|(_, prop)| prop.is_indexed())
        .filter_map(|(name, prop)| {
            wire.get(name).filter(|v| !v.is_null()).map(|value| Entry {
                key: name.to_string(),
                value: value.clone(),
                unique: prop.is_unique(),
            })
        })
        .collect()
}

fn index_op(index: &str, entry: &Entry, node: NodeRef, atomic: bool) -> BatchOp {
    if entry.unique && atomic {
        BatchOp::IndexAddUniqueOrFail {
            index: index.to_string(),
            key: entry.key.clone(),
            value: entry.value.clone(),
            node,
        }
    } else {
        BatchOp::IndexAdd {
            index: index.to_string(),
            key: entry.key.clone(),
            value: entry.value.clone(),
            node,
        }
    }
}

fn unique_conflict(index: &str, entry: &Entry) -> Error {
    Error::UniqueProperty {
        index: index.to_string(),
        key: entry.key.clone(),
        value: entry.value.to_string(),
    }
}

async fn submit<S: GraphStore>(db: &Database<S>, batch: Batch) -> Result<Vec<BatchResult>> {
    if let Some(max) = db.store().capabilities().max_batch_size {
        if batch.len() > max {
            return Err(Error::InvalidQuery(format!(
                "batch of {} ops exceeds the store limit of {max}",
                batch.len()
            )));
        }
    }
    db.store().submit(batch).await
}

/// Nodes other than `node` holding `entry` in `index`.
async fn holders<S: GraphStore>(db: &Database<S>, index: &str, entry: &Entry, node: Option<NodeId>) -> Result<Vec<NodeId>> {
    let found = db.store().index_search(index, &entry.key, &entry.value).await?;
    Ok(found.into_iter().map(|n| n.id).filter(|id| Some(*id) != node).collect())
}

// ============================================================================
// Create
// ============================================================================

/// Create one node per instance, link each to the class category node and
/// register its indexed values, all in one batch. Returns the new ids in
/// instance order.
pub(crate) async fn create_nodes<S: GraphStore>(
    db: &Database<S>,
    class: &Arc<NodeClass>,
    instances: &mut [NodeInstance],
) -> Result<Vec<NodeId>> {
    let index = class.index_name();
    let mut wires = Vec::with_capacity(instances.len());
    for inst in instances.iter_mut() {
        wires.push(class.properties().deflate_all(inst.values_mut(), class.name(), None)?);
    }
    let per_node: Vec<Vec<Entry>> = wires.iter().map(|w| entries(class, w)).collect();

    // The store checks against existing entries only.
    let mut claimed: Vec<&Entry> = Vec::new();
    for entry in per_node.iter().flatten().filter(|e| e.unique) {
        if claimed.iter().any(|c| c.key == entry.key && c.value == entry.value) {
            return Err(unique_conflict(index, entry));
        }
        claimed.push(entry);
    }

    let atomic = db.store().capabilities().atomic_unique_index;
    if !atomic && !claimed.is_empty() {
        warn!(
            class = class.name(),
            "store has no create-or-fail unique registration, guarding with pre/post checks"
        );
        for entry in &claimed {
            if !holders(db, index, entry, None).await?.is_empty() {
                return Err(unique_conflict(index, entry));
            }
        }
    }

    let category = CategoryNode::get_or_create(db, Arc::clone(class)).await?;
    let rel_type = class.category_rel_type();
    let mut batch = Batch::new();
    let mut created = Vec::with_capacity(wires.len());
    for (wire, node_entries) in wires.into_iter().zip(&per_node) {
        let node = batch.create_node(class.labels().to_vec(), wire);
        created.push(node);
        batch.push(BatchOp::CreateRelationship {
            from: category.id().into(),
            rel_type: rel_type.clone(),
            to: node,
            properties: PropertyMap::new(),
        });
        for entry in node_entries {
            batch.push(index_op(index, entry, node, atomic));
        }
    }

    let results = submit(db, batch).await?;
    let ids = created
        .iter()
        .map(|node| match node {
            NodeRef::Pending(pos) => results.get(*pos).and_then(|r| r.node()),
            NodeRef::Id(id) => Some(*id),
        })
        .collect::<Option<Vec<NodeId>>>()
        .ok_or_else(|| Error::InvalidQuery("store did not report every created node".into()))?;
    debug!(class = class.name(), count = ids.len(), "created nodes");

    if !atomic {
        for (id, node_entries) in ids.iter().zip(&per_node) {
            for entry in node_entries.iter().filter(|e| e.unique) {
                let others = holders(db, index, entry, Some(*id)).await?;
                if !others.is_empty() {
                    discard(db, index, &ids).await;
                    return Err(Error::DataInconsistency {
                        index: index.to_string(),
                        key: entry.key.clone(),
                        value: entry.value.to_string(),
                        nodes: others,
                    });
                }
            }
        }
    }
    Ok(ids)
}

/// Best-effort removal of nodes created by a batch that lost a race.
async fn discard<S: GraphStore>(db: &Database<S>, index: &str, ids: &[NodeId]) {
    let mut batch = Batch::new();
    for id in ids {
        batch.push(BatchOp::IndexRemove { index: index.to_string(), node: *id });
        batch.push(BatchOp::DeleteNode { node: *id });
    }
    if let Err(e) = db.store().submit(batch).await {
        warn!(error = %e, nodes = ids.len(), "failed to remove nodes after unique conflict");
    }
}

// ============================================================================
// Update
// ============================================================================

/// Write an instance's values back to its node. Stale index entries are
/// removed and the current ones registered in the same batch, so a
/// conflict leaves both the node and the index untouched.
pub(crate) async fn update_node<S: GraphStore>(db: &Database<S>, instance: &mut NodeInstance) -> Result<()> {
    let id = instance.require_persisted()?;
    let class = Arc::clone(instance.class());
    let index = class.index_name();
    let wire = class.properties().deflate_all(instance.values_mut(), class.name(), Some(id))?;
    let node_entries = entries(&class, &wire);

    let atomic = db.store().capabilities().atomic_unique_index;
    if !atomic {
        for entry in node_entries.iter().filter(|e| e.unique) {
            if !holders(db, index, entry, Some(id)).await?.is_empty() {
                return Err(unique_conflict(index, entry));
            }
        }
    }

    let mut batch = Batch::new();
    batch.push(BatchOp::IndexRemove { index: index.to_string(), node: id });
    batch.push(BatchOp::SetNodeProperties { node: id.into(), properties: wire });
    for entry in &node_entries {
        batch.push(index_op(index, entry, id.into(), atomic));
    }
    submit(db, batch).await?;

    if !atomic {
        for entry in node_entries.iter().filter(|e| e.unique) {
            let others = holders(db, index, entry, Some(id)).await?;
            if !others.is_empty() {
                return Err(Error::DataInconsistency {
                    index: index.to_string(),
                    key: entry.key.clone(),
                    value: entry.value.to_string(),
                    nodes: others,
                });
            }
        }
    }
    debug!(class = class.name(), node = %id, "updated node");
    Ok(())
}
