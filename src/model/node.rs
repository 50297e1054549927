//! Raw node as stored in the graph.

use serde::{Deserialize, Serialize};
use super::{PropertyMap, Value};

/// Remote handle of a stored node. An entity owns one once saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored node: its handle, the classes it was created for, and its
/// deflated (wire) properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Most derived class first, then its ancestors. Empty on category nodes.
    pub labels: Vec<String>,
    pub properties: PropertyMap,
}

impl Node {
    /// The class the node was created as.
    pub fn class_label(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// A wire property; `Null` when absent.
    pub fn wire(&self, key: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.properties.get(key).unwrap_or(&NULL)
    }
}
