//! Relationship (edge) in the property graph.

use serde::{Deserialize, Serialize};
use super::{NodeId, PropertyMap};

/// Opaque relationship identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelId(pub u64);

impl std::fmt::Display for RelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Traversal direction, seen from the origin node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Either,
}

impl Direction {
    /// Pattern arrows for this direction: `(left, right)` around `[...]`.
    pub fn arrows(self) -> (&'static str, &'static str) {
        match self {
            Direction::Outgoing => ("-", "->"),
            Direction::Incoming => ("<-", "-"),
            Direction::Either => ("-", "-"),
        }
    }

    /// Does `rel` leave/enter `node` the way this direction asks?
    pub fn matches(self, rel: &Relationship, node: NodeId) -> bool {
        match self {
            Direction::Outgoing => rel.src == node,
            Direction::Incoming => rel.dst == node,
            Direction::Either => rel.src == node || rel.dst == node,
        }
    }
}

/// A relationship (directed edge) in the property graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelId,
    pub src: NodeId,
    pub dst: NodeId,
    pub rel_type: String,
    pub properties: PropertyMap,
}

impl Relationship {
    pub fn new(id: RelId, src: NodeId, dst: NodeId, rel_type: impl Into<String>) -> Self {
        Self {
            id,
            src,
            dst,
            rel_type: rel_type.into(),
            properties: PropertyMap::new(),
        }
    }

    /// The "other" end of the relationship from the given node.
    pub fn other_node(&self, from: NodeId) -> Option<NodeId> {
        if from == self.src { Some(self.dst) }
        else if from == self.dst { Some(self.src) }
        else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_matches() {
        let rel = Relationship::new(RelId(1), NodeId(1), NodeId(2), "FRIEND");
        assert!(Direction::Outgoing.matches(&rel, NodeId(1)));
        assert!(!Direction::Outgoing.matches(&rel, NodeId(2)));
        assert!(Direction::Incoming.matches(&rel, NodeId(2)));
        assert!(Direction::Either.matches(&rel, NodeId(2)));
        assert_eq!(rel.other_node(NodeId(2)), Some(NodeId(1)));
        assert_eq!(rel.other_node(NodeId(3)), None);
    }
}
