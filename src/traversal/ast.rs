//! Instructions a traversal accumulates before rendering.

use std::fmt;

use smallvec::SmallVec;

use crate::model::Direction;

/// One pattern leg: `(from)-[rel_alias:TYPES]->(to)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leg {
    pub from: String,
    pub rel_alias: Option<String>,
    pub rel_types: SmallVec<[String; 2]>,
    /// Seen from `from`.
    pub direction: Direction,
    /// `None` renders an anonymous node.
    pub to: Option<String>,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (left, right) = self.direction.arrows();
        write!(f, "({}){left}[", self.from)?;
        if let Some(alias) = &self.rel_alias {
            f.write_str(alias)?;
        }
        if !self.rel_types.is_empty() {
            write!(f, ":{}", self.rel_types.join("|"))?;
        }
        write!(f, "]{right}({})", self.to.as_deref().unwrap_or(""))
    }
}

/// Everything a query can contain, in the order calls were made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Bind `alias` to the node id in parameter `param`.
    Start { alias: String, param: String },
    /// The live pattern. Each hop appends its legs (the relationship and,
    /// usually, the category link of the node it reaches) and replaces
    /// `alias` and `classes` with the node it reached.
    Match {
        legs: SmallVec<[Leg; 4]>,
        alias: String,
        /// Classes `alias` may hold.
        classes: Vec<String>,
    },
    /// One predicate, AND-combined with the others.
    Where(String),
    Order { expr: String, descending: bool },
    Return { items: Vec<String>, count: bool },
    Skip(String),
    Limit(String),
}
