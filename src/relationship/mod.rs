//! # Relationships
//!
//! A [`RelationshipManager`] is bound to one persisted origin instance and
//! one declared relationship. It reads the far end through a one-hop
//! [`Traversal`](crate::Traversal) and writes edges directly.
//!
//! [`Relation`] wraps a manager with the arity rules of the declared
//! [`Cardinality`](crate::Cardinality):
//!
//! | Cardinality | read with 0 edges | `connect` when connected | `disconnect` |
//! |---|---|---|---|
//! | zero or more | empty | allowed | allowed |
//! | zero or one | empty | `AttemptedCardinalityViolation` | allowed |
//! | one or more | `CardinalityViolation` | allowed | fails on the last edge |
//! | exactly one | `CardinalityViolation` | fails, use `reconnect` | fails, use `reconnect` |

mod cardinality;
mod manager;

pub use cardinality::Relation;
pub use manager::RelationshipManager;
