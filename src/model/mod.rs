//! # Property Graph Model
//!
//! Clean DTOs shared by the store, the query layer and the mapped entities.
//! These types cross every boundary: store ↔ traversal ↔ entity ↔ user.
//!
//! This module is pure data. No I/O, no state, no async.

pub mod node;
pub mod relationship;
pub mod value;
pub mod property_map;

pub use node::{Node, NodeId};
pub use relationship::{Relationship, RelId, Direction};
pub use value::{Value, FromValue};
pub use property_map::{PropertyMap, props};
