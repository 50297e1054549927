//! PropertyMap: the key-value store on nodes, relationships and query
//! parameters.

use std::collections::HashMap;
use super::Value;

/// A map of property names to values.
pub type PropertyMap = HashMap<String, Value>;

/// Build a `PropertyMap` from `(key, value)` pairs.
///
/// ```
/// use neo4j_ogm::model::props;
/// let p = props([("name", "Ada".into()), ("age", 36.into())]);
/// assert_eq!(p.len(), 2);
/// ```
pub fn props<K, I>(pairs: I) -> PropertyMap
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
