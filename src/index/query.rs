//! Boolean index query expressions.
//!
//! ```
//! use neo4j_ogm::IndexQuery;
//!
//! let q = IndexQuery::term("name", "Alice") | (IndexQuery::term("age", 30) & !IndexQuery::term("name", "Bob"));
//! assert_eq!(q.to_string(), r#"(name:"Alice" OR (age:30 AND NOT name:"Bob"))"#);
//! ```

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use crate::model::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum IndexQuery {
    Term { key: String, value: Value },
    And(Box<IndexQuery>, Box<IndexQuery>),
    Or(Box<IndexQuery>, Box<IndexQuery>),
    Not(Box<IndexQuery>),
}

impl IndexQuery {
    pub fn term(key: impl Into<String>, value: impl Into<Value>) -> Self {
        IndexQuery::Term { key: key.into(), value: value.into() }
    }

    /// AND together every term; `None` when there are none.
    pub fn all<I>(terms: I) -> Option<Self>
    where
        I: IntoIterator<Item = IndexQuery>,
    {
        terms.into_iter().reduce(|acc, q| acc & q)
    }

    /// Every key the expression mentions, in order of appearance.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys<'q>(&'q self, out: &mut Vec<&'q str>) {
        match self {
            IndexQuery::Term { key, .. } => out.push(key),
            IndexQuery::And(a, b) | IndexQuery::Or(a, b) => {
                a.collect_keys(out);
                b.collect_keys(out);
            }
            IndexQuery::Not(q) => q.collect_keys(out),
        }
    }

    /// Evaluate against one node; `has` answers whether the node holds
    /// `key = value` in the index.
    pub fn matches<F>(&self, has: &F) -> bool
    where
        F: Fn(&str, &Value) -> bool,
    {
        match self {
            IndexQuery::Term { key, value } => has(key, value),
            IndexQuery::And(a, b) => a.matches(has) && b.matches(has),
            IndexQuery::Or(a, b) => a.matches(has) || b.matches(has),
            IndexQuery::Not(q) => !q.matches(has),
        }
    }

    /// Rewrite keys in place.
    pub(crate) fn map_keys<F>(&mut self, f: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            IndexQuery::Term { key, .. } => {
                if let Some(new) = f(key) {
                    *key = new;
                }
            }
            IndexQuery::And(a, b) | IndexQuery::Or(a, b) => {
                a.map_keys(f);
                b.map_keys(f);
            }
            IndexQuery::Not(q) => q.map_keys(f),
        }
    }

    /// Visit every term value mutably.
    pub(crate) fn try_for_each_term<F, E>(&mut self, f: &mut F) -> Result<(), E>
    where
        F: FnMut(&str, &mut Value) -> Result<(), E>,
    {
        match self {
            IndexQuery::Term { key, value } => f(key, value),
            IndexQuery::And(a, b) | IndexQuery::Or(a, b) => {
                a.try_for_each_term(f)?;
                b.try_for_each_term(f)
            }
            IndexQuery::Not(q) => q.try_for_each_term(f),
        }
    }
}

impl BitAnd for IndexQuery {
    type Output = IndexQuery;
    fn bitand(self, rhs: IndexQuery) -> IndexQuery {
        IndexQuery::And(Box::new(self), Box::new(rhs))
    }
}

impl BitOr for IndexQuery {
    type Output = IndexQuery;
    fn bitor(self, rhs: IndexQuery) -> IndexQuery {
        IndexQuery::Or(Box::new(self), Box::new(rhs))
    }
}

impl Not for IndexQuery {
    type Output = IndexQuery;
    fn not(self) -> IndexQuery {
        IndexQuery::Not(Box::new(self))
    }
}

/// Lucene query syntax.
impl fmt::Display for IndexQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexQuery::Term { key, value } => match value {
                Value::String(s) => write!(f, "{key}:\"{}\"", lucene_escape(s)),
                other => write!(f, "{key}:{other}"),
            },
            IndexQuery::And(a, b) => write!(f, "({a} AND {b})"),
            IndexQuery::Or(a, b) => write!(f, "({a} OR {b})"),
            IndexQuery::Not(q) => write!(f, "NOT {q}"),
        }
    }
}

fn lucene_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
