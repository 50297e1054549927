//! Universal value type shared by native attributes and the wire.
//!
//! Native property values may use any variant. Values handed to a
//! `GraphStore` are always *deflated*: only `Null`, `Bool`, `Int`, `Float`,
//! `String` and `List`s of those ever cross the wire. `Node` and
//! `Relationship` only appear in query result rows.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use super::{Node, Relationship};
use crate::{Error, Result};

/// Neo4j-compatible value type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),

    // Graph types (result rows only)
    Node(Box<Node>),
    Relationship(Box<Relationship>),

    // Temporal types (native side only)
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    LocalDateTime(NaiveDateTime),
}

// ============================================================================
// Type checking
// ============================================================================

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::List(_) => "LIST",
            Value::Map(_) => "MAP",
            Value::Node(_) => "NODE",
            Value::Relationship(_) => "RELATIONSHIP",
            Value::Date(_) => "DATE",
            Value::DateTime(_) => "DATETIME",
            Value::LocalDateTime(_) => "LOCAL_DATETIME",
        }
    }

    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }
    pub fn is_numeric(&self) -> bool { matches!(self, Value::Int(_) | Value::Float(_)) }
    pub fn is_string(&self) -> bool { matches!(self, Value::String(_)) }

    /// Neo4j-compatible truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            _ => true,
        }
    }

    /// Attempt to extract as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Attempt to extract as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Attempt to extract as &str
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int(v as i64) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<u32> for Value { fn from(v: u32) -> Self { Value::Int(v as i64) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Float(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::String(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::String(v.to_owned()) } }
impl From<NaiveDate> for Value { fn from(v: NaiveDate) -> Self { Value::Date(v) } }
impl From<NaiveDateTime> for Value { fn from(v: NaiveDateTime) -> Self { Value::LocalDateTime(v) } }
impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(v: DateTime<Tz>) -> Self { Value::DateTime(v.fixed_offset()) }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self { Value::List(v.into_iter().map(Into::into).collect()) }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Value::Null) }
}

/// Convert from Value to concrete types.
pub trait FromValue: Sized {
    fn from_value(val: &Value) -> Result<Self>;
}

fn type_error(expected: &str, got: &Value) -> Error {
    Error::TypeError { expected: expected.into(), got: got.type_name().into() }
}

impl FromValue for Value {
    fn from_value(val: &Value) -> Result<Self> { Ok(val.clone()) }
}

impl FromValue for String {
    fn from_value(val: &Value) -> Result<Self> {
        val.as_str().map(str::to_owned).ok_or_else(|| type_error("String", val))
    }
}

impl FromValue for i64 {
    fn from_value(val: &Value) -> Result<Self> {
        val.as_int().ok_or_else(|| type_error("Integer", val))
    }
}

impl FromValue for f64 {
    fn from_value(val: &Value) -> Result<Self> {
        val.as_float().ok_or_else(|| type_error("Float", val))
    }
}

impl FromValue for bool {
    fn from_value(val: &Value) -> Result<Self> {
        val.as_bool().ok_or_else(|| type_error("Boolean", val))
    }
}

impl FromValue for NaiveDate {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Date(d) => Ok(*d),
            _ => Err(type_error("Date", val)),
        }
    }
}

impl FromValue for DateTime<FixedOffset> {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::DateTime(dt) => Ok(*dt),
            _ => Err(type_error("DateTime", val)),
        }
    }
}

impl FromValue for Node {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Node(n) => Ok(*n.clone()),
            _ => Err(type_error("Node", val)),
        }
    }
}

impl FromValue for Relationship {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Relationship(r) => Ok(*r.clone()),
            _ => Err(type_error("Relationship", val)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                let mut keys: Vec<&String> = m.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, k) in keys.into_iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{k}: {}", m[k])?;
                }
                write!(f, "}}")
            }
            Value::Node(n) => write!(f, "({})", n.id),
            Value::Relationship(r) => write!(f, "[{}]", r.id),
            Value::Date(d) => write!(f, "{d}"),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::LocalDateTime(dt) => write!(f, "{dt}"),
        }
    }
}

// ============================================================================
// Comparison (Neo4j ordering rules)
// ============================================================================

impl Value {
    /// Neo4j comparison. Returns None for incompatible types (like SQL NULL behavior).
    pub fn neo4j_cmp(&self, other: &Value) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    /// Equality under Neo4j rules: NULL never equals anything, numbers
    /// compare across Int/Float.
    pub fn neo4j_eq(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (a, b) if a.is_numeric() && b.is_numeric() => {
                Some(a.neo4j_cmp(b) == Some(std::cmp::Ordering::Equal))
            }
            (a, b) => Some(a == b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_value_from() {
        assert_eq!(Value::from("hello"), Value::String("hello".into()));
        assert_eq!(Value::from(42), Value::Int(42));
        assert_eq!(Value::from(3.5), Value::Float(3.5));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_datetime_from_utc_is_fixed_offset() {
        let now = Utc::now();
        match Value::from(now) {
            Value::DateTime(dt) => assert_eq!(dt, now),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_null_comparison() {
        assert_eq!(Value::Null.neo4j_cmp(&Value::Null), None);
        assert_eq!(Value::Null.neo4j_cmp(&Value::Int(1)), None);
        assert_eq!(Value::Null.neo4j_eq(&Value::Null), None);
    }

    #[test]
    fn test_numeric_comparison() {
        assert_eq!(
            Value::Int(1).neo4j_cmp(&Value::Float(1.5)),
            Some(std::cmp::Ordering::Less)
        );
        assert_eq!(Value::Int(2).neo4j_eq(&Value::Float(2.0)), Some(true));
    }

    #[test]
    fn test_from_value() {
        assert_eq!(String::from_value(&Value::from("x")).unwrap(), "x");
        assert_eq!(i64::from_value(&Value::Float(4.0)).unwrap(), 4);
        assert!(bool::from_value(&Value::Int(1)).is_err());
        assert_eq!(Option::<i64>::from_value(&Value::Null).unwrap(), None);
    }

    #[test]
    fn test_map_display_is_sorted() {
        let mut m = HashMap::new();
        m.insert("b".to_string(), Value::Int(2));
        m.insert("a".to_string(), Value::Int(1));
        assert_eq!(Value::Map(m).to_string(), "{a: 1, b: 2}");
    }
}
