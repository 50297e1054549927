//! # Property System
//!
//! Typed, validated attributes on nodes and relationship values.
//!
//! A [`Property`] converts a native [`Value`] into its wire form
//! (*deflate*) and back (*inflate*). Wire values are plain scalars:
//!
//! | Kind | Native | Wire |
//! |------|--------|------|
//! | `String` | `String` | `String` |
//! | `Integer` | `Int` | `Int` |
//! | `Float` | `Float` | `Float` |
//! | `Boolean` | `Bool` | `Bool` |
//! | `Date` | `Date` | `String` (`YYYY-MM-DD`) |
//! | `DateTime` | `DateTime` / `LocalDateTime` | `Float` (seconds since epoch, UTC) |
//! | `Json` | any JSON-shaped value | `String` |
//!
//! An alias ([`PropertyDef::Alias`]) is not stored; it forwards reads and
//! writes to its target property.

mod convert;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;

use crate::model::{NodeId, PropertyMap, Value};
use crate::{Error, Result};

pub use convert::{json_to_value, value_to_json};

// ============================================================================
// Force-timezone switch
// ============================================================================

static FORCE_TIMEZONE: AtomicBool = AtomicBool::new(false);

/// When on, deflating a naive datetime fails instead of assuming UTC.
pub fn set_force_timezone(on: bool) {
    FORCE_TIMEZONE.store(on, Ordering::Relaxed);
}

pub fn force_timezone() -> bool {
    FORCE_TIMEZONE.load(Ordering::Relaxed)
}

// ============================================================================
// Descriptors
// ============================================================================

/// Native type of a stored property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Json,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyKind::String => "string",
            PropertyKind::Integer => "integer",
            PropertyKind::Float => "float",
            PropertyKind::Boolean => "boolean",
            PropertyKind::Date => "date",
            PropertyKind::DateTime => "datetime",
            PropertyKind::Json => "json",
        };
        f.write_str(name)
    }
}

/// Index registration of a property. Unique and plain indexing are
/// mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexKind {
    #[default]
    None,
    Indexed,
    Unique,
}

/// Zero-arg default factory.
pub type DefaultFactory = Arc<dyn Fn() -> Value + Send + Sync>;

#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    Factory(DefaultFactory),
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(v) => write!(f, "Literal({v})"),
            DefaultValue::Factory(_) => write!(f, "Factory(..)"),
        }
    }
}

/// Where a value being converted belongs; used to label errors.
#[derive(Debug, Clone, Copy)]
pub struct PropertyContext<'a> {
    pub class: &'a str,
    pub property: &'a str,
    pub node: Option<NodeId>,
}

/// A stored property declaration.
#[derive(Debug, Clone)]
pub struct Property {
    kind: PropertyKind,
    required: bool,
    index: IndexKind,
    default: Option<DefaultValue>,
}

impl Property {
    pub fn new(kind: PropertyKind) -> Self {
        Self { kind, required: false, index: IndexKind::None, default: None }
    }

    pub fn string() -> Self { Self::new(PropertyKind::String) }
    pub fn integer() -> Self { Self::new(PropertyKind::Integer) }
    pub fn float() -> Self { Self::new(PropertyKind::Float) }
    pub fn boolean() -> Self { Self::new(PropertyKind::Boolean) }
    pub fn date() -> Self { Self::new(PropertyKind::Date) }
    pub fn datetime() -> Self { Self::new(PropertyKind::DateTime) }
    pub fn json() -> Self { Self::new(PropertyKind::Json) }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Register values in the class index. Replaces `unique_index`.
    pub fn index(mut self) -> Self {
        self.index = IndexKind::Indexed;
        self
    }

    /// Register values in the class index, at most one node per value.
    /// Replaces `index`.
    pub fn unique_index(mut self) -> Self {
        self.index = IndexKind::Unique;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    pub fn default_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Factory(Arc::new(factory)));
        self
    }

    pub fn kind(&self) -> PropertyKind { self.kind }
    pub fn is_required(&self) -> bool { self.required }
    pub fn index_kind(&self) -> IndexKind { self.index }
    pub fn is_indexed(&self) -> bool { self.index != IndexKind::None }
    pub fn is_unique(&self) -> bool { self.index == IndexKind::Unique }
    pub fn has_default(&self) -> bool { self.default.is_some() }

    /// Evaluate the default, coerced to this property's native type.
    pub fn default_value(&self, ctx: PropertyContext<'_>) -> Result<Option<Value>> {
        let raw = match &self.default {
            None => return Ok(None),
            Some(DefaultValue::Literal(v)) => v.clone(),
            Some(DefaultValue::Factory(f)) => f(),
        };
        convert::coerce(self.kind, &raw)
            .map(Some)
            .map_err(|reason| deflate_error(ctx, reason))
    }

    /// Native → wire.
    pub fn deflate(&self, value: &Value, ctx: PropertyContext<'_>) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        convert::deflate(self.kind, value).map_err(|reason| deflate_error(ctx, reason))
    }

    /// Wire → native.
    pub fn inflate(&self, value: &Value, ctx: PropertyContext<'_>) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        convert::inflate(self.kind, value).map_err(|reason| Error::InflateError {
            property: ctx.property.to_string(),
            class: ctx.class.to_string(),
            reason,
            node: ctx.node,
        })
    }
}

fn deflate_error(ctx: PropertyContext<'_>, reason: String) -> Error {
    Error::DeflateError {
        property: ctx.property.to_string(),
        class: ctx.class.to_string(),
        reason,
        node: ctx.node,
    }
}

/// A declared attribute: either stored, or an alias of a stored one.
#[derive(Debug, Clone)]
pub enum PropertyDef {
    Stored(Property),
    Alias { to: String },
}

// ============================================================================
// PropertySet
// ============================================================================

/// The declared attributes of a class, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct PropertySet {
    defs: IndexMap<String, PropertyDef>,
}

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or override a declaration.
    pub fn insert(&mut self, name: impl Into<String>, def: PropertyDef) {
        self.defs.insert(name.into(), def);
    }

    pub fn get(&self, name: &str) -> Option<&PropertyDef> {
        self.defs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyDef)> {
        self.defs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Stored properties only; aliases are skipped.
    pub fn stored(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.defs.iter().filter_map(|(k, v)| match v {
            PropertyDef::Stored(p) => Some((k.as_str(), p)),
            PropertyDef::Alias { .. } => None,
        })
    }

    /// Follow an alias to the stored property it names.
    pub fn resolve<'s>(&'s self, name: &'s str) -> Option<(&'s str, &'s Property)> {
        match self.defs.get_key_value(name)? {
            (key, PropertyDef::Stored(p)) => Some((key.as_str(), p)),
            (_, PropertyDef::Alias { to }) => match self.defs.get_key_value(to.as_str())? {
                (key, PropertyDef::Stored(p)) => Some((key.as_str(), p)),
                _ => None,
            },
        }
    }

    pub fn is_alias(&self, name: &str) -> bool {
        matches!(self.defs.get(name), Some(PropertyDef::Alias { .. }))
    }

    /// Every alias must name a stored property.
    pub fn validate(&self, class: &str) -> Result<()> {
        for (name, def) in &self.defs {
            if let PropertyDef::Alias { to } = def {
                match self.defs.get(to) {
                    Some(PropertyDef::Stored(_)) => {}
                    Some(PropertyDef::Alias { .. }) => {
                        return Err(Error::SchemaError(format!(
                            "{class}.{name}: alias target '{to}' is itself an alias"
                        )));
                    }
                    None => {
                        return Err(Error::SchemaError(format!(
                            "{class}.{name}: alias target '{to}' is not declared"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Deflate every stored property of `values`, filling in defaults and
    /// enforcing `required`. Defaults are written back into `values`.
    pub fn deflate_all(
        &self,
        values: &mut HashMap<String, Value>,
        class: &str,
        node: Option<NodeId>,
    ) -> Result<PropertyMap> {
        let mut wire = PropertyMap::new();
        for (name, prop) in self.stored() {
            let ctx = PropertyContext { class, property: name, node };
            let current = values.get(name).filter(|v| !v.is_null()).cloned();
            let value = match current {
                Some(v) => v,
                None => match prop.default_value(ctx)? {
                    Some(default) => {
                        values.insert(name.to_string(), default.clone());
                        default
                    }
                    None if prop.is_required() => {
                        return Err(Error::RequiredProperty {
                            class: class.to_string(),
                            property: name.to_string(),
                        });
                    }
                    None => continue,
                },
            };
            wire.insert(name.to_string(), prop.deflate(&value, ctx)?);
        }
        Ok(wire)
    }

    /// Inflate the declared properties found in a wire map. Unknown keys
    /// are ignored.
    pub fn inflate_all(
        &self,
        wire: &PropertyMap,
        class: &str,
        node: Option<NodeId>,
    ) -> Result<HashMap<String, Value>> {
        let mut values = HashMap::new();
        for (name, prop) in self.stored() {
            if let Some(raw) = wire.get(name) {
                let ctx = PropertyContext { class, property: name, node };
                values.insert(name.to_string(), prop.inflate(raw, ctx)?);
            }
        }
        Ok(values)
    }
}
