//! Cached attribute values for one proxy.

use std::collections::BTreeMap;

use crate::value::{Value, ValueKind};

/// One named value of a declared kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    kind: ValueKind,
    value: Option<Value>,
}

impl Attribute {
    /// Creates an attribute that has not yet received a value.
    #[must_use]
    pub const fn new(kind: ValueKind) -> Self {
        Self { kind, value: None }
    }

    /// Creates an attribute holding `value`.
    #[must_use]
    pub const fn with_value(kind: ValueKind, value: Value) -> Self {
        Self {
            kind,
            value: Some(value),
        }
    }

    /// Declared kind.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Cached value; an attribute never written reads as null.
    #[must_use]
    pub fn value(&self) -> Value {
        self.value.clone().unwrap_or(Value::Null)
    }

    /// Whether a value has ever been stored.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Replaces the cached value.
    pub fn set_value(&mut self, value: Value) {
        self.value = Some(value);
    }

    /// Whether writing `candidate` would leave the cached value unchanged.
    #[must_use]
    pub fn value_equals(&self, candidate: &Value) -> bool {
        match &self.value {
            Some(value) => value == candidate,
            None => candidate.is_null(),
        }
    }
}

/// All attributes of one proxy plus its removal marker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMap {
    attrs: BTreeMap<String, Attribute>,
    zombie: bool,
}

impl AttributeMap {
    /// Creates an empty, live map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an attribute.
    pub fn insert(&mut self, name: impl Into<String>, attribute: Attribute) {
        self.attrs.insert(name.into(), attribute);
    }

    /// Looks up an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attrs.get(name)
    }

    /// Looks up an attribute for update.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attrs.get_mut(name)
    }

    /// Attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attrs.iter().map(|(name, attr)| (name.as_str(), attr))
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Whether the map holds no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Whether the backing object has been removed.
    #[must_use]
    pub const fn is_zombie(&self) -> bool {
        self.zombie
    }

    /// Marks the backing object as removed.
    pub const fn mark_zombie(&mut self) {
        self.zombie = true;
    }
}
