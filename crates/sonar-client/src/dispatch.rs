//! Binds a type's declared attribute schema to cache reads and writes.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::attribute::{Attribute, AttributeMap};
use crate::errors::CacheError;
use crate::proxy::{Proxy, SonarType};
use crate::value::{Value, ValueKind};

/// Attribute holding the object's own name.
pub const NAME_ATTRIBUTE: &str = "name";
/// Attribute holding the object's type name.
pub const TYPE_NAME_ATTRIBUTE: &str = "typeName";

/// Which accessors a type exposes for an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Getter only.
    ReadOnly,
    /// Setter only; writes are never suppressed.
    WriteOnly,
    /// Getter and setter; unchanged writes are suppressed.
    ReadWrite,
}

impl Access {
    const fn readable(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    const fn writable(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}

/// One declared attribute of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSpec {
    /// Attribute name on the wire.
    pub name: Cow<'static, str>,
    /// Declared value kind.
    pub kind: ValueKind,
    /// Exposed accessors.
    pub access: Access,
}

impl AttributeSpec {
    /// Declares a getter-only attribute.
    #[must_use]
    pub const fn read_only(name: &'static str, kind: ValueKind) -> Self {
        Self::declare(name, kind, Access::ReadOnly)
    }

    /// Declares a setter-only attribute.
    #[must_use]
    pub const fn write_only(name: &'static str, kind: ValueKind) -> Self {
        Self::declare(name, kind, Access::WriteOnly)
    }

    /// Declares an attribute with both accessors.
    #[must_use]
    pub const fn read_write(name: &'static str, kind: ValueKind) -> Self {
        Self::declare(name, kind, Access::ReadWrite)
    }

    const fn declare(name: &'static str, kind: ValueKind, access: Access) -> Self {
        Self {
            name: Cow::Borrowed(name),
            kind,
            access,
        }
    }

    /// Declares an attribute whose name is only known at run time.
    #[must_use]
    pub fn dynamic(name: impl Into<String>, kind: ValueKind, access: Access) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            kind,
            access,
        }
    }
}

/// The attribute surface of one SONAR type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSchema {
    type_name: Cow<'static, str>,
    attributes: Vec<AttributeSpec>,
    open: bool,
}

impl TypeSchema {
    /// Builds a closed schema.
    #[must_use]
    pub fn new(
        type_name: impl Into<Cow<'static, str>>,
        attributes: impl IntoIterator<Item = AttributeSpec>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            attributes: attributes.into_iter().collect(),
            open: false,
        }
    }

    /// Schema generated for a typed wrapper.
    #[must_use]
    pub fn of<T: SonarType>() -> Self {
        Self::new(T::TYPE_NAME, T::ATTRIBUTES.iter().cloned())
    }

    /// Accepts undeclared inbound attributes as text arrays.
    #[must_use]
    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }

    /// Wire name of the type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Declared attributes.
    #[must_use]
    pub fn attributes(&self) -> &[AttributeSpec] {
        &self.attributes
    }

    /// Whether undeclared attributes are accepted.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }
}

/// A closed set of proxy operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// Read an attribute through its getter.
    Get(String),
    /// Write an attribute through its setter.
    Set(String, Value),
    /// Object name.
    Name,
    /// Type name.
    TypeName,
    /// Ask the server to remove the object.
    Destroy,
}

const OPEN_KIND: ValueKind = ValueKind::Array(&ValueKind::Text);

/// Getter and setter tables for one type.
#[derive(Debug, Clone)]
pub struct ProxyDispatch {
    type_name: String,
    getters: BTreeMap<String, ValueKind>,
    setters: BTreeMap<String, (ValueKind, bool)>,
    open: bool,
}

impl ProxyDispatch {
    /// Builds the accessor tables from a schema.
    #[must_use]
    pub fn new(schema: &TypeSchema) -> Self {
        let getters: BTreeMap<String, ValueKind> = schema
            .attributes()
            .iter()
            .filter(|spec| spec.access.readable())
            .map(|spec| (spec.name.to_string(), spec.kind))
            .collect();
        let setters = schema
            .attributes()
            .iter()
            .filter(|spec| spec.access.writable())
            .map(|spec| {
                let check = getters.contains_key(spec.name.as_ref());
                (spec.name.to_string(), (spec.kind, check))
            })
            .collect();
        Self {
            type_name: schema.type_name().to_owned(),
            getters,
            setters,
            open: schema.is_open(),
        }
    }

    /// Wire name of the type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether undeclared attributes are accepted inbound.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    /// Kind used for an inbound attribute missing from a proxy's map.
    pub(crate) const fn open_kind(&self) -> Option<ValueKind> {
        if self.open { Some(OPEN_KIND) } else { None }
    }

    /// Builds the initial attributes of a freshly minted proxy.
    #[must_use]
    pub fn create_attributes(&self, name: &str) -> AttributeMap {
        let mut attrs = AttributeMap::new();
        for (attr, (kind, _)) in &self.setters {
            attrs.insert(attr.clone(), Attribute::new(*kind));
        }
        for (attr, kind) in &self.getters {
            attrs.insert(attr.clone(), Attribute::new(*kind));
        }
        attrs.insert(
            TYPE_NAME_ATTRIBUTE,
            Attribute::with_value(ValueKind::Text, Value::Text(self.type_name.clone())),
        );
        attrs.insert(
            NAME_ATTRIBUTE,
            Attribute::with_value(ValueKind::Text, Value::Text(name.to_owned())),
        );
        attrs
    }

    /// Runs one call against `proxy`.
    ///
    /// Reads return `Some`; writes and destroy return `None`.
    pub fn invoke(&self, proxy: &Proxy, call: Call) -> Result<Option<Value>, CacheError> {
        match call {
            Call::Get(attr) => {
                if !self.open && !self.getters.contains_key(&attr) {
                    return Err(CacheError::unknown_operation(
                        &self.type_name,
                        format!("get {attr}"),
                    ));
                }
                proxy.read(&attr).map(Some)
            }
            Call::Set(attr, value) => {
                let check = match self.setters.get(&attr) {
                    Some((_, check)) => *check,
                    None if self.open => true,
                    None => {
                        return Err(CacheError::unknown_operation(
                            &self.type_name,
                            format!("set {attr}"),
                        ));
                    }
                };
                proxy.write(&attr, value, check).map(|()| None)
            }
            Call::Name => proxy.read(NAME_ATTRIBUTE).map(Some),
            Call::TypeName => Ok(Some(Value::Text(self.type_name.clone()))),
            Call::Destroy => proxy.remove_request().map(|()| None),
        }
    }
}
