//! Client-side stand-ins for server objects.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::attribute::AttributeMap;
use crate::cache::CacheCore;
use crate::dispatch::{AttributeSpec, Call};
use crate::errors::{CacheError, NamespaceError};
use crate::name::Name;
use crate::request::Request;
use crate::sync::lock;
use crate::value::{FromValue, Value};

/// Shared handle to one cached object.
///
/// Clones refer to the same object; equality is identity.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ProxyInner>,
}

struct ProxyInner {
    name: String,
    core: Arc<CacheCore>,
    attrs: Mutex<AttributeMap>,
}

impl Proxy {
    pub(crate) fn new(name: &str, core: Arc<CacheCore>) -> Self {
        let attrs = core.dispatch().create_attributes(name);
        Self {
            inner: Arc::new(ProxyInner {
                name: name.to_owned(),
                core,
                attrs: Mutex::new(attrs),
            }),
        }
    }

    /// Object name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.inner.core.dispatch().type_name()
    }

    /// Full `type/object` name.
    #[must_use]
    pub fn object_name(&self) -> Name {
        Name::of_object(self.type_name(), self.name())
    }

    /// Whether the server has removed this object.
    #[must_use]
    pub fn is_zombie(&self) -> bool {
        lock(&self.inner.attrs).is_zombie()
    }

    /// Whether both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Runs a schema-checked call.
    pub fn invoke(&self, call: Call) -> Result<Option<Value>, CacheError> {
        self.inner.core.dispatch().invoke(self, call)
    }

    /// Reads an attribute through its getter and converts it.
    pub fn get_as<V: FromValue>(&self, attr: &str) -> Result<V, CacheError> {
        let value = self
            .invoke(Call::Get(attr.to_owned()))?
            .unwrap_or(Value::Null);
        V::from_value(value).ok_or_else(|| CacheError::KindMismatch {
            attribute: attr.to_owned(),
            expected: V::EXPECTED.to_owned(),
        })
    }

    /// Writes an attribute through its setter.
    ///
    /// The new value reaches the cache only once the server echoes it.
    pub fn set(&self, attr: &str, value: impl Into<Value>) -> Result<(), CacheError> {
        self.invoke(Call::Set(attr.to_owned(), value.into()))
            .map(|_| ())
    }

    /// Asks the server to remove the object.
    pub fn destroy(&self) -> Result<(), CacheError> {
        self.invoke(Call::Destroy).map(|_| ())
    }

    /// Snapshot of every cached attribute in name order.
    #[must_use]
    pub fn attributes(&self) -> Vec<(String, Value)> {
        lock(&self.inner.attrs)
            .iter()
            .map(|(name, attr)| (name.to_owned(), attr.value()))
            .collect()
    }

    /// Reads the cached value of any attribute in the map.
    pub(crate) fn read(&self, attr: &str) -> Result<Value, CacheError> {
        lock(&self.inner.attrs)
            .get(attr)
            .map(crate::attribute::Attribute::value)
            .ok_or_else(|| NamespaceError::unknown(attr).into())
    }

    /// Sends an attribute write unless suppressed or the object is gone.
    pub(crate) fn write(&self, attr: &str, value: Value, check: bool) -> Result<(), CacheError> {
        let zombie = {
            let attrs = lock(&self.inner.attrs);
            let attribute = attrs
                .get(attr)
                .ok_or_else(|| NamespaceError::unknown(attr))?;
            if !attribute.kind().accepts(&value) {
                return Err(CacheError::KindMismatch {
                    attribute: attr.to_owned(),
                    expected: attribute.kind().to_string(),
                });
            }
            if check && attribute.value_equals(&value) {
                return Ok(());
            }
            attrs.is_zombie()
        };
        let values = value.marshal()?;
        if zombie {
            return Ok(());
        }
        self.inner.core.submit(Request::SetAttribute {
            name: Name::of_attribute(self.type_name(), self.name(), attr),
            values,
        })
    }

    /// Sends REMOVE unless the object is already gone.
    pub(crate) fn remove_request(&self) -> Result<(), CacheError> {
        if self.is_zombie() {
            return Ok(());
        }
        self.inner.core.submit(Request::Remove(self.object_name()))
    }

    pub(crate) fn mark_zombie(&self) {
        lock(&self.inner.attrs).mark_zombie();
    }

    /// Stores a value received from the server.
    pub(crate) fn apply(&self, attr: &str, params: &[String]) -> Result<(), CacheError> {
        let mut attrs = lock(&self.inner.attrs);
        if attrs.get(attr).is_none() {
            let Some(kind) = self.inner.core.dispatch().open_kind() else {
                return Err(NamespaceError::unknown(attr).into());
            };
            attrs.insert(attr, crate::attribute::Attribute::new(kind));
        }
        let Some(attribute) = attrs.get_mut(attr) else {
            return Err(NamespaceError::unknown(attr).into());
        };
        let value = Value::unmarshal(attribute.kind(), params)?;
        attribute.set_value(value);
        Ok(())
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Proxy {}

impl fmt::Debug for Proxy {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Proxy")
            .field("type", &self.type_name())
            .field("name", &self.name())
            .field("zombie", &self.is_zombie())
            .finish()
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

impl From<&Proxy> for Value {
    fn from(proxy: &Proxy) -> Self {
        Self::Ref(proxy.name().to_owned())
    }
}

/// An object handle stored in a [`TypeCache`](crate::TypeCache).
pub trait SonarObject: Clone + Send + Sync + 'static {
    /// Wraps a freshly minted proxy.
    fn from_proxy(proxy: Proxy) -> Self;

    /// The underlying proxy.
    fn proxy(&self) -> &Proxy;

    /// Object name.
    fn name(&self) -> &str {
        self.proxy().name()
    }

    /// Asks the server to remove the object.
    fn destroy(&self) -> Result<(), CacheError> {
        self.proxy().destroy()
    }
}

impl SonarObject for Proxy {
    fn from_proxy(proxy: Proxy) -> Self {
        proxy
    }

    fn proxy(&self) -> &Proxy {
        self
    }
}

/// A typed wrapper with a schema known at build time.
pub trait SonarType: SonarObject {
    /// Wire name of the type.
    const TYPE_NAME: &'static str;
    /// Declared attributes.
    const ATTRIBUTES: &'static [AttributeSpec];
}

/// Declares a typed wrapper over [`Proxy`] together with its schema.
///
/// ```ignore
/// sonar_object! {
///     /// A field device.
///     pub struct Widget = "widget" {
///         read_write "size": ValueKind::Int,
///         read_only "serial": ValueKind::Text,
///         write_only "command": ValueKind::Text,
///     }
/// }
/// ```
#[macro_export]
macro_rules! sonar_object {
    (
        $(#[$meta:meta])*
        $vis:vis struct $ident:ident = $type_name:literal {
            $($access:ident $attr:literal : $kind:expr),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        $vis struct $ident($crate::Proxy);

        impl $crate::SonarObject for $ident {
            fn from_proxy(proxy: $crate::Proxy) -> Self {
                Self(proxy)
            }

            fn proxy(&self) -> &$crate::Proxy {
                &self.0
            }
        }

        impl $crate::SonarType for $ident {
            const TYPE_NAME: &'static str = $type_name;
            const ATTRIBUTES: &'static [$crate::AttributeSpec] = &[
                $($crate::AttributeSpec::$access($attr, $kind)),*
            ];
        }
    };
}
