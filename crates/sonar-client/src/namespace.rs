//! Routes decoded messages to type caches.
//!
//! Servers send relative names inside a TYPE or OBJECT context, so the
//! namespace keeps a cursor of the current type and object while decoding.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::trace;

use crate::cache::CacheNode;
use crate::errors::{NamespaceError, SonarError};
use crate::name::{Depth, Reference, classify};
use crate::proxy::Proxy;
use crate::sync::{lock, read, write};

const NAMESPACE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::namespace");

#[derive(Debug, Default)]
struct Cursor {
    type_name: Option<String>,
    object: Option<String>,
}

/// Every registered type cache plus the decoding cursor.
#[derive(Default)]
pub struct Namespace {
    types: RwLock<HashMap<String, Arc<dyn CacheNode>>>,
    cursor: Mutex<Cursor>,
}

impl Namespace {
    /// Creates an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cache, replacing any earlier one for the same type.
    pub(crate) fn register(&self, cache: Arc<dyn CacheNode>) {
        let type_name = cache.type_name().to_owned();
        write(&self.types).insert(type_name, cache);
    }

    /// Whether a cache exists for `type_name`.
    #[must_use]
    pub fn has_type(&self, type_name: &str) -> bool {
        read(&self.types).contains_key(type_name)
    }

    /// Registered type names, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.types).keys().cloned().collect();
        names.sort();
        names
    }

    /// Finds a proxy by type and object name.
    #[must_use]
    pub fn lookup_object(&self, type_name: &str, object: &str) -> Option<Proxy> {
        self.cache(type_name).ok()?.lookup(object)
    }

    /// Iterates over a snapshot of a type's proxies; unknown types are empty.
    #[must_use]
    pub fn iter(&self, type_name: &str) -> std::vec::IntoIter<Proxy> {
        self.cache(type_name)
            .map(|cache| cache.proxies())
            .unwrap_or_default()
            .into_iter()
    }

    /// Number of live proxies of a type; unknown types count zero.
    #[must_use]
    pub fn get_count(&self, type_name: &str) -> usize {
        self.cache(type_name).map_or(0, |cache| cache.count())
    }

    /// TYPE: selects a type, or with an empty name closes the current one.
    pub(crate) fn set_current_type(&self, type_name: &str) -> Result<(), SonarError> {
        let previous = {
            let mut cursor = lock(&self.cursor);
            cursor.object = None;
            if type_name.is_empty() {
                cursor.type_name.take()
            } else {
                self.cache(type_name)?;
                cursor.type_name = Some(type_name.to_owned());
                None
            }
        };
        if let Some(previous) = previous {
            trace!(target: NAMESPACE_TARGET, type_name = %previous, "type closed");
            if let Ok(cache) = self.cache(&previous) {
                cache.enumeration_complete();
            }
        }
        Ok(())
    }

    /// OBJECT: confirms an object.
    pub(crate) fn put_object(&self, wire: &str) -> Result<(), SonarError> {
        let (cache, object) = self.resolve_object(wire)?;
        self.select_object(cache.type_name(), &object);
        cache.put_object(&object);
        Ok(())
    }

    /// REMOVE: evicts an object.
    pub(crate) fn remove_object(&self, wire: &str) -> Result<(), SonarError> {
        let (cache, object) = self.resolve_object(wire)?;
        cache.remove_object(&object)?;
        Ok(())
    }

    /// ATTRIBUTE: stores a value.
    ///
    /// An absolute name may mint its object as the phantom; a relative
    /// name needs an existing current object.
    pub(crate) fn update_attribute(&self, wire: &str, params: &[String]) -> Result<(), SonarError> {
        let (cache, object, attribute, materialize) = match classify(wire, Depth::Attribute)
            .map_err(NamespaceError::from)?
        {
            Reference::Absolute(name) => {
                let cache = self.cache(name.type_part())?;
                let object = name.object_part().unwrap_or_default().to_owned();
                let attribute = name.attribute_part().unwrap_or_default().to_owned();
                self.select_object(name.type_part(), &object);
                (cache, object, attribute, true)
            }
            Reference::Relative(attribute) => {
                let (type_name, object) = {
                    let cursor = lock(&self.cursor);
                    match (&cursor.type_name, &cursor.object) {
                        (Some(type_name), Some(object)) => (type_name.clone(), object.clone()),
                        _ => return Err(NamespaceError::invalid(wire).into()),
                    }
                };
                (self.cache(&type_name)?, object, attribute.to_owned(), false)
            }
        };
        cache.update_attribute(&object, &attribute, params, materialize)?;
        Ok(())
    }

    fn resolve_object(&self, wire: &str) -> Result<(Arc<dyn CacheNode>, String), SonarError> {
        match classify(wire, Depth::Object).map_err(NamespaceError::from)? {
            Reference::Absolute(name) => Ok((
                self.cache(name.type_part())?,
                name.object_part().unwrap_or_default().to_owned(),
            )),
            Reference::Relative(object) => {
                let type_name = lock(&self.cursor)
                    .type_name
                    .clone()
                    .ok_or_else(|| NamespaceError::invalid(wire))?;
                Ok((self.cache(&type_name)?, object.to_owned()))
            }
        }
    }

    fn select_object(&self, type_name: &str, object: &str) {
        let mut cursor = lock(&self.cursor);
        cursor.type_name = Some(type_name.to_owned());
        cursor.object = Some(object.to_owned());
    }

    fn cache(&self, type_name: &str) -> Result<Arc<dyn CacheNode>, NamespaceError> {
        read(&self.types)
            .get(type_name)
            .cloned()
            .ok_or_else(|| NamespaceError::unknown(type_name))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::{fixture, rstest};

    use super::*;
    use crate::cache::{ProxyListener, TypeCache};
    use crate::dispatch::TypeSchema;
    use crate::request::RequestSink;
    use crate::test_support::{Event, RecordingListener, RecordingSink, Widget};
    use crate::value::Value;

    struct World {
        namespace: Namespace,
        widgets: Arc<TypeCache<Widget>>,
        listener: Arc<RecordingListener>,
    }

    #[fixture]
    fn world() -> World {
        let sink: Arc<dyn RequestSink> = Arc::new(RecordingSink::default());
        let widgets: Arc<TypeCache<Widget>> = Arc::new(TypeCache::typed(Arc::clone(&sink)));
        let other: Arc<TypeCache<Proxy>> =
            Arc::new(TypeCache::new(&TypeSchema::new("gadget", []).open(), sink));
        let namespace = Namespace::new();
        namespace.register(widgets.clone());
        namespace.register(other);
        let listener = Arc::new(RecordingListener::default());
        widgets.add_proxy_listener(listener.clone() as Arc<dyn ProxyListener<Widget>>);
        World {
            namespace,
            widgets,
            listener,
        }
    }

    fn params(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[rstest]
    fn absolute_names_ignore_the_cursor(world: World) {
        world.namespace.set_current_type("gadget").expect("known type");
        world.namespace.put_object("widget/w1").expect("object");
        world
            .namespace
            .update_attribute("widget/w1/size", &params(&["42"]))
            .expect("attribute");
        let proxy = world.namespace.lookup_object("widget", "w1").expect("present");
        assert_eq!(proxy.attributes().iter().find(|(n, _)| n == "size").map(|(_, v)| v.clone()), Some(Value::Int(42)));
        assert_eq!(world.namespace.get_count("gadget"), 0);
    }

    #[rstest]
    fn relative_names_follow_the_cursor(world: World) {
        world.namespace.set_current_type("widget").expect("known type");
        world.namespace.put_object("w1").expect("object");
        world
            .namespace
            .update_attribute("size", &params(&["7"]))
            .expect("relative attribute");
        let widget = world.widgets.lookup_object("w1").expect("present");
        assert_eq!(widget.size(), Ok(Some(7)));
        assert_eq!(
            world.listener.events(),
            [
                Event::Added("w1".to_owned()),
                Event::Changed("w1".to_owned(), "size".to_owned())
            ]
        );
    }

    #[rstest]
    fn enumeration_stream_stages_a_phantom(world: World) {
        world.namespace.set_current_type("widget").expect("known type");
        world
            .namespace
            .update_attribute("widget/w2/size", &params(&["3"]))
            .expect("absolute attribute");
        world
            .namespace
            .update_attribute("serial", &params(&["X1"]))
            .expect("relative attribute");
        world.namespace.put_object("w2").expect("object");
        world.namespace.set_current_type("").expect("close");

        assert_eq!(
            world.listener.events(),
            [Event::Added("w2".to_owned()), Event::EnumerationComplete]
        );
        assert!(world.widgets.is_enumerated());
    }

    #[rstest]
    fn relative_attribute_without_object_is_invalid(world: World) {
        world.namespace.set_current_type("widget").expect("known type");
        assert!(matches!(
            world.namespace.update_attribute("size", &params(&["1"])),
            Err(SonarError::Namespace(NamespaceError::NameInvalid(_)))
        ));
    }

    #[rstest]
    fn relative_object_without_type_is_invalid(world: World) {
        assert!(matches!(
            world.namespace.put_object("w1"),
            Err(SonarError::Namespace(NamespaceError::NameInvalid(_)))
        ));
    }

    #[rstest]
    fn unknown_types_are_unknown_names(world: World) {
        assert!(matches!(
            world.namespace.put_object("sprocket/s1"),
            Err(SonarError::Namespace(NamespaceError::NameUnknown(_)))
        ));
        assert!(matches!(
            world.namespace.set_current_type("sprocket"),
            Err(SonarError::Namespace(NamespaceError::NameUnknown(_)))
        ));
        assert_eq!(world.namespace.iter("sprocket").count(), 0);
    }

    #[rstest]
    fn type_change_resets_the_object_cursor(world: World) {
        world.namespace.put_object("widget/w1").expect("object");
        world.namespace.set_current_type("gadget").expect("known type");
        assert!(world.namespace.update_attribute("size", &params(&["1"])).is_err());
    }

    #[rstest]
    fn remove_resolves_relative_names(world: World) {
        world.namespace.set_current_type("widget").expect("known type");
        world.namespace.put_object("w1").expect("object");
        world.namespace.remove_object("w1").expect("remove");
        assert_eq!(world.namespace.get_count("widget"), 0);
        assert!(matches!(
            world.namespace.remove_object("widget/w1"),
            Err(SonarError::Namespace(NamespaceError::NameUnknown(_)))
        ));
    }

    #[rstest]
    fn iteration_is_a_snapshot(world: World) {
        world.namespace.put_object("widget/a").expect("object");
        let iter = world.namespace.iter("widget");
        world.namespace.put_object("widget/b").expect("object");
        assert_eq!(iter.map(|proxy| proxy.name().to_owned()).collect::<Vec<_>>(), ["a"]);
        assert_eq!(world.namespace.type_names(), ["gadget", "widget"]);
    }
}
