use crate::errors::{CacheError, NamespaceError};
use crate::proxy::{Proxy, SonarObject};

use super::TypeCache;

/// Type-erased view of a [`TypeCache`] used by the namespace router.
pub(crate) trait CacheNode: Send + Sync {
    fn type_name(&self) -> &str;

    /// OBJECT: confirm an object.
    fn put_object(&self, object: &str);

    /// REMOVE: evict an object.
    fn remove_object(&self, object: &str) -> Result<(), NamespaceError>;

    /// ATTRIBUTE: store a value. With `materialize`, a missing object is
    /// minted as the phantom; otherwise it is an unknown name.
    fn update_attribute(
        &self,
        object: &str,
        attr: &str,
        params: &[String],
        materialize: bool,
    ) -> Result<(), CacheError>;

    fn enumeration_complete(&self);

    fn lookup(&self, object: &str) -> Option<Proxy>;

    fn proxies(&self) -> Vec<Proxy>;

    fn count(&self) -> usize;
}

impl<T: SonarObject> CacheNode for TypeCache<T> {
    fn type_name(&self) -> &str {
        TypeCache::type_name(self)
    }

    fn put_object(&self, object: &str) {
        self.add(object);
    }

    fn remove_object(&self, object: &str) -> Result<(), NamespaceError> {
        self.remove(object).map(|_| ())
    }

    fn update_attribute(
        &self,
        object: &str,
        attr: &str,
        params: &[String],
        materialize: bool,
    ) -> Result<(), CacheError> {
        let proxy = if materialize {
            self.get_proxy(object)
        } else {
            self.lookup_object(object)
                .ok_or_else(|| NamespaceError::unknown(object))?
        };
        TypeCache::update_attribute(self, &proxy, attr, params)
    }

    fn enumeration_complete(&self) {
        TypeCache::enumeration_complete(self);
    }

    fn lookup(&self, object: &str) -> Option<Proxy> {
        self.lookup_object(object).map(|found| found.proxy().clone())
    }

    fn proxies(&self) -> Vec<Proxy> {
        self.snapshot()
            .iter()
            .map(|found| found.proxy().clone())
            .collect()
    }

    fn count(&self) -> usize {
        self.len()
    }
}
