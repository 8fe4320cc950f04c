//! Per-type proxy registries.
//!
//! A [`TypeCache`] owns every proxy of one SONAR type. Membership sits under
//! a short-lived state lock so application threads can read while the
//! processing thread mutates. Listener notification and registration share a
//! second lock, which is what lets a late subscriber see a full replay with
//! no gap before live events resume.

mod listener;
mod node;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

pub use listener::ProxyListener;
pub(crate) use node::CacheNode;

use crate::dispatch::{ProxyDispatch, TypeSchema};
use crate::errors::{CacheError, NamespaceError};
use crate::name::Name;
use crate::proxy::{Proxy, SonarObject, SonarType};
use crate::request::{Request, RequestSink};
use crate::sync::lock;
use crate::value::Value;

const CACHE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cache");
const LOOKUP_POLL: Duration = Duration::from_millis(100);

/// Type-level state shared by a cache and all of its proxies.
pub(crate) struct CacheCore {
    dispatch: ProxyDispatch,
    requests: Arc<dyn RequestSink>,
}

impl CacheCore {
    pub(crate) const fn dispatch(&self) -> &ProxyDispatch {
        &self.dispatch
    }

    pub(crate) fn submit(&self, request: Request) -> Result<(), CacheError> {
        self.requests.submit(request)
    }
}

struct CacheState<T> {
    children: BTreeMap<String, T>,
    phantom: Option<T>,
    enumerated: bool,
}

type ListenerList<T> = Vec<Arc<dyn ProxyListener<T>>>;

/// Registry of all proxies of one type.
pub struct TypeCache<T: SonarObject> {
    core: Arc<CacheCore>,
    state: Mutex<CacheState<T>>,
    listeners: Mutex<ListenerList<T>>,
}

impl<T: SonarType> TypeCache<T> {
    /// Creates a cache for a typed wrapper.
    #[must_use]
    pub fn typed(requests: Arc<dyn RequestSink>) -> Self {
        Self::new(&TypeSchema::of::<T>(), requests)
    }
}

impl<T: SonarObject> TypeCache<T> {
    /// Creates a cache for `schema`, sending requests through `requests`.
    #[must_use]
    pub fn new(schema: &TypeSchema, requests: Arc<dyn RequestSink>) -> Self {
        Self {
            core: Arc::new(CacheCore {
                dispatch: ProxyDispatch::new(schema),
                requests,
            }),
            state: Mutex::new(CacheState {
                children: BTreeMap::new(),
                phantom: None,
                enumerated: false,
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Wire name of the type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.core.dispatch.type_name()
    }

    /// Accessor tables for the type.
    #[must_use]
    pub fn dispatch(&self) -> &ProxyDispatch {
        &self.core.dispatch
    }

    /// Finds a live proxy by object name.
    #[must_use]
    pub fn lookup_object(&self, name: &str) -> Option<T> {
        lock(&self.state).children.get(name).cloned()
    }

    /// Polls for a proxy until it appears or `timeout` passes.
    #[must_use]
    pub fn lookup_object_wait(&self, name: &str, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(proxy) = self.lookup_object(name) {
                return Some(proxy);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            thread::sleep(LOOKUP_POLL.min(deadline - now));
        }
    }

    /// Number of live proxies.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.state).children.len()
    }

    /// Whether the cache holds no proxies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.state).children.is_empty()
    }

    /// Whether the initial listing has completed.
    #[must_use]
    pub fn is_enumerated(&self) -> bool {
        lock(&self.state).enumerated
    }

    /// Snapshot of the live proxies in name order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        lock(&self.state).children.values().cloned().collect()
    }

    /// Iterates over a snapshot taken at the time of the call.
    #[must_use]
    pub fn iter(&self) -> std::vec::IntoIter<T> {
        self.snapshot().into_iter()
    }

    /// Reads the cached value of any attribute of `object`.
    pub fn get_attribute(&self, object: &T, attr: &str) -> Result<Value, CacheError> {
        object.proxy().read(attr)
    }

    /// Reads an attribute of the named object.
    pub fn get_attribute_by_name(&self, object: &str, attr: &str) -> Result<Value, CacheError> {
        let proxy = self
            .lookup_object(object)
            .ok_or_else(|| NamespaceError::unknown(object))?;
        self.get_attribute(&proxy, attr)
    }

    /// Writes an attribute, skipping the send when `check` is set and the
    /// cached value already matches.
    pub fn set_attribute(
        &self,
        object: &T,
        attr: &str,
        value: Value,
        check: bool,
    ) -> Result<(), CacheError> {
        object.proxy().write(attr, value, check)
    }

    /// Asks the server to create an object.
    pub fn create_object(&self, name: &str) -> Result<(), CacheError> {
        self.core
            .submit(Request::Create(Name::of_object(self.type_name(), name)))
    }

    /// Asks the server to create an object with initial attribute values.
    ///
    /// Each value is sent before the create request. Another client creating
    /// the same name at the same moment can interleave with these sends.
    pub fn create_object_with<I, K>(&self, name: &str, attrs: I) -> Result<(), CacheError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        for (attr, value) in attrs {
            let values = value.marshal()?;
            self.core.submit(Request::SetAttribute {
                name: Name::of_attribute(self.type_name(), name, attr.as_ref()),
                values,
            })?;
        }
        self.create_object(name)
    }

    /// Asks the server to remove an object; a zombie sends nothing.
    pub fn remove_object(&self, object: &T) -> Result<(), CacheError> {
        object.proxy().remove_request()
    }

    /// Stops updates of one attribute for every object of the type.
    pub fn ignore_attribute(&self, attr: &str) -> Result<(), CacheError> {
        self.core
            .submit(Request::Ignore(Name::of_attribute(self.type_name(), "", attr)))
    }

    /// Subscribes to every attribute of one object.
    pub fn watch_object(&self, object: &T) -> Result<(), CacheError> {
        let proxy = object.proxy();
        if proxy.is_zombie() {
            return Ok(());
        }
        self.core.submit(Request::Enumerate(proxy.object_name()))
    }

    /// Drops an object subscription made with [`TypeCache::watch_object`].
    pub fn ignore_object(&self, object: &T) -> Result<(), CacheError> {
        let proxy = object.proxy();
        if proxy.is_zombie() {
            return Ok(());
        }
        self.core.submit(Request::Ignore(proxy.object_name()))
    }

    /// Registers a listener, replaying current membership first.
    ///
    /// The listener receives `proxy_added` for every live proxy and then
    /// `enumeration_complete` if the listing already finished, before any
    /// live event.
    pub fn add_proxy_listener(&self, listener: Arc<dyn ProxyListener<T>>) {
        let mut listeners = lock(&self.listeners);
        let (children, enumerated) = {
            let state = lock(&self.state);
            (
                state.children.values().cloned().collect::<Vec<_>>(),
                state.enumerated,
            )
        };
        for proxy in &children {
            listener.proxy_added(proxy);
        }
        if enumerated {
            listener.enumeration_complete();
        }
        listeners.push(listener);
    }

    /// Detaches a listener registered earlier.
    pub fn remove_proxy_listener(&self, listener: &Arc<dyn ProxyListener<T>>) {
        let target = Arc::as_ptr(listener).cast::<()>();
        lock(&self.listeners).retain(|existing| Arc::as_ptr(existing).cast::<()>() != target);
    }

    /// Returns the proxy for `name`, minting it as the phantom if absent.
    pub(crate) fn get_proxy(&self, name: &str) -> T {
        let mut state = lock(&self.state);
        if let Some(existing) = state.children.get(name) {
            return existing.clone();
        }
        let proxy = T::from_proxy(Proxy::new(name, Arc::clone(&self.core)));
        state.children.insert(name.to_owned(), proxy.clone());
        state.phantom = Some(proxy.clone());
        proxy
    }

    /// Confirms an object and tells listeners about it.
    pub(crate) fn add(&self, name: &str) -> T {
        let listeners = lock(&self.listeners);
        let proxy = self.get_proxy(name);
        for listener in listeners.iter() {
            listener.proxy_added(&proxy);
        }
        lock(&self.state).phantom = None;
        proxy
    }

    /// Evicts an object, marking it a zombie before listeners hear of it.
    pub(crate) fn remove(&self, name: &str) -> Result<T, NamespaceError> {
        let listeners = lock(&self.listeners);
        let proxy = {
            let mut state = lock(&self.state);
            let proxy = state
                .children
                .remove(name)
                .ok_or_else(|| NamespaceError::unknown(name))?;
            if state
                .phantom
                .as_ref()
                .is_some_and(|phantom| phantom.proxy().ptr_eq(proxy.proxy()))
            {
                state.phantom = None;
            }
            proxy
        };
        proxy.proxy().mark_zombie();
        for listener in listeners.iter() {
            listener.proxy_removed(&proxy);
        }
        Ok(proxy)
    }

    /// Stores an inbound value and notifies listeners unless `object` is
    /// the unconfirmed phantom.
    pub(crate) fn update_attribute(
        &self,
        object: &T,
        attr: &str,
        params: &[String],
    ) -> Result<(), CacheError> {
        object.proxy().apply(attr, params)?;
        let listeners = lock(&self.listeners);
        let is_phantom = lock(&self.state)
            .phantom
            .as_ref()
            .is_some_and(|phantom| phantom.proxy().ptr_eq(object.proxy()));
        if is_phantom {
            return Ok(());
        }
        for listener in listeners.iter() {
            listener.proxy_changed(object, attr);
        }
        Ok(())
    }

    /// Records that the initial listing finished and tells listeners.
    pub fn enumeration_complete(&self) {
        let listeners = lock(&self.listeners);
        for listener in listeners.iter() {
            listener.enumeration_complete();
        }
        lock(&self.state).enumerated = true;
        debug!(
            target: CACHE_TARGET,
            type_name = %self.type_name(),
            listeners = listeners.len(),
            "enumeration complete"
        );
    }
}
