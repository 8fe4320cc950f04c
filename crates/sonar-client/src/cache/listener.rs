/// Subscriber to membership and attribute changes of one type cache.
///
/// Callbacks run on the session's processing thread. They may read any
/// cache but must not add or remove listeners on the cache that is calling
/// them.
pub trait ProxyListener<T>: Send + Sync {
    /// A proxy was confirmed by the server, or replayed on registration.
    fn proxy_added(&self, _proxy: &T) {}

    /// The initial listing of the type finished.
    fn enumeration_complete(&self) {}

    /// A proxy was removed; it is already a zombie.
    fn proxy_removed(&self, _proxy: &T) {}

    /// An attribute of a confirmed proxy changed.
    fn proxy_changed(&self, _proxy: &T, _attribute: &str) {}
}
