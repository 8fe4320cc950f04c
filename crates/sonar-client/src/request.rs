//! Outbound protocol requests raised by caches and proxies.

use crate::errors::CacheError;
use crate::name::Name;

/// A client-to-server request originating from a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// OBJECT: create the named object.
    Create(Name),
    /// REMOVE: remove the named object.
    Remove(Name),
    /// ATTRIBUTE: write marshalled values.
    SetAttribute {
        /// Fully qualified attribute name.
        name: Name,
        /// Marshalled value parameters.
        values: Vec<String>,
    },
    /// ENUMERATE: subscribe to a name.
    Enumerate(Name),
    /// IGNORE: unsubscribe from a name.
    Ignore(Name),
}

/// Destination for outbound requests.
///
/// The session implements this by queueing a job on its serial processor,
/// which keeps every outbound send ordered with inbound handling.
pub trait RequestSink: Send + Sync {
    /// Queues a request for sending.
    fn submit(&self, request: Request) -> Result<(), CacheError>;
}
