//! Client library for the SONAR object-namespace protocol.
//!
//! A SONAR server exposes a namespace of typed objects. Each type holds
//! named objects and each object holds typed attributes. Clients subscribe
//! to types, keep a local proxy per object in a [`TypeCache`], and write
//! attributes back over one TLS connection.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use sonar_client::{Client, LogErrorHandler, ProxyListener, ValueKind, sonar_object};
//! use sonar_config::Config;
//!
//! sonar_object! {
//!     /// A dynamic message sign.
//!     pub struct Sign = "dms" {
//!         read_only "messageCurrent": ValueKind::Text,
//!         write_only "messageNext": ValueKind::Text,
//!     }
//! }
//!
//! struct Printer;
//!
//! impl ProxyListener<Sign> for Printer {
//!     fn proxy_added(&self, sign: &Sign) {
//!         println!("{}", sign.0);
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::connect(&Config::default(), LogErrorHandler)?;
//! client.login("tms", "secret")?;
//! let signs = client.type_cache::<Sign>();
//! signs.add_proxy_listener(Arc::new(Printer));
//! client.populate_wait(&signs)?;
//! # Ok(())
//! # }
//! ```

mod attribute;
mod cache;
mod client;
mod conduit;
mod dispatch;
mod errors;
mod event_loop;
mod failure;
mod name;
mod namespace;
mod processor;
pub mod protocol;
mod proxy;
mod request;
mod sync;
pub mod telemetry;
mod value;

#[cfg(test)]
mod test_support;

pub use attribute::{Attribute, AttributeMap};
pub use cache::{ProxyListener, TypeCache};
pub use client::Client;
pub use conduit::tls::{PlaintextEngine, RustlsEngine, TlsEngine, client_config};
pub use dispatch::{
    Access, AttributeSpec, Call, NAME_ATTRIBUTE, ProxyDispatch, TYPE_NAME_ATTRIBUTE, TypeSchema,
};
pub use errors::{
    CacheError, NameError, NamespaceError, ProtocolError, SonarError, TlsError,
};
pub use failure::{ErrorHandler, LogErrorHandler, SessionFailure};
pub use name::{Depth, Name, Reference, classify, is_absolute};
pub use namespace::Namespace;
pub use proxy::{Proxy, SonarObject, SonarType};
pub use request::{Request, RequestSink};
pub use value::{FromValue, NULL_PARAM, TIME_FORMAT, Value, ValueKind, ValueKindParseError};
