//! Error types shared across the SONAR client.

use std::io;

use thiserror::Error;

/// A name string that cannot address anything in the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// The string has the wrong number of parts or an empty type.
    #[error("invalid name '{0}'")]
    Invalid(String),
    /// A part carries a reserved separator or control character.
    #[error("name '{0}' contains a reserved character")]
    ReservedCharacter(String),
}

/// Framing or value errors on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A message or value carried the wrong number of parameters.
    #[error("wrong parameter count")]
    WrongParameterCount,
    /// The message code is unknown or not accepted from the server.
    #[error("invalid message code '{0}'")]
    InvalidMessageCode(String),
    /// A parameter could not be converted to the declared kind.
    #[error("invalid parameter '{0}'")]
    InvalidParameter(String),
    /// A frame was not valid UTF-8.
    #[error("message is not valid UTF-8")]
    MalformedText,
    /// A wire name was malformed.
    #[error(transparent)]
    Name(#[from] NameError),
}

/// Failures resolving names against the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    /// No type, object or attribute exists under this name.
    #[error("unknown name '{0}'")]
    NameUnknown(String),
    /// The name cannot be resolved in the current context.
    #[error("invalid name '{0}'")]
    NameInvalid(String),
}

impl NamespaceError {
    pub(crate) fn unknown(name: impl Into<String>) -> Self {
        Self::NameUnknown(name.into())
    }

    pub(crate) fn invalid(name: impl Into<String>) -> Self {
        Self::NameInvalid(name.into())
    }
}

impl From<NameError> for NamespaceError {
    fn from(error: NameError) -> Self {
        match error {
            NameError::Invalid(name) | NameError::ReservedCharacter(name) => {
                Self::NameInvalid(name)
            }
        }
    }
}

/// Errors returned by cache and proxy operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The type does not declare this operation.
    #[error("unknown operation '{operation}' on type '{type_name}'")]
    UnknownOperation {
        /// Type the call was made against.
        type_name: String,
        /// Operation that was requested.
        operation: String,
    },
    /// The value does not match the attribute's declared kind.
    #[error("attribute '{attribute}' expects {expected}")]
    KindMismatch {
        /// Attribute being read or written.
        attribute: String,
        /// Human-readable kind description.
        expected: String,
    },
    /// A name could not be resolved.
    #[error(transparent)]
    Namespace(#[from] NamespaceError),
    /// A value could not be marshalled or unmarshalled.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The session has closed and no longer accepts requests.
    #[error("session is disconnected")]
    Disconnected,
}

impl CacheError {
    pub(crate) fn unknown_operation(type_name: &str, operation: impl Into<String>) -> Self {
        Self::UnknownOperation {
            type_name: type_name.to_owned(),
            operation: operation.into(),
        }
    }
}

/// TLS configuration and record-layer failures.
#[derive(Debug, Error)]
pub enum TlsError {
    /// Trust anchors could not be read from disk.
    #[error("failed to read trust anchors from {path}: {source}")]
    ReadTrustAnchors {
        /// Configured CA bundle path.
        path: String,
        /// Underlying read failure.
        #[source]
        source: io::Error,
    },
    /// The trust anchor bundle held no usable certificate.
    #[error("no usable certificates in {path}")]
    NoCertificates {
        /// Configured CA bundle path.
        path: String,
    },
    /// A certificate was rejected while building the trust store.
    #[error("invalid certificate: {0}")]
    Certificate(String),
    /// Neither trust anchors nor insecure mode were configured.
    #[error("no TLS trust anchors configured; set tls_ca_path or tls_insecure")]
    MissingTrust,
    /// The host name is not a valid TLS server name.
    #[error("invalid TLS server name '{host}'")]
    ServerName {
        /// Host name taken from the endpoint.
        host: String,
    },
    /// Decrypted plaintext could not be read back.
    #[error("failed to read TLS plaintext: {0}")]
    Record(#[source] io::Error),
    /// rustls refused the configuration or the peer's records.
    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// Session-level errors surfaced by the client.
#[derive(Debug, Error)]
pub enum SonarError {
    /// Host name resolution failed.
    #[error("failed to resolve {endpoint}: {source}")]
    Resolve {
        /// `host:port` being resolved.
        endpoint: String,
        /// Resolver failure.
        #[source]
        source: io::Error,
    },
    /// Host name resolved to nothing.
    #[error("no addresses resolved for {endpoint}")]
    ResolveEmpty {
        /// `host:port` that resolved to nothing.
        endpoint: String,
    },
    /// The TCP connection could not be established.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        /// `host:port` that refused or timed out.
        endpoint: String,
        /// Error from the last address tried.
        #[source]
        source: io::Error,
    },
    /// Socket I/O failed.
    #[error("{context}: {source}")]
    Io {
        /// What the session was doing.
        context: &'static str,
        /// Socket error.
        #[source]
        source: io::Error,
    },
    /// The server closed the connection.
    #[error("connection closed by peer")]
    EndOfStream,
    /// The server answered neither with success nor failure in time.
    #[error("Login timed out")]
    LoginTimedOut,
    /// The session is no longer connected.
    #[error("session is disconnected")]
    Disconnected,
    /// A worker thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Role of the thread, such as `processor`.
        name: &'static str,
        /// Error from the thread builder.
        #[source]
        source: io::Error,
    },
    /// A worker thread panicked.
    #[error("{name} thread panicked")]
    ThreadPanic {
        /// Role of the thread that panicked.
        name: &'static str,
    },
    /// TLS setup or processing failed.
    #[error(transparent)]
    Tls(#[from] TlsError),
    /// The server sent something unparseable.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The server referenced an unknown or unresolvable name.
    #[error(transparent)]
    Namespace(#[from] NamespaceError),
    /// A cache operation failed.
    #[error(transparent)]
    Cache(CacheError),
}

impl From<CacheError> for SonarError {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::Namespace(inner) => Self::Namespace(inner),
            CacheError::Protocol(inner) => Self::Protocol(inner),
            CacheError::Disconnected => Self::Disconnected,
            other => Self::Cache(other),
        }
    }
}

impl SonarError {
    pub(crate) const fn io(context: &'static str, source: io::Error) -> Self {
        Self::Io { context, source }
    }
}
