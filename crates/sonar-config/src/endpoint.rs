use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::defaults::{DEFAULT_HOST, DEFAULT_PORT};

/// Address of a SONAR server, written as `host[:port]`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct ServerEndpoint {
    host: String,
    port: u16,
}

impl ServerEndpoint {
    /// Builds an endpoint from its parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address literal.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl Default for ServerEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(formatter, "[{}]:{}", self.host, self.port)
        } else {
            write!(formatter, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ServerEndpoint {
    type Err = EndpointParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(EndpointParseError::Empty);
        }
        if trimmed.contains("://") {
            return Err(EndpointParseError::UnexpectedScheme(trimmed.to_owned()));
        }
        let url = Url::parse(&format!("sonar://{trimmed}"))?;
        if !url.path().is_empty() && url.path() != "/" {
            return Err(EndpointParseError::TrailingPath(trimmed.to_owned()));
        }
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| EndpointParseError::MissingHost(trimmed.to_owned()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        Ok(Self::new(host, url.port().unwrap_or(DEFAULT_PORT)))
    }
}

impl TryFrom<String> for ServerEndpoint {
    type Error = EndpointParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServerEndpoint> for String {
    fn from(value: ServerEndpoint) -> Self {
        value.to_string()
    }
}

/// Errors encountered while parsing a [`ServerEndpoint`] from text.
#[derive(Debug, Error)]
pub enum EndpointParseError {
    /// Nothing was supplied.
    #[error("server address is empty")]
    Empty,
    /// A URL scheme was supplied where a bare address was expected.
    #[error("server address '{0}' must not carry a scheme")]
    UnexpectedScheme(String),
    /// The host part was missing.
    #[error("missing host in server address '{0}'")]
    MissingHost(String),
    /// Something followed the port.
    #[error("unexpected path in server address '{0}'")]
    TrailingPath(String),
    /// Address failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
