//! Shared configuration for the SONAR client library and its command-line tool.
//!
//! Values are layered by `ortho_config`: built-in defaults, then a TOML file
//! (`--config-path` or `SONAR_CONFIG_PATH`), then `SONAR_*` environment
//! variables, then command-line flags.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod endpoint;
mod logging;

pub use defaults::{
    DEFAULT_FLUSH_DELAY_MS, DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_LOGIN_TIMEOUT_MS,
    DEFAULT_PORT, default_log_filter, default_log_filter_string, default_log_format,
    default_server,
};
pub use endpoint::{EndpointParseError, ServerEndpoint};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration for a SONAR session.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[ortho_config(prefix = "SONAR")]
pub struct Config {
    /// Server to connect to, as `host[:port]`.
    #[ortho_config(default = defaults::default_server())]
    pub server: ServerEndpoint,
    /// User name presented at login.
    pub user: Option<String>,
    /// Milliseconds to wait for the server to answer a login.
    #[ortho_config(default = DEFAULT_LOGIN_TIMEOUT_MS)]
    pub login_timeout_ms: u64,
    /// Milliseconds before buffered outbound messages are flushed.
    #[ortho_config(default = DEFAULT_FLUSH_DELAY_MS)]
    pub flush_delay_ms: u64,
    /// PEM bundle of trust anchors used to verify the server.
    pub tls_ca_path: Option<Utf8PathBuf>,
    /// Skip certificate chain and host name verification.
    #[ortho_config(default = false)]
    pub tls_insecure: bool,
    /// `tracing` filter expression.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: default_server(),
            user: None,
            login_timeout_ms: DEFAULT_LOGIN_TIMEOUT_MS,
            flush_delay_ms: DEFAULT_FLUSH_DELAY_MS,
            tls_ca_path: None,
            tls_insecure: false,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Server endpoint the client connects to.
    #[must_use]
    pub fn server(&self) -> &ServerEndpoint {
        &self.server
    }

    /// User name configured for login, if any.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Upper bound on how long a login may take.
    #[must_use]
    pub const fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }

    /// Delay before queued outbound data is flushed.
    #[must_use]
    pub const fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    /// Trust anchors for TLS verification.
    #[must_use]
    pub fn tls_ca_path(&self) -> Option<&Utf8PathBuf> {
        self.tls_ca_path.as_ref()
    }

    /// Whether server certificates are accepted without chain verification.
    #[must_use]
    pub const fn tls_insecure(&self) -> bool {
        self.tls_insecure
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
