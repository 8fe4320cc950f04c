use crate::endpoint::ServerEndpoint;
use crate::logging::LogFormat;

/// Port SONAR servers listen on unless told otherwise.
pub const DEFAULT_PORT: u16 = 1037;

/// Host used when no server is configured.
pub const DEFAULT_HOST: &str = "localhost";

/// Milliseconds a login may take before it is abandoned.
pub const DEFAULT_LOGIN_TIMEOUT_MS: u64 = 20_000;

/// Milliseconds between queued writes and the forced flush of the outbound buffer.
pub const DEFAULT_FLUSH_DELAY_MS: u64 = 500;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Server contacted when nothing else is configured.
#[must_use]
pub fn default_server() -> ServerEndpoint {
    ServerEndpoint::default()
}
