//! Error types for the command-line runtime.

use std::io;
use std::sync::Arc;

use sonar_client::telemetry::TelemetryError;
use sonar_client::{CacheError, NameError, SonarError};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise logging: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("no user configured; pass --user or set SONAR_USER")]
    MissingUser,
    #[error("{variable} is not set")]
    MissingSecret { variable: &'static str },
    #[error("invalid name: {0}")]
    Name(#[from] NameError),
    #[error("'{name}' does not name {expected}")]
    WrongDepth { name: String, expected: &'static str },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
    #[error("failed to serialise output: {0}")]
    Serialise(#[source] serde_json::Error),
}

/// Failures raised while talking to the server.
#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("failed to connect: {0}")]
    Connect(#[source] SonarError),
    #[error("login rejected for user '{user}'")]
    LoginRejected { user: String },
    #[error(transparent)]
    Client(#[from] SonarError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// Failures the server reported during the session.
    #[error("server reported: {}", .0.join("; "))]
    Reported(Vec<String>),
}
