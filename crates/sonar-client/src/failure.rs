//! Session failure reporting.
//!
//! Failures reach the application through an [`ErrorHandler`] registered at
//! connect time. Handlers run on the processor thread.

use thiserror::Error;
use tracing::warn;

use crate::errors::SonarError;

const FAILURE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::failure");

const AUTHENTICATION_FAILED: &str = "Authentication failed";
const PERMISSION_DENIED: &str = "Permission denied";

/// A failure observed by the session.
#[derive(Debug, Error)]
pub enum SessionFailure {
    /// The server rejected the supplied credentials.
    #[error("{0}")]
    Authentication(String),
    /// The server refused an operation for lack of privilege.
    #[error("{0}")]
    PermissionDenied(String),
    /// Any other SHOW text from the server.
    #[error("{0}")]
    Show(String),
    /// The session was torn down by a transport or protocol error.
    #[error(transparent)]
    Transport(#[from] SonarError),
}

impl SessionFailure {
    /// Classifies the text of a SHOW message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sonar_client::SessionFailure;
    ///
    /// let failure = SessionFailure::classify_show("Permission denied: tms".into());
    /// assert!(matches!(failure, SessionFailure::PermissionDenied(_)));
    /// ```
    #[must_use]
    pub fn classify_show(text: String) -> Self {
        if text.contains(AUTHENTICATION_FAILED) {
            Self::Authentication(text)
        } else if text.starts_with(PERMISSION_DENIED) {
            Self::PermissionDenied(text)
        } else {
            Self::Show(text)
        }
    }

    /// Returns `true` when the failure closed the session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Receives session failures.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorHandler: Send + Sync {
    /// Handles one failure.
    fn handle(&self, failure: SessionFailure);
}

impl<F> ErrorHandler for F
where
    F: Fn(SessionFailure) + Send + Sync,
{
    fn handle(&self, failure: SessionFailure) {
        self(failure);
    }
}

/// Handler that records failures in the log and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorHandler;

impl ErrorHandler for LogErrorHandler {
    fn handle(&self, failure: SessionFailure) {
        warn!(target: FAILURE_TARGET, fatal = failure.is_fatal(), %failure, "session failure");
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("Authentication failed for user tms", "authentication")]
    #[case("Login: Authentication failed", "authentication")]
    #[case("Permission denied: cannot write", "permission")]
    #[case("Error: Permission denied", "show")]
    #[case("Unknown object", "show")]
    fn classifies_show_text(#[case] text: &str, #[case] expected: &str) {
        let actual = match SessionFailure::classify_show(text.to_owned()) {
            SessionFailure::Authentication(_) => "authentication",
            SessionFailure::PermissionDenied(_) => "permission",
            SessionFailure::Show(_) => "show",
            SessionFailure::Transport(_) => "transport",
        };
        assert_eq!(actual, expected);
    }

    #[rstest]
    fn only_transport_failures_are_fatal() {
        assert!(SessionFailure::Transport(SonarError::EndOfStream).is_fatal());
        assert!(!SessionFailure::Show("x".into()).is_fatal());
    }

    #[rstest]
    fn closures_act_as_handlers() {
        let seen = std::sync::Mutex::new(Vec::new());
        let handler = |failure: SessionFailure| {
            if let Ok(mut guard) = seen.lock() {
                guard.push(failure.to_string());
            }
        };
        handler.handle(SessionFailure::Show("hello".into()));
        let recorded = seen.lock().map(|guard| guard.clone()).unwrap_or_default();
        assert_eq!(recorded, vec!["hello".to_owned()]);
    }
}
