//! Password lookup.
//!
//! Passwords never travel on the command line, where other users could read
//! them from the process table.

use std::env;

use crate::AppError;

pub(crate) const PASSWORD_VARIABLE: &str = "SONAR_PASSWORD";
pub(crate) const NEW_PASSWORD_VARIABLE: &str = "SONAR_NEW_PASSWORD";

pub(crate) trait Secrets {
    /// Value of `variable`, if set.
    fn lookup(&self, variable: &'static str) -> Option<String>;

    fn require(&self, variable: &'static str) -> Result<String, AppError> {
        self.lookup(variable)
            .ok_or(AppError::MissingSecret { variable })
    }
}

/// Reads secrets from the process environment.
pub(crate) struct EnvSecrets;

impl Secrets for EnvSecrets {
    fn lookup(&self, variable: &'static str) -> Option<String> {
        env::var(variable).ok()
    }
}
