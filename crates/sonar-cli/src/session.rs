//! The session seam between command dispatch and the client library.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use sonar_client::{Client, Name, SessionFailure, TypeSchema, Value};
use sonar_config::Config;
use tracing::{debug, warn};

use crate::errors::SessionError;

const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// How long to wait for the server to name a fresh connection.
const CONNECTION_NAME_WAIT: Duration = Duration::from_secs(1);
const CONNECTION_NAME_POLL: Duration = Duration::from_millis(20);
/// How long the server gets to close the connection after QUIT.
const QUIT_GRACE: Duration = Duration::from_secs(2);

/// One object as printed by `list`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ObjectRecord {
    pub(crate) name: String,
    pub(crate) attributes: BTreeMap<String, Value>,
}

/// A logged-in session, as the commands see it.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Session {
    /// Name the server gave the connection, if it sent one.
    fn connection_name(&self) -> Option<String>;

    /// Enumerates every object described by `schema`.
    fn list(&self, schema: &TypeSchema) -> Result<Vec<ObjectRecord>, SessionError>;

    fn create(&self, name: Name) -> Result<(), SessionError>;

    fn remove(&self, name: Name) -> Result<(), SessionError>;

    fn set(&self, name: Name, values: Vec<String>) -> Result<(), SessionError>;

    fn change_password(&self, current: &str, new: &str) -> Result<(), SessionError>;

    /// Quits, waits for the connection to close and surfaces any failure
    /// the server reported along the way.
    fn finish(&self) -> Result<(), SessionError>;
}

/// Opens sessions for the runner.
pub(crate) trait Connector {
    fn open(
        &self,
        config: &Config,
        user: &str,
        password: &str,
    ) -> Result<Box<dyn Session>, SessionError>;
}

/// Connects with [`Client`] over TLS.
pub(crate) struct ClientConnector;

impl Connector for ClientConnector {
    fn open(
        &self,
        config: &Config,
        user: &str,
        password: &str,
    ) -> Result<Box<dyn Session>, SessionError> {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        let client = Client::connect(config, move |failure: SessionFailure| {
            warn!(target: SESSION_TARGET, %failure, "session failure");
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(failure.to_string());
        })
        .map_err(SessionError::Connect)?;
        if !client.login(user, password)? {
            return Err(SessionError::LoginRejected {
                user: user.to_owned(),
            });
        }
        Ok(Box::new(ClientSession { client, failures }))
    }
}

/// [`Session`] backed by a live [`Client`].
pub(crate) struct ClientSession {
    client: Client,
    failures: Arc<Mutex<Vec<String>>>,
}

impl ClientSession {
    fn reported(&self) -> Vec<String> {
        std::mem::take(&mut *self.failures.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Session for ClientSession {
    fn connection_name(&self) -> Option<String> {
        let deadline = Instant::now() + CONNECTION_NAME_WAIT;
        loop {
            let name = self.client.connection_name();
            if name.is_some() || Instant::now() >= deadline || self.client.is_closed() {
                return name;
            }
            thread::sleep(CONNECTION_NAME_POLL);
        }
    }

    fn list(&self, schema: &TypeSchema) -> Result<Vec<ObjectRecord>, SessionError> {
        let cache = self.client.type_cache_with_schema(schema);
        self.client.populate_wait(&cache)?;
        let records = cache
            .snapshot()
            .into_iter()
            .map(|proxy| ObjectRecord {
                name: proxy.name().to_owned(),
                attributes: proxy.attributes().into_iter().collect(),
            })
            .collect::<Vec<_>>();
        debug!(target: SESSION_TARGET, type_name = schema.type_name(), count = records.len(), "listed");
        Ok(records)
    }

    fn create(&self, name: Name) -> Result<(), SessionError> {
        Ok(self.client.create(name)?)
    }

    fn remove(&self, name: Name) -> Result<(), SessionError> {
        Ok(self.client.remove(name)?)
    }

    fn set(&self, name: Name, values: Vec<String>) -> Result<(), SessionError> {
        Ok(self.client.set_attribute(name, values)?)
    }

    fn change_password(&self, current: &str, new: &str) -> Result<(), SessionError> {
        Ok(self.client.change_password(current, new)?)
    }

    fn finish(&self) -> Result<(), SessionError> {
        self.client.quit_within(QUIT_GRACE)?;
        let reported = self.reported();
        if reported.is_empty() {
            Ok(())
        } else {
            Err(SessionError::Reported(reported))
        }
    }
}
