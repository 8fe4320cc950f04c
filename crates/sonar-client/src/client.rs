//! Session façade for applications.
//!
//! A [`Client`] owns one connection, its processor thread and, once logged
//! in, its event loop thread. Type caches are created through the client so
//! their requests flow through the session's single processing queue.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sonar_config::Config;
use tracing::{debug, info, warn};

use crate::cache::TypeCache;
use crate::conduit::tls::{RustlsEngine, TlsEngine};
use crate::conduit::{Conduit, LoginState};
use crate::dispatch::TypeSchema;
use crate::errors::{CacheError, NameError, ProtocolError, SonarError};
use crate::event_loop;
use crate::failure::ErrorHandler;
use crate::name::Name;
use crate::namespace::Namespace;
use crate::processor::{Job, JobRunner, Processor};
use crate::proxy::{Proxy, SonarObject, SonarType};
use crate::request::Request;
use crate::sync::lock;
use crate::value::Value;

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");
const POPULATE_POLL: Duration = Duration::from_millis(100);

/// Routes processor jobs onto the conduit.
pub(crate) struct SessionRunner {
    conduit: Arc<Conduit>,
}

impl SessionRunner {
    pub(crate) const fn new(conduit: Arc<Conduit>) -> Self {
        Self { conduit }
    }
}

impl JobRunner for SessionRunner {
    fn run(&self, job: Job) -> Result<(), SonarError> {
        match job {
            Job::Login { user, password } => self.conduit.login(&user, &password),
            Job::ChangePassword { current, new } => self.conduit.change_password(&current, &new),
            Job::Request(request) => self.conduit.request(&request),
            Job::ProcessMessages => self.conduit.process_messages(),
            Job::Flush => {
                self.conduit.flush();
                Ok(())
            }
            Job::Quit => self.conduit.quit(),
            Job::Disconnect => {
                self.conduit.disconnect();
                Ok(())
            }
            Job::Fail(error) => Err(error),
        }
    }

    fn fail(&self, error: SonarError) {
        self.conduit.fail(error);
    }
}

/// A connection to a SONAR server.
///
/// # Examples
///
/// ```rust,no_run
/// use sonar_client::{Client, LogErrorHandler};
/// use sonar_config::Config;
///
/// # fn main() -> Result<(), sonar_client::SonarError> {
/// let config = Config::default();
/// let client = Client::connect(&config, LogErrorHandler)?;
/// if client.login("tms", "secret")? {
///     println!("connected to {:?}", client.connection_name());
/// }
/// client.quit()?;
/// client.join()?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    conduit: Arc<Conduit>,
    processor: Arc<Processor>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    login_timeout: Duration,
    flush_delay: Duration,
}

impl Client {
    /// Connects over TLS using the trust settings in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SonarError::Tls`] for unusable TLS settings, or a resolve
    /// or connect error when the server is unreachable.
    pub fn connect(config: &Config, handler: impl ErrorHandler + 'static) -> Result<Self, SonarError> {
        let engine = RustlsEngine::from_config(config)?;
        Self::with_engine(config, Box::new(engine), handler)
    }

    /// Connects using a caller-supplied record-layer engine.
    ///
    /// # Errors
    ///
    /// Returns a resolve or connect error when the server is unreachable,
    /// or [`SonarError::Spawn`] when the processor thread cannot start.
    pub fn with_engine(
        config: &Config,
        engine: Box<dyn TlsEngine>,
        handler: impl ErrorHandler + 'static,
    ) -> Result<Self, SonarError> {
        let namespace = Arc::new(Namespace::new());
        let conduit = Arc::new(Conduit::connect(
            config.server(),
            engine,
            namespace,
            Arc::new(handler),
        )?);
        let runner = Arc::new(SessionRunner::new(Arc::clone(&conduit)));
        let processor = Arc::new(Processor::start(runner)?);
        Ok(Self {
            conduit,
            processor,
            event_loop: Mutex::new(None),
            login_timeout: config.login_timeout(),
            flush_delay: config.flush_delay(),
        })
    }

    /// Namespace holding every registered type cache.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        self.conduit.namespace()
    }

    /// Creates and registers the cache for a typed wrapper.
    ///
    /// Registering a type again replaces the earlier cache.
    #[must_use]
    pub fn type_cache<T: SonarType>(&self) -> Arc<TypeCache<T>> {
        let cache = Arc::new(TypeCache::<T>::typed(self.processor.clone()));
        self.conduit.namespace().register(cache.clone());
        cache
    }

    /// Creates and registers an untyped cache described by `schema`.
    #[must_use]
    pub fn type_cache_with_schema(&self, schema: &TypeSchema) -> Arc<TypeCache<Proxy>> {
        let cache = Arc::new(TypeCache::<Proxy>::new(schema, self.processor.clone()));
        self.conduit.namespace().register(cache.clone());
        cache
    }

    /// Logs in and waits for the server's verdict.
    ///
    /// Returns `Ok(false)` when the server rejects the credentials or the
    /// session closes first; the processor then closes the connection.
    ///
    /// # Errors
    ///
    /// Returns [`SonarError::LoginTimedOut`] when the server does not answer
    /// within the configured timeout; the session is disconnected as above.
    pub fn login(&self, user: &str, password: &str) -> Result<bool, SonarError> {
        self.start_event_loop()?;
        self.conduit.begin_login();
        self.processor.queue(Job::Login {
            user: user.to_owned(),
            password: password.to_owned(),
        })?;
        match self.conduit.wait_login(self.login_timeout) {
            LoginState::Accepted => {
                info!(target: CLIENT_TARGET, user, "login accepted");
                Ok(true)
            }
            LoginState::Pending | LoginState::Idle => {
                warn!(target: CLIENT_TARGET, user, "login timed out");
                self.abandon_login();
                Err(SonarError::LoginTimedOut)
            }
            outcome @ (LoginState::Rejected | LoginState::Disposed) => {
                warn!(target: CLIENT_TARGET, user, ?outcome, "login failed");
                self.abandon_login();
                Ok(false)
            }
        }
    }

    /// Queues the teardown behind any job the processor is still running.
    fn abandon_login(&self) {
        if self.disconnect().is_err() {
            // The processor is gone, so nothing else touches the conduit.
            self.conduit.disconnect();
        }
    }

    fn submit(&self, request: Request) -> Result<(), CacheError> {
        request_name(&request)
            .validate()
            .map_err(ProtocolError::from)?;
        self.processor.queue(Job::Request(request))
    }

    fn start_event_loop(&self) -> Result<(), SonarError> {
        let mut event_loop = lock(&self.event_loop);
        if event_loop.is_none() {
            let handle = event_loop::spawn(
                Arc::clone(&self.conduit),
                Arc::clone(&self.processor),
                self.flush_delay,
            )?;
            *event_loop = Some(handle);
        }
        Ok(())
    }

    /// Registers `cache` and asks the server to enumerate its type.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disconnected`] once the session has ended.
    pub fn populate<T: SonarObject>(&self, cache: &Arc<TypeCache<T>>) -> Result<(), CacheError> {
        self.conduit.namespace().register(cache.clone());
        self.processor
            .queue(Job::Request(Request::Enumerate(Name::of_type(cache.type_name()))))
    }

    /// Populates `cache` and blocks until its enumeration completes.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disconnected`] if the session closes first.
    pub fn populate_wait<T: SonarObject>(
        &self,
        cache: &Arc<TypeCache<T>>,
    ) -> Result<(), CacheError> {
        self.populate(cache)?;
        while !cache.is_enumerated() {
            if self.conduit.is_closed() {
                return Err(CacheError::Disconnected);
            }
            thread::sleep(POPULATE_POLL);
        }
        Ok(())
    }

    /// Sends OBJECT to create `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disconnected`] once the session has ended.
    pub fn create(&self, name: Name) -> Result<(), CacheError> {
        self.submit(Request::Create(name))
    }

    /// Sends one ATTRIBUTE per initial value, then OBJECT to create `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Protocol`] when `name` does not address an
    /// object or a value cannot be marshalled, and
    /// [`CacheError::Disconnected`] once the session has ended.
    pub fn create_with<I, K>(&self, name: Name, attributes: I) -> Result<(), CacheError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let Some(object) = name.object_part() else {
            return Err(ProtocolError::from(NameError::Invalid(name.to_string())).into());
        };
        for (attribute, value) in attributes {
            self.submit(Request::SetAttribute {
                name: Name::of_attribute(name.type_part(), object, attribute.as_ref()),
                values: value.marshal()?,
            })?;
        }
        self.submit(Request::Create(name))
    }

    /// Sends REMOVE for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disconnected`] once the session has ended.
    pub fn remove(&self, name: Name) -> Result<(), CacheError> {
        self.submit(Request::Remove(name))
    }

    /// Sends ATTRIBUTE with already marshalled values.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disconnected`] once the session has ended.
    pub fn set_attribute(&self, name: Name, values: Vec<String>) -> Result<(), CacheError> {
        self.submit(Request::SetAttribute { name, values })
    }

    /// Sends ENUMERATE for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disconnected`] once the session has ended.
    pub fn enumerate(&self, name: Name) -> Result<(), CacheError> {
        self.submit(Request::Enumerate(name))
    }

    /// Sends IGNORE for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disconnected`] once the session has ended.
    pub fn ignore(&self, name: Name) -> Result<(), CacheError> {
        self.submit(Request::Ignore(name))
    }

    /// Asks the server to change the login password.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disconnected`] once the session has ended.
    pub fn change_password(&self, current: &str, new: &str) -> Result<(), CacheError> {
        self.processor.queue(Job::ChangePassword {
            current: current.to_owned(),
            new: new.to_owned(),
        })
    }

    /// Closes the connection without a QUIT exchange.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disconnected`] once the processor has stopped.
    pub fn disconnect(&self) -> Result<(), CacheError> {
        self.conduit.mark_quitting();
        self.processor.queue(Job::Disconnect)
    }

    /// Sends QUIT; the server then closes the connection.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disconnected`] once the processor has stopped.
    pub fn quit(&self) -> Result<(), CacheError> {
        self.conduit.mark_quitting();
        self.processor.queue(Job::Quit)
    }

    /// Sends QUIT and gives the server `grace` to close the connection.
    ///
    /// A server that ignores QUIT is disconnected once `grace` runs out.
    /// The session threads are joined either way.
    ///
    /// # Errors
    ///
    /// Returns [`SonarError::ThreadPanic`] when a session thread panicked.
    pub fn quit_within(&self, grace: Duration) -> Result<(), SonarError> {
        if let Err(error) = self.quit() {
            debug!(target: CLIENT_TARGET, %error, "quit not queued");
        }
        if !self.conduit.wait_closed(grace) {
            warn!(
                target: CLIENT_TARGET,
                ?grace,
                "server did not close after quit; disconnecting"
            );
            self.conduit.dispose();
        }
        self.join()
    }

    /// Waits for the session to end, then stops the processor.
    ///
    /// # Errors
    ///
    /// Returns [`SonarError::ThreadPanic`] when a session thread panicked.
    pub fn join(&self) -> Result<(), SonarError> {
        let handle = lock(&self.event_loop).take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| SonarError::ThreadPanic { name: "event loop" })?;
        }
        self.processor.stop();
        self.processor.join()
    }

    /// Text of the first SHOW received after login.
    #[must_use]
    pub fn connection_name(&self) -> Option<String> {
        self.conduit.connection_name()
    }

    /// `host:port` of the connected socket.
    #[must_use]
    pub fn peer_name(&self) -> String {
        self.conduit.peer_name()
    }

    /// Whether the server has accepted the login and the session is open.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.conduit.is_logged_in()
    }

    /// Whether the connection has closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.conduit.is_closed()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        debug!(target: CLIENT_TARGET, peer = %self.conduit.peer_name(), "disposing client");
        self.conduit.dispose();
        self.processor.stop();
    }
}

fn request_name(request: &Request) -> &Name {
    match request {
        Request::Create(name)
        | Request::Remove(name)
        | Request::Enumerate(name)
        | Request::Ignore(name)
        | Request::SetAttribute { name, .. } => name,
    }
}
