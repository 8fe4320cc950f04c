//! Session state machine over a TLS transport.
//!
//! The conduit owns the socket, the login handshake and inbound message
//! handling. Socket readiness is driven by the event loop; everything that
//! touches the namespace runs on the processor thread.

pub(crate) mod tls;
pub(crate) mod transport;

use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use sonar_config::ServerEndpoint;
use tracing::{debug, error, info, warn};

use self::tls::TlsEngine;
use self::transport::{ReadOutcome, Transport};
use crate::event_loop::Waker;
use crate::errors::SonarError;
use crate::failure::{ErrorHandler, SessionFailure};
use crate::namespace::Namespace;
use crate::protocol::{FrameDecoder, Inbound, MessageKind, encode_frame};
use crate::request::Request;
use crate::sync::lock;

const CONDUIT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::conduit");

/// Progress of the login handshake as seen by a waiting caller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoginState {
    #[default]
    Idle,
    Pending,
    Accepted,
    Rejected,
    Disposed,
}

#[derive(Debug, Default)]
struct Session {
    login: LoginState,
    logged_in: bool,
    connection_name: Option<String>,
    quitting: bool,
    closed: bool,
}

impl Session {
    fn release_waiter(&mut self, outcome: LoginState) {
        if self.login == LoginState::Pending {
            self.login = outcome;
        }
    }
}

/// One SONAR session over one connection.
pub(crate) struct Conduit {
    endpoint: String,
    peer: SocketAddr,
    transport: Mutex<Transport>,
    decoder: Mutex<FrameDecoder>,
    namespace: Arc<Namespace>,
    session: Mutex<Session>,
    session_signal: Condvar,
    waker: Waker,
    handler: Arc<dyn ErrorHandler>,
    #[cfg(unix)]
    socket_fd: std::os::fd::RawFd,
}

impl Conduit {
    pub(crate) fn connect(
        endpoint: &ServerEndpoint,
        engine: Box<dyn TlsEngine>,
        namespace: Arc<Namespace>,
        handler: Arc<dyn ErrorHandler>,
    ) -> Result<Self, SonarError> {
        let transport = Transport::connect(endpoint, engine)?;
        let waker = Waker::new()?;
        let peer = transport.peer();
        #[cfg(unix)]
        let socket_fd = {
            use std::os::fd::AsRawFd;
            transport.stream().as_raw_fd()
        };
        info!(target: CONDUIT_TARGET, %endpoint, %peer, "connected");
        Ok(Self {
            endpoint: endpoint.to_string(),
            peer,
            transport: Mutex::new(transport),
            decoder: Mutex::new(FrameDecoder::new()),
            namespace,
            session: Mutex::new(Session::default()),
            session_signal: Condvar::new(),
            waker,
            handler,
            #[cfg(unix)]
            socket_fd,
        })
    }

    pub(crate) fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    pub(crate) fn peer_name(&self) -> String {
        self.peer.to_string()
    }

    pub(crate) fn connection_name(&self) -> Option<String> {
        lock(&self.session).connection_name.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        lock(&self.session).closed
    }

    pub(crate) fn is_logged_in(&self) -> bool {
        lock(&self.session).logged_in
    }

    pub(crate) const fn waker(&self) -> &Waker {
        &self.waker
    }

    #[cfg(unix)]
    pub(crate) const fn socket_fd(&self) -> std::os::fd::RawFd {
        self.socket_fd
    }

    /// Arms the login waiter before the LOGIN frame is queued.
    pub(crate) fn begin_login(&self) {
        let mut session = lock(&self.session);
        session.login = if session.closed {
            LoginState::Disposed
        } else {
            LoginState::Pending
        };
    }

    /// Blocks until the login resolves or `timeout` expires.
    ///
    /// Returns [`LoginState::Pending`] on timeout.
    pub(crate) fn wait_login(&self, timeout: Duration) -> LoginState {
        let session = lock(&self.session);
        let (session, _) = self
            .session_signal
            .wait_timeout_while(session, timeout, |session| {
                session.login == LoginState::Pending
            })
            .unwrap_or_else(PoisonError::into_inner);
        session.login
    }

    /// Blocks until the connection closes or `timeout` expires.
    ///
    /// Returns whether the connection is closed.
    pub(crate) fn wait_closed(&self, timeout: Duration) -> bool {
        let session = lock(&self.session);
        let (session, _) = self
            .session_signal
            .wait_timeout_while(session, timeout, |session| !session.closed)
            .unwrap_or_else(PoisonError::into_inner);
        session.closed
    }

    /// Records that the application asked the session to end.
    ///
    /// Failures observed after this point are logged but not reported.
    pub(crate) fn mark_quitting(&self) {
        lock(&self.session).quitting = true;
    }

    pub(crate) fn login(&self, user: &str, password: &str) -> Result<(), SonarError> {
        debug!(target: CONDUIT_TARGET, user, "sending login");
        self.send(MessageKind::Login, &[user, password])
    }

    pub(crate) fn change_password(&self, current: &str, new: &str) -> Result<(), SonarError> {
        self.send(MessageKind::Password, &[current, new])
    }

    pub(crate) fn quit(&self) -> Result<(), SonarError> {
        self.mark_quitting();
        self.send(MessageKind::Quit, &[])
    }

    pub(crate) fn request(&self, request: &Request) -> Result<(), SonarError> {
        match request {
            Request::Create(name) => self.send(MessageKind::Object, &[&name.to_string()]),
            Request::Remove(name) => self.send(MessageKind::Remove, &[&name.to_string()]),
            Request::SetAttribute { name, values } => {
                let wire = name.to_string();
                let mut params = Vec::with_capacity(values.len() + 1);
                params.push(wire.as_str());
                params.extend(values.iter().map(String::as_str));
                self.send(MessageKind::Attribute, &params)
            }
            Request::Enumerate(name) => self.send(MessageKind::Enumerate, &[&name.to_string()]),
            Request::Ignore(name) => self.send(MessageKind::Ignore, &[&name.to_string()]),
        }
    }

    fn send(&self, kind: MessageKind, params: &[&str]) -> Result<(), SonarError> {
        let frame = encode_frame(kind, params)?;
        lock(&self.transport).queue(&frame)?;
        self.flush();
        Ok(())
    }

    /// Hands pending ciphertext to the event loop.
    pub(crate) fn flush(&self) {
        if lock(&self.transport).wants_write() {
            self.waker.wake();
        }
    }

    /// Drains buffered plaintext and handles every complete frame.
    pub(crate) fn process_messages(&self) -> Result<(), SonarError> {
        let mut decoder = lock(&self.decoder);
        let plaintext = lock(&self.transport).take_plaintext();
        decoder.extend(&plaintext);
        while let Some(params) = decoder.next_frame()? {
            if self.is_closed() {
                break;
            }
            self.handle(Inbound::parse(params)?)?;
        }
        drop(decoder);
        self.flush();
        Ok(())
    }

    fn handle(&self, message: Inbound) -> Result<(), SonarError> {
        match message {
            Inbound::Quit => {
                info!(target: CONDUIT_TARGET, endpoint = %self.endpoint, "server ended the session");
                self.disconnect();
                Ok(())
            }
            Inbound::Object(name) => self.namespace.put_object(&name),
            Inbound::Remove(name) => self.namespace.remove_object(&name),
            Inbound::Attribute { name, values } => self.namespace.update_attribute(&name, &values),
            Inbound::Type(Some(name)) => self.namespace.set_current_type(&name),
            Inbound::Type(None) => {
                self.namespace.set_current_type("")?;
                self.login_accepted();
                Ok(())
            }
            Inbound::Show(text) => {
                self.show(text);
                Ok(())
            }
        }
    }

    fn login_accepted(&self) {
        let mut session = lock(&self.session);
        if !session.logged_in {
            info!(target: CONDUIT_TARGET, endpoint = %self.endpoint, "logged in");
        }
        session.logged_in = true;
        session.release_waiter(LoginState::Accepted);
        self.session_signal.notify_all();
    }

    fn show(&self, text: String) {
        let unclaimed = {
            let mut session = lock(&self.session);
            if !session.logged_in {
                session.release_waiter(LoginState::Rejected);
                self.session_signal.notify_all();
                Some(text)
            } else if session.connection_name.is_none() {
                info!(target: CONDUIT_TARGET, connection = %text, "connection named");
                session.connection_name = Some(text);
                None
            } else {
                Some(text)
            }
        };
        if let Some(text) = unclaimed {
            warn!(target: CONDUIT_TARGET, message = %text, "server message");
            self.handler.handle(SessionFailure::classify_show(text));
        }
    }

    /// Pumps socket bytes through the engine.
    pub(crate) fn on_readable(&self) -> Result<ReadOutcome, SonarError> {
        lock(&self.transport).read_available()
    }

    /// Writes pending ciphertext; returns `true` when bytes went out.
    pub(crate) fn on_writable(&self) -> Result<bool, SonarError> {
        lock(&self.transport).write_pending()
    }

    pub(crate) fn wants_write(&self) -> bool {
        lock(&self.transport).wants_write()
    }

    /// Closes the connection and releases any login waiter.
    pub(crate) fn disconnect(&self) {
        let closed_now = lock(&self.transport).close();
        {
            let mut session = lock(&self.session);
            session.closed = true;
            session.logged_in = false;
            session.release_waiter(LoginState::Disposed);
            self.session_signal.notify_all();
        }
        self.waker.wake();
        if closed_now {
            info!(target: CONDUIT_TARGET, endpoint = %self.endpoint, "disconnected");
        }
    }

    /// Tears the session down for good.
    pub(crate) fn dispose(&self) {
        self.mark_quitting();
        self.disconnect();
    }

    /// Disconnects after a failure and reports it unless the session was
    /// already ending.
    pub(crate) fn fail(&self, failure: SonarError) {
        let report = {
            let session = lock(&self.session);
            !session.quitting && !session.closed
        };
        self.disconnect();
        if report {
            error!(target: CONDUIT_TARGET, endpoint = %self.endpoint, error = %failure, "session failed");
            self.handler.handle(SessionFailure::Transport(failure));
        } else {
            debug!(target: CONDUIT_TARGET, error = %failure, "ignoring failure after session end");
        }
    }
}
