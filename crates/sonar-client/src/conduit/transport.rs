//! Non-blocking socket plus TLS engine.

use std::io::{self, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use sonar_config::ServerEndpoint;

use super::tls::TlsEngine;
use crate::errors::SonarError;

/// Upper bound on establishing the TCP connection.
pub(crate) const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of pumping bytes from the socket into the engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadOutcome {
    /// New plaintext is buffered.
    pub(crate) plaintext: bool,
    /// The peer closed its side.
    pub(crate) closed: bool,
}

/// Socket and record layer for one session.
pub(crate) struct Transport {
    stream: TcpStream,
    engine: Box<dyn TlsEngine>,
    plaintext: Vec<u8>,
    peer: SocketAddr,
    closed: bool,
}

impl Transport {
    /// Connects to `endpoint` and switches the socket to non-blocking mode.
    pub(crate) fn connect(
        endpoint: &ServerEndpoint,
        engine: Box<dyn TlsEngine>,
    ) -> Result<Self, SonarError> {
        let addresses = resolve(endpoint)?;
        let mut last_error = None;
        for address in addresses {
            match open_socket(address) {
                Ok(stream) => {
                    return Ok(Self {
                        stream,
                        engine,
                        plaintext: Vec::new(),
                        peer: address,
                        closed: false,
                    });
                }
                Err(error) => last_error = Some(error),
            }
        }
        Err(SonarError::Connect {
            endpoint: endpoint.to_string(),
            source: last_error
                .unwrap_or_else(|| io::Error::new(ErrorKind::AddrNotAvailable, "no addresses")),
        })
    }

    pub(crate) const fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Reads whatever the socket holds and decrypts it.
    pub(crate) fn read_available(&mut self) -> Result<ReadOutcome, SonarError> {
        let mut outcome = ReadOutcome::default();
        if self.closed {
            return Ok(outcome);
        }
        let before = self.plaintext.len();
        loop {
            match self.engine.read_tls(&mut self.stream) {
                Ok(0) => {
                    outcome.closed = true;
                    break;
                }
                // The engine buffers a bounded amount of ciphertext, so each
                // read is decrypted before the next one.
                Ok(_) => outcome.closed |= self.engine.process_packets(&mut self.plaintext)?,
                Err(error) if error.kind() == ErrorKind::WouldBlock => break,
                Err(error) if error.kind() == ErrorKind::Interrupted => {}
                Err(error) => return Err(SonarError::io("failed to read from server", error)),
            }
        }
        outcome.closed |= self.engine.process_packets(&mut self.plaintext)?;
        outcome.plaintext = self.plaintext.len() > before;
        Ok(outcome)
    }

    /// Writes pending ciphertext until the socket would block.
    ///
    /// Returns `true` when any bytes were written.
    pub(crate) fn write_pending(&mut self) -> Result<bool, SonarError> {
        let mut wrote = false;
        while !self.closed && self.engine.wants_write() {
            match self.engine.write_tls(&mut self.stream) {
                Ok(0) => break,
                Ok(_) => wrote = true,
                Err(error) if error.kind() == ErrorKind::WouldBlock => break,
                Err(error) if error.kind() == ErrorKind::Interrupted => {}
                Err(error) => return Err(SonarError::io("failed to write to server", error)),
            }
        }
        Ok(wrote)
    }

    pub(crate) fn wants_write(&self) -> bool {
        !self.closed && self.engine.wants_write()
    }

    /// Queues an encoded frame for the engine.
    pub(crate) fn queue(&mut self, frame: &[u8]) -> Result<(), SonarError> {
        if self.closed {
            return Err(SonarError::Disconnected);
        }
        self.engine
            .write_plaintext(frame)
            .map_err(|error| SonarError::io("failed to queue outbound data", error))
    }

    pub(crate) fn take_plaintext(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.plaintext)
    }

    /// Sends close-notify on a best-effort basis and shuts the socket down.
    ///
    /// Returns `false` when the transport was already closed.
    pub(crate) fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.engine.close();
        // Best effort: the peer may already be gone.
        let _ = self.write_pending();
        self.closed = true;
        let _ = self.stream.shutdown(Shutdown::Both);
        true
    }
}

fn resolve(endpoint: &ServerEndpoint) -> Result<Vec<SocketAddr>, SonarError> {
    let addresses: Vec<SocketAddr> = (endpoint.host(), endpoint.port())
        .to_socket_addrs()
        .map_err(|source| SonarError::Resolve {
            endpoint: endpoint.to_string(),
            source,
        })?
        .collect();
    if addresses.is_empty() {
        return Err(SonarError::ResolveEmpty {
            endpoint: endpoint.to_string(),
        });
    }
    Ok(addresses)
}

fn open_socket(address: SocketAddr) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))?;
    socket.connect_timeout(&SockAddr::from(address), CONNECTION_TIMEOUT)?;
    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    use rstest::rstest;
    use rustls::pki_types::pem::PemObject;
    use rustls::pki_types::{CertificateDer, PrivateKeyDer};
    use rustls::{ServerConfig, ServerConnection, StreamOwned};
    use sonar_config::Config;

    use super::*;
    use crate::conduit::tls::{self, PlaintextEngine, RustlsEngine};
    use crate::errors::TlsError;

    const WAIT: Duration = Duration::from_secs(5);
    const LOCALHOST_CERT: &[u8] = include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/localhost.pem"
    ));
    const LOCALHOST_KEY: &[u8] = include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/localhost.key"
    ));

    /// Refuses a second read until the first one has been processed.
    #[derive(Default)]
    struct SingleRecordEngine {
        inner: PlaintextEngine,
        buffered: bool,
    }

    impl TlsEngine for SingleRecordEngine {
        fn read_tls(&mut self, source: &mut dyn Read) -> io::Result<usize> {
            if self.buffered {
                return Err(io::Error::new(ErrorKind::InvalidData, "message buffer full"));
            }
            let count = self.inner.read_tls(source)?;
            self.buffered = count > 0;
            Ok(count)
        }

        fn process_packets(&mut self, plaintext: &mut Vec<u8>) -> Result<bool, TlsError> {
            self.buffered = false;
            self.inner.process_packets(plaintext)
        }

        fn write_plaintext(&mut self, data: &[u8]) -> io::Result<()> {
            self.inner.write_plaintext(data)
        }

        fn wants_write(&self) -> bool {
            self.inner.wants_write()
        }

        fn write_tls(&mut self, sink: &mut dyn Write) -> io::Result<usize> {
            self.inner.write_tls(sink)
        }

        fn close(&mut self) {
            self.inner.close();
        }
    }

    fn local_pair() -> (Transport, TcpStream) {
        connected_with(Box::new(PlaintextEngine::new()))
    }

    fn connected_with(engine: Box<dyn TlsEngine>) -> (Transport, TcpStream) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let endpoint = ServerEndpoint::new("127.0.0.1", port);
        let transport = Transport::connect(&endpoint, engine).expect("connect");
        let (server, _) = listener.accept().expect("accept");
        (transport, server)
    }

    /// Frames repeated until `len` bytes.
    fn burst(len: usize) -> Vec<u8> {
        b"o\x1fwidget/w1\x1e".iter().copied().cycle().take(len).collect()
    }

    /// Reads until `expected` plaintext bytes arrived; every read must succeed.
    fn drain(transport: &mut Transport, expected: usize) -> Vec<u8> {
        let deadline = Instant::now() + WAIT;
        let mut received = Vec::new();
        while received.len() < expected {
            assert!(Instant::now() < deadline, "only {} bytes arrived", received.len());
            transport.read_available().expect("read");
            received.extend(transport.take_plaintext());
            thread::sleep(Duration::from_millis(5));
        }
        received
    }

    fn localhost_server_config() -> Arc<ServerConfig> {
        let certificates = CertificateDer::pem_slice_iter(LOCALHOST_CERT)
            .collect::<Result<Vec<_>, _>>()
            .expect("certificate");
        let key = PrivateKeyDer::from_pem_slice(LOCALHOST_KEY).expect("key");
        let config =
            ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
                .with_safe_default_protocol_versions()
                .expect("protocol versions")
                .with_no_client_auth()
                .with_single_cert(certificates, key)
                .expect("server config");
        Arc::new(config)
    }

    fn insecure_engine() -> Box<dyn TlsEngine> {
        let config = Config {
            tls_insecure: true,
            ..Config::default()
        };
        let client = tls::client_config(&config).expect("client config");
        Box::new(RustlsEngine::new(client, "localhost").expect("engine"))
    }

    fn read_until(transport: &mut Transport, predicate: impl Fn(&ReadOutcome) -> bool) -> ReadOutcome {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let outcome = transport.read_available().expect("read");
            if predicate(&outcome) || Instant::now() > deadline {
                return outcome;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[rstest]
    fn refused_connections_report_the_endpoint() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        let endpoint = ServerEndpoint::new("127.0.0.1", port);
        let Err(error) = Transport::connect(&endpoint, Box::new(PlaintextEngine::new())) else {
            panic!("connection to a closed port should fail");
        };
        assert!(error.to_string().contains(&format!("127.0.0.1:{port}")));
    }

    #[rstest]
    fn frames_flow_both_ways() {
        let (mut transport, mut server) = local_pair();
        transport.queue(b"e\x1fwidget\x1e").expect("queue");
        assert!(transport.wants_write());
        assert!(transport.write_pending().expect("write"));

        let mut received = [0_u8; 9];
        server.read_exact(&mut received).expect("server read");
        assert_eq!(&received, b"e\x1fwidget\x1e");

        server.write_all(b"t\x1e").expect("server write");
        let outcome = read_until(&mut transport, |outcome| outcome.plaintext);
        assert!(outcome.plaintext);
        assert_eq!(transport.take_plaintext(), b"t\x1e");
    }

    #[rstest]
    fn peer_shutdown_is_observed() {
        let (mut transport, server) = local_pair();
        drop(server);
        let outcome = read_until(&mut transport, |outcome| outcome.closed);
        assert!(outcome.closed);
    }

    #[rstest]
    fn closed_transport_refuses_frames() {
        let (mut transport, _server) = local_pair();
        assert!(transport.close());
        assert!(!transport.close());
        assert!(matches!(transport.queue(b"q\x1e"), Err(SonarError::Disconnected)));
        assert!(!transport.wants_write());
    }

    #[rstest]
    fn large_bursts_are_decrypted_between_reads() {
        let (mut transport, mut server) = connected_with(Box::new(SingleRecordEngine::default()));
        let payload = burst(40 * 1024);
        server.write_all(&payload).expect("server write");
        assert_eq!(drain(&mut transport, payload.len()), payload);
    }

    #[rstest]
    fn tls_bursts_beyond_the_record_buffer_are_read() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let payload = burst(80 * 1024);
        let (handshaken_tx, handshaken) = mpsc::channel();
        let (go, go_rx) = mpsc::channel::<()>();
        let (written_tx, written) = mpsc::channel();
        let server_payload = payload.clone();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().expect("accept");
            let mut connection =
                ServerConnection::new(localhost_server_config()).expect("server session");
            while connection.is_handshaking() {
                connection.complete_io(&mut socket).expect("server handshake");
            }
            handshaken_tx.send(()).expect("signal handshake");
            go_rx.recv().expect("go");
            let mut stream = StreamOwned::new(connection, socket);
            stream.write_all(&server_payload).expect("server write");
            stream.flush().expect("server flush");
            written_tx.send(()).expect("signal written");
            // Holds the connection open until the client hangs up.
            let _ = go_rx.recv();
        });

        let endpoint = ServerEndpoint::new("127.0.0.1", port);
        let mut transport = Transport::connect(&endpoint, insecure_engine()).expect("connect");
        let deadline = Instant::now() + WAIT;
        while handshaken.try_recv().is_err() {
            assert!(Instant::now() < deadline, "handshake never finished");
            transport.write_pending().expect("handshake write");
            transport.read_available().expect("handshake read");
            thread::sleep(Duration::from_millis(5));
        }
        transport.write_pending().expect("handshake write");

        go.send(()).expect("go");
        // Once socket buffers fill the server blocks; the first read then
        // sees whatever the kernel already holds.
        let _ = written.recv_timeout(Duration::from_secs(1));
        let first = transport.read_available().expect("single read of the burst");
        assert!(first.plaintext);
        assert_eq!(drain(&mut transport, payload.len()), payload);

        drop(go);
        transport.close();
        server.join().expect("server thread");
    }
}
