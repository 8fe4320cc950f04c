//! TLS record-layer engines.
//!
//! The conduit never touches rustls directly. It feeds socket bytes into a
//! [`TlsEngine`] and drains ciphertext back out, so tests and cleartext
//! endpoints can substitute [`PlaintextEngine`].

use std::fs;
use std::io::{self, Read, Write};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{self, CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore, SignatureScheme};
use sonar_config::Config;
use tracing::{debug, warn};

use crate::errors::TlsError;

const TLS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::tls");

const READ_CHUNK: usize = 16 * 1024;

/// Record-layer engine between the socket and the plaintext protocol.
pub trait TlsEngine: Send {
    /// Reads ciphertext from `source` into the engine.
    ///
    /// # Errors
    ///
    /// Propagates socket errors, including `WouldBlock`.
    fn read_tls(&mut self, source: &mut dyn Read) -> io::Result<usize>;

    /// Decrypts buffered records and appends the plaintext to `plaintext`.
    ///
    /// Returns `true` once the peer has closed the TLS session.
    ///
    /// # Errors
    ///
    /// Returns [`TlsError`] when the records are invalid.
    fn process_packets(&mut self, plaintext: &mut Vec<u8>) -> Result<bool, TlsError>;

    /// Queues plaintext for encryption.
    ///
    /// # Errors
    ///
    /// Fails when the engine cannot accept more data.
    fn write_plaintext(&mut self, data: &[u8]) -> io::Result<()>;

    /// Returns `true` while ciphertext is waiting to be written.
    fn wants_write(&self) -> bool;

    /// Writes pending ciphertext into `sink`.
    ///
    /// # Errors
    ///
    /// Propagates socket errors, including `WouldBlock`.
    fn write_tls(&mut self, sink: &mut dyn Write) -> io::Result<usize>;

    /// Starts an orderly shutdown of the session.
    fn close(&mut self);
}

/// rustls-backed client engine.
pub struct RustlsEngine {
    connection: ClientConnection,
}

impl RustlsEngine {
    /// Starts a client session for `host`.
    ///
    /// # Errors
    ///
    /// Returns [`TlsError::ServerName`] when `host` is not a valid server
    /// name, or [`TlsError::Rustls`] when rustls rejects the session.
    pub fn new(config: Arc<ClientConfig>, host: &str) -> Result<Self, TlsError> {
        let server_name =
            ServerName::try_from(host.to_owned()).map_err(|_| TlsError::ServerName {
                host: host.to_owned(),
            })?;
        let connection = ClientConnection::new(config, server_name)?;
        Ok(Self { connection })
    }

    /// Builds an engine from client configuration.
    ///
    /// # Errors
    ///
    /// See [`client_config`] and [`RustlsEngine::new`].
    pub fn from_config(config: &Config) -> Result<Self, TlsError> {
        Self::new(client_config(config)?, config.server().host())
    }
}

impl TlsEngine for RustlsEngine {
    fn read_tls(&mut self, source: &mut dyn Read) -> io::Result<usize> {
        self.connection.read_tls(source)
    }

    fn process_packets(&mut self, plaintext: &mut Vec<u8>) -> Result<bool, TlsError> {
        let state = self.connection.process_new_packets()?;
        let available = state.plaintext_bytes_to_read();
        if available > 0 {
            let start = plaintext.len();
            plaintext.resize(start + available, 0);
            let read = self
                .connection
                .reader()
                .read(plaintext.get_mut(start..).unwrap_or_default());
            match read {
                Ok(count) => plaintext.truncate(start + count),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    plaintext.truncate(start);
                }
                Err(error) => {
                    plaintext.truncate(start);
                    return Err(TlsError::Record(error));
                }
            }
        }
        Ok(state.peer_has_closed())
    }

    fn write_plaintext(&mut self, data: &[u8]) -> io::Result<()> {
        self.connection.writer().write_all(data)
    }

    fn wants_write(&self) -> bool {
        self.connection.wants_write()
    }

    fn write_tls(&mut self, sink: &mut dyn Write) -> io::Result<usize> {
        self.connection.write_tls(sink)
    }

    fn close(&mut self) {
        self.connection.send_close_notify();
    }
}

/// Pass-through engine for cleartext endpoints and tests.
#[derive(Debug, Default)]
pub struct PlaintextEngine {
    inbound: Vec<u8>,
    outbound: Vec<u8>,
    peer_closed: bool,
}

impl PlaintextEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TlsEngine for PlaintextEngine {
    fn read_tls(&mut self, source: &mut dyn Read) -> io::Result<usize> {
        let mut chunk = [0_u8; READ_CHUNK];
        let count = source.read(&mut chunk)?;
        if count == 0 {
            self.peer_closed = true;
        }
        self.inbound.extend_from_slice(chunk.get(..count).unwrap_or_default());
        Ok(count)
    }

    fn process_packets(&mut self, plaintext: &mut Vec<u8>) -> Result<bool, TlsError> {
        plaintext.append(&mut self.inbound);
        Ok(self.peer_closed)
    }

    fn write_plaintext(&mut self, data: &[u8]) -> io::Result<()> {
        self.outbound.extend_from_slice(data);
        Ok(())
    }

    fn wants_write(&self) -> bool {
        !self.outbound.is_empty()
    }

    fn write_tls(&mut self, sink: &mut dyn Write) -> io::Result<usize> {
        let count = sink.write(&self.outbound)?;
        self.outbound.drain(..count);
        Ok(count)
    }

    fn close(&mut self) {}
}

/// Builds a rustls client configuration from SONAR settings.
///
/// A configured CA bundle takes precedence. Without one, `tls_insecure`
/// disables certificate verification.
///
/// # Errors
///
/// Returns [`TlsError`] when the bundle cannot be read or holds no
/// certificates, or when neither trust source is configured.
pub fn client_config(config: &Config) -> Result<Arc<ClientConfig>, TlsError> {
    let provider = Arc::new(crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?;

    let client = if let Some(path) = config.tls_ca_path() {
        let roots = load_trust_anchors(path.as_str())?;
        builder.with_root_certificates(roots).with_no_client_auth()
    } else if config.tls_insecure() {
        warn!(target: TLS_TARGET, "server certificate verification is disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate::new(&provider)))
            .with_no_client_auth()
    } else {
        return Err(TlsError::MissingTrust);
    };
    Ok(Arc::new(client))
}

fn load_trust_anchors(path: &str) -> Result<RootCertStore, TlsError> {
    let pem = fs::read(path).map_err(|source| TlsError::ReadTrustAnchors {
        path: path.to_owned(),
        source,
    })?;
    let mut roots = RootCertStore::empty();
    for certificate in CertificateDer::pem_slice_iter(&pem) {
        let certificate =
            certificate.map_err(|error| TlsError::Certificate(error.to_string()))?;
        roots
            .add(certificate)
            .map_err(|error| TlsError::Certificate(error.to_string()))?;
    }
    if roots.is_empty() {
        return Err(TlsError::NoCertificates {
            path: path.to_owned(),
        });
    }
    debug!(target: TLS_TARGET, path, anchors = roots.len(), "loaded trust anchors");
    Ok(roots)
}

/// Verifier that accepts any certificate but still checks handshake
/// signatures.
#[derive(Debug)]
struct AcceptAnyCertificate {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyCertificate {
    fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use camino::Utf8PathBuf;
    use rstest::rstest;

    use super::*;

    fn config_with(ca: Option<Utf8PathBuf>, insecure: bool) -> Config {
        Config {
            tls_ca_path: ca,
            tls_insecure: insecure,
            ..Config::default()
        }
    }

    #[rstest]
    fn missing_trust_is_rejected() {
        let result = client_config(&config_with(None, false));
        assert!(matches!(result, Err(TlsError::MissingTrust)));
    }

    #[rstest]
    fn insecure_mode_builds_a_session() {
        let config = config_with(None, true);
        let engine = RustlsEngine::from_config(&config).expect("engine");
        assert!(engine.wants_write(), "client hello should be queued");
    }

    #[rstest]
    fn unreadable_bundle_is_reported() {
        let config = config_with(Some(Utf8PathBuf::from("/nonexistent/ca.pem")), false);
        let result = client_config(&config);
        assert!(matches!(result, Err(TlsError::ReadTrustAnchors { .. })));
    }

    #[rstest]
    fn bundle_without_certificates_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ca.pem");
        fs::write(&path, "not a certificate\n").expect("write bundle");
        let path = Utf8PathBuf::from_path_buf(path).expect("utf8 path");
        let result = client_config(&config_with(Some(path), false));
        assert!(matches!(result, Err(TlsError::NoCertificates { .. })));
    }

    #[rstest]
    fn invalid_server_name_is_rejected() {
        let config = client_config(&config_with(None, true)).expect("config");
        let result = RustlsEngine::new(config, "bad host name");
        assert!(matches!(result, Err(TlsError::ServerName { .. })));
    }

    #[rstest]
    fn plaintext_engine_passes_bytes_through() {
        let mut engine = PlaintextEngine::new();
        let mut source = Cursor::new(b"o\x1fwidget/w1\x1e".to_vec());
        assert_eq!(engine.read_tls(&mut source).expect("read"), 12);

        let mut plaintext = Vec::new();
        let closed = engine.process_packets(&mut plaintext).expect("process");
        assert!(!closed);
        assert_eq!(plaintext, b"o\x1fwidget/w1\x1e");

        engine.write_plaintext(b"q\x1e").expect("queue");
        assert!(engine.wants_write());
        let mut sink = Vec::new();
        engine.write_tls(&mut sink).expect("write");
        assert_eq!(sink, b"q\x1e");
        assert!(!engine.wants_write());
    }

    #[rstest]
    fn plaintext_engine_reports_end_of_stream() {
        let mut engine = PlaintextEngine::new();
        let mut source = Cursor::new(Vec::new());
        assert_eq!(engine.read_tls(&mut source).expect("read"), 0);
        let mut plaintext = Vec::new();
        assert!(engine.process_packets(&mut plaintext).expect("process"));
    }
}
