//! Upstream mail-store connection
//!
//! TLS connection to the real IMAP server, verified against the system
//! trust store at TLS >= 1.2. An explicit override accepts unverified
//! upstreams and logs a warning.

use crate::error::{ProxyError, ProxyResult};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle read timeout on the upstream socket.
pub const UPSTREAM_READ_TIMEOUT: Duration = Duration::from_secs(600);

/// TLS connection to an upstream IMAP server.
pub struct UpstreamConnection {
    reader: BufReader<ReadHalf<TlsStream<TcpStream>>>,
    writer: WriteHalf<TlsStream<TcpStream>>,
    host: String,
    port: u16,
}

impl UpstreamConnection {
    /// Connect, complete the TLS handshake, and consume the greeting.
    pub async fn connect(host: &str, port: u16, allow_unverified: bool) -> ProxyResult<Self> {
        let config = client_config(allow_unverified)?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| ProxyError::Tls(format!("invalid server name {}", host)))?;

        let tcp = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ProxyError::UpstreamUnreachable(format!("{}:{} connect timeout", host, port)))?
            .map_err(|e| ProxyError::UpstreamUnreachable(format!("{}:{}: {}", host, port, e)))?;

        let connector = TlsConnector::from(Arc::new(config));
        let stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| ProxyError::Tls(e.to_string()))?;

        let (read_half, writer) = tokio::io::split(stream);
        let mut connection = Self {
            reader: BufReader::new(read_half),
            writer,
            host: host.to_string(),
            port,
        };

        let greeting = connection.read_line(CONNECT_TIMEOUT).await?;
        tracing::info!(
            host = %connection.host,
            port = connection.port,
            greeting = %greeting.trim_end().chars().take(100).collect::<String>(),
            "upstream.connected"
        );
        Ok(connection)
    }

    /// Send one command line, appending CRLF.
    pub async fn send_line(&mut self, line: &str) -> ProxyResult<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read one response line. Lines are ASCII per the protocol; anything
    /// else is a malformed response.
    pub async fn read_line(&mut self, timeout: Duration) -> ProxyResult<String> {
        let mut line = String::new();
        let read = tokio::time::timeout(timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| ProxyError::Timeout)?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::InvalidData {
                    ProxyError::ProtocolMalformed("non-UTF-8 response line".into())
                } else {
                    ProxyError::Io(e)
                }
            })?;
        if read == 0 {
            return Err(ProxyError::UpstreamUnreachable("connection closed".into()));
        }
        Ok(line)
    }

    /// Read response lines until the tagged completion for `tag` arrives.
    pub async fn read_tagged_response(
        &mut self,
        tag: &str,
        timeout: Duration,
    ) -> ProxyResult<Vec<String>> {
        let mut lines = Vec::new();
        let completion = format!("{} ", tag);
        loop {
            let line = self.read_line(timeout).await?;
            let done = line.starts_with(&completion);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    /// Read a raw chunk into `buf` with the upstream idle timeout.
    /// Returns 0 at EOF.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> ProxyResult<usize> {
        let read = tokio::time::timeout(UPSTREAM_READ_TIMEOUT, self.reader.read(buf))
            .await
            .map_err(|_| ProxyError::Timeout)??;
        Ok(read)
    }

    /// Close the upstream connection.
    pub async fn shutdown(&mut self) {
        let _ = self.writer.shutdown().await;
        tracing::debug!(host = %self.host, port = self.port, "upstream.closed");
    }

    /// Split into independent read and write halves for the duplex relay.
    pub fn into_split(self) -> (UpstreamReadHalf, UpstreamWriteHalf) {
        (
            UpstreamReadHalf {
                reader: self.reader,
            },
            UpstreamWriteHalf {
                writer: self.writer,
            },
        )
    }
}

/// Read half of a split upstream connection.
pub struct UpstreamReadHalf {
    reader: BufReader<ReadHalf<TlsStream<TcpStream>>>,
}

impl UpstreamReadHalf {
    /// Read a raw chunk with the upstream idle timeout. Returns 0 at EOF.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> ProxyResult<usize> {
        let read = tokio::time::timeout(UPSTREAM_READ_TIMEOUT, self.reader.read(buf))
            .await
            .map_err(|_| ProxyError::Timeout)??;
        Ok(read)
    }
}

/// Write half of a split upstream connection.
pub struct UpstreamWriteHalf {
    writer: WriteHalf<TlsStream<TcpStream>>,
}

impl UpstreamWriteHalf {
    /// Relay raw client bytes upstream.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> ProxyResult<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Close the upstream connection.
    pub async fn shutdown(&mut self) {
        let _ = self.writer.shutdown().await;
    }
}

fn client_config(allow_unverified: bool) -> ProxyResult<rustls::ClientConfig> {
    if allow_unverified {
        tracing::warn!("upstream TLS verification DISABLED by configuration");
        let config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification::new()))
            .with_no_client_auth();
        return Ok(config);
    }

    let mut roots = rustls::RootCertStore::empty();
    let certs = rustls_native_certs::load_native_certs()
        .map_err(|e| ProxyError::Tls(format!("system trust store: {}", e)))?;
    for cert in certs {
        // Individually malformed anchors are skipped, not fatal.
        let _ = roots.add(cert);
    }
    if roots.is_empty() {
        return Err(ProxyError::Tls("system trust store is empty".into()));
    }

    Ok(rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

/// Certificate verifier that accepts anything. Only reachable through the
/// explicit UPSTREAM_ALLOW_UNVERIFIED_TLS override.
#[derive(Debug)]
struct NoVerification {
    provider: rustls::crypto::CryptoProvider,
}

impl NoVerification {
    fn new() -> Self {
        Self {
            provider: rustls::crypto::ring::default_provider(),
        }
    }
}

impl ServerCertVerifier for NoVerification {
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
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
