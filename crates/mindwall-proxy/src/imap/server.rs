//! IMAP proxy server
//!
//! Accepts mail-client connections, brokers authentication against the
//! upstream store chosen with `XMINDWALL <host> <port>`, then becomes a
//! bidirectional relay. The upstream-to-client direction runs through the
//! FETCH interceptor; a stalled analysis never stalls the relay.

use crate::client::{AnalysisClient, AnalysisSubmission};
use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::imap::interceptor::{
    emit_fetch, AnnotationMode, CapturedBody, FetchInterceptor, InterceptEvent,
};
use crate::imap::upstream::{UpstreamConnection, UpstreamReadHalf, UpstreamWriteHalf};
use crate::mime::extractor::MessageExtractor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

/// Idle read timeout on the client socket.
const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for each upstream line during the authentication exchange.
const LOGIN_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

const GREETING: &[u8] = b"* OK [CAPABILITY IMAP4rev1] MindWall IMAP Proxy Ready\r\n";
const CAPABILITIES: &[u8] = b"* CAPABILITY IMAP4rev1 AUTH=PLAIN LOGIN STARTTLS\r\n";

/// The MindWall IMAP proxy.
pub struct ImapProxyServer {
    config: Arc<ProxyConfig>,
    analysis: Arc<AnalysisClient>,
}

impl ImapProxyServer {
    pub fn new(config: ProxyConfig, analysis: Arc<AnalysisClient>) -> Self {
        Self {
            config: Arc::new(config),
            analysis,
        }
    }

    /// Bind and serve forever. Each accepted client is an independent task.
    pub async fn run(&self) -> ProxyResult<()> {
        let addr = format!(
            "{}:{}",
            self.config.imap_listen_host, self.config.imap_listen_port
        );
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "imap.server_started");

        loop {
            let (socket, peer) = listener.accept().await?;
            let config = self.config.clone();
            let analysis = self.analysis.clone();
            tokio::spawn(async move {
                tracing::info!(%peer, "imap.client_connected");
                if let Err(e) = handle_session(socket, peer, config, analysis).await {
                    tracing::warn!(%peer, error = %e, "imap.session_error");
                }
                tracing::info!(%peer, "imap.client_disconnected");
            });
        }
    }
}

async fn handle_session(
    socket: TcpStream,
    peer: SocketAddr,
    config: Arc<ProxyConfig>,
    analysis: Arc<AnalysisClient>,
) -> ProxyResult<()> {
    let (read_half, mut writer) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    writer.write_all(GREETING).await?;
    writer.flush().await?;

    let mut upstream_endpoint: Option<(String, u16)> = None;

    loop {
        let mut line = String::new();
        let read = tokio::time::timeout(CLIENT_READ_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| ProxyError::Timeout)??;
        if read == 0 {
            return Ok(());
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        tracing::debug!(%peer, command = %truncate(trimmed, 100), "imap.client_command");

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.len() < 2 {
            writer.write_all(b"* BAD Invalid command\r\n").await?;
            writer.flush().await?;
            continue;
        }
        let tag = parts[0];
        let command = parts[1].to_ascii_uppercase();

        match command.as_str() {
            "CAPABILITY" => {
                writer.write_all(CAPABILITIES).await?;
                writer
                    .write_all(format!("{} OK CAPABILITY completed\r\n", tag).as_bytes())
                    .await?;
                writer.flush().await?;
            }

            // Pre-auth extension: XMINDWALL <host> <port> selects the
            // upstream store for this session.
            "XMINDWALL" => {
                match (parts.get(2), parts.get(3).and_then(|p| p.parse::<u16>().ok())) {
                    (Some(host), Some(port)) => {
                        upstream_endpoint = Some((host.to_string(), port));
                        writer
                            .write_all(format!("{} OK Upstream set\r\n", tag).as_bytes())
                            .await?;
                    }
                    _ => {
                        writer
                            .write_all(
                                format!("{} BAD Usage: XMINDWALL host port\r\n", tag).as_bytes(),
                            )
                            .await?;
                    }
                }
                writer.flush().await?;
            }

            "STARTTLS" => {
                writer
                    .write_all(
                        format!(
                            "{} NO STARTTLS not supported on proxy (TLS is terminated upstream)\r\n",
                            tag
                        )
                        .as_bytes(),
                    )
                    .await?;
                writer.flush().await?;
            }

            "LOGIN" | "AUTHENTICATE" => {
                let Some((host, port)) = upstream_endpoint.clone() else {
                    writer
                        .write_all(
                            format!(
                                "{} NO Upstream server not configured. Use XMINDWALL <host> <port> first.\r\n",
                                tag
                            )
                            .as_bytes(),
                        )
                        .await?;
                    writer.flush().await?;
                    continue;
                };

                let mut upstream = match UpstreamConnection::connect(
                    &host,
                    port,
                    config.allow_unverified_tls,
                )
                .await
                {
                    Ok(upstream) => upstream,
                    Err(e) => {
                        tracing::warn!(%peer, error = %e, "imap.upstream_connect_failed");
                        writer
                            .write_all(
                                format!("{} NO Upstream connection failed\r\n", tag).as_bytes(),
                            )
                            .await?;
                        writer.flush().await?;
                        continue;
                    }
                };

                let authenticated =
                    login_exchange(&mut reader, &mut writer, &mut upstream, tag, trimmed).await?;

                if authenticated {
                    tracing::info!(%peer, upstream = %host, "imap.authenticated");
                    return pipe(reader, writer, upstream, config, analysis, peer).await;
                }
                upstream.shutdown().await;
            }

            "LOGOUT" => {
                writer
                    .write_all(b"* BYE MindWall IMAP Proxy logging out\r\n")
                    .await?;
                writer
                    .write_all(format!("{} OK LOGOUT completed\r\n", tag).as_bytes())
                    .await?;
                writer.flush().await?;
                return Ok(());
            }

            _ => {
                writer
                    .write_all(format!("{} BAD Not authenticated\r\n", tag).as_bytes())
                    .await?;
                writer.flush().await?;
            }
        }
    }
}

/// Forward an authentication command and relay the upstream exchange,
/// including `+` continuation rounds, until the tagged completion.
/// Returns whether the upstream accepted.
async fn login_exchange(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    upstream: &mut UpstreamConnection,
    tag: &str,
    command_line: &str,
) -> ProxyResult<bool> {
    upstream.send_line(command_line).await?;
    let completion = format!("{} ", tag);

    loop {
        let line = upstream.read_line(LOGIN_RESPONSE_TIMEOUT).await?;

        if line.starts_with('+') {
            // Continuation: hand it to the client and relay its answer.
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await?;
            let mut answer = String::new();
            let read = tokio::time::timeout(CLIENT_READ_TIMEOUT, reader.read_line(&mut answer))
                .await
                .map_err(|_| ProxyError::Timeout)??;
            if read == 0 {
                return Ok(false);
            }
            upstream
                .send_line(answer.trim_end_matches(['\r', '\n']))
                .await?;
            continue;
        }

        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        if line.starts_with(&completion) {
            let ok = line[completion.len()..].trim_start().starts_with("OK");
            return Ok(ok);
        }
    }
}

/// Full-duplex relay. The client-to-upstream pump is pure passthrough; the
/// upstream-to-client pump feeds every byte through the FETCH interceptor.
async fn pipe(
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    upstream: UpstreamConnection,
    config: Arc<ProxyConfig>,
    analysis: Arc<AnalysisClient>,
    peer: SocketAddr,
) -> ProxyResult<()> {
    let (upstream_reader, upstream_writer) = upstream.into_split();

    let mut client_to_upstream =
        tokio::spawn(forward_client_commands(reader, upstream_writer, peer));
    let mut upstream_to_client = tokio::spawn(forward_upstream_responses(
        upstream_reader,
        writer,
        config,
        analysis,
        peer,
    ));

    tokio::select! {
        _ = &mut client_to_upstream => upstream_to_client.abort(),
        _ = &mut upstream_to_client => client_to_upstream.abort(),
    }
    Ok(())
}

async fn forward_client_commands(
    mut reader: BufReader<OwnedReadHalf>,
    mut upstream: UpstreamWriteHalf,
    peer: SocketAddr,
) {
    let mut buf = vec![0u8; 8 * 1024];
    loop {
        let read = match tokio::time::timeout(CLIENT_READ_TIMEOUT, reader.read(&mut buf)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => n,
            Ok(Err(_)) => break,
        };
        if upstream.write_raw(&buf[..read]).await.is_err() {
            break;
        }
    }
    upstream.shutdown().await;
    tracing::debug!(%peer, "imap.client_pump_closed");
}

async fn forward_upstream_responses(
    mut upstream: UpstreamReadHalf,
    mut writer: OwnedWriteHalf,
    config: Arc<ProxyConfig>,
    analysis: Arc<AnalysisClient>,
    peer: SocketAddr,
) {
    let mode = if config.annotation_wait_ms > 0 {
        AnnotationMode::HoldForVerdict
    } else {
        AnnotationMode::AnnotateNextFetch
    };
    let mut interceptor = FetchInterceptor::new(analysis.verdicts(), mode);
    let extractor = MessageExtractor::new();
    let wait = Duration::from_millis(config.annotation_wait_ms);

    let mut buf = vec![0u8; 8 * 1024];
    let mut out = Vec::with_capacity(16 * 1024);
    let mut events = Vec::new();

    loop {
        let read = match upstream.read_chunk(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };

        out.clear();
        events.clear();
        interceptor.process(&buf[..read], &mut out, &mut events);

        if !out.is_empty() && writer.write_all(&out).await.is_err() {
            return;
        }

        for event in events.drain(..) {
            match event {
                InterceptEvent::BodyCaptured(captured) => {
                    submit_capture(&analysis, &extractor, &captured);
                }
                InterceptEvent::HeldFetch { uid, line, body } => {
                    submit_capture(
                        &analysis,
                        &extractor,
                        &CapturedBody {
                            uid: uid.clone(),
                            bytes: body.clone(),
                        },
                    );
                    let verdict = analysis.await_verdict(&uid, wait).await;
                    let mut held = Vec::with_capacity(line.len() + body.len());
                    emit_fetch(&mut held, &line, &body, verdict.map(|v| v.severity));
                    if writer.write_all(&held).await.is_err() {
                        return;
                    }
                }
            }
        }
        if writer.flush().await.is_err() {
            return;
        }
    }

    // Upstream is gone: release anything buffered and say goodbye.
    out.clear();
    interceptor.flush(&mut out);
    let _ = writer.write_all(&out).await;
    let _ = writer
        .write_all(b"* BYE MindWall proxy: upstream connection closed\r\n")
        .await;
    let _ = writer.flush().await;
    tracing::debug!(%peer, "imap.upstream_pump_closed");
}

/// Extract and submit a captured body, unless it is too small or already
/// analyzed. Never blocks the relay.
fn submit_capture(
    analysis: &Arc<AnalysisClient>,
    extractor: &MessageExtractor,
    captured: &CapturedBody,
) {
    let extracted = extractor.extract(&captured.bytes);
    if !analysis.should_submit(&captured.uid, &extracted.text) {
        return;
    }
    AnalysisClient::submit_background(analysis, AnalysisSubmission {
        message_uid: captured.uid.clone(),
        recipient_email: extracted.recipient_email,
        sender_email: extracted.sender_email,
        sender_display_name: extracted.sender_display,
        subject: extracted.subject,
        body: extracted.text,
        channel: "imap",
        received_at: extracted.date,
    });
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
