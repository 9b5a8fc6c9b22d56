//! Proxy error types

use thiserror::Error;

/// Errors raised on the proxy path.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("read timed out")]
    Timeout,

    #[error("protocol malformed: {0}")]
    ProtocolMalformed(String),

    #[error("analysis API error: {0}")]
    Api(String),
}

/// Result type for the proxy.
pub type ProxyResult<T> = Result<T, ProxyError>;
