//! Environment-driven proxy configuration

use std::env;

/// Proxy process configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Base URL of the MindWall analysis API.
    pub api_base_url: String,
    /// Shared secret sent in X-MindWall-Key.
    pub api_secret_key: String,
    pub imap_listen_host: String,
    pub imap_listen_port: u16,
    /// Skip upstream certificate verification. Logged as a warning.
    pub allow_unverified_tls: bool,
    /// How long a FETCH response may be held awaiting a verdict before it
    /// is released unannotated. Zero selects annotate-on-next-fetch.
    pub annotation_wait_ms: u64,
    pub log_level: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ProxyConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            api_base_url: var_or("API_BASE_URL", "http://api:8000"),
            api_secret_key: var_or("API_SECRET_KEY", ""),
            imap_listen_host: var_or("IMAP_LISTEN_HOST", "0.0.0.0"),
            imap_listen_port: parse_or("IMAP_LISTEN_PORT", 1143),
            allow_unverified_tls: parse_or("UPSTREAM_ALLOW_UNVERIFIED_TLS", false),
            annotation_wait_ms: parse_or("ANNOTATION_WAIT_MS", 0),
            log_level: var_or("LOG_LEVEL", "info"),
        }
    }
}
