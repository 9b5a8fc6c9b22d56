//! MindWall IMAP Proxy
//!
//! Transparent interceptor on the mail-retrieval path: relays the IMAP
//! dialogue, captures FETCH message bodies, submits them for manipulation
//! analysis, and stamps risk badges into Subject lines.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod client;
mod config;
mod error;
mod imap;
mod mime;

use client::AnalysisClient;
use config::ProxyConfig;
use imap::server::ImapProxyServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ProxyConfig::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.api_secret_key.is_empty() {
        tracing::warn!("API_SECRET_KEY is empty; analysis submissions will be rejected");
    }

    let analysis = Arc::new(AnalysisClient::new(
        &config.api_base_url,
        &config.api_secret_key,
    ));

    let server = ImapProxyServer::new(config, analysis);
    server.run().await?;
    Ok(())
}
