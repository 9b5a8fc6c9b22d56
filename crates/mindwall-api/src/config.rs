//! Environment-driven settings for the analysis API

use mindwall_common::AlertThresholds;
use std::env;

/// API process settings, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen_addr: String,
    pub api_secret_key: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ollama_timeout_seconds: u64,
    pub log_level: String,
    pub workers: usize,
    pub thresholds: AlertThresholds,
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

impl Settings {
    /// Load settings from the environment, defaulting anything unset.
    pub fn from_env() -> Self {
        Self {
            listen_addr: var_or("MINDWALL_API_LISTEN", "0.0.0.0:8000"),
            api_secret_key: var_or("MINDWALL_API_SECRET_KEY", "changeme"),
            ollama_base_url: var_or("OLLAMA_BASE_URL", "http://ollama:11434"),
            ollama_model: var_or("OLLAMA_MODEL", "mindwall-llama3.1-8b"),
            ollama_timeout_seconds: parse_or("OLLAMA_TIMEOUT_SECONDS", 30),
            log_level: var_or("LOG_LEVEL", "info"),
            workers: parse_or("WORKERS", 4),
            thresholds: AlertThresholds {
                medium: parse_or("ALERT_MEDIUM_THRESHOLD", 35.0),
                high: parse_or("ALERT_HIGH_THRESHOLD", 60.0),
                critical: parse_or("ALERT_CRITICAL_THRESHOLD", 80.0),
            },
        }
    }
}
