//! MindWall Analysis API
//!
//! Axum service exposing the analysis pipeline over REST plus a websocket
//! alert feed for dashboards.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use mindwall_analysis::memory::{
    MemoryAlertRepository, MemoryAnalysisRepository, MemoryBaselineRepository,
    MemoryEmployeeRepository,
};
use mindwall_analysis::{
    AlertHub, AnalysisPipeline, AnalysisRepository, BaselineEngine, EmployeeRepository,
    InferenceClient, OllamaClient,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod config;
mod error;
mod handlers;
mod request_id;
mod ws;

use config::Settings;

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub pipeline: Arc<AnalysisPipeline>,
    pub hub: Arc<AlertHub>,
    pub inference: Arc<dyn InferenceClient>,
    pub employee_repo: Arc<dyn EmployeeRepository>,
}

fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.workers)
        .enable_all()
        .build()?;
    runtime.block_on(run(settings))
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| settings.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let analysis_repo: Arc<dyn AnalysisRepository> = Arc::new(MemoryAnalysisRepository::new());
    let alert_repo = Arc::new(MemoryAlertRepository::new());
    let baseline_repo = Arc::new(MemoryBaselineRepository::new());
    let employee_repo: Arc<dyn EmployeeRepository> =
        Arc::new(MemoryEmployeeRepository::new(analysis_repo.clone()));

    let baseline_engine = Arc::new(BaselineEngine::new(baseline_repo));
    let (baseline_mailbox, baseline_updater) =
        BaselineEngine::spawn_updater(baseline_engine.clone());

    let hub = Arc::new(AlertHub::new());
    let inference: Arc<dyn InferenceClient> = Arc::new(OllamaClient::new(
        &settings.ollama_base_url,
        &settings.ollama_model,
        settings.ollama_timeout_seconds,
    ));

    if !inference.check_health().await {
        tracing::warn!(
            base_url = %settings.ollama_base_url,
            "inference service unreachable at startup; analyses will use the fallback path"
        );
    }

    let pipeline = Arc::new(AnalysisPipeline::new(
        inference.clone(),
        baseline_engine,
        baseline_mailbox,
        analysis_repo.clone(),
        alert_repo,
        hub.clone(),
        settings.thresholds,
    ));

    let state = AppState {
        settings: Arc::new(settings),
        pipeline,
        hub,
        inference,
        employee_repo,
    };

    let protected = Router::new()
        .route("/api/analyze", post(handlers::analyze))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/ws/alerts", get(ws::alerts_feed))
        .merge(protected)
        .layer(middleware::from_fn(request_id::propagate_request_id))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let listen_addr = state.settings.listen_addr.clone();
    tracing::info!(%listen_addr, "MindWall analysis API listening");

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    // Let in-flight baseline updates land before the process exits.
    drop(state);
    baseline_updater.shutdown(Duration::from_secs(5)).await;
    Ok(())
}
