//! REST handlers

use crate::error::ApiError;
use crate::AppState;
use axum::extract::State;
use axum::Json;
use mindwall_analysis::{AnalyzeRequest, AnalyzeResponse, EmployeeRepository, InferenceClient};
use serde_json::{json, Value};

/// POST /api/analyze - run the full pipeline on one message.
pub async fn analyze(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let errors = payload.validate();
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    // Make sure the protected recipient exists before analysis lands.
    state
        .employee_repo
        .get_or_create(&payload.recipient_email, None)
        .await?;

    let recipient = payload.recipient_email.clone();
    let result = state.pipeline.run(payload).await?;

    tracing::info!(
        analysis_id = result.analysis_id,
        score = result.manipulation_score,
        severity = %result.severity,
        processing_ms = result.processing_time_ms,
        "analyze.complete"
    );

    // Refresh the recipient's rolling 30-day risk profile off the request
    // path; the profile query recomputes and stores the score.
    let state_bg = state.clone();
    tokio::spawn(async move {
        match state_bg.employee_repo.risk_profile(&recipient).await {
            Ok((employee, _recent)) => {
                tracing::debug!(
                    recipient = %employee.email,
                    risk = employee.risk_score,
                    "employee.risk_refreshed"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, recipient, "employee.risk_refresh_failed");
            }
        }
    });

    Ok(Json(result))
}

/// GET /health - public liveness probe, reports inference reachability.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let inference_up = state.inference.check_health().await;
    Json(json!({
        "status": "ok",
        "inference_available": inference_up,
        "subscribers": state.hub.subscriber_count(),
    }))
}
