//! Inference service client
//!
//! Async HTTP client for the Ollama-style inference endpoint, plus strict
//! boundary validation of its dynamic JSON response. All coercion of the
//! model's output lives here; the rest of the pipeline works with a typed
//! `InferenceVerdict`.

use async_trait::async_trait;
use mindwall_common::{Dimension, DimensionScores, RecommendedAction};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors on the inference path. Every variant routes the pipeline to the
/// rule-based fallback.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("inference request timed out after {0}s")]
    Timeout(u64),

    #[error("inference transport error: {0}")]
    Transport(String),

    #[error("inference service returned HTTP {0}")]
    Status(u16),

    #[error("inference response was not valid JSON: {0}")]
    InvalidJson(String),

    #[error("inference response missing dimension_scores")]
    MissingDimensions,

    #[error("inference dimension {0} has a non-numeric score")]
    NonNumericScore(String),

    #[error("inference service returned an empty response")]
    Empty,
}

/// Validated verdict from the inference service.
#[derive(Debug, Clone)]
pub struct InferenceVerdict {
    pub dimension_scores: DimensionScores,
    pub primary_tactic: Dimension,
    pub explanation: String,
    pub recommended_action: RecommendedAction,
    pub confidence: u8,
    /// The raw response string as returned by the service, kept for the
    /// analysis record.
    pub raw_response: String,
}

/// Prompt-to-JSON inference service contract.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Run one analysis prompt and return the validated verdict.
    async fn analyze(&self, system_prompt: &str, user_prompt: &str)
        -> Result<InferenceVerdict, InferenceError>;

    /// Whether the service is reachable and has the model loaded.
    async fn check_health(&self) -> bool;
}

/// Parse and validate the model's JSON payload.
///
/// Rejects (-> fallback): invalid JSON, a missing `dimension_scores`
/// object, or any present score that is not a number. Tolerates (-> coerce):
/// missing individual dimensions (0), out-of-range values (clamped), and an
/// unknown `recommended_action` (degrades to verify).
pub fn validate_response(raw: &str) -> Result<InferenceVerdict, InferenceError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| InferenceError::InvalidJson(e.to_string()))?;

    let dims = value
        .get("dimension_scores")
        .and_then(Value::as_object)
        .ok_or(InferenceError::MissingDimensions)?;

    let mut scores = DimensionScores::zeroed();
    for dim in Dimension::ALL {
        match dims.get(dim.as_str()) {
            None | Some(Value::Null) => {}
            Some(v) => {
                let number = v
                    .as_f64()
                    .ok_or_else(|| InferenceError::NonNumericScore(dim.as_str().to_string()))?;
                scores.set(dim, number);
            }
        }
    }

    let primary_tactic = value
        .get("primary_tactic")
        .and_then(Value::as_str)
        .and_then(Dimension::from_str_opt)
        .unwrap_or_else(|| scores.primary_tactic());

    let explanation = value
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or("Analysis completed.")
        .to_string();

    let recommended_action = value
        .get("recommended_action")
        .and_then(Value::as_str)
        .map(RecommendedAction::parse_lenient)
        .unwrap_or(RecommendedAction::Proceed);

    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 100.0) as u8;

    Ok(InferenceVerdict {
        dimension_scores: scores,
        primary_tactic,
        explanation,
        recommended_action,
        confidence,
        raw_response: raw.to_string(),
    })
}

/// HTTP client for the Ollama generate API.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout_seconds: u64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    #[serde(default)]
    name: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout_seconds: u64) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout_seconds,
        }
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn analyze(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<InferenceVerdict, InferenceError> {
        let payload = serde_json::json!({
            "model": self.model,
            "prompt": user_prompt,
            "system": system_prompt,
            "stream": false,
            "format": "json",
            "options": {
                "temperature": 0.1,
                "top_p": 0.9,
                "num_predict": 1024,
                "repeat_penalty": 1.1,
            },
        });

        tracing::debug!(
            model = %self.model,
            prompt_length = user_prompt.len(),
            "inference.request"
        );

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout(self.timeout_seconds)
                } else {
                    InferenceError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(InferenceError::Status(status.as_u16()));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidJson(e.to_string()))?;

        if body.response.is_empty() {
            return Err(InferenceError::Empty);
        }

        tracing::debug!(
            model = %self.model,
            response_length = body.response.len(),
            eval_count = body.eval_count,
            "inference.response"
        );

        validate_response(&body.response)
    }

    async fn check_health(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                let model_loaded = response
                    .json::<TagsResponse>()
                    .await
                    .map(|tags| tags.models.iter().any(|m| m.name.contains(&self.model)))
                    .unwrap_or(false);
                tracing::info!(available = true, model_loaded, "inference.health");
                true
            }
            Ok(response) => {
                tracing::error!(status = %response.status(), "inference.health_failed");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "inference.health_failed");
                false
            }
        }
    }
}
