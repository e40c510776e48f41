use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::config::Redacted;
use crate::errors::GatewayError;
use crate::jobs::{Acknowledgment, Admission, JobRequest, JobRunner, SubmitPayload};
use crate::util::secrets_match;

// ── State ─────────────────────────────────────────────────────────────

/// Shared application state for all handlers.
pub struct AppState {
    pub secret: Redacted,
    pub runner: JobRunner,
}

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    Forbidden(String),
    BadRequest(String),
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Authentication => ApiError::Forbidden(err.to_string()),
            GatewayError::Validation(_) => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api-endpoint", post(submit_job))
        .route("/eval-mock", post(eval_mock))
        .route("/health", get(health))
        .route("/", get(health))
}

// ── Handlers ──────────────────────────────────────────────────────────

/// Validate the secret, then hand the job to the runner and acknowledge at once.
async fn submit_job(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<Acknowledgment>, ApiError> {
    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::Validation(format!("malformed JSON body: {}", e)))?;
    if !value.is_object() {
        return Err(GatewayError::Validation("body must be a JSON object".into()).into());
    }

    // An unconfigured secret rejects everything.
    let provided = value.get("secret").and_then(|s| s.as_str()).unwrap_or_default();
    if state.secret.is_empty() || !secrets_match(provided, state.secret.expose()) {
        tracing::warn!("Rejected job request with invalid secret");
        return Err(GatewayError::Authentication.into());
    }

    let payload: SubmitPayload = serde_json::from_value(value)
        .map_err(|e| GatewayError::Validation(e.to_string()))?;
    let request = JobRequest::try_from(payload)?;
    let task = request.task.clone();
    let round = request.round;

    let ack = match state.runner.submit(request).await {
        Admission::Started => Acknowledgment {
            status: "ok".into(),
            message: "Task accepted; processing in background".into(),
            task,
            round,
        },
        Admission::AlreadyRunning => Acknowledgment {
            status: "in_progress".into(),
            message: "Task already in progress".into(),
            task,
            round,
        },
    };
    Ok(Json(ack))
}

/// Test sink for callbacks: logs and echoes the payload.
async fn eval_mock(Json(payload): Json<serde_json::Value>) -> Json<serde_json::Value> {
    tracing::info!(payload = %payload, "Evaluation callback received");
    let round = payload.get("round").cloned().unwrap_or(serde_json::Value::Null);
    Json(serde_json::json!({
        "status": "received",
        "round": round,
        "payload": payload,
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok", "project": "pagesmith"}))
}
