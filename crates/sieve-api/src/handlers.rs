//! HTTP handlers for the scoring API.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use serde::Serialize;
use tracing::error;

use sieve_core::{DecisionLabel, DecisionRecord, Explanation, InvoiceIn, TopMatch};

use crate::auth::RequireAuth;
use crate::AppState;

/// Response body for `/scoreInvoice`.
#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub risk_score: f64,
    pub decision: DecisionLabel,
    pub reason_codes: Vec<String>,
    pub top_matches: Vec<TopMatch>,
    pub explanations: Vec<Explanation>,
    pub trace_id: String,
}

/// Score one invoice.
///
/// The body is parsed leniently as JSON first so every shape violation maps
/// to a 400 rather than the framework's mixed rejection codes. The whole
/// pipeline runs under the configured deadline; expiry aborts in-flight
/// work without persisting a decision.
pub async fn score_invoice(
    State(state): State<AppState>,
    auth: RequireAuth,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<ScoreResponse>, ApiError> {
    let invoice: InvoiceIn = serde_json::from_value(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid payload: {e}")))?;

    let deadline = Duration::from_millis(state.settings.score_deadline_ms);
    let outcome = tokio::time::timeout(
        deadline,
        state.pipeline.score(invoice, &auth.claims.sub),
    )
    .await
    .map_err(|_| ApiError::Timeout(format!("scoring exceeded {}ms", deadline.as_millis())))??;

    Ok(Json(ScoreResponse {
        risk_score: outcome.risk_score,
        decision: outcome.decision,
        reason_codes: outcome.reason_codes,
        top_matches: outcome.top_matches,
        explanations: outcome.explanations,
        trace_id: trace_id(&headers),
    }))
}

/// Most recent decision for an invoice.
pub async fn get_decision(
    State(state): State<AppState>,
    _auth: RequireAuth,
    Path(invoice_id): Path<String>,
) -> Result<Json<DecisionRecord>, ApiError> {
    let decision = state
        .db
        .decisions
        .latest(&invoice_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no decision for invoice {invoice_id}")))?;
    Ok(Json(decision))
}

/// Liveness probe.
pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "tenant": state.settings.tenant_id,
    }))
}

fn trace_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

/// API-level error with an HTTP status mapping.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Timeout(String),
    Internal(sieve_core::Error),
}

impl From<sieve_core::Error> for ApiError {
    fn from(err: sieve_core::Error) -> Self {
        match err {
            sieve_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            sieve_core::Error::Unauthorized(msg) => ApiError::Unauthorized(msg),
            sieve_core::Error::Forbidden(msg) => ApiError::Forbidden(msg),
            sieve_core::Error::NotFound(msg) => ApiError::NotFound(msg),
            sieve_core::Error::Timeout(msg) => ApiError::Timeout(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            ApiError::Internal(err) => {
                error!(
                    subsystem = "api",
                    component = "handlers",
                    error = %err,
                    "Request failed"
                );
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
