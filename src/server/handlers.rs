//! HTTP request handlers for the pairing API.
//!
//! # Endpoints
//!
//! - `POST /request-code` - Start pairing and return a pairing code
//! - `GET /session-status/{session_id}` - Poll a session
//! - `GET /ping` - Liveness probe
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::PairingError;
use crate::link::Linker;
use crate::pairing::{PairingService, StatusReport};
use crate::phone::PhoneNumber;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the pairing service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<L: Linker> {
    pub service: Arc<PairingService<L>>,
}

impl<L: Linker> AppState<L> {
    pub fn new(service: Arc<PairingService<L>>) -> Self {
        Self { service }
    }
}

impl<L: Linker> Clone for AppState<L> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

// =============================================================================
// Request / Response Types
// =============================================================================

/// Body of `POST /request-code`.
///
/// `phone` is kept as a raw JSON value so that both `"+1 555 123"` and
/// `1555123` are accepted.
#[derive(Debug, Default, Deserialize)]
pub struct RequestCodeBody {
    #[serde(default)]
    pub phone: Option<Value>,
}

/// Successful `POST /request-code` response.
#[derive(Debug, Serialize)]
pub struct RequestCodeResponse {
    pub success: bool,

    #[serde(rename = "sessionId")]
    pub session_id: String,

    /// Pairing code formatted as `ABCD-EFGH`
    pub code: String,
}

/// JSON body returned for all pairing failures.
#[derive(Debug, Serialize)]
pub struct FailureResponse {
    pub success: bool,

    /// Human-readable error message
    pub error: String,
}

impl FailureResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert PairingError to HTTP response.
///
/// Callers only ever see the short user-facing message; the full error is
/// logged (ERROR for 5xx, WARN for upstream failures, DEBUG for bad input).
impl IntoResponse for PairingError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            PairingError::Phone(_) | PairingError::InvalidBody(_) => {
                (StatusCode::BAD_REQUEST, "invalid_phone")
            }
            PairingError::CodeUnavailable { .. } => (StatusCode::BAD_GATEWAY, "code_unavailable"),
            PairingError::Workspace(_) => (StatusCode::INTERNAL_SERVER_ERROR, "workspace_error"),
            PairingError::Link(_) => (StatusCode::INTERNAL_SERVER_ERROR, "link_error"),
        };

        if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                self
            );
        } else if status == StatusCode::BAD_GATEWAY {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Upstream error: {}",
                self
            );
        } else {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                self
            );
        }

        (status, Json(FailureResponse::new(self.user_message()))).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle pairing code requests.
///
/// # Endpoint
///
/// `POST /request-code`
///
/// # Request
///
/// ```json
/// { "phone": "+254 712 345 678" }
/// ```
///
/// # Response
///
/// ```json
/// { "success": true, "sessionId": "k3j9x0a1b2c3d4e5", "code": "ABCD-EFGH" }
/// ```
///
/// On failure: `{ "success": false, "error": "..." }` with a 4xx/5xx status.
pub async fn request_code_handler<L>(
    State(state): State<AppState<L>>,
    body: Result<Json<RequestCodeBody>, JsonRejection>,
) -> Result<Json<RequestCodeResponse>, PairingError>
where
    L: Linker + 'static,
{
    let Json(body) = body.map_err(|e| PairingError::InvalidBody(e.body_text()))?;

    let phone = PhoneNumber::from_json(body.phone.as_ref())?;

    let ticket = state.service.request_code(phone).await?;

    Ok(Json(RequestCodeResponse {
        success: true,
        session_id: ticket.session_id,
        code: ticket.code,
    }))
}

/// Handle session status polling.
///
/// # Endpoint
///
/// `GET /session-status/{session_id}`
///
/// # Response
///
/// `{ "status": "pending" }`, `{ "status": "failed" }`,
/// `{ "status": "not_found" }` or
/// `{ "status": "connected", "session": "<session string>" }`.
pub async fn session_status_handler<L>(
    State(state): State<AppState<L>>,
    Path(session_id): Path<String>,
) -> Json<StatusReport>
where
    L: Linker + 'static,
{
    Json(state.service.status(&session_id).await)
}

/// Liveness probe used by uptime pingers.
pub async fn ping_handler() -> &'static str {
    "pong"
}

/// Handle health check requests.
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
