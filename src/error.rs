//! # Error Handling
//!
//! Two layers of errors live here:
//!
//! - **VoiceError**: the voice engine's own taxonomy (microphone access,
//!   transport failures, malformed audio). These never crash the host; the
//!   session state machine turns them into UI-visible state.
//! - **AppError**: what the HTTP layer returns. Every variant maps to a status
//!   code and a JSON body with the same shape across all endpoints.
//!
//! ## Error Policy:
//! - **AccessDenied / OutputUnavailable**: fatal to the start attempt only
//! - **Transport**: fatal to the current session only, never retried
//! - **MalformedAudio**: the chunk is dropped, the session keeps going

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Failures raised by the voice engine and its collaborators.
///
/// ## Rust Concepts:
/// - **thiserror**: `#[error(...)]` generates the `Display` impl for each variant
/// - **Clone**: errors are copied into UI snapshots and reply channels
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceError {
    /// Microphone permission refused or no capture device available.
    #[error("microphone unavailable: {0}")]
    AccessDenied(String),

    /// Playback device could not be opened.
    #[error("audio output unavailable: {0}")]
    OutputUnavailable(String),

    /// Connection failed to open, failed mid-session, or closed unexpectedly.
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound audio chunk could not be decoded.
    #[error("malformed audio chunk: {0}")]
    MalformedAudio(String),

    /// The engine task has exited; no more commands can be delivered.
    #[error("voice engine is not running")]
    EngineStopped,
}

impl VoiceError {
    /// Short machine-readable code used in UI events and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            VoiceError::AccessDenied(_) => "access_denied",
            VoiceError::OutputUnavailable(_) => "output_unavailable",
            VoiceError::Transport(_) => "transport_error",
            VoiceError::MalformedAudio(_) => "malformed_audio",
            VoiceError::EngineStopped => "engine_stopped",
        }
    }
}

/// Errors returned by HTTP handlers.
///
/// ## Error Categories:
/// - **Internal**: host-side problems (500)
/// - **BadRequest**: client sent invalid data (400)
/// - **Conflict**: request cannot be honoured in the current session state (409)
/// - **ConfigError**: configuration problems (500)
/// - **ValidationError**: a configuration update failed validation (400)
/// - **Unavailable**: the voice engine could not serve the request (503)
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    Conflict(String),
    ConfigError(String),
    ValidationError(String),
    Unavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Unavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

/// Converts errors into JSON HTTP responses.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "conflict",
///     "message": "a voice session is already running",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;

        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AppError::ConfigError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are almost always the client's fault, so they become
/// a 400 rather than a 500.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Engine failures seen by HTTP handlers.
///
/// Device and transport failures are reported to the caller as 503s; a
/// malformed chunk never reaches a handler, but maps to a 400 for completeness.
impl From<VoiceError> for AppError {
    fn from(err: VoiceError) -> Self {
        match err {
            VoiceError::MalformedAudio(_) => AppError::BadRequest(err.to_string()),
            other => AppError::Unavailable(other.to_string()),
        }
    }
}

/// Shorthand for handler results.
pub type AppResult<T> = Result<T, AppError>;
