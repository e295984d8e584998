use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::json;

/// Failures surfaced by the relay routes.
///
/// Every variant renders as JSON except `LlmStatus`, whose upstream body is
/// passed back untouched.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0} is not configured on the relay")]
    MissingKey(&'static str),

    #[error("Invalid voice id: {0}")]
    InvalidVoice(String),

    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM API returned status {status}")]
    LlmStatus { status: StatusCode, body: Bytes },

    #[error("TTS API Error: {body}")]
    TtsStatus { status: StatusCode, body: String },
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            RelayError::LlmStatus { status, body } => {
                tracing::warn!(%status, "LLM upstream rejected the request");
                (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
            }
            RelayError::TtsStatus { status, .. } => {
                tracing::warn!(%status, "TTS upstream rejected the request");
                (status, Json(json!({ "error": self.to_string() }))).into_response()
            }
            RelayError::InvalidVoice(_) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": self.to_string() })))
                    .into_response()
            }
            RelayError::MissingKey(_) | RelayError::Transport(_) => {
                tracing::error!(error = %self, "relay request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": self.to_string() })),
                )
                    .into_response()
            }
        }
    }
}
