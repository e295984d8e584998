//! Pass-through handlers. Each one attaches the server-side API key, forwards
//! the caller's payload and hands the upstream answer back.

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use companion_types::{BufferedSpeech, TtsRelayRequest};
use futures_util::TryStreamExt;
use secrecy::ExposeSecret;

use crate::AppState;
use crate::error::RelayError;

const DEFAULT_AUDIO_TYPE: &str = "audio/mpeg";

/// `POST /api/llm`: the body is forwarded to `generateContent` verbatim.
pub async fn llm(State(state): State<AppState>, body: Bytes) -> Result<Response, RelayError> {
    let key = state
        .config
        .gemini_api_key
        .as_ref()
        .ok_or(RelayError::MissingKey("GEMINI_API_KEY"))?;

    let url = format!(
        "{}/v1beta/models/{}:generateContent",
        state.config.gemini_base_url, state.config.gemini_model
    );
    tracing::debug!(bytes = body.len(), model = %state.config.gemini_model, "relaying LLM request");

    let upstream = state
        .client
        .post(url)
        .query(&[("key", key.expose_secret())])
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let bytes = upstream.bytes().await?;
    if !status.is_success() {
        return Err(RelayError::LlmStatus { status, body: bytes });
    }

    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

/// `POST /api/tts`: buffers the whole clip and returns it base64-encoded.
pub async fn tts_buffered(
    State(state): State<AppState>,
    Json(request): Json<TtsRelayRequest>,
) -> Result<Json<BufferedSpeech>, RelayError> {
    let upstream = send_tts(&state, &request, "").await?;
    let content_type = content_type_of(&upstream);
    let audio = upstream.bytes().await?;

    tracing::info!(bytes = audio.len(), %content_type, "buffered TTS clip relayed");
    Ok(Json(BufferedSpeech {
        audio_base64: STANDARD.encode(&audio),
        content_type,
    }))
}

/// `POST /api/tts/stream`: pipes the upstream audio as it arrives.
pub async fn tts_stream(
    State(state): State<AppState>,
    Json(request): Json<TtsRelayRequest>,
) -> Result<Response, RelayError> {
    let upstream = send_tts(&state, &request, "/stream").await?;
    let content_type = content_type_of(&upstream);

    tracing::info!(%content_type, "streaming TTS clip");
    Ok((
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(
            upstream
                .bytes_stream()
                .inspect_err(|e| tracing::warn!(error = %e, "TTS stream broke off")),
        ),
    )
        .into_response())
}

/// `POST /api/tts/timestamps`: audio plus per-character alignment, as JSON.
pub async fn tts_timestamps(
    State(state): State<AppState>,
    Json(request): Json<TtsRelayRequest>,
) -> Result<Response, RelayError> {
    let upstream = send_tts(&state, &request, "/with-timestamps").await?;
    let bytes = upstream.bytes().await?;

    tracing::info!(bytes = bytes.len(), "timestamped TTS clip relayed");
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

async fn send_tts(
    state: &AppState,
    request: &TtsRelayRequest,
    suffix: &str,
) -> Result<reqwest::Response, RelayError> {
    let key = state
        .config
        .elevenlabs_api_key
        .as_ref()
        .ok_or(RelayError::MissingKey("ELEVENLABS_API_KEY"))?;
    if !is_valid_voice_id(&request.voice_id) {
        return Err(RelayError::InvalidVoice(request.voice_id.clone()));
    }

    let url = format!(
        "{}/v1/text-to-speech/{}{}",
        state.config.elevenlabs_base_url, request.voice_id, suffix
    );
    let mut builder = state
        .client
        .post(url)
        .header("xi-api-key", key.expose_secret())
        .json(&request.payload);
    if let Some(format) = &request.output_format {
        builder = builder.query(&[("output_format", format)]);
    }

    let upstream = builder.send().await?;
    let status = upstream.status();
    if !status.is_success() {
        let body = upstream.text().await.unwrap_or_default();
        return Err(RelayError::TtsStatus { status, body });
    }
    Ok(upstream)
}

fn content_type_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_AUDIO_TYPE)
        .to_string()
}

// The id becomes a path segment upstream.
fn is_valid_voice_id(voice_id: &str) -> bool {
    !voice_id.is_empty()
        && voice_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
