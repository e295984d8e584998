pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::http::{Method, header};
use axum::routing::post;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;

/// Shared by every handler: one pooled HTTP client and the relay config.
#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }
}

/// Builds the relay router. Only `POST` is routed, so other methods get
/// `405`; preflight `OPTIONS` requests are answered by the CORS layer.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/llm", post(routes::llm))
        .route("/api/tts", post(routes::tts_buffered))
        .route("/api/tts/stream", post(routes::tts_stream))
        .route("/api/tts/timestamps", post(routes::tts_timestamps))
        .with_state(state)
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use secrecy::SecretString;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use tracing::Level;
    use wiremock::matchers::{body_json, header as header_is, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LLM_PATH: &str = "/v1beta/models/gemini-1.5-flash-latest:generateContent";

    fn state_for(upstream: &MockServer, with_keys: bool) -> AppState {
        let key = |k: &str| with_keys.then(|| SecretString::from(k.to_string()));
        AppState::new(Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            gemini_api_key: key("g-key"),
            elevenlabs_api_key: key("e-key"),
            gemini_model: config::DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: upstream.uri(),
            elevenlabs_base_url: upstream.uri(),
            log_level: Level::INFO,
        })
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn tts_request() -> Value {
        json!({ "voiceId": "voice-1", "payload": { "text": "Hello." } })
    }

    #[tokio::test]
    async fn llm_body_is_forwarded_with_the_key() {
        // --- 1. Arrange ---
        let upstream = MockServer::start().await;
        let request = json!({ "contents": [{ "role": "user", "parts": [{ "text": "hi" }] }] });
        Mock::given(method("POST"))
            .and(path(LLM_PATH))
            .and(query_param("key", "g-key"))
            .and(body_json(&request))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .expect(1)
            .mount(&upstream)
            .await;
        let app = router(state_for(&upstream, true));

        // --- 2. Act ---
        let response = app.oneshot(post_json("/api/llm", request)).await.unwrap();

        // --- 3. Assert ---
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!({ "candidates": [] }));
    }

    #[tokio::test]
    async fn llm_upstream_error_keeps_status_and_body() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LLM_PATH))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(json!({ "error": { "code": 429 } })),
            )
            .mount(&upstream)
            .await;
        let app = router(state_for(&upstream, true));

        let response = app.oneshot(post_json("/api/llm", json!({}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(read_json(response).await, json!({ "error": { "code": 429 } }));
    }

    #[tokio::test]
    async fn missing_key_is_a_server_error() {
        let upstream = MockServer::start().await;
        let app = router(state_for(&upstream, false));

        let response = app.oneshot(post_json("/api/llm", json!({}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn buffered_tts_returns_base64_audio() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-1"))
            .and(header_is("xi-api-key", "e-key"))
            .and(body_json(json!({ "text": "Hello." })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .expect(1)
            .mount(&upstream)
            .await;
        let app = router(state_for(&upstream, true));

        let response = app.oneshot(post_json("/api/tts", tts_request())).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["contentType"], "audio/mpeg");
        assert_eq!(body["audioBase64"], STANDARD.encode([1u8, 2, 3]));
    }

    #[tokio::test]
    async fn tts_upstream_error_is_wrapped() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-1"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&upstream)
            .await;
        let app = router(state_for(&upstream, true));

        let response = app.oneshot(post_json("/api/tts", tts_request())).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            read_json(response).await,
            json!({ "error": "TTS API Error: invalid api key" })
        );
    }

    #[tokio::test]
    async fn stream_route_pipes_the_audio() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-1/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(b"mp3-bytes".to_vec()),
            )
            .mount(&upstream)
            .await;
        let app = router(state_for(&upstream, true));

        let response = app
            .oneshot(post_json("/api/tts/stream", tts_request()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "audio/mpeg");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"mp3-bytes");
    }

    #[tokio::test]
    async fn timestamps_route_passes_the_output_format() {
        let upstream = MockServer::start().await;
        let reply = json!({ "audio_base64": "AAAA", "alignment": { "characters": ["H"] } });
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-1/with-timestamps"))
            .and(query_param("output_format", "pcm_16000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&reply))
            .expect(1)
            .mount(&upstream)
            .await;
        let app = router(state_for(&upstream, true));

        let mut request = tts_request();
        request["outputFormat"] = json!("pcm_16000");
        let response = app
            .oneshot(post_json("/api/tts/timestamps", request))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, reply);
    }

    #[tokio::test]
    async fn voice_id_must_be_a_plain_token() {
        let upstream = MockServer::start().await;
        let app = router(state_for(&upstream, true));

        let response = app
            .oneshot(post_json(
                "/api/tts",
                json!({ "voiceId": "../models", "payload": { "text": "x" } }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn only_post_is_routed() {
        let upstream = MockServer::start().await;
        let app = router(state_for(&upstream, true));

        let response = app
            .oneshot(Request::get("/api/llm").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn preflight_is_answered_with_cors_headers() {
        let upstream = MockServer::start().await;
        let app = router(state_for(&upstream, true));

        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/tts")
                    .header("origin", "http://localhost:5173")
                    .header("access-control-request-method", "POST")
                    .header("access-control-request-headers", "content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_success());
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }
}
