use anyhow::Context;
use companion_relay::config::Config;
use companion_relay::{AppState, router};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load relay configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_target(true)
        .init();

    if config.gemini_api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY is not set; /api/llm will answer 500");
    }
    if config.elevenlabs_api_key.is_none() {
        tracing::warn!("ELEVENLABS_API_KEY is not set; /api/tts routes will answer 500");
    }

    // --- 3. Serve ---
    let addr = config.bind_address;
    let app = router(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Companion relay listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
