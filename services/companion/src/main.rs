mod assets;
mod config;
mod presenter;
mod prompt_loader;
#[cfg(feature = "speaker")]
mod speaker;

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use companion_core::Command;
use companion_core::avatar::Avatar;
use companion_core::chat::ConversationHistory;
use companion_core::expression::VirtualRig;
use companion_core::llm::RelayLlmClient;
use companion_core::mixer::BlendMixer;
use companion_core::session::{ChatSession, InputGate, SessionInput};
use companion_core::tts::RelayTtsClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing_subscriber::fmt::time::ChronoLocal;

use crate::assets::{LoadProgress, load_assets};
use crate::config::Config;
use crate::presenter::Presenter;

const TOGGLE_TEXT_COMMAND: &str = "/text";
const PROGRESS_BAR_WIDTH: usize = 30;

#[derive(Parser)]
#[command(version, about = "A headless virtual companion you can chat with")]
struct Cli {
    /// Start with replies shown as text bubbles instead of speech
    #[arg(long)]
    text: bool,
    /// Frames per second of the render loop
    #[arg(long, default_value_t = 60)]
    fps: u32,
    /// Seed for blinking, glancing and idle variants
    #[arg(long)]
    seed: Option<u64>,
}

type CompanionAvatar = Avatar<BlendMixer, VirtualRig>;

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Configuration loaded successfully. Starting companion...");

    // --- 3. Parse Command-Line Arguments ---
    let cli = Cli::parse();
    let frame = Duration::from_secs_f64(1.0 / f64::from(cli.fps.max(1)));

    // --- 4. Load the Persona ---
    let persona = prompt_loader::load_persona(&config.prompt_dir);

    // --- 5. Build the Avatar and Load Assets ---
    let mut avatar: CompanionAvatar = Avatar::seeded(VirtualRig::standard(), cli.seed);
    if cli.text {
        avatar.set_text_output(true);
    }

    let mut ticker = tokio::time::interval(frame);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut progress = LoadProgress::new();
    let assets =
        load_assets(&config.asset_dir, &mut progress).context("Failed to load avatar assets")?;
    while !progress.is_complete() {
        draw_progress(&mut progress);
        ticker.tick().await;
        avatar.frame(frame);
    }
    eprintln!();
    for slot in &assets.skipped {
        tracing::warn!("Animation '{}' unavailable; its action is disabled", slot.label());
    }
    tracing::info!(model = %assets.model, clips = assets.library.len(), "avatar ready");
    avatar.load_animations(assets.library.into_mixer());

    // --- 6. Start the Chat Session ---
    let gate = InputGate::new();
    gate.mark_ready();

    let (command_tx, mut command_rx) = mpsc::channel::<Command>(32);
    let (input_tx, input_rx) = mpsc::channel::<SessionInput>(8);

    let session = ChatSession::new(
        RelayLlmClient::new(&config.relay_url),
        RelayTtsClient::new(&config.relay_url, &config.voice_id, config.tts_model.clone()),
        persona,
        ConversationHistory::new(config.max_turns),
        gate.clone(),
        command_tx,
    )
    .with_text_output(cli.text);
    let session_handle = tokio::spawn(session.run(input_rx));

    let reader_gate = gate.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let input = match line.trim() {
                "" => continue,
                TOGGLE_TEXT_COMMAND => SessionInput::ToggleTextOutput,
                prompt => {
                    if !reader_gate.accepts() {
                        tracing::info!("Still answering; prompt ignored");
                        continue;
                    }
                    SessionInput::Prompt(prompt.to_string())
                }
            };
            if input_tx.send(input).await.is_err() {
                break;
            }
        }
        tracing::debug!("stdin closed");
    });

    println!("Say something (or {TOGGLE_TEXT_COMMAND} to toggle text replies).");

    // --- 7. Render Loop ---
    #[cfg(feature = "speaker")]
    let mut speaker = match speaker::Speaker::open() {
        Ok(speaker) => Some(speaker),
        Err(e) => {
            tracing::warn!("Speech will be silent: {:#}", e);
            None
        }
    };

    let mut presenter = Presenter::new(std::io::stdout());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                avatar.frame(now - last);
                last = now;
                presenter.tick(avatar.now());
            }
            command = command_rx.recv() => {
                let Some(command) = command else { break };
                #[cfg(feature = "speaker")]
                if let (Some(speaker), Command::Speak { utterance, .. }) = (speaker.as_mut(), &command) {
                    speaker.play(utterance);
                }
                apply_command(&mut avatar, &mut presenter, command)?;
            }
            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    session_handle.abort();
    match session_handle.await {
        Ok(result) => result.context("Chat session failed")?,
        Err(e) if e.is_cancelled() => {}
        Err(e) => return Err(e).context("Chat session panicked"),
    }

    Ok(())
}

fn apply_command<W: Write>(
    avatar: &mut CompanionAvatar,
    presenter: &mut Presenter<W>,
    command: Command,
) -> Result<()> {
    match command {
        Command::ShowBubble {
            bubble,
            text,
            duration,
        } => presenter
            .show(bubble, &text, duration, avatar.now())
            .context("Failed to write bubble")?,
        Command::HideBubble(bubble) => presenter.hide(bubble),
        other => avatar.apply(other),
    }
    Ok(())
}

fn draw_progress(progress: &mut LoadProgress) {
    let shown = progress.ease();
    let filled = ((shown * PROGRESS_BAR_WIDTH as f32).round() as usize).min(PROGRESS_BAR_WIDTH);
    eprint!(
        "\r[{}{}] {:>3}% {:<24}",
        "#".repeat(filled),
        " ".repeat(PROGRESS_BAR_WIDTH - filled),
        (shown * 100.0).round() as u32,
        progress.status()
    );
    let _ = std::io::stderr().flush();
}
