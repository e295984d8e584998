//! Chat turn orchestration.
//!
//! `ChatSession` decides what happens during a turn and emits [`Command`]s;
//! the runtime executes them against the avatar and the bubbles. The session
//! is generic over the LLM and TTS clients so tests can substitute mocks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use companion_types::CompanionReply;
use tokio::sync::{mpsc, oneshot};

use crate::chat::{
    ConversationHistory, ERROR_BUBBLE_DURATION, build_request, is_greeting, parse_reply,
    split_into_chunks, text_bubble_duration,
};
use crate::error::{ChatError, SpeechError};
use crate::expression::Emotion;
use crate::llm::LlmClient;
use crate::speech::Utterance;
use crate::tts::SpeechSynthesizer;
use crate::{Bubble, Command};

pub const THINKING_TEXT: &str = "Thinking...";

/// Shared by the session and whatever reads user input: prompts are only
/// accepted once the avatar is ready and while no turn is in flight.
#[derive(Debug, Default)]
pub struct InputGate {
    ready: AtomicBool,
    busy: AtomicBool,
}

impl InputGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn accepts(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && !self.busy.load(Ordering::SeqCst)
    }

    /// Takes the lock for one turn. Fails when not ready or already taken.
    fn try_lock(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && !self.busy.swap(true, Ordering::SeqCst)
    }

    fn unlock(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    Prompt(String),
    ToggleTextOutput,
}

pub struct ChatSession<L, S> {
    llm: L,
    tts: S,
    persona: String,
    history: ConversationHistory,
    text_output: bool,
    gate: Arc<InputGate>,
    command_tx: mpsc::Sender<Command>,
}

impl<L, S> ChatSession<L, S>
where
    L: LlmClient + Send + Sync,
    S: SpeechSynthesizer + Send + Sync,
{
    pub fn new(
        llm: L,
        tts: S,
        persona: String,
        history: ConversationHistory,
        gate: Arc<InputGate>,
        command_tx: mpsc::Sender<Command>,
    ) -> Self {
        Self {
            llm,
            tts,
            persona,
            history,
            text_output: false,
            gate,
            command_tx,
        }
    }

    pub fn with_text_output(mut self, on: bool) -> Self {
        self.text_output = on;
        self
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn text_output(&self) -> bool {
        self.text_output
    }

    /// Processes inputs until the sender side closes. Prompts that queued up
    /// while a turn was running are dropped once it ends.
    pub async fn run(mut self, mut inputs: mpsc::Receiver<SessionInput>) -> Result<()> {
        while let Some(input) = inputs.recv().await {
            match input {
                SessionInput::Prompt(prompt) => {
                    if self.handle_prompt(&prompt).await? {
                        self.discard_queued_prompts(&mut inputs).await?;
                    }
                }
                SessionInput::ToggleTextOutput => self.toggle_text_output().await?,
            }
        }
        tracing::info!("input closed; chat session finished");
        Ok(())
    }

    async fn discard_queued_prompts(
        &mut self,
        inputs: &mut mpsc::Receiver<SessionInput>,
    ) -> Result<()> {
        let mut toggles = 0;
        while let Ok(input) = inputs.try_recv() {
            match input {
                SessionInput::Prompt(prompt) => {
                    tracing::info!(%prompt, "prompt arrived during a turn; ignored");
                }
                SessionInput::ToggleTextOutput => toggles += 1,
            }
        }
        for _ in 0..toggles {
            self.toggle_text_output().await?;
        }
        Ok(())
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .context("runtime stopped receiving commands")
    }

    pub async fn toggle_text_output(&mut self) -> Result<()> {
        self.text_output = !self.text_output;
        tracing::info!(text_output = self.text_output, "output mode switched");
        if !self.text_output {
            self.send(Command::HideBubble(Bubble::Text)).await?;
        }
        self.send(Command::SetTextOutput(self.text_output)).await
    }

    /// Runs one chat turn. Returns `Ok(false)` when the prompt was ignored:
    /// it was empty, the avatar is not ready, or a turn is already running.
    pub async fn handle_prompt(&mut self, prompt: &str) -> Result<bool> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Ok(false);
        }
        if !self.gate.try_lock() {
            tracing::debug!("prompt ignored; input is locked");
            return Ok(false);
        }

        let outcome = self.run_turn(prompt).await;
        self.gate.unlock();
        outcome.map(|()| true)
    }

    async fn run_turn(&mut self, prompt: &str) -> Result<()> {
        self.send(Command::HideBubble(Bubble::Text)).await?;
        self.send(Command::ShowBubble {
            bubble: Bubble::Thinking,
            text: THINKING_TEXT.to_string(),
            duration: None,
        })
        .await?;
        self.send(Command::BeginThinking).await?;
        let greeting = is_greeting(prompt);

        let reply = match self.request_reply(prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "chat turn failed");
                self.send(Command::HideBubble(Bubble::Thinking)).await?;
                self.send(Command::ShowBubble {
                    bubble: Bubble::Text,
                    text: e.to_string(),
                    duration: Some(ERROR_BUBBLE_DURATION),
                })
                .await?;
                return self.send(Command::Settle).await;
            }
        };

        self.send(Command::HideBubble(Bubble::Thinking)).await?;
        self.play_reply(&reply, greeting).await
    }

    /// Asks the LLM and records the exchange. History is only touched when
    /// the reply is usable.
    async fn request_reply(&mut self, prompt: &str) -> Result<CompanionReply, ChatError> {
        let request = build_request(&self.persona, &self.history, prompt);
        let response = self.llm.generate(&request).await?;
        let reply = parse_reply(&response)?;

        let model_text = serde_json::to_string(&reply)?;
        self.history.push_exchange(prompt, model_text);
        tracing::info!(
            chars = reply.response_text.chars().count(),
            expression = reply.primary_expression().map(|e| e.name.as_str()),
            "reply received"
        );
        Ok(reply)
    }

    async fn play_reply(&mut self, reply: &CompanionReply, greeting: bool) -> Result<()> {
        let emotion = Emotion::from_cue(reply.primary_expression());

        if self.text_output {
            let duration = text_bubble_duration(&reply.response_text);
            self.send(Command::ShowBubble {
                bubble: Bubble::Text,
                text: reply.response_text.clone(),
                duration: Some(duration),
            })
            .await?;
            self.send(Command::ShowTextReply { emotion, duration }).await?;
            return self.send(Command::Settle).await;
        }

        self.send(Command::StartTalking(emotion)).await?;
        let utterance = match self.synthesize(&reply.response_text).await {
            Ok(utterance) if !utterance.is_empty() => utterance,
            Ok(_) => {
                tracing::warn!("reply produced no speech");
                return self.send(Command::EndTalking).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "speech synthesis failed");
                return self.send(Command::EndTalking).await;
            }
        };

        let (done_tx, done_rx) = oneshot::channel();
        self.send(Command::Speak {
            utterance,
            greeting,
            done: done_tx,
        })
        .await?;

        // Input stays locked until the avatar stops talking. A dropped sender
        // means playback was torn down, which also ends the turn.
        let _ = done_rx.await;
        Ok(())
    }

    async fn synthesize(&self, text: &str) -> Result<Utterance, SpeechError> {
        let mut clips = Vec::new();
        for chunk in split_into_chunks(text) {
            clips.push(self.tts.synthesize(&chunk).await?);
        }
        Ok(Utterance::new(clips))
    }
}
