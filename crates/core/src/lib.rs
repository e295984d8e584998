pub mod animation;
pub mod avatar;
pub mod chat;
pub mod clips;
pub mod error;
pub mod expression;
pub mod idle;
pub mod llm;
pub mod mixer;
pub mod session;
pub mod speech;
pub mod timers;
pub mod tts;
pub mod tween;
pub mod viseme;

use std::time::Duration;

use expression::Emotion;
use speech::Utterance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bubble {
    Thinking,
    Text,
}

/// Represents commands that the chat session issues to the runtime.
///
/// The session never touches the avatar directly; the runtime applies these
/// between frames, so every state change happens on the render loop.
#[derive(Debug)]
pub enum Command {
    /// Show a bubble. `None` keeps it up until it is hidden explicitly.
    ShowBubble {
        bubble: Bubble,
        text: String,
        duration: Option<Duration>,
    },
    HideBubble(Bubble),
    BeginThinking,
    /// Leave the thinking pose if the avatar is still in it.
    Settle,
    ShowTextReply {
        emotion: Emotion,
        duration: Duration,
    },
    StartTalking(Emotion),
    /// Play the synthesized reply. `done` fires when playback ends.
    Speak {
        utterance: Utterance,
        greeting: bool,
        done: tokio::sync::oneshot::Sender<()>,
    },
    EndTalking,
    SetTextOutput(bool),
}
