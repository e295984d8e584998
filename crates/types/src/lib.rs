pub mod generate;
pub mod reply;
pub mod speech;

pub use generate::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part, Role,
};
pub use reply::{CompanionReply, ExpressionCue};
pub use speech::{Alignment, BufferedSpeech, SpeechPayload, TimestampedSpeech, TtsRelayRequest};
