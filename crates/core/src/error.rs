/// Why a chat turn produced no reply. The display text is what the error
/// bubble shows.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Gemini API request failed with status {status}")]
    Status { status: u16, body: String },
    #[error("Could not reach the chat relay: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid response structure from Gemini API.")]
    InvalidEnvelope,
    #[error("The reply was not valid JSON: {0}")]
    MalformedReply(#[from] serde_json::Error),
    #[error("Empty response text from API.")]
    EmptyReply,
}

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("TTS request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Could not reach the TTS relay: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("TTS audio is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("TTS returned no audio")]
    Empty,
}
