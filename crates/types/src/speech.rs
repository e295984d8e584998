/// Body accepted by the TTS relay routes.
///
/// `payload` is forwarded upstream untouched, so the relay keeps it as a raw
/// JSON value while clients fill in a typed [`SpeechPayload`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TtsRelayRequest<P = serde_json::Value> {
    pub voice_id: String,
    pub payload: P,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct SpeechPayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

impl SpeechPayload {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            model_id: None,
        }
    }

    pub fn with_model_id(mut self, model_id: Option<String>) -> Self {
        self.model_id = model_id;
        self
    }
}

/// Buffered relay answer: the upstream audio re-encoded as base64.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BufferedSpeech {
    pub audio_base64: String,
    pub content_type: String,
}

/// Per-character timing returned alongside timestamped speech.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Alignment {
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub character_start_times_seconds: Vec<f32>,
    #[serde(default)]
    pub character_end_times_seconds: Vec<f32>,
}

impl Alignment {
    /// Pairs each character with its start time, dropping unpaired tails.
    pub fn timed_characters(&self) -> impl Iterator<Item = (&str, f32)> {
        self.characters
            .iter()
            .map(String::as_str)
            .zip(self.character_start_times_seconds.iter().copied())
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct TimestampedSpeech {
    pub audio_base64: String,
    #[serde(default)]
    pub alignment: Option<Alignment>,
}
