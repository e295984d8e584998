use async_trait::async_trait;
use companion_types::{SpeechPayload, TimestampedSpeech, TtsRelayRequest};
#[cfg(test)]
use mockall::automock;
use reqwest::Client;

use crate::error::SpeechError;
use crate::speech::{PCM_OUTPUT_FORMAT, PCM_SAMPLE_RATE, SpeechClip, decode_pcm16};
use crate::viseme;

#[async_trait]
#[cfg_attr(test, automock)]
pub trait SpeechSynthesizer {
    /// Synthesizes one chunk of text into a playable clip with visemes.
    async fn synthesize(&self, text: &str) -> Result<SpeechClip, SpeechError>;
}

/// Uses the timestamped TTS route of the relay so every clip carries
/// per-character timing for lip-sync.
pub struct RelayTtsClient {
    client: Client,
    endpoint: String,
    voice_id: String,
    model_id: Option<String>,
}

impl RelayTtsClient {
    pub fn new(relay_url: &str, voice_id: &str, model_id: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/api/tts/timestamps", relay_url.trim_end_matches('/')),
            voice_id: voice_id.to_string(),
            model_id,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for RelayTtsClient {
    async fn synthesize(&self, text: &str) -> Result<SpeechClip, SpeechError> {
        let body = TtsRelayRequest {
            voice_id: self.voice_id.clone(),
            payload: SpeechPayload::new(text).with_model_id(self.model_id.clone()),
            output_format: Some(PCM_OUTPUT_FORMAT.to_string()),
        };

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let speech: TimestampedSpeech = response.json().await?;
        let samples = decode_pcm16(&speech.audio_base64)?;
        if samples.is_empty() {
            return Err(SpeechError::Empty);
        }

        let mut clip = SpeechClip {
            text: text.to_string(),
            samples,
            sample_rate: PCM_SAMPLE_RATE,
            visemes: Vec::new(),
        };
        clip.visemes = speech
            .alignment
            .as_ref()
            .map(viseme::from_alignment)
            .filter(|track| !track.is_empty())
            .unwrap_or_else(|| viseme::from_text(text, clip.duration()));

        tracing::debug!(
            chars = text.chars().count(),
            seconds = clip.duration(),
            visemes = clip.visemes.len(),
            "speech chunk synthesized"
        );
        Ok(clip)
    }
}
