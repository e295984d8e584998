use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::SpeechError;
use crate::viseme::Viseme;

/// Sample rate of the `pcm_16000` output format the companion requests.
pub const PCM_SAMPLE_RATE: u32 = 16_000;
pub const PCM_OUTPUT_FORMAT: &str = "pcm_16000";

/// One synthesized chunk: decoded mono samples plus its viseme track.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechClip {
    pub text: String,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Times are relative to the start of this clip.
    pub visemes: Vec<Viseme>,
}

impl SpeechClip {
    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decodes base64 16-bit little-endian PCM into `f32` samples in `-1.0..1.0`.
/// A dangling odd byte is dropped.
pub fn decode_pcm16(audio_base64: &str) -> Result<Vec<f32>, SpeechError> {
    let bytes = STANDARD.decode(audio_base64.trim())?;
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32_768.0)
        .collect())
}

/// Clips of one reply, played back to back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Utterance {
    pub clips: Vec<SpeechClip>,
}

impl Utterance {
    pub fn new(clips: Vec<SpeechClip>) -> Self {
        Self { clips }
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn duration(&self) -> f32 {
        self.clips.iter().map(SpeechClip::duration).sum()
    }

    /// Every clip's visemes shifted by the clip's start offset.
    pub fn visemes(&self) -> Vec<Viseme> {
        let mut offset = 0.0;
        let mut track = Vec::new();
        for clip in &self.clips {
            track.extend(clip.visemes.iter().map(|v| Viseme {
                shape: v.shape,
                time: v.time + offset,
            }));
            offset += clip.duration();
        }
        track
    }
}
