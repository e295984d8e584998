//! Mouth shapes timed against audio playback.

use std::collections::VecDeque;

use companion_types::Alignment;

use crate::expression::{ExpressionRig, RigExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouthShape {
    #[default]
    Silence,
    A,
    E,
    I,
    O,
    U,
}

impl MouthShape {
    /// Rig expression that forms the shape. Silence forms nothing.
    pub fn expression(self) -> Option<&'static str> {
        match self {
            MouthShape::Silence => None,
            MouthShape::A => Some("aa"),
            MouthShape::E => Some("ee"),
            MouthShape::I => Some("ih"),
            MouthShape::O => Some("oh"),
            MouthShape::U => Some("ou"),
        }
    }

    /// Vowels open the mouth, whitespace and punctuation close it, and
    /// consonants (`None`) keep whatever shape came before.
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'a' => Some(MouthShape::A),
            'e' => Some(MouthShape::E),
            'i' | 'y' => Some(MouthShape::I),
            'o' => Some(MouthShape::O),
            'u' | 'w' => Some(MouthShape::U),
            c if c.is_whitespace() || c.is_ascii_punctuation() => Some(MouthShape::Silence),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viseme {
    pub shape: MouthShape,
    /// Seconds since the start of the utterance.
    pub time: f32,
}

fn collapse(timed: impl Iterator<Item = (char, f32)>, end: Option<f32>) -> Vec<Viseme> {
    let mut track = Vec::new();
    let mut last = MouthShape::Silence;

    for (c, time) in timed {
        let Some(shape) = MouthShape::from_char(c) else {
            continue;
        };
        if shape != last {
            track.push(Viseme { shape, time });
            last = shape;
        }
    }

    if let Some(end) = end {
        if last != MouthShape::Silence {
            track.push(Viseme {
                shape: MouthShape::Silence,
                time: end,
            });
        }
    }
    track
}

/// Track from the per-character timing of a timestamped TTS reply.
pub fn from_alignment(alignment: &Alignment) -> Vec<Viseme> {
    let timed = alignment
        .timed_characters()
        .filter_map(|(chars, time)| chars.chars().next().map(|c| (c, time)));
    collapse(
        timed,
        alignment.character_end_times_seconds.last().copied(),
    )
}

/// Fallback track that spreads the text evenly over the clip.
pub fn from_text(text: &str, duration: f32) -> Vec<Viseme> {
    let count = text.chars().count();
    if count == 0 || duration <= 0.0 {
        return Vec::new();
    }
    let step = duration / count as f32;
    collapse(
        text.chars().enumerate().map(|(i, c)| (c, i as f32 * step)),
        Some(duration),
    )
}

/// Consumes queued visemes against elapsed playback time and keeps exactly
/// one mouth shape applied.
#[derive(Debug, Default)]
pub struct VisemeDriver {
    queue: VecDeque<Viseme>,
    applied: MouthShape,
}

impl VisemeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, visemes: impl IntoIterator<Item = Viseme>) {
        self.queue.extend(visemes);
        self.queue
            .make_contiguous()
            .sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn applied(&self) -> MouthShape {
        self.applied
    }

    pub fn drive<R: ExpressionRig + ?Sized>(&mut self, rig: &mut R, elapsed: f32) {
        let mut next = self.applied;
        while self.queue.front().is_some_and(|v| v.time <= elapsed) {
            if let Some(viseme) = self.queue.pop_front() {
                next = viseme.shape;
            }
        }
        if next == self.applied {
            return;
        }

        if let Some(old) = self.applied.expression() {
            rig.set_or_log(old, 0.0);
        }
        if let Some(new) = next.expression() {
            rig.set_or_log(new, 1.0);
        }
        self.applied = next;
    }

    /// Closes the mouth if a viseme is still applied.
    pub fn release<R: ExpressionRig + ?Sized>(&mut self, rig: &mut R) {
        if let Some(old) = self.applied.expression() {
            rig.set_or_log(old, 0.0);
        }
        self.applied = MouthShape::Silence;
    }
}
