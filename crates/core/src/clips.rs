//! Turns the six source clips into the eight actions the avatar plays.

use std::collections::BTreeMap;

use crate::mixer::{ActionId, ActionSpec, BlendMixer, LoopMode};

/// Source animation files, in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClipSlot {
    Idle,
    IdleVariant,
    Talking,
    Waving,
    Texting,
    Thinking,
}

impl ClipSlot {
    pub const ALL: [ClipSlot; 6] = [
        ClipSlot::Idle,
        ClipSlot::IdleVariant,
        ClipSlot::Talking,
        ClipSlot::Waving,
        ClipSlot::Texting,
        ClipSlot::Thinking,
    ];

    pub fn file_stem(self) -> &'static str {
        match self {
            ClipSlot::Idle => "idle",
            ClipSlot::IdleVariant => "idle1",
            ClipSlot::Talking => "talking",
            ClipSlot::Waving => "waving",
            ClipSlot::Texting => "texting",
            ClipSlot::Thinking => "thinking",
        }
    }

    /// Shown on the progress line while loading.
    pub fn label(self) -> &'static str {
        match self {
            ClipSlot::Idle => "Idle",
            ClipSlot::IdleVariant => "Idle Variant",
            ClipSlot::Talking => "Talking",
            ClipSlot::Waving => "Waving",
            ClipSlot::Texting => "Texting",
            ClipSlot::Thinking => "Thinking",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawClip {
    pub name: String,
    pub duration: f32,
}

const THINKING_INTRO_SHARE: f32 = 0.40;
const THINKING_FPS: f32 = 60.0;
const TEXTING_INTRO_SHARE: f32 = 0.25;
const TEXTING_FPS: f32 = 30.0;
const WAVING_TRIM_SECONDS: f32 = 0.9;

/// Splits a clip at `share` of its length, snapped down to a `fps` frame grid.
/// Returns the intro and loop durations.
pub fn split_on_frame_grid(duration: f32, share: f32, fps: f32) -> (f32, f32) {
    let intro_end = (duration * share * fps).floor();
    let clip_end = (duration * fps).floor();
    (intro_end / fps, (clip_end - intro_end).max(0.0) / fps)
}

#[derive(Debug, Clone, Default)]
pub struct ClipLibrary {
    clips: BTreeMap<ClipSlot, RawClip>,
}

impl ClipLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slot: ClipSlot, clip: RawClip) {
        self.clips.insert(slot, clip);
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Action specs for every clip that loaded. Missing slots yield no
    /// actions, so transitions to them become no-ops.
    pub fn actions(&self) -> Vec<(ActionId, ActionSpec)> {
        let mut actions = Vec::new();

        for (slot, clip) in &self.clips {
            match slot {
                ClipSlot::Idle => actions.push((
                    ActionId::Idle,
                    ActionSpec::looping(&clip.name, clip.duration, LoopMode::PingPong),
                )),
                ClipSlot::IdleVariant => actions.push((
                    ActionId::IdleVariant,
                    ActionSpec::once(&clip.name, clip.duration),
                )),
                ClipSlot::Talking => actions.push((
                    ActionId::Talking,
                    ActionSpec::looping(&clip.name, clip.duration, LoopMode::PingPong),
                )),
                ClipSlot::Waving => {
                    let duration = if clip.duration > 1.0 {
                        clip.duration - WAVING_TRIM_SECONDS
                    } else {
                        clip.duration
                    };
                    actions.push((ActionId::Waving, ActionSpec::once(&clip.name, duration)));
                }
                ClipSlot::Texting => {
                    let (intro, rest) =
                        split_on_frame_grid(clip.duration, TEXTING_INTRO_SHARE, TEXTING_FPS);
                    actions.push((ActionId::TextingIntro, ActionSpec::once("textingIntro", intro)));
                    actions.push((
                        ActionId::TextingLoop,
                        ActionSpec::looping("textingLoop", rest, LoopMode::PingPong),
                    ));
                }
                ClipSlot::Thinking => {
                    let (intro, rest) =
                        split_on_frame_grid(clip.duration, THINKING_INTRO_SHARE, THINKING_FPS);
                    actions.push((
                        ActionId::ThinkingIntro,
                        ActionSpec::once("thinkingIntro", intro),
                    ));
                    actions.push((
                        ActionId::ThinkingLoop,
                        ActionSpec::looping("thinkingLoop", rest, LoopMode::PingPong),
                    ));
                }
            }
        }

        actions
    }

    pub fn into_mixer(self) -> BlendMixer {
        BlendMixer::with_actions(self.actions())
    }
}
