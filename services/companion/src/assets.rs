//! Loads the avatar's clip manifest and reports progress while doing so.
//!
//! The manifest (`animations.json` in the asset directory) names the model
//! and lists each source clip by file stem:
//!
//! ```json
//! { "model": "companion.vrm", "clips": { "idle": { "duration": 4.0 } } }
//! ```
//!
//! A missing or unreadable manifest fails startup. A clip that is absent or
//! has an unusable duration is skipped and its action never plays.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use companion_core::clips::{ClipLibrary, ClipSlot, RawClip};
use serde::Deserialize;

pub const MANIFEST_FILE: &str = "animations.json";

const MODEL_WEIGHT: f32 = 0.7;
const ANIMATIONS_WEIGHT: f32 = 0.3;
const EASE_PER_FRAME: f32 = 0.2;

#[derive(Debug, Deserialize)]
struct Manifest {
    model: String,
    #[serde(default)]
    clips: HashMap<String, ClipEntry>,
}

#[derive(Debug, Deserialize)]
struct ClipEntry {
    duration: f32,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug)]
pub struct LoadedAssets {
    pub model: String,
    pub library: ClipLibrary,
    pub skipped: Vec<ClipSlot>,
}

/// Loading-bar state. The target only moves forward; the shown value eases
/// toward it a fifth of the remaining distance per frame.
#[derive(Debug, Clone, Default)]
pub struct LoadProgress {
    target: f32,
    shown: f32,
    status: String,
}

impl LoadProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, progress: f32, status: impl Into<String>) {
        self.target = self.target.max(progress.clamp(0.0, 1.0));
        self.status = status.into();
    }

    /// Advances the displayed value by one frame and returns it.
    pub fn ease(&mut self) -> f32 {
        let difference = self.target - self.shown;
        if difference.abs() > 0.001 {
            self.shown += difference * EASE_PER_FRAME;
        } else {
            self.shown = self.target;
        }
        self.shown
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn shown(&self) -> f32 {
        self.shown
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_complete(&self) -> bool {
        self.shown >= 1.0
    }
}

pub fn load_assets(dir: &Path, progress: &mut LoadProgress) -> Result<LoadedAssets> {
    let path = dir.join(MANIFEST_FILE);
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read asset manifest: {}", path.display()))?;
    let mut manifest: Manifest = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid asset manifest: {}", path.display()))?;
    progress.update(MODEL_WEIGHT, "Loading Model... 100%");
    tracing::info!(model = %manifest.model, "model loaded");

    let per_clip = ANIMATIONS_WEIGHT / ClipSlot::ALL.len() as f32;
    let mut library = ClipLibrary::new();
    let mut skipped = Vec::new();

    for (index, slot) in ClipSlot::ALL.into_iter().enumerate() {
        let reached = MODEL_WEIGHT + (index + 1) as f32 * per_clip;
        match manifest.clips.remove(slot.file_stem()) {
            Some(entry) if entry.duration.is_finite() && entry.duration > 0.0 => {
                let name = entry.name.unwrap_or_else(|| slot.file_stem().to_string());
                library.insert(
                    slot,
                    RawClip {
                        name,
                        duration: entry.duration,
                    },
                );
                progress.update(reached, format!("Loading: {}", slot.label()));
            }
            entry => {
                if entry.is_some() {
                    tracing::warn!(clip = slot.file_stem(), "clip has an unusable duration");
                } else {
                    tracing::warn!(clip = slot.file_stem(), "clip missing from manifest");
                }
                skipped.push(slot);
                progress.update(reached, format!("Skipping: {}", slot.label()));
            }
        }
    }

    Ok(LoadedAssets {
        model: manifest.model,
        library,
        skipped,
    })
}
