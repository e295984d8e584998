//! Facial expressions: the rig abstraction, the mouth/non-mouth bind split
//! and a headless rig.

use std::collections::BTreeMap;

use companion_types::ExpressionCue;

pub const BLINK: &str = "blink";
pub const LOOK_LEFT: &str = "lookLeft";
pub const LOOK_RIGHT: &str = "lookRight";
pub const RELAXED: &str = "relaxed";

/// Emotions the LLM may pick from. Everything else in the rig is driven
/// procedurally.
pub const ALLOWED_EMOTIONS: [&str; 9] = [
    "happy", "angry", "sad", "relaxed", "Surprise", "Proud", "Scornful", "Worry", "Shy",
];

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RigError {
    #[error("unknown expression `{0}`")]
    UnknownExpression(String),
    #[error("morph target {index} does not exist on mesh {mesh}")]
    UnknownMorph { mesh: usize, index: usize },
}

/// One morph target an expression pushes, scaled by `weight`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MorphBind {
    pub mesh: usize,
    pub index: usize,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionDef {
    pub name: String,
    pub binds: Vec<MorphBind>,
}

/// The expression manager of a loaded avatar.
pub trait ExpressionRig {
    /// Every bind the named expression was authored with.
    fn binds(&self, name: &str) -> Option<Vec<MorphBind>>;

    fn morph_name(&self, mesh: usize, index: usize) -> Option<String>;

    fn value(&self, name: &str) -> Result<f32, RigError>;

    fn set_value(&mut self, name: &str, value: f32) -> Result<(), RigError>;

    /// Clears what the expression currently applies and applies only
    /// `binds` from now on.
    fn set_active_binds(&mut self, name: &str, binds: &[MorphBind]) -> Result<(), RigError>;

    fn set_look_at_auto_update(&mut self, enabled: bool);

    /// Pushes expression values into the morph targets.
    fn update(&mut self);
}

/// Best-effort wrappers: rig failures are logged and never interrupt a frame.
pub trait RigExt {
    fn set_or_log(&mut self, name: &str, value: f32);
    fn value_or_zero(&self, name: &str) -> f32;
}

impl<R: ExpressionRig + ?Sized> RigExt for R {
    fn set_or_log(&mut self, name: &str, value: f32) {
        if let Err(e) = self.set_value(name, value) {
            tracing::debug!(expression = name, error = %e, "expression update skipped");
        }
    }

    fn value_or_zero(&self, name: &str) -> f32 {
        self.value(name).unwrap_or(0.0)
    }
}

/// Whether a morph target moves the mouth.
pub fn is_mouth_morph(name: &str) -> bool {
    let lower = name.to_lowercase();

    ["mouth", "lip", "jaw", "tong"]
        .iter()
        .any(|part| lower.contains(part))
        || lower.contains("fcl_mth")
        || lower.contains("fclmth")
        || ["_a", "_i", "_ou", "_aa", "_ee", "_ih"]
            .iter()
            .any(|suffix| lower.ends_with(suffix))
        || ["a", "i", "o", "e", "u"].contains(&lower.as_str())
}

#[derive(Debug, Clone, Default)]
struct EmotionBinds {
    full: Vec<MorphBind>,
    non_mouth: Vec<MorphBind>,
}

/// Per-emotion bind lists, split once when the model loads.
#[derive(Debug, Clone, Default)]
pub struct BindMaps {
    emotions: BTreeMap<String, EmotionBinds>,
}

impl BindMaps {
    pub fn build<R: ExpressionRig + ?Sized>(rig: &R) -> Self {
        let mut emotions = BTreeMap::new();

        for name in ALLOWED_EMOTIONS {
            let Some(full) = rig.binds(name) else {
                tracing::debug!(expression = name, "emotion missing from rig");
                continue;
            };
            // Unresolvable morph names stay in; better a full face than a
            // half-applied one.
            let non_mouth = full
                .iter()
                .copied()
                .filter(|b| {
                    rig.morph_name(b.mesh, b.index)
                        .is_none_or(|morph| !is_mouth_morph(&morph))
                })
                .collect();
            emotions.insert(name.to_string(), EmotionBinds { full, non_mouth });
        }

        Self { emotions }
    }

    pub fn non_mouth(&self, name: &str) -> Option<&[MorphBind]> {
        self.emotions.get(name).map(|e| e.non_mouth.as_slice())
    }

    pub fn full(&self, name: &str) -> Option<&[MorphBind]> {
        self.emotions.get(name).map(|e| e.full.as_slice())
    }
}

/// Applies an emotion to the face while leaving the mouth to the visemes.
pub fn apply_emotion_non_mouth<R: ExpressionRig + ?Sized>(
    rig: &mut R,
    maps: &BindMaps,
    emotion: &Emotion,
) {
    if let Some(binds) = maps.non_mouth(&emotion.name) {
        if let Err(e) = rig.set_active_binds(&emotion.name, binds) {
            tracing::debug!(expression = %emotion.name, error = %e, "bind split skipped");
        }
    }
    rig.set_or_log(&emotion.name, emotion.weight);
}

/// Applies an emotion with all of its binds, mouth included.
pub fn apply_emotion_full<R: ExpressionRig + ?Sized>(
    rig: &mut R,
    maps: &BindMaps,
    emotion: &Emotion,
) {
    if let Some(binds) = maps.full(&emotion.name) {
        if let Err(e) = rig.set_active_binds(&emotion.name, binds) {
            tracing::debug!(expression = %emotion.name, error = %e, "bind restore skipped");
        }
    }
    rig.set_or_log(&emotion.name, emotion.weight);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Emotion {
    pub name: String,
    pub weight: f32,
}

impl Emotion {
    pub fn new(name: &str, weight: f32) -> Self {
        Self {
            name: name.to_string(),
            weight: weight.clamp(0.0, 1.0),
        }
    }

    pub fn relaxed() -> Self {
        Self::new(RELAXED, 1.0)
    }

    /// The reply's first cue, or `relaxed` when the LLM sent none.
    pub fn from_cue(cue: Option<&ExpressionCue>) -> Self {
        match cue {
            Some(cue) => Self::new(&cue.name, cue.weight.unwrap_or(1.0)),
            None => Self::relaxed(),
        }
    }
}

impl Default for Emotion {
    fn default() -> Self {
        Self::relaxed()
    }
}

#[derive(Debug, Clone)]
struct VirtualExpression {
    binds: Vec<MorphBind>,
    active: Vec<MorphBind>,
    value: f32,
}

/// In-memory rig that computes morph influences the way a skinned mesh would.
#[derive(Debug, Clone, Default)]
pub struct VirtualRig {
    meshes: Vec<Vec<(String, f32)>>,
    expressions: BTreeMap<String, VirtualExpression>,
    look_at_auto_update: bool,
}

impl VirtualRig {
    pub fn new(meshes: Vec<Vec<String>>, expressions: Vec<ExpressionDef>) -> Self {
        let meshes = meshes
            .into_iter()
            .map(|morphs| morphs.into_iter().map(|m| (m, 0.0)).collect())
            .collect();
        let expressions = expressions
            .into_iter()
            .map(|def| {
                let expr = VirtualExpression {
                    active: def.binds.clone(),
                    binds: def.binds,
                    value: 0.0,
                };
                (def.name, expr)
            })
            .collect();

        Self {
            meshes,
            expressions,
            look_at_auto_update: true,
        }
    }

    /// A single face mesh with the usual `Fcl_*` morph set and every
    /// expression the companion drives.
    pub fn standard() -> Self {
        const MORPHS: [&str; 22] = [
            "Fcl_BRW_Joy",
            "Fcl_EYE_Joy",
            "Fcl_MTH_Joy",
            "Fcl_BRW_Angry",
            "Fcl_EYE_Angry",
            "Fcl_MTH_Angry",
            "Fcl_BRW_Sorrow",
            "Fcl_MTH_Sorrow",
            "Fcl_EYE_Fun",
            "Fcl_MTH_Fun",
            "Fcl_EYE_Surprised",
            "Fcl_MTH_Surprised",
            "Fcl_MTH_A",
            "Fcl_MTH_I",
            "Fcl_MTH_U",
            "Fcl_MTH_E",
            "Fcl_MTH_O",
            "Fcl_EYE_Close",
            "Fcl_EYE_Close_L",
            "Fcl_EYE_Close_R",
            "Fcl_HA_Shy",
            "Fcl_BRW_Worry",
        ];
        let index = |name: &str| MORPHS.iter().position(|m| *m == name).unwrap_or(0);
        let bind = |name: &str, weight: f32| MorphBind {
            mesh: 0,
            index: index(name),
            weight,
        };
        let def = |name: &str, binds: Vec<MorphBind>| ExpressionDef {
            name: name.to_string(),
            binds,
        };

        let expressions = vec![
            def(
                "happy",
                vec![bind("Fcl_BRW_Joy", 1.0), bind("Fcl_EYE_Joy", 1.0), bind("Fcl_MTH_Joy", 1.0)],
            ),
            def(
                "angry",
                vec![
                    bind("Fcl_BRW_Angry", 1.0),
                    bind("Fcl_EYE_Angry", 1.0),
                    bind("Fcl_MTH_Angry", 1.0),
                ],
            ),
            def("sad", vec![bind("Fcl_BRW_Sorrow", 1.0), bind("Fcl_MTH_Sorrow", 1.0)]),
            def("relaxed", vec![bind("Fcl_EYE_Fun", 1.0), bind("Fcl_MTH_Fun", 1.0)]),
            def(
                "Surprise",
                vec![bind("Fcl_EYE_Surprised", 1.0), bind("Fcl_MTH_Surprised", 1.0)],
            ),
            def("Proud", vec![bind("Fcl_EYE_Joy", 0.5), bind("Fcl_MTH_Fun", 0.6)]),
            def("Scornful", vec![bind("Fcl_BRW_Angry", 0.4), bind("Fcl_MTH_Sorrow", 0.5)]),
            def("Worry", vec![bind("Fcl_BRW_Worry", 1.0), bind("Fcl_MTH_Sorrow", 0.3)]),
            def("Shy", vec![bind("Fcl_HA_Shy", 1.0), bind("Fcl_EYE_Joy", 0.3)]),
            def("aa", vec![bind("Fcl_MTH_A", 1.0)]),
            def("ih", vec![bind("Fcl_MTH_I", 1.0)]),
            def("ou", vec![bind("Fcl_MTH_U", 1.0)]),
            def("ee", vec![bind("Fcl_MTH_E", 1.0)]),
            def("oh", vec![bind("Fcl_MTH_O", 1.0)]),
            def(BLINK, vec![bind("Fcl_EYE_Close", 1.0)]),
            def("blinkLeft", vec![bind("Fcl_EYE_Close_L", 1.0)]),
            def("blinkRight", vec![bind("Fcl_EYE_Close_R", 1.0)]),
            def(LOOK_LEFT, vec![]),
            def(LOOK_RIGHT, vec![]),
            def("neutral", vec![]),
        ];

        Self::new(
            vec![MORPHS.iter().map(|m| m.to_string()).collect()],
            expressions,
        )
    }

    pub fn look_at_auto_update(&self) -> bool {
        self.look_at_auto_update
    }

    /// Influence of a morph target as of the last [`ExpressionRig::update`].
    pub fn morph_influence(&self, mesh: usize, name: &str) -> Option<f32> {
        self.meshes
            .get(mesh)?
            .iter()
            .find(|(morph, _)| morph == name)
            .map(|(_, influence)| *influence)
    }

    fn check_bind(&self, bind: &MorphBind) -> Result<(), RigError> {
        match self.meshes.get(bind.mesh) {
            Some(morphs) if bind.index < morphs.len() => Ok(()),
            _ => Err(RigError::UnknownMorph {
                mesh: bind.mesh,
                index: bind.index,
            }),
        }
    }
}

impl ExpressionRig for VirtualRig {
    fn binds(&self, name: &str) -> Option<Vec<MorphBind>> {
        self.expressions.get(name).map(|e| e.binds.clone())
    }

    fn morph_name(&self, mesh: usize, index: usize) -> Option<String> {
        self.meshes
            .get(mesh)?
            .get(index)
            .map(|(name, _)| name.clone())
    }

    fn value(&self, name: &str) -> Result<f32, RigError> {
        self.expressions
            .get(name)
            .map(|e| e.value)
            .ok_or_else(|| RigError::UnknownExpression(name.to_string()))
    }

    fn set_value(&mut self, name: &str, value: f32) -> Result<(), RigError> {
        let expr = self
            .expressions
            .get_mut(name)
            .ok_or_else(|| RigError::UnknownExpression(name.to_string()))?;
        expr.value = value.clamp(0.0, 1.0);
        Ok(())
    }

    fn set_active_binds(&mut self, name: &str, binds: &[MorphBind]) -> Result<(), RigError> {
        for bind in binds {
            self.check_bind(bind)?;
        }
        let expr = self
            .expressions
            .get_mut(name)
            .ok_or_else(|| RigError::UnknownExpression(name.to_string()))?;
        expr.active = binds.to_vec();
        Ok(())
    }

    fn set_look_at_auto_update(&mut self, enabled: bool) {
        self.look_at_auto_update = enabled;
    }

    fn update(&mut self) {
        for morphs in &mut self.meshes {
            for (_, influence) in morphs.iter_mut() {
                *influence = 0.0;
            }
        }
        for expr in self.expressions.values() {
            for bind in &expr.active {
                if let Some((_, influence)) = self
                    .meshes
                    .get_mut(bind.mesh)
                    .and_then(|m| m.get_mut(bind.index))
                {
                    *influence = (*influence + expr.value * bind.weight).min(1.0);
                }
            }
        }
    }
}
