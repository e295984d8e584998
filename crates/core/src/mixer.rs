//! Clip playback and weight blending.
//!
//! [`AnimationMixer`] is the seam to whatever actually poses the skeleton.
//! [`BlendMixer`] is the headless implementation used by the companion
//! runtime and the tests: it tracks clip time and blend weight per action
//! and reports one-shot completions, without touching any bones.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionId {
    Idle,
    IdleVariant,
    Talking,
    Waving,
    TextingIntro,
    TextingLoop,
    ThinkingIntro,
    ThinkingLoop,
}

impl ActionId {
    pub const ALL: [ActionId; 8] = [
        ActionId::Idle,
        ActionId::IdleVariant,
        ActionId::Talking,
        ActionId::Waving,
        ActionId::TextingIntro,
        ActionId::TextingLoop,
        ActionId::ThinkingIntro,
        ActionId::ThinkingLoop,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActionId::Idle => "idle",
            ActionId::IdleVariant => "idle1",
            ActionId::Talking => "talking",
            ActionId::Waving => "waving",
            ActionId::TextingIntro => "textingIntro",
            ActionId::TextingLoop => "textingLoop",
            ActionId::ThinkingIntro => "thinkingIntro",
            ActionId::ThinkingLoop => "thinkingLoop",
        }
    }

    /// Playback rate applied whenever the action becomes current.
    pub fn time_scale(self) -> f32 {
        match self {
            ActionId::Idle | ActionId::TextingIntro | ActionId::TextingLoop => 0.8,
            _ => 1.0,
        }
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Once,
    Repeat,
    PingPong,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpec {
    pub clip: String,
    pub duration: f32,
    pub loop_mode: LoopMode,
    pub clamp_when_finished: bool,
}

impl ActionSpec {
    pub fn looping(clip: &str, duration: f32, loop_mode: LoopMode) -> Self {
        Self {
            clip: clip.to_string(),
            duration,
            loop_mode,
            clamp_when_finished: false,
        }
    }

    pub fn once(clip: &str, duration: f32) -> Self {
        Self {
            clip: clip.to_string(),
            duration,
            loop_mode: LoopMode::Once,
            clamp_when_finished: true,
        }
    }
}

pub trait AnimationMixer {
    fn has_action(&self, id: ActionId) -> bool;

    fn duration(&self, id: ActionId) -> Option<f32>;

    /// Rewinds the action and starts it at full weight.
    fn play(&mut self, id: ActionId);

    /// Ramps the action's weight from zero to one.
    fn fade_in(&mut self, id: ActionId, seconds: f32);

    /// Ramps `from` down to zero while ramping `to` up to one.
    fn cross_fade(&mut self, from: ActionId, to: ActionId, seconds: f32);

    fn set_time_scale(&mut self, id: ActionId, scale: f32);

    fn weight(&self, id: ActionId) -> f32;

    /// Advances every running action and returns the one-shot actions that
    /// reached their end during this step.
    fn update(&mut self, dt: f32) -> Vec<ActionId>;
}

#[derive(Debug, Clone)]
struct Fade {
    from: f32,
    to: f32,
    elapsed: f32,
    seconds: f32,
}

impl Fade {
    fn value(&self) -> f32 {
        if self.seconds <= 0.0 {
            return self.to;
        }
        let t = (self.elapsed / self.seconds).min(1.0);
        self.from + (self.to - self.from) * t
    }

    fn is_done(&self) -> bool {
        self.elapsed >= self.seconds
    }
}

#[derive(Debug, Clone)]
struct ClipAction {
    spec: ActionSpec,
    time: f32,
    direction: f32,
    weight: f32,
    fade: Option<Fade>,
    time_scale: f32,
    running: bool,
    finished: bool,
}

impl ClipAction {
    fn new(spec: ActionSpec) -> Self {
        Self {
            spec,
            time: 0.0,
            direction: 1.0,
            weight: 0.0,
            fade: None,
            time_scale: 1.0,
            running: false,
            finished: false,
        }
    }

    fn reset(&mut self) {
        self.time = 0.0;
        self.direction = 1.0;
        self.fade = None;
        self.running = true;
        self.finished = false;
    }

    fn stop(&mut self) {
        self.running = false;
        self.weight = 0.0;
        self.fade = None;
    }

    /// Returns true when a one-shot clip reached its end on this step.
    fn advance_clock(&mut self, dt: f32) -> bool {
        let duration = self.spec.duration;
        if duration <= 0.0 {
            self.time = 0.0;
            return self.spec.loop_mode == LoopMode::Once && !self.finished;
        }

        let step = dt * self.time_scale;
        match self.spec.loop_mode {
            LoopMode::Repeat => {
                self.time = (self.time + step).rem_euclid(duration);
                false
            }
            LoopMode::PingPong => {
                self.time += step * self.direction;
                while self.time > duration || self.time < 0.0 {
                    if self.time > duration {
                        self.time = 2.0 * duration - self.time;
                    } else {
                        self.time = -self.time;
                    }
                    self.direction = -self.direction;
                }
                false
            }
            LoopMode::Once => {
                self.time += step;
                if self.time >= duration {
                    self.time = duration;
                    true
                } else {
                    false
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct BlendMixer {
    actions: BTreeMap<ActionId, ClipAction>,
}

impl BlendMixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actions(specs: impl IntoIterator<Item = (ActionId, ActionSpec)>) -> Self {
        let mut mixer = Self::new();
        for (id, spec) in specs {
            mixer.add_action(id, spec);
        }
        mixer
    }

    pub fn add_action(&mut self, id: ActionId, spec: ActionSpec) {
        self.actions.insert(id, ClipAction::new(spec));
    }

    pub fn is_running(&self, id: ActionId) -> bool {
        self.actions.get(&id).is_some_and(|a| a.running)
    }

    pub fn time(&self, id: ActionId) -> Option<f32> {
        self.actions.get(&id).map(|a| a.time)
    }

    pub fn time_scale(&self, id: ActionId) -> Option<f32> {
        self.actions.get(&id).map(|a| a.time_scale)
    }

    /// Sum of all blend weights; zero means the skeleton would fall back to
    /// its bind pose.
    pub fn total_weight(&self) -> f32 {
        self.actions
            .values()
            .filter(|a| a.running)
            .map(|a| a.weight)
            .sum()
    }
}

impl AnimationMixer for BlendMixer {
    fn has_action(&self, id: ActionId) -> bool {
        self.actions.contains_key(&id)
    }

    fn duration(&self, id: ActionId) -> Option<f32> {
        self.actions.get(&id).map(|a| a.spec.duration)
    }

    fn play(&mut self, id: ActionId) {
        if let Some(action) = self.actions.get_mut(&id) {
            action.reset();
            action.weight = 1.0;
        }
    }

    fn fade_in(&mut self, id: ActionId, seconds: f32) {
        if let Some(action) = self.actions.get_mut(&id) {
            action.running = true;
            action.weight = 0.0;
            action.fade = Some(Fade {
                from: 0.0,
                to: 1.0,
                elapsed: 0.0,
                seconds,
            });
        }
    }

    fn cross_fade(&mut self, from: ActionId, to: ActionId, seconds: f32) {
        if let Some(action) = self.actions.get_mut(&from) {
            if action.running {
                action.fade = Some(Fade {
                    from: action.weight,
                    to: 0.0,
                    elapsed: 0.0,
                    seconds,
                });
            }
        }
        self.fade_in(to, seconds);
    }

    fn set_time_scale(&mut self, id: ActionId, scale: f32) {
        if let Some(action) = self.actions.get_mut(&id) {
            action.time_scale = scale;
        }
    }

    fn weight(&self, id: ActionId) -> f32 {
        self.actions
            .get(&id)
            .filter(|a| a.running)
            .map_or(0.0, |a| a.weight)
    }

    fn update(&mut self, dt: f32) -> Vec<ActionId> {
        let mut finished = Vec::new();

        for (id, action) in self.actions.iter_mut() {
            if !action.running {
                continue;
            }

            if let Some(fade) = action.fade.as_mut() {
                fade.elapsed += dt;
                action.weight = fade.value();
                if fade.is_done() {
                    let faded_out = fade.to <= 0.0;
                    action.fade = None;
                    if faded_out {
                        action.stop();
                        continue;
                    }
                }
            }

            // A clamped one-shot holds its last pose until something else
            // takes over.
            if action.finished {
                continue;
            }

            if action.advance_clock(dt) {
                action.finished = true;
                finished.push(*id);
                if !action.spec.clamp_when_finished {
                    action.stop();
                }
            }
        }

        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixer() -> BlendMixer {
        BlendMixer::with_actions([
            (
                ActionId::Idle,
                ActionSpec::looping("idle", 4.0, LoopMode::PingPong),
            ),
            (
                ActionId::Talking,
                ActionSpec::looping("talking", 2.0, LoopMode::Repeat),
            ),
            (ActionId::Waving, ActionSpec::once("waving", 1.0)),
        ])
    }

    #[test]
    fn cross_fade_keeps_total_weight_at_one() {
        let mut mixer = mixer();
        mixer.play(ActionId::Idle);
        mixer.cross_fade(ActionId::Idle, ActionId::Talking, 0.35);

        for _ in 0..40 {
            mixer.update(1.0 / 60.0);
            let total = mixer.weight(ActionId::Idle) + mixer.weight(ActionId::Talking);
            assert!((total - 1.0).abs() < 1e-4, "total weight drifted to {total}");
        }

        assert_eq!(mixer.weight(ActionId::Talking), 1.0);
        assert!(!mixer.is_running(ActionId::Idle));
    }

    #[test]
    fn one_shot_reports_finished_once_and_clamps() {
        let mut mixer = mixer();
        mixer.play(ActionId::Waving);

        let mut reported = Vec::new();
        for _ in 0..90 {
            reported.extend(mixer.update(1.0 / 60.0));
        }

        assert_eq!(reported, vec![ActionId::Waving]);
        assert!(mixer.is_running(ActionId::Waving));
        assert_eq!(mixer.time(ActionId::Waving), Some(1.0));
        assert_eq!(mixer.weight(ActionId::Waving), 1.0);
    }

    #[test]
    fn ping_pong_bounces_inside_the_clip() {
        let mut mixer = mixer();
        mixer.play(ActionId::Idle);

        mixer.update(5.0);
        let time = mixer.time(ActionId::Idle).unwrap();
        assert!((time - 3.0).abs() < 1e-4, "expected bounce back to 3.0, got {time}");
    }

    #[test]
    fn time_scale_slows_the_clock() {
        let mut mixer = mixer();
        mixer.play(ActionId::Talking);
        mixer.set_time_scale(ActionId::Talking, 0.5);

        mixer.update(1.0);
        assert_eq!(mixer.time(ActionId::Talking), Some(0.5));
    }

    #[test]
    fn unknown_actions_are_ignored() {
        let mut mixer = mixer();
        mixer.play(ActionId::ThinkingLoop);
        mixer.fade_in(ActionId::ThinkingIntro, 0.35);

        assert!(!mixer.has_action(ActionId::ThinkingLoop));
        assert_eq!(mixer.weight(ActionId::ThinkingLoop), 0.0);
        assert!(mixer.update(0.1).is_empty());
    }
}
