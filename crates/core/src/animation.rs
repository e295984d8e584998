use crate::mixer::{ActionId, AnimationMixer};

/// Every transition blends over this many seconds.
pub const CROSS_FADE_SECONDS: f32 = 0.35;

/// Tracks the single current action and performs cross-faded transitions.
#[derive(Debug)]
pub struct AnimationDirector {
    current: Option<ActionId>,
    fade_seconds: f32,
}

impl Default for AnimationDirector {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationDirector {
    pub fn new() -> Self {
        Self {
            current: None,
            fade_seconds: CROSS_FADE_SECONDS,
        }
    }

    pub fn current(&self) -> Option<ActionId> {
        self.current
    }

    pub fn is_current(&self, id: ActionId) -> bool {
        self.current == Some(id)
    }

    /// Starts the base pose at full weight with no fade. Used once, when the
    /// clips finish loading.
    pub fn start<M: AnimationMixer + ?Sized>(&mut self, mixer: &mut M, id: ActionId) -> bool {
        if !mixer.has_action(id) {
            return false;
        }
        mixer.play(id);
        mixer.set_time_scale(id, id.time_scale());
        self.current = Some(id);
        true
    }

    /// Switches to `target`, cross-fading from the current action.
    ///
    /// Returns false when nothing changed: the target is already current or
    /// its clip never loaded.
    pub fn set_animation<M: AnimationMixer + ?Sized>(
        &mut self,
        mixer: &mut M,
        target: ActionId,
    ) -> bool {
        if !mixer.has_action(target) || self.current == Some(target) {
            return false;
        }

        mixer.play(target);
        match self.current {
            Some(previous) => mixer.cross_fade(previous, target, self.fade_seconds),
            None => mixer.fade_in(target, self.fade_seconds),
        }
        mixer.set_time_scale(target, target.time_scale());

        tracing::debug!(from = ?self.current, to = %target, "animation transition");
        self.current = Some(target);
        true
    }

    /// Which action follows a finished one-shot.
    pub fn successor(finished: ActionId, talking: bool) -> Option<ActionId> {
        match finished {
            ActionId::ThinkingIntro => Some(ActionId::ThinkingLoop),
            ActionId::TextingIntro => Some(ActionId::TextingLoop),
            ActionId::Waving if talking => Some(ActionId::Talking),
            ActionId::Waving => Some(ActionId::Idle),
            _ => None,
        }
    }

    /// Routes a finished event. Stale completions of actions that are no
    /// longer current are dropped so they cannot override a newer request.
    pub fn on_finished<M: AnimationMixer + ?Sized>(
        &mut self,
        mixer: &mut M,
        finished: ActionId,
        talking: bool,
    ) -> Option<ActionId> {
        if self.current != Some(finished) {
            return None;
        }
        let next = Self::successor(finished, talking)?;
        self.set_animation(mixer, next).then_some(next)
    }
}
