//! The per-avatar state machine.
//!
//! [`Avatar`] owns every moving part of one companion: the animation mixer,
//! the expression rig, the idle timers, the active emotion and the viseme
//! queue. It is advanced once per frame by the runtime and mutated between
//! frames through [`Command`]s, so all of its state lives on a single thread
//! of control.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::oneshot;

use crate::Command;
use crate::animation::AnimationDirector;
use crate::expression::{
    ALLOWED_EMOTIONS, BLINK, BindMaps, Emotion, ExpressionRig, RigExt, apply_emotion_full,
    apply_emotion_non_mouth,
};
use crate::idle::{
    GlanceSide, IdleContext, IdleTuning, can_blink, can_glance, can_switch_variant,
    glance_weight,
};
use crate::mixer::{ActionId, AnimationMixer};
use crate::speech::Utterance;
use crate::timers::TimerQueue;
use crate::tween::ExpressionTweens;
use crate::viseme::VisemeDriver;

/// Delay between the end of loading and the greeting wave.
pub const STARTUP_WAVE_DELAY: Duration = Duration::from_millis(750);

/// The emotion of a text reply is released this long before its bubble hides.
pub const EMOTION_RELEASE_LEAD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AvatarTimer {
    Blink,
    BlinkOpen,
    Glance,
    GlanceReturn(GlanceSide),
    GazeRestore,
    IdleVariant,
    IdleVariantEnd,
    StartupWave,
    ReleaseEmotion(u64),
    SpeechEnd(u64),
}

pub struct Avatar<M, R, G = StdRng> {
    mixer: M,
    rig: R,
    rng: G,
    tuning: IdleTuning,
    director: AnimationDirector,
    bind_maps: BindMaps,
    tweens: ExpressionTweens,
    visemes: VisemeDriver,
    timers: TimerQueue<AvatarTimer>,
    emotion: Emotion,
    talking: bool,
    text_output: bool,
    expression_held: bool,
    animations_ready: bool,
    playback_start: Option<Duration>,
    speech_done: Option<oneshot::Sender<()>>,
    speech_generation: u64,
    hold_generation: u64,
}

impl<M, R> Avatar<M, R, StdRng>
where
    M: AnimationMixer + Default,
    R: ExpressionRig,
{
    /// An avatar with default idle tuning. A seed makes idle behaviour
    /// reproducible.
    pub fn seeded(rig: R, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(rig, rng, IdleTuning::default())
    }
}

impl<M, R, G> Avatar<M, R, G>
where
    M: AnimationMixer + Default,
    R: ExpressionRig,
    G: Rng,
{
    /// Wraps a freshly loaded model. Blinking and glancing start right away;
    /// animations arrive later through [`Avatar::load_animations`].
    pub fn new(mut rig: R, rng: G, tuning: IdleTuning) -> Self {
        let bind_maps = BindMaps::build(&rig);
        let emotion = Emotion::relaxed();
        rig.set_or_log(&emotion.name, emotion.weight);

        let mut avatar = Self {
            mixer: M::default(),
            rig,
            rng,
            tuning,
            director: AnimationDirector::new(),
            bind_maps,
            tweens: ExpressionTweens::new(),
            visemes: VisemeDriver::new(),
            timers: TimerQueue::new(),
            emotion,
            talking: false,
            text_output: false,
            expression_held: false,
            animations_ready: false,
            playback_start: None,
            speech_done: None,
            speech_generation: 0,
            hold_generation: 0,
        };
        avatar.arm_blink();
        avatar.arm_glance();
        avatar
    }
}

impl<M, R, G> Avatar<M, R, G>
where
    M: AnimationMixer,
    R: ExpressionRig,
    G: Rng,
{
    /// Installs the clip actions, starts the base idle pose and queues the
    /// greeting wave.
    pub fn load_animations(&mut self, mixer: M) {
        self.mixer = mixer;
        self.animations_ready = true;

        let start = if self.text_output && self.mixer.has_action(ActionId::TextingLoop) {
            ActionId::TextingLoop
        } else {
            ActionId::Idle
        };
        if !self.director.start(&mut self.mixer, start) {
            tracing::warn!("no base animation loaded; the avatar will hold its bind pose");
        }

        self.arm_idle_variant();
        self.timers
            .schedule(STARTUP_WAVE_DELAY, AvatarTimer::StartupWave);
    }

    pub fn is_ready(&self) -> bool {
        self.animations_ready
    }

    pub fn current_action(&self) -> Option<ActionId> {
        self.director.current()
    }

    pub fn emotion(&self) -> &Emotion {
        &self.emotion
    }

    pub fn is_talking(&self) -> bool {
        self.talking
    }

    pub fn text_output(&self) -> bool {
        self.text_output
    }

    pub fn expression_held(&self) -> bool {
        self.expression_held
    }

    pub fn mixer(&self) -> &M {
        &self.mixer
    }

    pub fn rig(&self) -> &R {
        &self.rig
    }

    /// Time on the avatar's frame clock.
    pub fn now(&self) -> Duration {
        self.timers.now()
    }

    fn idle_context(&self) -> IdleContext {
        IdleContext {
            current: self.director.current(),
            talking: self.talking,
            text_output: self.text_output,
            expression_held: self.expression_held,
            variant_loaded: self.mixer.has_action(ActionId::IdleVariant),
        }
    }

    /// Advances the avatar by one frame.
    pub fn frame(&mut self, dt: Duration) {
        self.timers.advance(dt);
        while let Some(timer) = self.timers.pop_due() {
            self.fire(timer);
        }

        for finished in self.mixer.update(dt.as_secs_f32()) {
            if let Some(next) = self
                .director
                .on_finished(&mut self.mixer, finished, self.talking)
            {
                tracing::debug!(%finished, %next, "one-shot finished");
            }
        }

        self.tweens.advance(&mut self.rig, dt);
        self.blend_expressions();
        self.rig.update();
    }

    fn blend_expressions(&mut self) {
        for name in ALLOWED_EMOTIONS {
            if name != self.emotion.name {
                self.rig.set_or_log(name, 0.0);
            }
        }

        if self.talking {
            apply_emotion_non_mouth(&mut self.rig, &self.bind_maps, &self.emotion);
            if let Some(start) = self.playback_start {
                let elapsed = self.timers.now().saturating_sub(start).as_secs_f32();
                self.visemes.drive(&mut self.rig, elapsed);
            }
        } else {
            self.visemes.release(&mut self.rig);
            apply_emotion_full(&mut self.rig, &self.bind_maps, &self.emotion);
        }
    }

    fn arm_blink(&mut self) {
        let delay = self.tuning.blink_every.sample(&mut self.rng);
        self.timers.schedule(delay, AvatarTimer::Blink);
    }

    fn arm_glance(&mut self) {
        let delay = self.tuning.glance_every.sample(&mut self.rng);
        self.timers.schedule(delay, AvatarTimer::Glance);
    }

    fn arm_idle_variant(&mut self) {
        let delay = self.tuning.variant_every.sample(&mut self.rng);
        self.timers.schedule(delay, AvatarTimer::IdleVariant);
    }

    fn fire(&mut self, timer: AvatarTimer) {
        match timer {
            AvatarTimer::Blink => {
                if can_blink(&self.idle_context()) {
                    self.tweens
                        .start(&self.rig, BLINK, 1.0, self.tuning.blink_close);
                    self.timers
                        .schedule(self.tuning.blink_hold, AvatarTimer::BlinkOpen);
                }
                self.arm_blink();
            }
            AvatarTimer::BlinkOpen => {
                self.tweens
                    .start(&self.rig, BLINK, 0.0, self.tuning.blink_open);
            }
            AvatarTimer::Glance => {
                if can_glance(&self.idle_context()) {
                    let side = GlanceSide::random(&mut self.rng);
                    let weight = glance_weight(&mut self.rng, self.tuning.glance_min_weight);
                    let hold = self.tuning.glance_hold.sample(&mut self.rng);

                    self.rig.set_look_at_auto_update(false);
                    self.tweens
                        .start(&self.rig, side.expression(), weight, self.tuning.glance_turn);
                    self.timers.schedule(hold, AvatarTimer::GlanceReturn(side));
                    tracing::trace!(?side, weight, "side glance");
                }
                self.arm_glance();
            }
            AvatarTimer::GlanceReturn(side) => {
                self.tweens
                    .start(&self.rig, side.expression(), 0.0, self.tuning.glance_turn);
                self.timers
                    .schedule(self.tuning.gaze_restore_after, AvatarTimer::GazeRestore);
            }
            AvatarTimer::GazeRestore => self.rig.set_look_at_auto_update(true),
            AvatarTimer::IdleVariant => {
                if can_switch_variant(&self.idle_context())
                    && self
                        .director
                        .set_animation(&mut self.mixer, ActionId::IdleVariant)
                {
                    let seconds = self.mixer.duration(ActionId::IdleVariant).unwrap_or(0.0);
                    let duration = Duration::try_from_secs_f32(seconds).unwrap_or_default();
                    self.timers.schedule(duration, AvatarTimer::IdleVariantEnd);
                }
                self.arm_idle_variant();
            }
            AvatarTimer::IdleVariantEnd => {
                if self.director.is_current(ActionId::IdleVariant) {
                    self.director.set_animation(&mut self.mixer, ActionId::Idle);
                }
            }
            AvatarTimer::StartupWave => {
                self.director.set_animation(&mut self.mixer, ActionId::Waving);
            }
            AvatarTimer::ReleaseEmotion(generation) => {
                if generation == self.hold_generation {
                    self.emotion = Emotion::relaxed();
                    self.expression_held = false;
                }
            }
            AvatarTimer::SpeechEnd(generation) => {
                if generation == self.speech_generation {
                    self.end_talking();
                }
            }
        }
    }

    /// Applies a runtime command. Bubble commands belong to the presenter
    /// and are ignored here.
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::BeginThinking => self.begin_thinking(),
            Command::Settle => self.settle(),
            Command::ShowTextReply { emotion, duration } => self.show_text_reply(emotion, duration),
            Command::StartTalking(emotion) => self.start_talking(emotion),
            Command::Speak {
                utterance,
                greeting,
                done,
            } => self.speak(&utterance, greeting, done),
            Command::EndTalking => self.end_talking(),
            Command::SetTextOutput(on) => self.set_text_output(on),
            Command::ShowBubble { .. } | Command::HideBubble(_) => {}
        }
    }

    pub fn begin_thinking(&mut self) {
        self.director
            .set_animation(&mut self.mixer, ActionId::ThinkingIntro);
    }

    /// Leaves the thinking pose for the resting action of the current output
    /// mode. Does nothing when the avatar is not thinking.
    pub fn settle(&mut self) {
        if !matches!(
            self.director.current(),
            Some(ActionId::ThinkingIntro | ActionId::ThinkingLoop)
        ) {
            return;
        }
        let rested = self.text_output
            && self
                .director
                .set_animation(&mut self.mixer, ActionId::TextingLoop);
        if !rested {
            self.director.set_animation(&mut self.mixer, ActionId::Idle);
        }
    }

    /// Holds `emotion` for a text reply whose bubble stays up for
    /// `bubble_duration`.
    pub fn show_text_reply(&mut self, emotion: Emotion, bubble_duration: Duration) {
        self.emotion = emotion;
        self.expression_held = true;
        self.hold_generation += 1;
        self.timers.schedule(
            bubble_duration.saturating_sub(EMOTION_RELEASE_LEAD),
            AvatarTimer::ReleaseEmotion(self.hold_generation),
        );
    }

    pub fn start_talking(&mut self, emotion: Emotion) {
        self.talking = true;
        self.emotion = emotion;
    }

    /// Starts playback bookkeeping for `utterance`: visemes are timed from
    /// now, and `done` fires when the last clip ends.
    pub fn speak(&mut self, utterance: &Utterance, greeting: bool, done: oneshot::Sender<()>) {
        self.talking = true;
        self.visemes.clear();
        self.visemes.enqueue(utterance.visemes());
        self.playback_start = Some(self.timers.now());
        self.speech_done = Some(done);
        self.speech_generation += 1;

        let duration = Duration::try_from_secs_f32(utterance.duration()).unwrap_or_default();
        self.timers
            .schedule(duration, AvatarTimer::SpeechEnd(self.speech_generation));

        let waved = greeting && self.director.set_animation(&mut self.mixer, ActionId::Waving);
        if !waved {
            self.director.set_animation(&mut self.mixer, ActionId::Talking);
        }
        tracing::debug!(
            seconds = utterance.duration(),
            clips = utterance.clips.len(),
            greeting,
            "speech started"
        );
    }

    pub fn end_talking(&mut self) {
        self.talking = false;
        self.emotion = Emotion::relaxed();
        self.playback_start = None;
        self.visemes.clear();
        self.speech_generation += 1;
        if let Some(done) = self.speech_done.take() {
            let _ = done.send(());
        }

        if self.director.is_current(ActionId::Talking) {
            self.director.set_animation(&mut self.mixer, ActionId::Idle);
        }
        self.settle();
    }

    pub fn set_text_output(&mut self, on: bool) {
        self.text_output = on;
        let target = if on {
            ActionId::TextingIntro
        } else {
            ActionId::Idle
        };
        self.director.set_animation(&mut self.mixer, target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clips::{ClipLibrary, ClipSlot, RawClip};
    use crate::expression::VirtualRig;
    use crate::idle::DelayRange;
    use crate::mixer::BlendMixer;
    use crate::speech::{PCM_SAMPLE_RATE, SpeechClip};
    use crate::viseme::{MouthShape, Viseme};

    const STEP: Duration = Duration::from_millis(10);

    type TestAvatar = Avatar<BlendMixer, VirtualRig, StdRng>;

    fn library(skip: &[ClipSlot]) -> ClipLibrary {
        let mut library = ClipLibrary::new();
        for slot in ClipSlot::ALL.into_iter().filter(|s| !skip.contains(s)) {
            library.insert(
                slot,
                RawClip {
                    name: slot.file_stem().to_string(),
                    duration: 2.0,
                },
            );
        }
        library
    }

    fn avatar_from(tuning: IdleTuning, library: ClipLibrary) -> TestAvatar {
        let mut avatar = Avatar::new(VirtualRig::standard(), StdRng::seed_from_u64(11), tuning);
        avatar.load_animations(library.into_mixer());
        avatar
    }

    /// Without a waving clip, so the startup greeting does not interfere.
    fn avatar_with(tuning: IdleTuning) -> TestAvatar {
        avatar_from(tuning, library(&[ClipSlot::Waving]))
    }

    fn quiet_tuning() -> IdleTuning {
        IdleTuning {
            blink_every: DelayRange::millis(600_000, 600_000),
            glance_every: DelayRange::millis(600_000, 600_000),
            variant_every: DelayRange::millis(600_000, 600_000),
            ..IdleTuning::default()
        }
    }

    fn run(avatar: &mut TestAvatar, duration: Duration) {
        let steps = duration.as_millis() / STEP.as_millis();
        for _ in 0..steps {
            avatar.frame(STEP);
        }
    }

    fn utterance(seconds: usize) -> Utterance {
        Utterance::new(vec![SpeechClip {
            text: "hello".to_string(),
            samples: vec![0.0; seconds * PCM_SAMPLE_RATE as usize],
            sample_rate: PCM_SAMPLE_RATE,
            visemes: vec![
                Viseme {
                    shape: MouthShape::A,
                    time: 0.2,
                },
                Viseme {
                    shape: MouthShape::O,
                    time: 0.6,
                },
            ],
        }])
    }

    #[test]
    fn loading_starts_idle_then_waves() {
        let mut avatar = avatar_from(quiet_tuning(), library(&[]));
        assert_eq!(avatar.current_action(), Some(ActionId::Idle));
        assert_eq!(avatar.mixer().weight(ActionId::Idle), 1.0);

        run(&mut avatar, Duration::from_millis(800));
        assert_eq!(avatar.current_action(), Some(ActionId::Waving));

        // 2.0 s clip trimmed to 1.1 s, then back to idle.
        run(&mut avatar, Duration::from_millis(1_300));
        assert_eq!(avatar.current_action(), Some(ActionId::Idle));
    }

    #[test]
    fn blinks_while_idle() {
        let tuning = IdleTuning {
            blink_every: DelayRange::millis(1_000, 1_000),
            ..quiet_tuning()
        };
        let mut avatar = avatar_with(tuning);

        run(&mut avatar, Duration::from_millis(1_100));
        assert_eq!(avatar.rig().value_or_zero(BLINK), 1.0);

        run(&mut avatar, Duration::from_millis(400));
        assert_eq!(avatar.rig().value_or_zero(BLINK), 0.0);
    }

    #[test]
    fn no_blink_while_talking() {
        let tuning = IdleTuning {
            blink_every: DelayRange::millis(500, 500),
            ..quiet_tuning()
        };
        let mut avatar = avatar_with(tuning);
        avatar.start_talking(Emotion::new("happy", 1.0));

        for _ in 0..150 {
            avatar.frame(STEP);
            assert_eq!(avatar.rig().value_or_zero(BLINK), 0.0);
        }
    }

    #[test]
    fn glance_turns_away_and_restores_auto_gaze() {
        let tuning = IdleTuning {
            glance_every: DelayRange::millis(1_000, 1_000),
            glance_hold: DelayRange::millis(1_000, 1_000),
            ..quiet_tuning()
        };
        let mut avatar = avatar_with(tuning);
        avatar.tuning.glance_every = DelayRange::millis(600_000, 600_000);

        run(&mut avatar, Duration::from_millis(1_600));
        assert!(!avatar.rig().look_at_auto_update());
        let gaze = avatar.rig().value_or_zero("lookLeft") + avatar.rig().value_or_zero("lookRight");
        assert!(gaze >= 0.5, "expected a glance, got {gaze}");

        run(&mut avatar, Duration::from_millis(1_100));
        assert!(avatar.rig().look_at_auto_update());
        assert_eq!(avatar.rig().value_or_zero("lookLeft"), 0.0);
        assert_eq!(avatar.rig().value_or_zero("lookRight"), 0.0);
    }

    #[test]
    fn idle_variant_returns_to_idle_after_its_duration() {
        let tuning = IdleTuning {
            variant_every: DelayRange::millis(1_000, 1_000),
            ..quiet_tuning()
        };
        let mut avatar = avatar_with(tuning);

        run(&mut avatar, Duration::from_millis(1_050));
        assert_eq!(avatar.current_action(), Some(ActionId::IdleVariant));

        run(&mut avatar, Duration::from_millis(2_000));
        assert_eq!(avatar.current_action(), Some(ActionId::Idle));
    }

    #[test]
    fn idle_variant_is_skipped_in_text_mode() {
        let tuning = IdleTuning {
            variant_every: DelayRange::millis(1_000, 1_000),
            ..quiet_tuning()
        };
        let mut avatar = avatar_with(tuning);
        avatar.set_text_output(true);

        run(&mut avatar, Duration::from_millis(1_500));
        assert_ne!(avatar.current_action(), Some(ActionId::IdleVariant));
    }

    #[test]
    fn speech_drives_visemes_and_ends_on_its_own() {
        let mut avatar = avatar_with(quiet_tuning());
        let (done_tx, mut done_rx) = oneshot::channel();

        // Arrange
        avatar.begin_thinking();
        avatar.start_talking(Emotion::new("happy", 0.9));

        // Act
        avatar.speak(&utterance(1), false, done_tx);
        run(&mut avatar, Duration::from_millis(300));

        // Assert
        assert_eq!(avatar.current_action(), Some(ActionId::Talking));
        assert_eq!(avatar.rig().value_or_zero("aa"), 1.0);
        assert_eq!(avatar.rig().morph_influence(0, "Fcl_MTH_Joy"), Some(0.0));
        assert!(avatar.rig().morph_influence(0, "Fcl_EYE_Joy").unwrap() > 0.8);

        run(&mut avatar, Duration::from_millis(400));
        assert_eq!(avatar.rig().value_or_zero("aa"), 0.0);
        assert_eq!(avatar.rig().value_or_zero("oh"), 1.0);

        run(&mut avatar, Duration::from_millis(400));
        assert!(!avatar.is_talking());
        assert_eq!(avatar.emotion(), &Emotion::relaxed());
        assert_eq!(avatar.current_action(), Some(ActionId::Idle));
        assert_eq!(avatar.rig().value_or_zero("oh"), 0.0);
        assert!(done_rx.try_recv().is_ok());
    }

    #[test]
    fn greeting_waves_before_talking() {
        let mut avatar = avatar_from(quiet_tuning(), library(&[]));
        let (done_tx, _done_rx) = oneshot::channel();
        avatar.begin_thinking();
        avatar.start_talking(Emotion::relaxed());

        avatar.speak(&utterance(3), true, done_tx);
        assert_eq!(avatar.current_action(), Some(ActionId::Waving));

        run(&mut avatar, Duration::from_millis(1_200));
        assert_eq!(avatar.current_action(), Some(ActionId::Talking));
    }

    #[test]
    fn ending_without_clips_settles_the_thinking_pose() {
        let mut avatar = avatar_with(quiet_tuning());
        avatar.begin_thinking();
        avatar.start_talking(Emotion::new("sad", 1.0));

        avatar.end_talking();

        assert_eq!(avatar.current_action(), Some(ActionId::Idle));
        assert!(!avatar.is_talking());
    }

    #[test]
    fn text_reply_holds_emotion_until_shortly_before_bubble_hides() {
        let mut avatar = avatar_with(quiet_tuning());
        avatar.set_text_output(true);
        avatar.begin_thinking();

        avatar.show_text_reply(Emotion::new("Surprise", 0.7), Duration::from_secs(4));
        avatar.settle();
        assert_eq!(avatar.current_action(), Some(ActionId::TextingLoop));

        run(&mut avatar, Duration::from_millis(3_400));
        assert!(avatar.expression_held());
        assert_eq!(avatar.rig().value_or_zero("Surprise"), 0.7);

        run(&mut avatar, Duration::from_millis(200));
        assert!(!avatar.expression_held());
        assert_eq!(avatar.emotion(), &Emotion::relaxed());
        assert_eq!(avatar.rig().value_or_zero("Surprise"), 0.0);
    }

    #[test]
    fn newer_text_reply_keeps_its_own_hold() {
        let mut avatar = avatar_with(quiet_tuning());
        avatar.show_text_reply(Emotion::new("sad", 1.0), Duration::from_secs(4));
        run(&mut avatar, Duration::from_secs(3));
        avatar.show_text_reply(Emotion::new("happy", 1.0), Duration::from_secs(4));

        run(&mut avatar, Duration::from_secs(1));
        assert!(avatar.expression_held());
        assert_eq!(avatar.emotion().name, "happy");
    }

    #[test]
    fn only_the_active_emotion_is_non_zero() {
        let mut avatar = avatar_with(quiet_tuning());
        avatar.show_text_reply(Emotion::new("angry", 1.0), Duration::from_secs(10));
        avatar.frame(STEP);

        for name in ALLOWED_EMOTIONS {
            let expected = if name == "angry" { 1.0 } else { 0.0 };
            assert_eq!(avatar.rig().value_or_zero(name), expected, "{name}");
        }
    }

    #[test]
    fn text_output_toggle_switches_base_animation() {
        let mut avatar = avatar_with(quiet_tuning());

        avatar.apply(Command::SetTextOutput(true));
        assert_eq!(avatar.current_action(), Some(ActionId::TextingIntro));
        // 0.5 s intro at 0.8x speed.
        run(&mut avatar, Duration::from_millis(700));
        assert_eq!(avatar.current_action(), Some(ActionId::TextingLoop));

        avatar.apply(Command::SetTextOutput(false));
        assert_eq!(avatar.current_action(), Some(ActionId::Idle));
    }
}
