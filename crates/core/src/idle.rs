//! Randomized idle behaviours: blinking, side glances and idle variants.
//!
//! The schedulers only decide *whether* a behaviour may run; the avatar owns
//! the timers and re-arms them after every firing, whether the guard passed
//! or not.

use std::time::Duration;

use rand::Rng;

use crate::expression::{LOOK_LEFT, LOOK_RIGHT};
use crate::mixer::ActionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub const fn millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    pub fn sample<G: Rng + ?Sized>(&self, rng: &mut G) -> Duration {
        let (lo, hi) = (self.min.as_millis() as u64, self.max.as_millis() as u64);
        if hi <= lo {
            return self.min;
        }
        Duration::from_millis(rng.gen_range(lo..=hi))
    }
}

#[derive(Debug, Clone)]
pub struct IdleTuning {
    pub blink_every: DelayRange,
    pub blink_close: Duration,
    pub blink_hold: Duration,
    pub blink_open: Duration,
    pub glance_every: DelayRange,
    pub glance_turn: Duration,
    pub glance_hold: DelayRange,
    pub glance_min_weight: f32,
    pub gaze_restore_after: Duration,
    pub variant_every: DelayRange,
}

impl Default for IdleTuning {
    fn default() -> Self {
        Self {
            blink_every: DelayRange::millis(2_000, 6_000),
            blink_close: Duration::from_millis(100),
            blink_hold: Duration::from_millis(120),
            blink_open: Duration::from_millis(150),
            glance_every: DelayRange::millis(5_000, 11_000),
            glance_turn: Duration::from_millis(500),
            glance_hold: DelayRange::millis(800, 2_000),
            glance_min_weight: 0.5,
            gaze_restore_after: Duration::from_millis(500),
            variant_every: DelayRange::millis(10_000, 15_000),
        }
    }
}

/// What the guards look at when a timer fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleContext {
    pub current: Option<ActionId>,
    pub talking: bool,
    pub text_output: bool,
    pub expression_held: bool,
    pub variant_loaded: bool,
}

pub fn can_blink(ctx: &IdleContext) -> bool {
    matches!(
        ctx.current,
        Some(ActionId::Idle | ActionId::TextingIntro | ActionId::TextingLoop)
    ) && !ctx.talking
        && !ctx.expression_held
}

pub fn can_glance(ctx: &IdleContext) -> bool {
    ctx.current == Some(ActionId::Idle) && !ctx.talking && !ctx.text_output
}

pub fn can_switch_variant(ctx: &IdleContext) -> bool {
    can_glance(ctx) && ctx.variant_loaded
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlanceSide {
    Left,
    Right,
}

impl GlanceSide {
    pub fn random<G: Rng + ?Sized>(rng: &mut G) -> Self {
        if rng.gen_bool(0.5) {
            GlanceSide::Left
        } else {
            GlanceSide::Right
        }
    }

    pub fn expression(self) -> &'static str {
        match self {
            GlanceSide::Left => LOOK_LEFT,
            GlanceSide::Right => LOOK_RIGHT,
        }
    }
}

/// Glance weight in `min..=1.0`.
pub fn glance_weight<G: Rng + ?Sized>(rng: &mut G, min: f32) -> f32 {
    if min >= 1.0 {
        return 1.0;
    }
    rng.gen_range(min..=1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn idle() -> IdleContext {
        IdleContext {
            current: Some(ActionId::Idle),
            variant_loaded: true,
            ..Default::default()
        }
    }

    #[test]
    fn delays_stay_inside_their_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let range = DelayRange::millis(2_000, 6_000);
        for _ in 0..200 {
            let delay = range.sample(&mut rng);
            assert!(delay >= range.min && delay <= range.max);
        }
    }

    #[test]
    fn blink_allowed_while_texting_but_not_while_talking_or_held() {
        let texting = IdleContext {
            current: Some(ActionId::TextingLoop),
            text_output: true,
            ..Default::default()
        };
        assert!(can_blink(&texting));
        assert!(!can_blink(&IdleContext {
            talking: true,
            ..idle()
        }));
        assert!(!can_blink(&IdleContext {
            expression_held: true,
            ..texting
        }));
        assert!(!can_blink(&IdleContext {
            current: Some(ActionId::ThinkingLoop),
            ..Default::default()
        }));
    }

    #[test]
    fn glance_and_variant_need_plain_idle() {
        assert!(can_glance(&idle()));
        assert!(can_switch_variant(&idle()));

        let texting = IdleContext {
            text_output: true,
            ..idle()
        };
        assert!(!can_glance(&texting));
        assert!(!can_switch_variant(&texting));

        let no_clip = IdleContext {
            variant_loaded: false,
            ..idle()
        };
        assert!(can_glance(&no_clip));
        assert!(!can_switch_variant(&no_clip));
    }

    #[test]
    fn glance_weight_is_at_least_half() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let w = glance_weight(&mut rng, 0.5);
            assert!((0.5..=1.0).contains(&w));
        }
    }
}
