use std::collections::BTreeMap;
use std::time::Duration;

use crate::expression::{ExpressionRig, RigExt};

#[derive(Debug, Clone)]
struct Tween {
    from: f32,
    to: f32,
    elapsed: Duration,
    duration: Duration,
}

impl Tween {
    fn value(&self) -> f32 {
        if self.duration.is_zero() {
            return self.to;
        }
        let t = (self.elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0);
        self.from + (self.to - self.from) * t
    }

    fn is_done(&self) -> bool {
        self.elapsed >= self.duration
    }
}

/// Linear expression tweens, at most one per expression.
#[derive(Debug, Default)]
pub struct ExpressionTweens {
    active: BTreeMap<String, Tween>,
}

impl ExpressionTweens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts moving `name` from its current value to `target`. Replaces any
    /// tween already running on the same expression.
    pub fn start<R: ExpressionRig + ?Sized>(
        &mut self,
        rig: &R,
        name: &str,
        target: f32,
        duration: Duration,
    ) {
        let tween = Tween {
            from: rig.value_or_zero(name),
            to: target,
            elapsed: Duration::ZERO,
            duration,
        };
        self.active.insert(name.to_string(), tween);
    }

    pub fn advance<R: ExpressionRig + ?Sized>(&mut self, rig: &mut R, dt: Duration) {
        self.active.retain(|name, tween| {
            tween.elapsed += dt;
            rig.set_or_log(name, tween.value());
            !tween.is_done()
        });
    }

    #[cfg(test)]
    fn is_active(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }
}
