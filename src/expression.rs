//! Brief random brow and squint twitches while a viseme timeline is speaking.

use rand::{seq::SliceRandom, Rng};

use crate::{
    animator::TimerEvent,
    config::AnimationConfig,
    model::{FaceRig, MorphRef},
    registry::MorphTargetRegistry,
    scheduler::{Scheduler, TimerId},
};

#[derive(Debug, Default)]
pub struct ExpressionFlicker {
    /// Expressions currently raised and the timers that clear them.
    active: Vec<(MorphRef, TimerId)>,
}

impl ExpressionFlicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Maybe raise one random expression. Returns the raised blend shape, if any.
    pub fn frame<R: FaceRig + ?Sized, G: Rng + ?Sized>(
        &mut self,
        now_ms: f64,
        scheduler: &mut Scheduler<TimerEvent>,
        rng: &mut G,
        config: &AnimationConfig,
        registry: &MorphTargetRegistry,
        rig: &mut R,
    ) -> Option<MorphRef> {
        if !config.expression_flicker || registry.expressions.is_empty() {
            return None;
        }
        if !rng.gen_bool(config.flicker_probability.clamp(0.0, 1.0)) {
            return None;
        }

        let morph = registry.expressions.choose(rng)?.morph;
        let intensity = config.flicker_intensity.sample(rng) as f32;
        rig.set_influence(morph, intensity.clamp(0.0, 1.0));

        // Re-raising an expression pushes its clear time back
        if let Some(i) = self.active.iter().position(|(v, _)| *v == morph) {
            let (_, timer) = self.active.swap_remove(i);
            scheduler.cancel(timer);
        }
        let hold = config.flicker_hold_ms.sample(rng);
        let timer = scheduler.schedule(now_ms + hold, TimerEvent::ExpressionClear { morph });
        self.active.push((morph, timer));

        Some(morph)
    }

    pub fn on_clear<R: FaceRig + ?Sized>(&mut self, morph: MorphRef, rig: &mut R) {
        self.active.retain(|(v, _)| *v != morph);
        rig.set_influence(morph, 0.0);
    }

    /// Forget the raised expressions without writing them back. Timers are left to the caller.
    pub fn forget(&mut self) {
        self.active.clear();
    }

    /// Drop every raised expression immediately.
    pub fn clear_all<R: FaceRig + ?Sized>(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        rig: &mut R,
    ) {
        for (morph, timer) in self.active.drain(..) {
            scheduler.cancel(timer);
            rig.set_influence(morph, 0.0);
        }
    }
}
