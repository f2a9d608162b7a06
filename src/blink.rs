/*!
Idle eye blinking.

Open -> Closed -> Opening -> Open. The eyes snap shut, are held for a short random
time and then ramp open again over a few frames. Blinking only ever writes the eye
blink blend shapes, so it runs alongside any mouth session without coordination.
*/

use rand::Rng;

use crate::{
    animator::TimerEvent,
    config::AnimationConfig,
    model::FaceRig,
    registry::MorphTargetRegistry,
    scheduler::{Scheduler, TimerId},
};

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum BlinkPhase {
    #[default]
    Open,
    Closed,
    Opening {
        start_ms: f64,
    },
}

#[derive(Debug, Default)]
pub struct BlinkGenerator {
    phase: BlinkPhase,
    running: bool,
    timer: Option<TimerId>,
}

fn write_eyes<R: FaceRig + ?Sized>(registry: &MorphTargetRegistry, rig: &mut R, weight: f32) {
    for pair in registry.eye_blinks.iter() {
        rig.set_influence(pair.left, weight);
        rig.set_influence(pair.right, weight);
    }
}

impl BlinkGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> BlinkPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn schedule_next<G: Rng + ?Sized>(
        &mut self,
        now_ms: f64,
        scheduler: &mut Scheduler<TimerEvent>,
        rng: &mut G,
        config: &AnimationConfig,
    ) {
        let delay = config.blink_interval_ms.sample(rng);
        self.timer = Some(scheduler.schedule(now_ms + delay, TimerEvent::BlinkTrigger));
    }

    pub fn start<G: Rng + ?Sized>(
        &mut self,
        now_ms: f64,
        scheduler: &mut Scheduler<TimerEvent>,
        rng: &mut G,
        config: &AnimationConfig,
    ) {
        if self.running {
            return;
        }

        self.running = true;
        self.phase = BlinkPhase::Open;
        self.schedule_next(now_ms, scheduler, rng, config);
    }

    /// Stop blinking without touching the eyes. Any pending timer must be dropped by the caller.
    pub fn forget(&mut self) {
        self.timer = None;
        self.running = false;
        self.phase = BlinkPhase::Open;
    }

    /// Stop blinking and open the eyes.
    pub fn stop<R: FaceRig + ?Sized>(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        registry: &MorphTargetRegistry,
        rig: &mut R,
    ) {
        if let Some(timer) = self.timer.take() {
            scheduler.cancel(timer);
        }
        self.running = false;
        self.phase = BlinkPhase::Open;

        write_eyes(registry, rig, 0.0);
    }

    /// The blink timer fired. Blinks only pass the probability gate some of the time.
    pub fn on_trigger<R: FaceRig + ?Sized, G: Rng + ?Sized>(
        &mut self,
        now_ms: f64,
        scheduler: &mut Scheduler<TimerEvent>,
        rng: &mut G,
        config: &AnimationConfig,
        registry: &MorphTargetRegistry,
        rig: &mut R,
    ) {
        self.timer = None;
        if !self.running || self.phase != BlinkPhase::Open {
            return;
        }

        if rng.gen_bool(config.blink_probability.clamp(0.0, 1.0)) {
            self.close(now_ms, scheduler, rng, config, registry, rig);
        } else {
            self.schedule_next(now_ms, scheduler, rng, config);
        }
    }

    /// Blink right now, skipping the probability gate. Ignored mid-blink.
    pub fn close<R: FaceRig + ?Sized, G: Rng + ?Sized>(
        &mut self,
        now_ms: f64,
        scheduler: &mut Scheduler<TimerEvent>,
        rng: &mut G,
        config: &AnimationConfig,
        registry: &MorphTargetRegistry,
        rig: &mut R,
    ) {
        if self.phase != BlinkPhase::Open {
            return;
        }
        if let Some(timer) = self.timer.take() {
            scheduler.cancel(timer);
        }

        write_eyes(registry, rig, 1.0);
        self.phase = BlinkPhase::Closed;

        let hold = config.blink_hold_ms.sample(rng);
        self.timer = Some(scheduler.schedule(now_ms + hold, TimerEvent::BlinkReopen));
    }

    pub fn on_reopen(&mut self, now_ms: f64) {
        self.timer = None;
        if self.phase == BlinkPhase::Closed {
            self.phase = BlinkPhase::Opening { start_ms: now_ms };
        }
    }

    /// Advance the reopening ramp.
    pub fn frame<R: FaceRig + ?Sized, G: Rng + ?Sized>(
        &mut self,
        now_ms: f64,
        scheduler: &mut Scheduler<TimerEvent>,
        rng: &mut G,
        config: &AnimationConfig,
        registry: &MorphTargetRegistry,
        rig: &mut R,
    ) {
        let BlinkPhase::Opening { start_ms } = self.phase else {
            return;
        };

        let progress = if config.blink_reopen_ms > 0.0 {
            ((now_ms - start_ms) / config.blink_reopen_ms).clamp(0.0, 1.0)
        } else {
            1.0
        };
        write_eyes(registry, rig, (1.0 - progress) as f32);

        if progress >= 1.0 {
            self.phase = BlinkPhase::Open;
            if self.running {
                self.schedule_next(now_ms, scheduler, rng, config);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{
        config::{CandidateTable, Span},
        model::{MemoryRig, MeshId},
        registry::tests::full_rig,
        Logger,
    };

    struct Fixture {
        rig: MemoryRig,
        head: MeshId,
        registry: MorphTargetRegistry,
        scheduler: Scheduler<TimerEvent>,
        rng: StdRng,
        config: AnimationConfig,
        blink: BlinkGenerator,
    }

    impl Fixture {
        fn new(config: AnimationConfig) -> Self {
            let (rig, head) = full_rig();
            let registry =
                MorphTargetRegistry::scan(&rig, &CandidateTable::default(), &Logger::create("BlinkTest"));

            Self {
                rig,
                head,
                registry,
                scheduler: Scheduler::new(),
                rng: StdRng::seed_from_u64(11),
                config,
                blink: BlinkGenerator::new(),
            }
        }

        /// Fire due timers, then run the frame, like the animator tick does.
        fn tick(&mut self, now_ms: f64) {
            for event in self.scheduler.drain_due(now_ms) {
                match event {
                    TimerEvent::BlinkTrigger => self.blink.on_trigger(
                        now_ms,
                        &mut self.scheduler,
                        &mut self.rng,
                        &self.config,
                        &self.registry,
                        &mut self.rig,
                    ),
                    TimerEvent::BlinkReopen => self.blink.on_reopen(now_ms),
                    _ => {}
                }
            }
            self.blink.frame(
                now_ms,
                &mut self.scheduler,
                &mut self.rng,
                &self.config,
                &self.registry,
                &mut self.rig,
            );
        }

        fn eyes(&self) -> (f32, f32) {
            (
                self.rig.weight(self.head, "eyeBlinkLeft"),
                self.rig.weight(self.head, "eyeBlinkRight"),
            )
        }
    }

    fn always_blink() -> AnimationConfig {
        AnimationConfig {
            blink_interval_ms: Span::new(1000.0, 1000.0),
            blink_probability: 1.0,
            blink_hold_ms: Span::new(200.0, 200.0),
            blink_reopen_ms: 80.0,
            ..Default::default()
        }
    }

    #[test]
    fn full_cycle() {
        let mut f = Fixture::new(always_blink());
        f.blink.start(0.0, &mut f.scheduler, &mut f.rng, &f.config);

        f.tick(999.0);
        assert_eq!(f.eyes(), (0.0, 0.0));
        assert_eq!(f.blink.phase(), BlinkPhase::Open);

        f.tick(1000.0);
        assert_eq!(f.eyes(), (1.0, 1.0));
        assert_eq!(f.blink.phase(), BlinkPhase::Closed);

        // Reopen fires at 1200 and the ramp starts on the same tick
        f.tick(1200.0);
        assert_eq!(f.blink.phase(), BlinkPhase::Opening { start_ms: 1200.0 });
        assert_eq!(f.eyes(), (1.0, 1.0));

        f.tick(1240.0);
        let (left, right) = f.eyes();
        assert!((left - 0.5).abs() < 1e-6);
        assert_eq!(left, right);

        f.tick(1280.0);
        assert_eq!(f.eyes(), (0.0, 0.0));
        assert_eq!(f.blink.phase(), BlinkPhase::Open);

        // And the next one is scheduled another interval later
        f.tick(2279.0);
        assert_eq!(f.blink.phase(), BlinkPhase::Open);
        f.tick(2280.0);
        assert_eq!(f.blink.phase(), BlinkPhase::Closed);
    }

    #[test]
    fn probability_gate_skips() {
        let mut f = Fixture::new(AnimationConfig {
            blink_probability: 0.0,
            ..always_blink()
        });
        f.blink.start(0.0, &mut f.scheduler, &mut f.rng, &f.config);

        for i in 1..=5 {
            f.tick(i as f64 * 1000.0);
            assert_eq!(f.eyes(), (0.0, 0.0));
        }
        assert_eq!(f.scheduler.len(), 1);
    }

    #[test]
    fn stop_opens_eyes_and_cancels() {
        let mut f = Fixture::new(always_blink());
        f.blink.start(0.0, &mut f.scheduler, &mut f.rng, &f.config);
        f.tick(1000.0);
        assert_eq!(f.eyes(), (1.0, 1.0));

        f.blink.stop(&mut f.scheduler, &f.registry, &mut f.rig);

        assert_eq!(f.eyes(), (0.0, 0.0));
        assert!(f.scheduler.is_empty());
        assert!(!f.blink.is_running());

        f.tick(10_000.0);
        assert_eq!(f.eyes(), (0.0, 0.0));
    }

    #[test]
    fn start_twice_schedules_once() {
        let mut f = Fixture::new(always_blink());
        f.blink.start(0.0, &mut f.scheduler, &mut f.rng, &f.config);
        f.blink.start(0.0, &mut f.scheduler, &mut f.rng, &f.config);

        assert_eq!(f.scheduler.len(), 1);
    }

    #[test]
    fn manual_close_mid_blink_is_ignored() {
        let mut f = Fixture::new(always_blink());
        f.blink.start(0.0, &mut f.scheduler, &mut f.rng, &f.config);
        f.tick(1000.0);

        f.blink.close(
            1100.0,
            &mut f.scheduler,
            &mut f.rng,
            &f.config,
            &f.registry,
            &mut f.rig,
        );

        f.tick(1200.0);
        assert_eq!(f.blink.phase(), BlinkPhase::Opening { start_ms: 1200.0 });
    }

    #[test]
    fn blink_leaves_mouth_alone() {
        let mut f = Fixture::new(always_blink());
        let mouth = f.registry.mouth_morphs();
        for (i, morph) in mouth.iter().enumerate() {
            f.rig.set_influence(*morph, i as f32 / 20.0);
        }
        let before = mouth.iter().map(|v| f.rig.influence(*v)).collect::<Vec<_>>();

        f.blink.start(0.0, &mut f.scheduler, &mut f.rng, &f.config);
        for i in 0..200 {
            f.tick(i as f64 * 16.0);
        }

        let after = mouth.iter().map(|v| f.rig.influence(*v)).collect::<Vec<_>>();
        assert_eq!(before, after);
    }
}
