/*!
The facial animation component.

An [Animator] owns everything the animation core needs besides the rig itself: the
registry of discovered controls, the single active mouth session, the idle blink
generator and the timers. The host calls [Animator::tick] once per rendered frame
and passes its rig in, so nothing here ever holds on to engine objects.

At most one mouth session exists at a time. Every `drive_*` call and every stop
advances a shared generation counter; a session, its frames and its safety timer
are only honored while their token matches the generation.
*/

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use rand::{rngs::StdRng, SeedableRng};

use crate::{
    apply,
    blink::BlinkGenerator,
    config::AnimationConfig,
    drivers::{
        amplitude::{estimated_playback_ms, estimated_syllables},
        AmplitudeDriver, AmplitudeSource, SpectrumSource, TimelineDriver,
    },
    expression::ExpressionFlicker,
    mapper,
    model::{FaceRig, MorphRef, VisemeTimeline},
    registry::MorphTargetRegistry,
    scheduler::{Scheduler, TimerId},
    Logger,
};

/// Everything that can be scheduled on the animator's timers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerEvent {
    /// Forced end of a session, in case its frames stopped running.
    SessionTimeout { token: u64 },
    BlinkTrigger,
    BlinkReopen,
    ExpressionClear { morph: MorphRef },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Amplitude,
    VisemeTimeline,
}

enum SessionDriver {
    Amplitude(AmplitudeDriver),
    Timeline(TimelineDriver),
}

struct Session {
    token: u64,
    start_ms: f64,
    duration_ms: f64,
    driver: SessionDriver,
    safety_timer: TimerId,
}

impl Session {
    fn mode(&self) -> SessionMode {
        match self.driver {
            SessionDriver::Amplitude(_) => SessionMode::Amplitude,
            SessionDriver::Timeline(_) => SessionMode::VisemeTimeline,
        }
    }
}

/// Returned by every `drive_*` call. Stays valid after the session ends, but then
/// reports that it is no longer active.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    token: u64,
    mode: SessionMode,
    generation: Arc<AtomicU64>,
}

impl SessionHandle {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.generation.load(Ordering::Acquire) == self.token
    }
}

pub struct Animator {
    config: AnimationConfig,
    logger: Logger,
    rng: StdRng,

    registry: MorphTargetRegistry,
    ready: bool,

    scheduler: Scheduler<TimerEvent>,
    generation: Arc<AtomicU64>,
    session: Option<Session>,
    /// Token of the session that asked for the next frame.
    pending_frame: Option<u64>,

    blink: BlinkGenerator,
    flicker: ExpressionFlicker,
}

impl Animator {
    pub fn new(config: AnimationConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// An animator with deterministic randomness.
    pub fn with_seed(config: AnimationConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: AnimationConfig, rng: StdRng) -> Self {
        Self {
            config,
            logger: Logger::create("Animator"),
            rng,

            registry: MorphTargetRegistry::default(),
            ready: false,

            scheduler: Scheduler::new(),
            generation: Arc::new(AtomicU64::new(0)),
            session: None,
            pending_frame: None,

            blink: BlinkGenerator::new(),
            flicker: ExpressionFlicker::new(),
        }
    }

    pub fn config(&self) -> &AnimationConfig {
        &self.config
    }

    /// Replace the tuning constants. Applies to the next session, the running one keeps going.
    pub fn set_config(&mut self, config: AnimationConfig) {
        self.config = config;
    }

    pub fn registry(&self) -> &MorphTargetRegistry {
        &self.registry
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn session_mode(&self) -> Option<SessionMode> {
        self.session.as_ref().map(Session::mode)
    }

    pub fn is_speaking(&self) -> bool {
        self.session.is_some()
    }

    pub fn blink(&self) -> &BlinkGenerator {
        &self.blink
    }

    /// The model finished loading. Scans it and starts blinking.
    pub fn on_model_ready<R: FaceRig + ?Sized>(&mut self, rig: &mut R, now_ms: f64) {
        if self.ready {
            self.logger
                .debug("Model replaced, dropping the previous model's state");
            self.detach();
        }

        self.registry = MorphTargetRegistry::scan(rig, &self.config.candidates, &self.logger);
        self.ready = true;

        self.blink
            .start(now_ms, &mut self.scheduler, &mut self.rng, &self.config);
    }

    /// Cancel every session and timer and open the eyes.
    pub fn on_teardown<R: FaceRig + ?Sized>(&mut self, rig: &mut R) {
        self.stop(rig);
        self.blink.stop(&mut self.scheduler, &self.registry, rig);
        self.flicker.clear_all(&mut self.scheduler, rig);
        self.scheduler.clear();
        self.ready = false;
    }

    /// Forget every session, timer and blink without writing to any rig.
    ///
    /// The stored handles belong to the previous model, so they must not be written
    /// through to whatever rig comes next. Hosts that still hold the previous rig
    /// should call [Animator::on_teardown] with it first.
    fn detach(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.pending_frame = None;
        self.session = None;

        self.blink.forget();
        self.flicker.forget();
        self.scheduler.clear();

        self.registry = MorphTargetRegistry::default();
        self.ready = false;
    }

    /// Stop whatever is speaking and silence the mouth.
    pub fn stop<R: FaceRig + ?Sized>(&mut self, rig: &mut R) {
        self.end_session(rig);
    }

    /// Stop only if `handle` is still the active session.
    pub fn stop_session<R: FaceRig + ?Sized>(&mut self, rig: &mut R, handle: &SessionHandle) -> bool {
        if !handle.is_active() {
            return false;
        }

        self.end_session(rig);
        true
    }

    fn end_session<R: FaceRig + ?Sized>(&mut self, rig: &mut R) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.pending_frame = None;

        if let Some(session) = self.session.take() {
            self.scheduler.cancel(session.safety_timer);
        }
        self.flicker.clear_all(&mut self.scheduler, rig);

        apply::reset_to_idle(&mut self.registry, rig);
    }

    fn start_session(&mut self, driver: SessionDriver, duration_ms: f64, now_ms: f64) -> SessionHandle {
        let token = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let safety_timer = self.scheduler.schedule(
            now_ms + duration_ms + self.config.safety_buffer_ms,
            TimerEvent::SessionTimeout { token },
        );

        let session = Session {
            token,
            start_ms: now_ms,
            duration_ms,
            driver,
            safety_timer,
        };
        let mode = session.mode();

        self.session = Some(session);
        self.pending_frame = Some(token);

        SessionHandle {
            token,
            mode,
            generation: self.generation.clone(),
        }
    }

    /// Start an amplitude-driven session.
    ///
    /// Without an estimate, pattern sessions derive their duration from the payload size
    /// and spectrum sessions use the configured maximum.
    pub fn drive_with_amplitude<R: FaceRig + ?Sized>(
        &mut self,
        rig: &mut R,
        source: AmplitudeSource,
        estimated_duration_ms: Option<f64>,
        now_ms: f64,
    ) -> Option<SessionHandle> {
        self.end_session(rig);

        if source.is_empty() {
            self.logger.warn("Empty audio payload, staying idle");
            return None;
        }

        let duration_ms = match (&source, estimated_duration_ms) {
            (_, Some(v)) if v.is_finite() && v >= 0.0 => v,
            (AmplitudeSource::Pattern { payload_len }, _) => {
                estimated_playback_ms(*payload_len, &self.config)
            }
            (AmplitudeSource::Spectrum(_), _) => self.config.max_session_ms,
        };

        match &source {
            AmplitudeSource::Pattern { payload_len } => self.logger.debug(format!(
                "Starting pattern-based animation, {} bytes, ~{} syllables, {duration_ms}ms",
                payload_len,
                estimated_syllables(*payload_len, &self.config)
            )),
            AmplitudeSource::Spectrum(_) => self
                .logger
                .debug(format!("Starting spectrum-based animation, {duration_ms}ms")),
        }

        let driver = AmplitudeDriver::new(source, &self.config);

        Some(self.start_session(SessionDriver::Amplitude(driver), duration_ms, now_ms))
    }

    /// Start a viseme timeline session. An empty sequence only stops the current session.
    pub fn drive_with_viseme_timeline<R: FaceRig + ?Sized>(
        &mut self,
        rig: &mut R,
        visemes: Vec<String>,
        duration_ms: f64,
        now_ms: f64,
    ) -> Option<SessionHandle> {
        self.end_session(rig);

        let duration_ms = if duration_ms.is_finite() {
            duration_ms
        } else {
            self.logger.warn(format!(
                "Timeline duration {duration_ms} is not finite, using {}ms",
                self.config.default_timeline_ms
            ));
            self.config.default_timeline_ms
        };

        let Some(driver) = TimelineDriver::new(visemes, duration_ms) else {
            self.logger.warn("Empty viseme timeline, staying idle");
            return None;
        };

        self.logger.debug(format!(
            "Starting viseme animation with {} visemes over {}ms",
            driver.len(),
            driver.duration_ms()
        ));
        let duration_ms = driver.duration_ms();

        Some(self.start_session(SessionDriver::Timeline(driver), duration_ms, now_ms))
    }

    /// Drive a timeline payload, falling back to the configured duration.
    pub fn process_viseme_data<R: FaceRig + ?Sized>(
        &mut self,
        rig: &mut R,
        timeline: VisemeTimeline,
        now_ms: f64,
    ) -> Option<SessionHandle> {
        let duration_ms = timeline.duration_or(self.config.default_timeline_ms);

        self.drive_with_viseme_timeline(rig, timeline.visemes, duration_ms, now_ms)
    }

    /// Audio started playing. Does nothing if a session is already running.
    pub fn on_playback_started<R: FaceRig + ?Sized>(
        &mut self,
        rig: &mut R,
        spectrum: Option<Box<dyn SpectrumSource>>,
        estimated_duration_ms: Option<f64>,
        now_ms: f64,
    ) -> Option<SessionHandle> {
        if self.session.is_some() {
            return None;
        }

        let source = match spectrum {
            Some(v) => AmplitudeSource::Spectrum(v),
            None => {
                self.logger
                    .info("No audio analyser available, using pattern-based animation");
                AmplitudeSource::Pattern {
                    payload_len: self.config.fallback_payload_bytes,
                }
            }
        };

        self.drive_with_amplitude(rig, source, estimated_duration_ms, now_ms)
    }

    pub fn on_playback_paused<R: FaceRig + ?Sized>(&mut self, rig: &mut R) {
        self.logger.debug("Audio playback paused");
        self.stop(rig);
    }

    pub fn on_playback_ended<R: FaceRig + ?Sized>(&mut self, rig: &mut R) {
        self.logger.debug("Audio playback ended");
        self.stop(rig);
    }

    /// Blink immediately, unless already mid-blink.
    pub fn trigger_blink<R: FaceRig + ?Sized>(&mut self, rig: &mut R, now_ms: f64) {
        self.blink.close(
            now_ms,
            &mut self.scheduler,
            &mut self.rng,
            &self.config,
            &self.registry,
            rig,
        );
    }

    /// Advance everything by one frame: timers first, then the per-frame work.
    pub fn tick<R: FaceRig + ?Sized>(&mut self, rig: &mut R, now_ms: f64) {
        self.fire_timers(rig, now_ms);
        self.frame(rig, now_ms);
    }

    /// Fire every due timer.
    pub fn fire_timers<R: FaceRig + ?Sized>(&mut self, rig: &mut R, now_ms: f64) {
        for event in self.scheduler.drain_due(now_ms) {
            match event {
                TimerEvent::SessionTimeout { token } => {
                    if self.session.as_ref().map(|v| v.token) == Some(token) {
                        self.logger.info("Animation safety timeout reached");
                        self.end_session(rig);
                    }
                }
                TimerEvent::BlinkTrigger => self.blink.on_trigger(
                    now_ms,
                    &mut self.scheduler,
                    &mut self.rng,
                    &self.config,
                    &self.registry,
                    rig,
                ),
                TimerEvent::BlinkReopen => self.blink.on_reopen(now_ms),
                TimerEvent::ExpressionClear { morph } => self.flicker.on_clear(morph, rig),
            }
        }
    }

    /// Run the per-frame work of the blink ramp and the active session.
    pub fn frame<R: FaceRig + ?Sized>(&mut self, rig: &mut R, now_ms: f64) {
        self.blink.frame(
            now_ms,
            &mut self.scheduler,
            &mut self.rng,
            &self.config,
            &self.registry,
            rig,
        );

        let Some(token) = self.pending_frame.take() else {
            return;
        };
        if token != self.generation.load(Ordering::Acquire) {
            self.logger.debug(format!("Dropping frame for stale session {token}"));
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let elapsed_ms = now_ms - session.start_ms;
        let finished = match &mut session.driver {
            SessionDriver::Amplitude(driver) => {
                if elapsed_ms >= session.duration_ms {
                    true
                } else {
                    let openness =
                        driver.frame(elapsed_ms, &mut self.rng, &self.config, &self.logger);
                    mapper::apply_openness(&mut self.registry, openness, &self.config);
                    apply::apply(&mut self.registry, rig, self.config.smoothing);

                    false
                }
            }
            SessionDriver::Timeline(driver) => {
                let frame = driver.frame(&mut self.registry, elapsed_ms, &self.config);
                if frame.found {
                    self.flicker.frame(
                        now_ms,
                        &mut self.scheduler,
                        &mut self.rng,
                        &self.config,
                        &self.registry,
                        rig,
                    );
                }
                apply::apply(&mut self.registry, rig, self.config.smoothing);

                frame.finished
            }
        };

        if finished {
            self.logger.debug("Animation complete");
            self.end_session(rig);
        } else {
            self.pending_frame = Some(token);
        }
    }
}
