/*!
The Godot node that gives a loaded model a talking face.

Add a `TalkingHead` as the parent of a model scene. Once the model is in the tree the
node scans it, starts blinking and animates the mouth every frame whenever one of
the `speak_*` functions or the audio hooks start a session.
*/

use godot::{
    engine::{global::Error, Os, ProjectSettings, Time},
    prelude::*,
};

use crate::{
    animator::Animator,
    cli::{Args, Commands},
    config::{AnimationConfig, ConfigError},
    drivers::{AmplitudeSource, SpectrumSource},
    logger::init_godot_backend,
    model::VisemeTimeline,
    Logger,
};

use super::{godot_rig::GodotRig, spectrum::GodotSpectrum};

#[derive(GodotClass)]
#[class(base = Node3D)]
pub struct TalkingHead {
    #[base]
    base: Base<Node3D>,

    /// Animation config loaded when the node becomes ready. Overridden by `--config`.
    #[var]
    pub config_path: GodotString,
    /// Audio bus carrying an `AudioEffectSpectrumAnalyzer`. Empty for pattern-only lip sync.
    #[var]
    pub spectrum_bus: GodotString,
    #[var]
    pub spectrum_effect_index: i32,

    logger: Logger,
    animator: Animator,
    rig: Option<GodotRig>,
}

#[godot_api]
impl Node3DVirtual for TalkingHead {
    fn init(base: godot::obj::Base<Self::Base>) -> Self {
        Self {
            base,

            config_path: GodotString::new(),
            spectrum_bus: GodotString::new(),
            spectrum_effect_index: 0,

            logger: Logger::create("TalkingHead"),
            animator: Animator::new(AnimationConfig::default()),
            rig: None,
        }
    }

    fn ready(&mut self) {
        let args = self.user_args();
        init_godot_backend(
            args.as_ref()
                .map(Args::log_level)
                .unwrap_or(log::LevelFilter::Info),
        );

        self.logger.debug("Starting ready!");

        let config_path = args
            .as_ref()
            .and_then(|v| v.config_path())
            .map(String::from)
            .unwrap_or_else(|| self.config_path.to_string());
        if !config_path.is_empty() && self.load_config(GodotString::from(&config_path)) != Error::OK {
            self.logger.warn("Continuing with the default animation config");
        }

        let mut rig = GodotRig::build(&self.base, &self.logger);
        self.animator.on_model_ready(&mut rig, now_ms());
        self.rig = Some(rig);

        if let Some(command) = args.as_ref().and_then(Args::command) {
            self.run_command(command);
        }
    }

    fn process(&mut self, _delta: f64) {
        let now = now_ms();
        if let Some(rig) = self.rig.as_mut() {
            self.animator.tick(rig, now);
        }
    }

    fn exit_tree(&mut self) {
        if let Some(rig) = self.rig.as_mut() {
            self.animator.on_teardown(rig);
        }
        self.rig = None;
    }
}

#[godot_api]
impl TalkingHead {
    /// Lip sync an audio payload. Uses the spectrum bus if one is set, the payload size
    /// otherwise.
    #[func]
    pub fn speak_with_audio(&mut self, audio: PackedByteArray, duration_ms: f64) -> bool {
        let duration = (duration_ms > 0.0).then_some(duration_ms);
        let source = match self.spectrum() {
            Some(v) => AmplitudeSource::Spectrum(v),
            None => AmplitudeSource::Pattern {
                payload_len: audio.len(),
            },
        };

        let now = now_ms();
        let Some(rig) = self.rig.as_mut() else {
            self.logger.error("Model is not ready, unable to speak");
            return false;
        };

        self.animator
            .drive_with_amplitude(rig, source, duration, now)
            .is_some()
    }

    #[func]
    pub fn speak_with_visemes(&mut self, visemes: PackedStringArray, duration_ms: f64) -> bool {
        let visemes = visemes
            .as_slice()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>();
        let duration_ms = if duration_ms > 0.0 {
            duration_ms
        } else {
            self.animator.config().default_timeline_ms
        };

        let now = now_ms();
        let Some(rig) = self.rig.as_mut() else {
            self.logger.error("Model is not ready, unable to speak");
            return false;
        };

        self.animator
            .drive_with_viseme_timeline(rig, visemes, duration_ms, now)
            .is_some()
    }

    /// Speak a JSON timeline payload, `{"visemes": [...], "duration": ms}`.
    #[func]
    pub fn process_viseme_data(&mut self, data: PackedByteArray) -> bool {
        let timeline = VisemeTimeline::from_slice(data.as_slice());

        let now = now_ms();
        let Some(rig) = self.rig.as_mut() else {
            self.logger.error("Model is not ready, unable to speak");
            return false;
        };

        self.animator
            .process_viseme_data(rig, timeline, now)
            .is_some()
    }

    /// Connect to the `play` of whatever plays the voice.
    #[func]
    pub fn on_audio_play(&mut self, duration_ms: f64) {
        let duration = (duration_ms > 0.0).then_some(duration_ms);
        let spectrum = self.spectrum();

        let now = now_ms();
        if let Some(rig) = self.rig.as_mut() {
            self.animator
                .on_playback_started(rig, spectrum, duration, now);
        }
    }

    #[func]
    pub fn on_audio_pause(&mut self) {
        if let Some(rig) = self.rig.as_mut() {
            self.animator.on_playback_paused(rig);
        }
    }

    #[func]
    pub fn on_audio_ended(&mut self) {
        if let Some(rig) = self.rig.as_mut() {
            self.animator.on_playback_ended(rig);
        }
    }

    #[func]
    pub fn stop(&mut self) {
        if let Some(rig) = self.rig.as_mut() {
            self.animator.stop(rig);
        }
    }

    #[func]
    pub fn blink(&mut self) {
        let now = now_ms();
        if let Some(rig) = self.rig.as_mut() {
            self.animator.trigger_blink(rig, now);
        }
    }

    #[func]
    pub fn is_speaking(&self) -> bool {
        self.animator.is_speaking()
    }

    /// Load an animation config. Resource paths are resolved through [ProjectSettings].
    #[func]
    pub fn load_config(&mut self, path: GodotString) -> Error {
        let path = ProjectSettings::singleton()
            .globalize_path(path)
            .to_string();

        match AnimationConfig::from_path(&path) {
            Ok(v) => {
                self.logger.info(format!("Loaded animation config from {path}"));
                self.animator.set_config(v);

                Error::OK
            }
            Err(e) => {
                self.logger.error(e.to_string());

                match e {
                    ConfigError::Io { .. } => Error::ERR_FILE_CANT_OPEN,
                    ConfigError::Parse(_) => Error::ERR_PARSE_ERROR,
                    ConfigError::Invalid { .. } => Error::ERR_INVALID_DATA,
                }
            }
        }
    }

    /// Feed amplitude sessions from a spectrum analyzer on `bus`.
    #[func]
    pub fn set_spectrum_bus(&mut self, bus: GodotString, effect_index: i32) -> Error {
        if GodotSpectrum::new(&bus.to_string(), effect_index).is_none() {
            self.logger.error(format!("No audio bus named {bus}"));
            return Error::ERR_DOES_NOT_EXIST;
        }

        self.spectrum_bus = bus;
        self.spectrum_effect_index = effect_index;

        Error::OK
    }

    #[func]
    pub fn user_args_dict(&self) -> Dictionary {
        match self.user_args() {
            Some(v) => v.to_dict(),
            None => Dictionary::new(),
        }
    }
}

impl TalkingHead {
    fn spectrum(&self) -> Option<Box<dyn SpectrumSource>> {
        let bus = self.spectrum_bus.to_string();
        if bus.is_empty() {
            return None;
        }

        match GodotSpectrum::new(&bus, self.spectrum_effect_index) {
            Some(v) => Some(Box::new(v)),
            None => {
                self.logger.warn(format!(
                    "Audio bus {bus} is gone, using pattern-based animation"
                ));
                None
            }
        }
    }

    fn user_args(&self) -> Option<Args> {
        let args = Os::singleton()
            .get_cmdline_user_args()
            .as_slice()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>();
        let args = args.iter().map(String::as_str).collect::<Vec<_>>();

        match Args::parse(&args) {
            Ok(v) => Some(v),
            Err(e) => {
                self.logger.error(format!("Unable to parse user args: {e}"));
                None
            }
        }
    }

    fn run_command(&mut self, command: &Commands) {
        let now = now_ms();
        let Some(rig) = self.rig.as_mut() else {
            return;
        };

        match command {
            Commands::Timeline(c) => {
                let duration_ms = c
                    .duration
                    .map(|v| v.0)
                    .unwrap_or(self.animator.config().default_timeline_ms);

                self.animator
                    .drive_with_viseme_timeline(rig, c.visemes.0.clone(), duration_ms, now);
            }
            Commands::Pattern(c) => {
                self.animator.drive_with_amplitude(
                    rig,
                    AmplitudeSource::Pattern {
                        payload_len: c.bytes,
                    },
                    c.duration.map(|v| v.0),
                    now,
                );
            }
        }
    }
}

fn now_ms() -> f64 {
    Time::singleton().get_ticks_msec() as f64
}
