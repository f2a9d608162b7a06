/*!
Tuning constants and name tables for the facial animation core.

Every constant that differed between variants of the talking head is a policy
choice, so all of them live here and can be overridden from a JSON file. Missing
keys fall back to [Default].
*/

use std::{fmt::Display, path::Path};

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: String,
        error: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, error } => write!(f, "Unable to read {path}: {error}"),
            Self::Parse(e) => write!(f, "Unable to parse config: {e}"),
            Self::Invalid { field, reason } => write!(f, "Invalid value for {field}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// An inclusive-exclusive range of milliseconds or weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub min: f64,
    pub max: f64,
}

impl Span {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Uniformly sample the span. A zero-width span always returns `min`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.max <= self.min {
            return self.min;
        }
        rng.gen_range(self.min..self.max)
    }

    fn validate(&self, field: &'static str) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min < 0.0 {
            return Err(ConfigError::Invalid {
                field,
                reason: format!("{self:?} must be finite and non-negative"),
            });
        }
        if self.max < self.min {
            return Err(ConfigError::Invalid {
                field,
                reason: format!("min {} is greater than max {}", self.min, self.max),
            });
        }

        Ok(())
    }
}

/// Ordered name candidates per capability. The first candidate found wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateTable {
    /// Blend shapes starting with this prefix are registered as visemes.
    pub viseme_prefix: String,
    /// Exact blend shape names for the jaw-open control.
    pub jaw_open: Vec<String>,
    /// Exact blend shape names for the mouth-close control.
    pub mouth_close: Vec<String>,
    /// Lowercase substrings, any node whose lowercase name contains one is a jaw bone candidate.
    pub jaw_bone: Vec<String>,
    pub eye_blink_left: Vec<String>,
    pub eye_blink_right: Vec<String>,
    /// Blend shapes used for the idle expression flicker.
    pub expressions: Vec<String>,
}

impl Default for CandidateTable {
    fn default() -> Self {
        fn strings(v: &[&str]) -> Vec<String> {
            v.iter().map(|v| v.to_string()).collect()
        }

        Self {
            viseme_prefix: "viseme_".into(),
            jaw_open: strings(&["jawOpen", "mouthOpen", "JawOpen", "MouthOpen", "jaw_open"]),
            mouth_close: strings(&["mouthClose", "MouthClose", "mouth_close"]),
            jaw_bone: strings(&["jaw", "mouth", "chin", "teeth", "tongue"]),
            eye_blink_left: strings(&["eyeBlinkLeft"]),
            eye_blink_right: strings(&["eyeBlinkRight"]),
            expressions: strings(&[
                "browInnerUp",
                "browOuterUpLeft",
                "browOuterUpRight",
                "eyeSquintLeft",
                "eyeSquintRight",
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Exponential smoothing factor applied every frame, in (0, 1].
    pub smoothing: f32,
    /// Jaw bone x rotation at full openness, in radians.
    pub jaw_rotation_scale: f32,
    /// Multiplier from openness to the jaw-open blend shape target.
    pub jaw_open_scale: f32,

    pub pattern_word_ms: f64,
    pub pattern_pause_ms: f64,
    pub pattern_amplitude: f32,
    pub pattern_jitter: f32,
    /// Only used for diagnostics.
    pub pattern_bytes_per_syllable: usize,
    /// Payload bytes per second of playback, used to estimate durations.
    pub playback_bytes_per_second: f64,
    /// Added to estimated playback durations.
    pub playback_tail_ms: f64,
    /// Payload size used when playback starts without an analyser.
    pub fallback_payload_bytes: usize,

    pub spectrum_low_hz: f32,
    pub spectrum_high_hz: f32,

    pub timeline_viseme_weight: f32,
    pub timeline_wide_jaw: f32,
    pub timeline_narrow_jaw: f32,
    pub timeline_wide_visemes: Vec<String>,
    pub timeline_narrow_visemes: Vec<String>,
    pub default_timeline_ms: f64,

    /// Extra time after a session's natural end before it is forcibly stopped.
    pub safety_buffer_ms: f64,
    /// Natural duration of sessions that have no duration estimate.
    pub max_session_ms: f64,

    pub blink_interval_ms: Span,
    pub blink_probability: f64,
    pub blink_hold_ms: Span,
    pub blink_reopen_ms: f64,

    pub expression_flicker: bool,
    pub flicker_probability: f64,
    pub flicker_intensity: Span,
    pub flicker_hold_ms: Span,

    pub candidates: CandidateTable,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.3,
            jaw_rotation_scale: 0.2,
            jaw_open_scale: 1.0,

            pattern_word_ms: 300.0,
            pattern_pause_ms: 100.0,
            pattern_amplitude: 0.8,
            pattern_jitter: 0.1,
            pattern_bytes_per_syllable: 8000,
            playback_bytes_per_second: 44100.0,
            playback_tail_ms: 500.0,
            fallback_payload_bytes: 10000,

            spectrum_low_hz: 500.0,
            spectrum_high_hz: 2000.0,

            timeline_viseme_weight: 1.0,
            timeline_wide_jaw: 0.8,
            timeline_narrow_jaw: 0.5,
            timeline_wide_visemes: vec!["aa".into(), "O".into()],
            timeline_narrow_visemes: vec!["E".into(), "I".into()],
            default_timeline_ms: 3000.0,

            safety_buffer_ms: 500.0,
            max_session_ms: 30000.0,

            blink_interval_ms: Span::new(3000.0, 7000.0),
            blink_probability: 0.7,
            blink_hold_ms: Span::new(150.0, 250.0),
            blink_reopen_ms: 80.0,

            expression_flicker: true,
            flicker_probability: 0.1,
            flicker_intensity: Span::new(0.2, 0.5),
            flicker_hold_ms: Span::new(300.0, 500.0),

            candidates: CandidateTable::default(),
        }
    }
}

fn unit(field: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{value} is not within 0.0-1.0"),
        })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{value} must be finite and non-negative"),
        })
    }
}

impl AnimationConfig {
    pub fn from_json(data: &str) -> Result<Self> {
        let config = serde_json::from_str::<Self>(data)?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.display().to_string(),
            error,
        })?;

        Self::from_json(&data)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "smoothing",
                reason: format!("{} is not within (0.0, 1.0]", self.smoothing),
            });
        }
        non_negative("jaw_rotation_scale", self.jaw_rotation_scale.into())?;
        non_negative("jaw_open_scale", self.jaw_open_scale.into())?;

        if !(self.pattern_word_ms > 0.0) {
            return Err(ConfigError::Invalid {
                field: "pattern_word_ms",
                reason: "must be greater than 0".into(),
            });
        }
        non_negative("pattern_pause_ms", self.pattern_pause_ms)?;
        unit("pattern_amplitude", self.pattern_amplitude.into())?;
        unit("pattern_jitter", self.pattern_jitter.into())?;
        if self.pattern_bytes_per_syllable == 0 {
            return Err(ConfigError::Invalid {
                field: "pattern_bytes_per_syllable",
                reason: "must be greater than 0".into(),
            });
        }
        if !(self.playback_bytes_per_second > 0.0) {
            return Err(ConfigError::Invalid {
                field: "playback_bytes_per_second",
                reason: "must be greater than 0".into(),
            });
        }
        non_negative("playback_tail_ms", self.playback_tail_ms)?;

        if !(self.spectrum_low_hz >= 0.0 && self.spectrum_low_hz <= self.spectrum_high_hz) {
            return Err(ConfigError::Invalid {
                field: "spectrum_low_hz",
                reason: format!(
                    "band {}-{} is inverted or negative",
                    self.spectrum_low_hz, self.spectrum_high_hz
                ),
            });
        }

        unit("timeline_viseme_weight", self.timeline_viseme_weight.into())?;
        unit("timeline_wide_jaw", self.timeline_wide_jaw.into())?;
        unit("timeline_narrow_jaw", self.timeline_narrow_jaw.into())?;
        non_negative("default_timeline_ms", self.default_timeline_ms)?;
        non_negative("safety_buffer_ms", self.safety_buffer_ms)?;
        non_negative("max_session_ms", self.max_session_ms)?;

        self.blink_interval_ms.validate("blink_interval_ms")?;
        unit("blink_probability", self.blink_probability)?;
        self.blink_hold_ms.validate("blink_hold_ms")?;
        non_negative("blink_reopen_ms", self.blink_reopen_ms)?;

        unit("flicker_probability", self.flicker_probability)?;
        self.flicker_intensity.validate("flicker_intensity")?;
        unit("flicker_intensity", self.flicker_intensity.max)?;
        self.flicker_hold_ms.validate("flicker_hold_ms")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(AnimationConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = AnimationConfig::from_json(r#"{ "smoothing": 0.5 }"#).unwrap();

        assert_eq!(config.smoothing, 0.5);
        assert_eq!(config.jaw_rotation_scale, 0.2);
        assert_eq!(config.candidates, CandidateTable::default());
    }

    #[test]
    fn partial_candidates() {
        let config =
            AnimationConfig::from_json(r#"{ "candidates": { "jaw_open": ["Mouth_A"] } }"#)
                .unwrap();

        assert_eq!(config.candidates.jaw_open, vec!["Mouth_A".to_string()]);
        assert_eq!(config.candidates.viseme_prefix, "viseme_");
    }

    #[test]
    fn round_trip_through_json() {
        let config = AnimationConfig::default();
        let parsed = AnimationConfig::from_json(&config.to_json().unwrap()).unwrap();

        assert_eq!(config, parsed);
    }

    #[test]
    fn reject_bad_smoothing() {
        for v in ["0.0", "-0.1", "1.5"] {
            let result = AnimationConfig::from_json(&format!(r#"{{ "smoothing": {v} }}"#));

            match result {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "smoothing"),
                other => panic!("Expected invalid smoothing for {v}, got {other:?}"),
            }
        }
    }

    #[test]
    fn reject_inverted_span() {
        let result = AnimationConfig::from_json(
            r#"{ "blink_interval_ms": { "min": 7000.0, "max": 3000.0 } }"#,
        );

        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "blink_interval_ms",
                ..
            })
        ));
    }

    #[test]
    fn reject_malformed_json() {
        assert!(matches!(
            AnimationConfig::from_json("{ smoothing: "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file() {
        let result = AnimationConfig::from_path("/definitely/not/here/talking_head.json");

        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn span_sampling_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let span = Span::new(150.0, 250.0);

        for _ in 0..100 {
            let v = span.sample(&mut rng);
            assert!((150.0..250.0).contains(&v));
        }

        assert_eq!(Span::new(80.0, 80.0).sample(&mut rng), 80.0);
    }
}
