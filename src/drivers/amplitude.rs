/*!
Openness generators for amplitude-driven lip sync.

Two sources exist. The pattern source knows nothing about the audio besides its
size and produces a generic talking rhythm. The spectrum source reads the energy in
the speech band of whatever is currently playing. A failing spectrum source is
replaced with the pattern source for the rest of the session.
*/

use std::{f32::consts::PI, fmt::Display};

use rand::Rng;

use crate::{config::AnimationConfig, mapper::clamp_openness, Logger};

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// The analyser is not connected to anything.
    Unavailable(String),
    /// Reading the analyser failed.
    Failed(String),
}

impl Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(v) => write!(f, "Audio analysis unavailable: {v}"),
            Self::Failed(v) => write!(f, "Audio analysis failed: {v}"),
        }
    }
}

impl std::error::Error for AnalysisError {}

/// A live frequency analyser for the audio that is currently playing.
pub trait SpectrumSource {
    fn sample_rate(&self) -> f32;

    fn fft_size(&self) -> usize;

    /// Number of frequency bins, half the FFT size.
    fn bin_count(&self) -> usize {
        self.fft_size() / 2
    }

    /// Fill `out` with one byte magnitude per bin, `u8::MAX` being the loudest.
    fn read_frequency_bytes(&mut self, out: &mut [u8]) -> Result<(), AnalysisError>;
}

/// Where an amplitude session gets its openness from.
pub enum AmplitudeSource {
    /// Only the size of the audio payload is known.
    Pattern { payload_len: usize },
    Spectrum(Box<dyn SpectrumSource>),
}

impl std::fmt::Debug for AmplitudeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pattern { payload_len } => write!(f, "Pattern({payload_len} bytes)"),
            Self::Spectrum(_) => write!(f, "Spectrum"),
        }
    }
}

impl AmplitudeSource {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Pattern { payload_len: 0 })
    }
}

/// Estimated playback time of a payload, including the configured tail.
pub fn estimated_playback_ms(payload_len: usize, config: &AnimationConfig) -> f64 {
    (payload_len as f64 / config.playback_bytes_per_second) * 1000.0 + config.playback_tail_ms
}

/// Rough syllable count of a payload. Only used for diagnostics.
pub fn estimated_syllables(payload_len: usize, config: &AnimationConfig) -> usize {
    payload_len.div_ceil(config.pattern_bytes_per_syllable.max(1))
}

/// An audio-blind talking rhythm: half a sine per syllable, then a pause.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternDriver {
    syllable_ms: f64,
    pause_ms: f64,
    amplitude: f32,
    jitter: f32,
}

impl PatternDriver {
    pub fn new(config: &AnimationConfig) -> Self {
        Self {
            syllable_ms: config.pattern_word_ms / 2.0,
            pause_ms: config.pattern_pause_ms,
            amplitude: config.pattern_amplitude,
            jitter: config.pattern_jitter,
        }
    }

    /// Openness without jitter.
    pub fn base_openness(&self, elapsed_ms: f64) -> f32 {
        let cycle_ms = self.syllable_ms + self.pause_ms;
        if !(self.syllable_ms > 0.0) || !(cycle_ms > 0.0) {
            return 0.0;
        }

        let cycle_position = (elapsed_ms.max(0.0) % cycle_ms) / self.syllable_ms;
        if cycle_position < 1.0 {
            (cycle_position as f32 * PI).sin() * self.amplitude
        } else {
            0.0
        }
    }

    pub fn openness<R: Rng + ?Sized>(&self, elapsed_ms: f64, rng: &mut R) -> f32 {
        let jitter = if self.jitter > 0.0 {
            rng.gen_range(0.0..self.jitter)
        } else {
            0.0
        };

        clamp_openness(self.base_openness(elapsed_ms) + jitter)
    }
}

/// Mean energy of the speech band, normalized to [0, 1].
pub struct SpectrumDriver {
    source: Box<dyn SpectrumSource>,
    buffer: Vec<u8>,
    low_hz: f32,
    high_hz: f32,
}

impl SpectrumDriver {
    pub fn new(source: Box<dyn SpectrumSource>, config: &AnimationConfig) -> Self {
        Self {
            source,
            buffer: Vec::new(),
            low_hz: config.spectrum_low_hz,
            high_hz: config.spectrum_high_hz,
        }
    }

    pub fn openness(&mut self) -> Result<f32, AnalysisError> {
        let sample_rate = self.source.sample_rate();
        let fft_size = self.source.fft_size();
        let bin_count = self.source.bin_count();
        if !(sample_rate > 0.0) || fft_size == 0 || bin_count == 0 {
            return Err(AnalysisError::Unavailable(format!(
                "sample rate {sample_rate}, fft size {fft_size}"
            )));
        }

        self.buffer.resize(bin_count, 0);
        self.source.read_frequency_bytes(&mut self.buffer)?;

        let bin_hz = sample_rate / fft_size as f32;
        let low = (self.low_hz / bin_hz).floor() as usize;
        let high = ((self.high_hz / bin_hz).floor() as usize).min(bin_count - 1);
        if low > high {
            return Ok(0.0);
        }

        let band = &self.buffer[low..=high];
        let sum = band.iter().map(|v| u32::from(*v)).sum::<u32>();

        Ok(clamp_openness(
            sum as f32 / band.len() as f32 / f32::from(u8::MAX),
        ))
    }
}

/// The active amplitude generator of a session.
pub enum AmplitudeDriver {
    Pattern(PatternDriver),
    Spectrum(SpectrumDriver),
}

impl AmplitudeDriver {
    pub fn new(source: AmplitudeSource, config: &AnimationConfig) -> Self {
        match source {
            AmplitudeSource::Pattern { .. } => Self::Pattern(PatternDriver::new(config)),
            AmplitudeSource::Spectrum(v) => Self::Spectrum(SpectrumDriver::new(v, config)),
        }
    }

    pub fn is_spectrum(&self) -> bool {
        matches!(self, Self::Spectrum(_))
    }

    /// Openness for this frame. A spectrum failure switches to the pattern driver for good.
    pub fn frame<R: Rng + ?Sized>(
        &mut self,
        elapsed_ms: f64,
        rng: &mut R,
        config: &AnimationConfig,
        logger: &Logger,
    ) -> f32 {
        match self {
            Self::Pattern(driver) => driver.openness(elapsed_ms, rng),
            Self::Spectrum(driver) => match driver.openness() {
                Ok(v) => v,
                Err(e) => {
                    logger.warn(format!("{e}, falling back to pattern-based animation"));

                    let fallback = PatternDriver::new(config);
                    let openness = fallback.openness(elapsed_ms, rng);
                    *self = Self::Pattern(fallback);

                    openness
                }
            },
        }
    }
}
