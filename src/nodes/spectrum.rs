use godot::{
    engine::{AudioEffectSpectrumAnalyzerInstance, AudioServer},
    prelude::*,
};

use crate::drivers::{AnalysisError, SpectrumSource};

pub const DEFAULT_FFT_SIZE: usize = 512;

/// Decibel range mapped onto a byte, quietest first.
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;

/// Reads an `AudioEffectSpectrumAnalyzer` sitting on an audio bus.
pub struct GodotSpectrum {
    bus_index: i32,
    effect_index: i32,
    fft_size: usize,
}

impl GodotSpectrum {
    /// Returns `None` if the bus does not exist.
    pub fn new(bus: &str, effect_index: i32) -> Option<Self> {
        let bus_index = AudioServer::singleton().get_bus_index(StringName::from(bus));
        if bus_index < 0 {
            return None;
        }

        Some(Self {
            bus_index,
            effect_index,
            fft_size: DEFAULT_FFT_SIZE,
        })
    }

    fn analyzer(&self) -> Result<Gd<AudioEffectSpectrumAnalyzerInstance>, AnalysisError> {
        AudioServer::singleton()
            .get_bus_effect_instance(self.bus_index, self.effect_index)
            .and_then(|v| v.try_cast::<AudioEffectSpectrumAnalyzerInstance>())
            .ok_or_else(|| {
                AnalysisError::Unavailable(format!(
                    "no spectrum analyzer at bus {} effect {}",
                    self.bus_index, self.effect_index
                ))
            })
    }
}

/// Map a linear magnitude to `0..=255`.
fn magnitude_to_byte(magnitude: f32) -> u8 {
    let db = 20.0 * magnitude.max(1e-10).log10();
    let normalized = ((db - MIN_DB) / (MAX_DB - MIN_DB)).clamp(0.0, 1.0);

    (normalized * f32::from(u8::MAX)).round() as u8
}

impl SpectrumSource for GodotSpectrum {
    fn sample_rate(&self) -> f32 {
        AudioServer::singleton().get_mix_rate()
    }

    fn fft_size(&self) -> usize {
        self.fft_size
    }

    fn read_frequency_bytes(&mut self, out: &mut [u8]) -> Result<(), AnalysisError> {
        let analyzer = self.analyzer()?;
        let bin_hz = self.sample_rate() / self.fft_size as f32;

        for (i, v) in out.iter_mut().enumerate() {
            let from = i as f32 * bin_hz;
            let magnitude = analyzer.get_magnitude_for_frequency_range(from, from + bin_hz);

            *v = magnitude_to_byte(magnitude.length());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decibel_mapping() {
        assert_eq!(magnitude_to_byte(0.0), 0);
        assert_eq!(magnitude_to_byte(1e-6), 0);
        assert_eq!(magnitude_to_byte(1.0), u8::MAX);
        // -58dB is 60% of the range
        assert_eq!(magnitude_to_byte(10f32.powf(-58.0 / 20.0)), 153);
    }
}
