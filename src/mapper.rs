use crate::{config::AnimationConfig, registry::MorphTargetRegistry};

/// Viseme weights for a range of mouth openness.
#[derive(Debug, PartialEq)]
pub struct Band {
    /// Exclusive upper bound. The last band also includes its upper bound.
    pub upper: f32,
    pub weights: &'static [(&'static str, f32)],
}

/// Openness bands from closed to wide open. Visemes the model lacks are skipped.
pub const BANDS: [Band; 5] = [
    Band {
        upper: 0.1,
        weights: &[("sil", 1.0), ("PP", 0.2)],
    },
    Band {
        upper: 0.3,
        weights: &[("PP", 0.5), ("FF", 0.5), ("TH", 0.3)],
    },
    Band {
        upper: 0.5,
        weights: &[("DD", 0.3), ("kk", 0.3), ("CH", 0.4), ("E", 0.6)],
    },
    Band {
        upper: 0.7,
        weights: &[("aa", 0.7), ("E", 0.3)],
    },
    Band {
        upper: 1.0,
        weights: &[("aa", 1.0), ("O", 0.3)],
    },
];

/// Clamp openness into [0, 1], treating NaN as a closed mouth.
pub fn clamp_openness(openness: f32) -> f32 {
    if openness.is_nan() {
        0.0
    } else {
        openness.clamp(0.0, 1.0)
    }
}

pub fn band_for(openness: f32) -> &'static Band {
    let openness = clamp_openness(openness);

    BANDS
        .iter()
        .find(|v| openness < v.upper)
        .unwrap_or(&BANDS[BANDS.len() - 1])
}

/// Turn a mouth openness into viseme, jaw-open and jaw bone targets.
pub fn apply_openness(registry: &mut MorphTargetRegistry, openness: f32, config: &AnimationConfig) {
    let openness = clamp_openness(openness);

    registry.clear_viseme_targets();
    for (code, weight) in band_for(openness).weights {
        registry.set_viseme_target(code, *weight);
    }

    registry.set_jaw_open_target(openness * config.jaw_open_scale);
    registry.set_jaw_bone_offset(openness * config.jaw_rotation_scale);
}
