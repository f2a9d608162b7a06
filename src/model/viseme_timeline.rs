use serde::{Deserialize, Serialize};

use crate::Logger;

/// A timed sequence of viseme codes as delivered by the speech backend.
///
/// The visemes are spread evenly over the duration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisemeTimeline {
    #[serde(default)]
    pub visemes: Vec<String>,
    /// Total duration in milliseconds, if the backend sent one.
    #[serde(rename = "duration", default)]
    pub duration_ms: Option<f64>,
}

impl VisemeTimeline {
    pub fn new(visemes: Vec<String>, duration_ms: f64) -> Self {
        Self {
            visemes,
            duration_ms: Some(duration_ms),
        }
    }

    /// Parse a JSON payload. Malformed payloads are logged and become an empty timeline.
    pub fn from_slice(data: &[u8]) -> Self {
        match serde_json::from_slice::<VisemeTimeline>(data) {
            Ok(v) => v,
            Err(e) => {
                Logger::create("VisemeTimeline")
                    .error(format!("Unable to parse viseme timeline: {e}"));
                Self::default()
            }
        }
    }

    /// The duration, or `default_ms` when none was sent or it was not positive.
    pub fn duration_or(&self, default_ms: f64) -> f64 {
        match self.duration_ms {
            Some(v) if v.is_finite() && v > 0.0 => v,
            _ => default_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.visemes.is_empty()
    }
}
