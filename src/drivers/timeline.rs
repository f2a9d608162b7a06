use crate::{config::AnimationConfig, registry::MorphTargetRegistry};

/// What a single timeline frame did.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineFrame {
    pub index: usize,
    pub code: String,
    /// Whether the model has a blend shape for `code`.
    pub found: bool,
    pub finished: bool,
}

/// Walks a sequence of visemes spread evenly over a fixed duration.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineDriver {
    visemes: Vec<String>,
    duration_ms: f64,
}

impl TimelineDriver {
    /// Returns `None` for an empty sequence.
    pub fn new(visemes: Vec<String>, duration_ms: f64) -> Option<Self> {
        if visemes.is_empty() {
            return None;
        }

        Some(Self {
            visemes,
            // A session has to end, so an endless duration finishes at once
            duration_ms: if duration_ms.is_finite() {
                duration_ms.max(0.0)
            } else {
                0.0
            },
        })
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    pub fn len(&self) -> usize {
        self.visemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visemes.is_empty()
    }

    pub fn progress(&self, elapsed_ms: f64) -> f64 {
        if self.duration_ms <= 0.0 {
            return 1.0;
        }

        (elapsed_ms.max(0.0) / self.duration_ms).min(1.0)
    }

    pub fn index_at(&self, elapsed_ms: f64) -> usize {
        let len = self.visemes.len();

        ((self.progress(elapsed_ms) * len as f64).floor() as usize).min(len - 1)
    }

    pub fn code_at(&self, elapsed_ms: f64) -> &str {
        &self.visemes[self.index_at(elapsed_ms)]
    }

    /// Set the targets for this frame. Smoothing and writing happen afterwards.
    pub fn frame(
        &self,
        registry: &mut MorphTargetRegistry,
        elapsed_ms: f64,
        config: &AnimationConfig,
    ) -> TimelineFrame {
        let index = self.index_at(elapsed_ms);
        let code = self.visemes[index].as_str();

        registry.clear_viseme_targets();
        let found = registry.set_viseme_target(code, config.timeline_viseme_weight);

        if found {
            if config.timeline_wide_visemes.iter().any(|v| v == code) {
                registry.set_jaw_open_target(config.timeline_wide_jaw);
            } else if config.timeline_narrow_visemes.iter().any(|v| v == code) {
                registry.set_jaw_open_target(config.timeline_narrow_jaw);
            }
        }

        TimelineFrame {
            index,
            code: code.to_string(),
            found,
            finished: self.progress(elapsed_ms) >= 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::CandidateTable, registry::tests::full_rig, Logger};

    fn sequence(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|v| v.to_string()).collect()
    }

    fn registry() -> MorphTargetRegistry {
        let (rig, _) = full_rig();
        MorphTargetRegistry::scan(&rig, &CandidateTable::default(), &Logger::create("TimelineTest"))
    }

    #[test]
    fn empty_sequence() {
        assert!(TimelineDriver::new(vec![], 400.0).is_none());
    }

    #[test]
    fn indexing() {
        let driver = TimelineDriver::new(sequence(&["sil", "aa", "E", "O"]), 400.0).unwrap();

        assert_eq!(driver.index_at(0.0), 0);
        assert_eq!(driver.code_at(0.0), "sil");
        assert_eq!(driver.index_at(250.0), 2);
        assert_eq!(driver.code_at(250.0), "E");
        assert_eq!(driver.index_at(399.0), 3);
        assert_eq!(driver.code_at(399.0), "O");
        assert_eq!(driver.index_at(400.0), 3);
        assert_eq!(driver.index_at(10_000.0), 3);
    }

    #[test]
    fn non_finite_duration_is_finished() {
        for duration in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let driver = TimelineDriver::new(sequence(&["aa", "O"]), duration).unwrap();

            assert_eq!(driver.duration_ms(), 0.0);
            assert_eq!(driver.progress(0.0), 1.0);
        }
    }

    #[test]
    fn zero_duration_is_finished() {
        let driver = TimelineDriver::new(sequence(&["aa", "O"]), 0.0).unwrap();

        assert_eq!(driver.progress(0.0), 1.0);
        assert_eq!(driver.index_at(0.0), 1);
    }

    #[test]
    fn frame_sets_only_current() {
        let config = AnimationConfig::default();
        let mut registry = registry();
        let driver = TimelineDriver::new(sequence(&["sil", "aa"]), 200.0).unwrap();

        let frame = driver.frame(&mut registry, 150.0, &config);

        assert_eq!(frame.code, "aa");
        assert!(frame.found);
        assert!(!frame.finished);
        assert_eq!(registry.viseme_target("aa"), Some(1.0));
        assert_eq!(registry.viseme_target("sil"), Some(0.0));
    }

    #[test]
    fn jaw_hints() {
        let config = AnimationConfig::default();
        let mut registry = registry();
        let driver = TimelineDriver::new(sequence(&["O", "E", "kk"]), 300.0).unwrap();

        driver.frame(&mut registry, 0.0, &config);
        assert_eq!(registry.jaw_open.as_ref().unwrap().target, 0.8);

        driver.frame(&mut registry, 100.0, &config);
        assert_eq!(registry.jaw_open.as_ref().unwrap().target, 0.5);

        // Consonants leave the jaw where it was
        driver.frame(&mut registry, 200.0, &config);
        assert_eq!(registry.jaw_open.as_ref().unwrap().target, 0.5);
    }

    #[test]
    fn unknown_code_is_silent() {
        let config = AnimationConfig::default();
        let mut registry = registry();
        let driver = TimelineDriver::new(sequence(&["aa", "zz"]), 200.0).unwrap();

        driver.frame(&mut registry, 0.0, &config);
        let frame = driver.frame(&mut registry, 150.0, &config);

        assert!(!frame.found);
        assert!(registry.visemes().iter().all(|v| v.target == 0.0));
    }

    #[test]
    fn finishes_at_duration() {
        let config = AnimationConfig::default();
        let mut registry = registry();
        let driver = TimelineDriver::new(sequence(&["aa"]), 100.0).unwrap();

        assert!(!driver.frame(&mut registry, 99.0, &config).finished);
        assert!(driver.frame(&mut registry, 100.0, &config).finished);
    }
}
