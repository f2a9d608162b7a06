pub mod amplitude;
pub mod timeline;

pub use amplitude::{AmplitudeDriver, AmplitudeSource, AnalysisError, SpectrumSource};
pub use timeline::{TimelineDriver, TimelineFrame};
