pub mod face_rig;
pub mod memory_rig;
pub mod viseme_timeline;

pub use face_rig::*;
pub use memory_rig::MemoryRig;
pub use viseme_timeline::VisemeTimeline;
