pub mod animator;
pub mod apply;
pub mod blink;
pub mod cli;
pub mod config;
pub mod drivers;
pub mod expression;
mod logger;
pub mod mapper;
pub mod model;
mod nodes;
pub mod registry;
pub mod scheduler;

pub use animator::{Animator, SessionHandle, SessionMode};
pub use config::{AnimationConfig, CandidateTable};
pub use logger::{recent_logs, Logger};
pub use registry::MorphTargetRegistry;

use godot::prelude::*;

/// Easy [GodotString] creation. :lenny:
macro_rules! gstring {
    ($string:expr) => {
        GodotString::from($string)
    };
}
pub(crate) use gstring;

/// Helper struct for information about the libtalkinghead library.
#[derive(Debug, Default, GodotClass)]
struct LibTalkingHead;

#[godot_api]
impl RefCountedVirtual for LibTalkingHead {
    fn init(_base: godot::obj::Base<Self::Base>) -> Self {
        Self
    }
}

#[godot_api]
impl LibTalkingHead {
    /// A mapping of various library metadata.
    #[func]
    fn metadata() -> Dictionary {
        let mut mapping = Dictionary::new();

        let is_debug = cfg!(debug_assertions);
        mapping.insert("DEBUG", is_debug);
        mapping.insert("RELEASE", !is_debug);

        mapping.insert("VERSION", env!("CARGO_PKG_VERSION"));
        mapping.insert("VERSION_MAJOR", env!("CARGO_PKG_VERSION_MAJOR"));
        mapping.insert("VERSION_MINOR", env!("CARGO_PKG_VERSION_MINOR"));
        mapping.insert("VERSION_PATCH", env!("CARGO_PKG_VERSION_PATCH"));

        mapping.insert("LIBTALKINGHEAD_AUTHORS", env!("CARGO_PKG_AUTHORS"));

        mapping
    }

    /// The most recent log lines of every [Logger].
    #[func]
    fn recent_logs() -> PackedStringArray {
        let mut r = PackedStringArray::new();
        for line in logger::recent_logs() {
            r.push(GodotString::from(line));
        }

        r
    }
}

struct GodotExtension;

#[gdextension]
unsafe impl ExtensionLibrary for GodotExtension {}
