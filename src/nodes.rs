pub mod godot_rig;
pub mod spectrum;
pub mod talking_head;
