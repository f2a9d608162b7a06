//! The per-frame write stage shared by every driver.

use crate::{
    model::{FaceRig, Rotation},
    registry::{BlendControl, MorphTargetRegistry},
};

/// Move `current` a fraction `alpha` of the way towards `target`.
///
/// For `alpha` in (0, 1] this never overshoots.
pub fn smooth(current: f32, target: f32, alpha: f32) -> f32 {
    current + (target - current) * alpha
}

fn smooth_control<R: FaceRig + ?Sized>(rig: &mut R, control: &mut BlendControl, alpha: f32) {
    control.current = smooth(control.current, control.target, alpha);
    rig.set_influence(control.morph, control.current);
}

/// Smooth every mouth control towards its target and write the result into the rig.
pub fn apply<R: FaceRig + ?Sized>(registry: &mut MorphTargetRegistry, rig: &mut R, alpha: f32) {
    for binding in registry.visemes_mut() {
        binding.current = smooth(binding.current, binding.target, alpha);
        rig.set_influence(binding.morph, binding.current);
    }

    if let Some(control) = registry.jaw_open.as_mut() {
        smooth_control(rig, control, alpha);
    }
    if let Some(control) = registry.mouth_close.as_mut() {
        smooth_control(rig, control, alpha);
    }

    if let Some(bone) = registry.jaw_bone.as_mut() {
        let original = bone.capture(&*rig);
        let current = rig.rotation(bone.node);

        // Only x is ever displaced, y and z are pulled back to the baseline
        let rotation = Rotation::new(
            smooth(current.x, original.x + bone.target_offset_x, alpha),
            smooth(current.y, original.y, alpha),
            smooth(current.z, original.z, alpha),
        );
        rig.set_rotation(bone.node, rotation);
    }
}

/// Immediately silence the mouth. Both current and target weights become 0.
pub fn reset_to_idle<R: FaceRig + ?Sized>(registry: &mut MorphTargetRegistry, rig: &mut R) {
    for binding in registry.visemes_mut() {
        binding.current = 0.0;
        binding.target = 0.0;
        rig.set_influence(binding.morph, 0.0);
    }

    for control in [registry.jaw_open.as_mut(), registry.mouth_close.as_mut()]
        .into_iter()
        .flatten()
    {
        control.current = 0.0;
        control.target = 0.0;
        rig.set_influence(control.morph, 0.0);
    }

    if let Some(bone) = registry.jaw_bone.as_mut() {
        bone.target_offset_x = 0.0;
        // Nothing was ever displaced if the baseline was never captured
        if let Some(original) = bone.original {
            rig.set_rotation(bone.node, original);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::CandidateTable, registry::tests::full_rig, Logger};

    fn registry_for(rig: &crate::model::MemoryRig) -> MorphTargetRegistry {
        MorphTargetRegistry::scan(rig, &CandidateTable::default(), &Logger::create("ApplyTest"))
    }

    #[test]
    fn smoothing_converges_without_overshoot() {
        let target = 0.8;
        let mut current = 0.0;

        for _ in 0..30 {
            let next = smooth(current, target, 0.3);

            assert!((next - target).abs() < (current - target).abs());
            assert!(next <= target);
            current = next;
        }

        assert!((current - target).abs() < 1e-4);
    }

    #[test]
    fn smoothing_from_above() {
        let mut current = 1.0;

        for _ in 0..20 {
            let next = smooth(current, 0.2, 0.3);

            assert!(next >= 0.2);
            assert!(next < current);
            current = next;
        }
    }

    #[test]
    fn apply_writes_smoothed_weights() {
        let (mut rig, head) = full_rig();
        let mut registry = registry_for(&rig);

        registry.set_viseme_target("aa", 1.0);
        registry.set_jaw_open_target(0.5);
        apply(&mut registry, &mut rig, 0.3);

        assert!((rig.weight(head, "viseme_aa") - 0.3).abs() < 1e-6);
        assert!((rig.weight(head, "jawOpen") - 0.15).abs() < 1e-6);
        assert_eq!(rig.weight(head, "viseme_O"), 0.0);

        apply(&mut registry, &mut rig, 0.3);
        assert!((rig.weight(head, "viseme_aa") - 0.51).abs() < 1e-6);
    }

    #[test]
    fn jaw_bone_only_moves_x() {
        let (mut rig, _) = full_rig();
        let mut registry = registry_for(&rig);
        let node = registry.jaw_bone.as_ref().unwrap().node;

        // Something else pushed the bone off its baseline after capture
        apply(&mut registry, &mut rig, 0.3);
        rig.set_rotation(node, Rotation::new(0.1, 0.5, -0.5));

        registry.set_jaw_bone_offset(0.2);
        apply(&mut registry, &mut rig, 1.0);

        let rotation = rig.rotation(node);
        assert!((rotation.x - 0.3).abs() < 1e-6);
        assert_eq!(rotation.y, 0.0);
        assert_eq!(rotation.z, 0.0);
    }

    #[test]
    fn reset_is_idempotent() {
        let (mut rig, head) = full_rig();
        let mut registry = registry_for(&rig);
        let node = registry.jaw_bone.as_ref().unwrap().node;

        registry.set_viseme_target("aa", 1.0);
        registry.set_jaw_open_target(1.0);
        registry.set_jaw_bone_offset(0.2);
        for _ in 0..5 {
            apply(&mut registry, &mut rig, 0.3);
        }

        reset_to_idle(&mut registry, &mut rig);
        let first = rig.influences(head).to_vec();
        let first_rotation = rig.rotation(node);

        reset_to_idle(&mut registry, &mut rig);

        assert_eq!(rig.influences(head), first.as_slice());
        assert_eq!(rig.rotation(node), first_rotation);
        assert!(first.iter().all(|v| *v == 0.0));
        assert_eq!(first_rotation, Rotation::new(0.1, 0.0, 0.0));
        assert!(registry.visemes().iter().all(|v| v.current == 0.0 && v.target == 0.0));
    }

    #[test]
    fn reset_before_capture_leaves_bone() {
        let (mut rig, _) = full_rig();
        let mut registry = registry_for(&rig);
        let node = registry.jaw_bone.as_ref().unwrap().node;

        rig.set_rotation(node, Rotation::new(1.0, 1.0, 1.0));
        reset_to_idle(&mut registry, &mut rig);

        assert_eq!(rig.rotation(node), Rotation::new(1.0, 1.0, 1.0));
    }
}
