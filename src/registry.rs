/*!
Discovery of the blend shapes and bones the animation core drives.

The registry is built once per model. It only stores handles into the [FaceRig] and
the animation state attached to them, never the model itself.
*/

use std::collections::HashMap;

use crate::{
    config::CandidateTable,
    model::{FaceRig, MeshId, MorphRef, NodeId, Rotation},
    Logger,
};

/// A `viseme_<code>` blend shape.
#[derive(Debug, Clone, PartialEq)]
pub struct VisemeBinding {
    /// The viseme code without the prefix, e.g. `aa`.
    pub code: String,
    pub morph: MorphRef,
    pub current: f32,
    pub target: f32,
}

/// A blend shape driven with the same smoothing law as the visemes.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendControl {
    pub name: String,
    pub morph: MorphRef,
    pub current: f32,
    pub target: f32,
}

impl BlendControl {
    fn new(name: String, morph: MorphRef) -> Self {
        Self {
            name,
            morph,
            current: 0.0,
            target: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JawBone {
    pub node: NodeId,
    pub name: String,
    /// Captured on first write, since the rest pose is only known once animation starts.
    pub original: Option<Rotation>,
    /// Target displacement of the x axis relative to `original`.
    pub target_offset_x: f32,
}

impl JawBone {
    /// Capture the baseline if this is the first write. The baseline never changes afterwards.
    pub fn capture<R: FaceRig + ?Sized>(&mut self, rig: &R) -> Rotation {
        *self.original.get_or_insert_with(|| rig.rotation(self.node))
    }
}

/// A pair of eye blink blend shapes living on the same mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeBlinkPair {
    pub left: MorphRef,
    pub right: MorphRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionControl {
    pub name: String,
    pub morph: MorphRef,
}

#[derive(Debug, Default, Clone)]
pub struct MorphTargetRegistry {
    visemes: Vec<VisemeBinding>,
    /// Viseme code to indices into `visemes`. A code can exist on multiple meshes.
    viseme_lookup: HashMap<String, Vec<usize>>,

    pub jaw_open: Option<BlendControl>,
    pub mouth_close: Option<BlendControl>,
    pub jaw_bone: Option<JawBone>,

    pub eye_blinks: Vec<EyeBlinkPair>,
    pub expressions: Vec<ExpressionControl>,
}

fn first_candidate(morphs: &HashMap<&str, usize>, candidates: &[String]) -> Option<(String, usize)> {
    candidates
        .iter()
        .find_map(|name| morphs.get(name.as_str()).map(|i| (name.clone(), *i)))
}

impl MorphTargetRegistry {
    /// Traverse the rig once and bind every control that can be found.
    ///
    /// Missing controls are not errors, they are simply left unbound.
    pub fn scan<R: FaceRig + ?Sized>(rig: &R, candidates: &CandidateTable, logger: &Logger) -> Self {
        let mut registry = Self::default();

        for mesh in (0..rig.mesh_count()).map(MeshId) {
            let mesh_name = rig.mesh_name(mesh);
            let targets = rig.morph_targets(mesh);
            if targets.is_empty() {
                logger.debug(format!("Mesh {mesh_name} has no blend shapes, skipping"));
                continue;
            }

            let morphs = targets
                .iter()
                .map(|(name, i)| (name.as_str(), *i))
                .collect::<HashMap<&str, usize>>();

            // Visemes are registered in blend shape order so scans are deterministic
            for (name, index) in targets.iter() {
                if let Some(code) = name.strip_prefix(candidates.viseme_prefix.as_str()) {
                    if code.is_empty() {
                        continue;
                    }

                    logger.debug(format!("Found viseme {name} on {mesh_name}"));
                    registry.add_viseme(code, MorphRef::new(mesh, *index));
                }
            }

            if registry.jaw_open.is_none() {
                if let Some((name, index)) = first_candidate(&morphs, &candidates.jaw_open) {
                    logger.debug(format!("Found jaw open {name} on {mesh_name}"));
                    registry.jaw_open = Some(BlendControl::new(name, MorphRef::new(mesh, index)));
                }
            }

            if registry.mouth_close.is_none() {
                if let Some((name, index)) = first_candidate(&morphs, &candidates.mouth_close) {
                    logger.debug(format!("Found mouth close {name} on {mesh_name}"));
                    registry.mouth_close =
                        Some(BlendControl::new(name, MorphRef::new(mesh, index)));
                }
            }

            match (
                first_candidate(&morphs, &candidates.eye_blink_left),
                first_candidate(&morphs, &candidates.eye_blink_right),
            ) {
                (Some((_, left)), Some((_, right))) => {
                    logger.debug(format!("Found eye blinks on {mesh_name}"));
                    registry.eye_blinks.push(EyeBlinkPair {
                        left: MorphRef::new(mesh, left),
                        right: MorphRef::new(mesh, right),
                    });
                }
                (None, None) => {}
                _ => logger.warn(format!(
                    "Mesh {mesh_name} only has one eye blink blend shape, skipping blinks"
                )),
            }

            for name in candidates.expressions.iter() {
                if let Some(index) = morphs.get(name.as_str()) {
                    registry.expressions.push(ExpressionControl {
                        name: name.clone(),
                        morph: MorphRef::new(mesh, *index),
                    });
                }
            }
        }

        for (node, name) in rig.nodes() {
            let lowercase = name.to_lowercase();
            if candidates
                .jaw_bone
                .iter()
                .any(|v| lowercase.contains(&v.to_lowercase()))
            {
                logger.debug(format!("Found jaw bone {name}"));
                registry.jaw_bone = Some(JawBone {
                    node,
                    name,
                    original: None,
                    target_offset_x: 0.0,
                });
                break;
            }
        }

        logger.info(format!(
            "Registered {} visemes, jaw open: {}, mouth close: {}, jaw bone: {}, blink pairs: {}",
            registry.visemes.len(),
            registry.jaw_open.is_some(),
            registry.mouth_close.is_some(),
            registry.jaw_bone.is_some(),
            registry.eye_blinks.len()
        ));

        registry
    }

    fn add_viseme(&mut self, code: &str, morph: MorphRef) {
        self.viseme_lookup
            .entry(code.to_string())
            .or_default()
            .push(self.visemes.len());
        self.visemes.push(VisemeBinding {
            code: code.to_string(),
            morph,
            current: 0.0,
            target: 0.0,
        });
    }

    pub fn visemes(&self) -> &[VisemeBinding] {
        &self.visemes
    }

    pub fn visemes_mut(&mut self) -> &mut [VisemeBinding] {
        &mut self.visemes
    }

    pub fn has_viseme(&self, code: &str) -> bool {
        self.viseme_lookup.contains_key(code)
    }

    /// Set all viseme targets back to 0. Current weights are untouched.
    pub fn clear_viseme_targets(&mut self) {
        for binding in self.visemes.iter_mut() {
            binding.target = 0.0;
        }
    }

    /// Set the target of every binding for `code`. Returns false if the model has no such viseme.
    pub fn set_viseme_target(&mut self, code: &str, weight: f32) -> bool {
        let Some(indices) = self.viseme_lookup.get(code) else {
            return false;
        };

        for i in indices {
            self.visemes[*i].target = weight.clamp(0.0, 1.0);
        }

        true
    }

    /// Target of the first binding for `code`.
    pub fn viseme_target(&self, code: &str) -> Option<f32> {
        self.viseme_lookup
            .get(code)
            .and_then(|v| v.first())
            .map(|i| self.visemes[*i].target)
    }

    pub fn set_jaw_open_target(&mut self, weight: f32) {
        if let Some(jaw) = self.jaw_open.as_mut() {
            jaw.target = weight.clamp(0.0, 1.0);
        }
    }

    pub fn set_jaw_bone_offset(&mut self, offset_x: f32) {
        if let Some(bone) = self.jaw_bone.as_mut() {
            bone.target_offset_x = offset_x;
        }
    }

    /// Every blend shape that belongs to the mouth.
    pub fn mouth_morphs(&self) -> Vec<MorphRef> {
        self.visemes
            .iter()
            .map(|v| v.morph)
            .chain(self.jaw_open.iter().map(|v| v.morph))
            .chain(self.mouth_close.iter().map(|v| v.morph))
            .collect()
    }

    /// Every blend shape used for blinking.
    pub fn blink_morphs(&self) -> Vec<MorphRef> {
        self.eye_blinks
            .iter()
            .flat_map(|v| [v.left, v.right])
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::MemoryRig;

    pub(crate) const PALETTE: [&str; 10] = [
        "viseme_sil",
        "viseme_PP",
        "viseme_FF",
        "viseme_TH",
        "viseme_DD",
        "viseme_kk",
        "viseme_CH",
        "viseme_E",
        "viseme_aa",
        "viseme_O",
    ];

    /// A head with the full viseme palette, jaw controls, blinks and a jaw bone.
    pub(crate) fn full_rig() -> (MemoryRig, MeshId) {
        let mut rig = MemoryRig::new();

        let mut morphs = PALETTE.to_vec();
        morphs.extend([
            "jawOpen",
            "mouthClose",
            "eyeBlinkLeft",
            "eyeBlinkRight",
            "browInnerUp",
            "eyeSquintLeft",
        ]);
        let head = rig.add_mesh("Wolf3D_Head", &morphs);

        rig.add_node("Hips", Rotation::ZERO);
        rig.add_node("Head", Rotation::ZERO);
        rig.add_node("Jaw", Rotation::new(0.1, 0.0, 0.0));

        (rig, head)
    }

    fn logger() -> Logger {
        Logger::create("RegistryTest")
    }

    #[test]
    fn scan_full_rig() {
        let (rig, head) = full_rig();
        let registry = MorphTargetRegistry::scan(&rig, &CandidateTable::default(), &logger());

        assert_eq!(registry.visemes().len(), PALETTE.len());
        for code in ["sil", "PP", "FF", "TH", "DD", "kk", "CH", "E", "aa", "O"] {
            assert!(registry.has_viseme(code), "missing {code}");
        }

        let jaw_open = registry.jaw_open.as_ref().unwrap();
        assert_eq!(jaw_open.name, "jawOpen");
        assert_eq!(jaw_open.morph, rig.morph(head, "jawOpen").unwrap());
        assert!(registry.mouth_close.is_some());

        let jaw_bone = registry.jaw_bone.as_ref().unwrap();
        assert_eq!(jaw_bone.name, "Jaw");
        assert!(jaw_bone.original.is_none());

        assert_eq!(registry.eye_blinks.len(), 1);
        assert_eq!(registry.expressions.len(), 2);
    }

    #[test]
    fn jaw_open_candidate_order() {
        let mut rig = MemoryRig::new();
        rig.add_mesh("Face", &["jaw_open", "MouthOpen"]);

        let registry = MorphTargetRegistry::scan(&rig, &CandidateTable::default(), &logger());

        // MouthOpen comes before jaw_open in the candidate list
        assert_eq!(registry.jaw_open.unwrap().name, "MouthOpen");
    }

    #[test]
    fn jaw_open_binds_first_mesh_only() {
        let mut rig = MemoryRig::new();
        let first = rig.add_mesh("Face", &["jawOpen"]);
        rig.add_mesh("Teeth", &["jawOpen"]);

        let registry = MorphTargetRegistry::scan(&rig, &CandidateTable::default(), &logger());

        assert_eq!(registry.jaw_open.unwrap().morph.mesh, first);
    }

    #[test]
    fn visemes_across_meshes() {
        let mut rig = MemoryRig::new();
        rig.add_mesh("Head", &["viseme_aa"]);
        rig.add_mesh("Teeth", &["viseme_aa", "viseme_"]);

        let mut registry =
            MorphTargetRegistry::scan(&rig, &CandidateTable::default(), &logger());

        assert_eq!(registry.visemes().len(), 2);
        assert!(registry.set_viseme_target("aa", 0.7));
        assert!(registry.visemes().iter().all(|v| v.target == 0.7));
    }

    #[test]
    fn first_jaw_bone_wins() {
        let mut rig = MemoryRig::new();
        rig.add_node("Spine", Rotation::ZERO);
        rig.add_node("LowerTEETH", Rotation::ZERO);
        rig.add_node("JawRoot", Rotation::ZERO);

        let registry = MorphTargetRegistry::scan(&rig, &CandidateTable::default(), &logger());

        assert_eq!(registry.jaw_bone.unwrap().name, "LowerTEETH");
    }

    #[test]
    fn custom_candidates() {
        let mut rig = MemoryRig::new();
        rig.add_mesh("Face", &["vis.aa", "Mouth_A"]);
        rig.add_node("J_Bip_C_Head", Rotation::ZERO);
        rig.add_node("Kiefer", Rotation::ZERO);

        let candidates = CandidateTable {
            viseme_prefix: "vis.".into(),
            jaw_open: vec!["Mouth_A".into()],
            jaw_bone: vec!["KIEFER".into()],
            ..Default::default()
        };
        let registry = MorphTargetRegistry::scan(&rig, &candidates, &logger());

        assert!(registry.has_viseme("aa"));
        assert_eq!(registry.jaw_open.unwrap().name, "Mouth_A");
        assert_eq!(registry.jaw_bone.unwrap().name, "Kiefer");
    }

    #[test]
    fn empty_rig() {
        let rig = MemoryRig::new();
        let mut registry = MorphTargetRegistry::scan(&rig, &CandidateTable::default(), &logger());

        assert!(registry.visemes().is_empty());
        assert!(registry.jaw_open.is_none());
        assert!(registry.jaw_bone.is_none());
        assert!(!registry.set_viseme_target("aa", 1.0));
        registry.set_jaw_open_target(1.0);
        registry.set_jaw_bone_offset(1.0);
    }

    #[test]
    fn single_eye_blink_is_skipped() {
        let mut rig = MemoryRig::new();
        rig.add_mesh("Face", &["eyeBlinkLeft"]);

        let registry = MorphTargetRegistry::scan(&rig, &CandidateTable::default(), &logger());

        assert!(registry.eye_blinks.is_empty());
    }

    #[test]
    fn jaw_bone_capture_is_stable() {
        let (mut rig, _) = full_rig();
        let mut registry =
            MorphTargetRegistry::scan(&rig, &CandidateTable::default(), &logger());
        let bone = registry.jaw_bone.as_mut().unwrap();

        assert_eq!(bone.capture(&rig), Rotation::new(0.1, 0.0, 0.0));

        rig.set_rotation(bone.node, Rotation::new(0.5, 0.5, 0.5));
        assert_eq!(bone.capture(&rig), Rotation::new(0.1, 0.0, 0.0));
    }

    #[test]
    fn targets_are_clamped() {
        let (rig, _) = full_rig();
        let mut registry =
            MorphTargetRegistry::scan(&rig, &CandidateTable::default(), &logger());

        registry.set_viseme_target("aa", 3.0);
        registry.set_jaw_open_target(-1.0);

        assert_eq!(registry.viseme_target("aa"), Some(1.0));
        assert_eq!(registry.jaw_open.unwrap().target, 0.0);
    }
}
