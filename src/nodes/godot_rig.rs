use godot::{
    engine::{ArrayMesh, MeshInstance3D, Node3D, Skeleton3D},
    prelude::*,
};

use crate::{
    gstring,
    model::{FaceRig, MeshId, MorphRef, NodeId, Rotation},
    Logger,
};

const MESH_INST_3D: &str = "MeshInstance3D";
/// Pattern for finding the skeleton node.
const SKELETON_NODE_NAME: &str = "*Skeleton*";

struct RigMesh {
    name: String,
    instance: Gd<MeshInstance3D>,
    blend_shapes: Vec<String>,
    /// Euler rotation when the rig was built.
    rest: Vector3,
    offset: Rotation,
}

struct RigBone {
    index: i32,
    name: String,
    /// Pose rotation when the rig was built.
    rest: Quaternion,
    offset: Rotation,
}

/// A [FaceRig] over the skeleton and meshes of a loaded model.
///
/// Rotations are offsets from the pose at build time. Bones come first in [FaceRig::nodes],
/// followed by the meshes.
pub struct GodotRig {
    skeleton: Option<Gd<Skeleton3D>>,
    bones: Vec<RigBone>,
    meshes: Vec<RigMesh>,
}

impl GodotRig {
    /// Collect every mesh under the model's skeleton.
    pub fn build(root: &Gd<Node3D>, logger: &Logger) -> Self {
        let skeleton = match root
            .find_child_ex(gstring!(SKELETON_NODE_NAME))
            .owned(false)
            .done()
        {
            Some(v) => match v.try_cast::<Skeleton3D>() {
                Some(v) => Some(v),
                None => {
                    logger.error("Skeleton node was not a Skeleton3D");
                    None
                }
            },
            None => {
                logger.warn("No skeleton found, the model will not be animated");
                None
            }
        };

        let Some(skeleton) = skeleton else {
            return Self {
                skeleton: None,
                bones: vec![],
                meshes: vec![],
            };
        };

        let bones = (0..skeleton.get_bone_count())
            .map(|i| RigBone {
                index: i,
                name: skeleton.get_bone_name(i).to_string(),
                rest: skeleton.get_bone_pose_rotation(i),
                offset: Rotation::ZERO,
            })
            .collect::<Vec<_>>();

        let mesh_instance_3d_name = StringName::from(MESH_INST_3D);

        let mut meshes = vec![];
        for child in skeleton.get_children().iter_shared() {
            let child_name = child.get_name().to_string();

            if !child.is_class(mesh_instance_3d_name.clone().into()) {
                logger.debug(format!("Child {child_name} was not a MeshInstance3D, skipping"));
                continue;
            }

            let Some(instance) = child.try_cast::<MeshInstance3D>() else {
                logger.error(format!(
                    "Skeleton child {child_name} was a MeshInstance3D but was unable to cast to MeshInstance3D"
                ));
                continue;
            };

            let blend_shapes = match instance.get_mesh().and_then(|v| v.try_cast::<ArrayMesh>()) {
                Some(mesh) => (0..mesh.get_blend_shape_count())
                    .map(|i| mesh.get_blend_shape_name(i).to_string())
                    .collect(),
                None => {
                    logger.debug(format!("{child_name} has no ArrayMesh, no blend shapes"));
                    vec![]
                }
            };

            meshes.push(RigMesh {
                name: child_name,
                rest: instance.get_rotation(),
                instance,
                blend_shapes,
                offset: Rotation::ZERO,
            });
        }

        logger.debug(format!(
            "Built rig with {} bones and {} meshes",
            bones.len(),
            meshes.len()
        ));

        Self {
            skeleton: Some(skeleton),
            bones,
            meshes,
        }
    }

    fn mesh(&self, mesh: MeshId) -> Option<&RigMesh> {
        self.meshes.get(mesh.0)
    }
}

fn to_vector(rotation: Rotation) -> Vector3 {
    Vector3::new(rotation.x, rotation.y, rotation.z)
}

impl FaceRig for GodotRig {
    fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    fn mesh_name(&self, mesh: MeshId) -> String {
        self.mesh(mesh).map(|v| v.name.clone()).unwrap_or_default()
    }

    fn morph_targets(&self, mesh: MeshId) -> Vec<(String, usize)> {
        self.mesh(mesh)
            .map(|v| {
                v.blend_shapes
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.clone(), i))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn influence(&self, morph: MorphRef) -> f32 {
        match self.mesh(morph.mesh) {
            Some(v) if morph.index < v.blend_shapes.len() => {
                v.instance.get_blend_shape_value(morph.index as i32)
            }
            _ => 0.0,
        }
    }

    fn set_influence(&mut self, morph: MorphRef, weight: f32) {
        if let Some(v) = self.meshes.get_mut(morph.mesh.0) {
            if morph.index < v.blend_shapes.len() {
                v.instance
                    .set_blend_shape_value(morph.index as i32, weight);
            }
        }
    }

    fn nodes(&self) -> Vec<(NodeId, String)> {
        let bones = self.bones.iter().map(|v| v.name.clone());
        let meshes = self.meshes.iter().map(|v| v.name.clone());

        bones
            .chain(meshes)
            .enumerate()
            .map(|(i, name)| (NodeId(i), name))
            .collect()
    }

    fn rotation(&self, node: NodeId) -> Rotation {
        if let Some(bone) = self.bones.get(node.0) {
            return bone.offset;
        }

        self.meshes
            .get(node.0 - self.bones.len())
            .map(|v| v.offset)
            .unwrap_or_default()
    }

    fn set_rotation(&mut self, node: NodeId, rotation: Rotation) {
        let bone_count = self.bones.len();

        if let Some(bone) = self.bones.get_mut(node.0) {
            let Some(skeleton) = self.skeleton.as_mut() else {
                return;
            };

            bone.offset = rotation;
            skeleton.set_bone_pose_rotation(
                bone.index,
                bone.rest * Quaternion::from_euler(to_vector(rotation)),
            );
        } else if let Some(mesh) = self.meshes.get_mut(node.0 - bone_count) {
            mesh.offset = rotation;
            mesh.instance.set_rotation(mesh.rest + to_vector(rotation));
        }
    }
}
