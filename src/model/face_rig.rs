use serde::{Deserialize, Serialize};

/// Index of a mesh inside a [FaceRig].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub usize);

/// Index of a node (bone or mesh) inside a [FaceRig].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// A single blend shape on a single mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MorphRef {
    pub mesh: MeshId,
    pub index: usize,
}

impl MorphRef {
    pub fn new(mesh: MeshId, index: usize) -> Self {
        Self { mesh, index }
    }
}

/// Euler rotation in radians.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Rotation {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// The scene graph the animation core writes into.
///
/// The animation core only ever reads names once, at scan time, and afterwards only
/// writes blend shape influences and node rotations. Implementations must ignore
/// handles that no longer resolve instead of panicking.
pub trait FaceRig {
    fn mesh_count(&self) -> usize;

    fn mesh_name(&self, mesh: MeshId) -> String;

    /// Blend shape names and their influence indices for a mesh.
    fn morph_targets(&self, mesh: MeshId) -> Vec<(String, usize)>;

    fn influence(&self, morph: MorphRef) -> f32;

    fn set_influence(&mut self, morph: MorphRef, weight: f32);

    /// All rotatable nodes in traversal order, bones and meshes alike.
    fn nodes(&self) -> Vec<(NodeId, String)>;

    fn rotation(&self, node: NodeId) -> Rotation;

    fn set_rotation(&mut self, node: NodeId, rotation: Rotation);
}
