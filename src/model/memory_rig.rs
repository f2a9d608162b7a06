use super::face_rig::{FaceRig, MeshId, MorphRef, NodeId, Rotation};

#[derive(Debug, Clone)]
struct MemoryMesh {
    name: String,
    morph_names: Vec<String>,
    influences: Vec<f32>,
}

#[derive(Debug, Clone)]
struct MemoryNode {
    name: String,
    rotation: Rotation,
}

/// A [FaceRig] that lives entirely in memory. Used when no engine is available.
#[derive(Debug, Default, Clone)]
pub struct MemoryRig {
    meshes: Vec<MemoryMesh>,
    nodes: Vec<MemoryNode>,
}

impl MemoryRig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mesh with the given blend shapes, all starting at 0.
    pub fn add_mesh(&mut self, name: &str, morph_names: &[&str]) -> MeshId {
        self.meshes.push(MemoryMesh {
            name: name.to_string(),
            morph_names: morph_names.iter().map(|v| v.to_string()).collect(),
            influences: vec![0.0; morph_names.len()],
        });

        MeshId(self.meshes.len() - 1)
    }

    pub fn add_node(&mut self, name: &str, rotation: Rotation) -> NodeId {
        self.nodes.push(MemoryNode {
            name: name.to_string(),
            rotation,
        });

        NodeId(self.nodes.len() - 1)
    }

    /// Look up a blend shape by mesh and name.
    pub fn morph(&self, mesh: MeshId, name: &str) -> Option<MorphRef> {
        self.meshes
            .get(mesh.0)?
            .morph_names
            .iter()
            .position(|v| v == name)
            .map(|index| MorphRef::new(mesh, index))
    }

    /// Influence of a named blend shape, 0.0 if it does not exist.
    pub fn weight(&self, mesh: MeshId, name: &str) -> f32 {
        self.morph(mesh, name)
            .map(|v| self.influence(v))
            .unwrap_or_default()
    }

    /// Every influence on a mesh, in index order.
    pub fn influences(&self, mesh: MeshId) -> &[f32] {
        self.meshes
            .get(mesh.0)
            .map(|v| v.influences.as_slice())
            .unwrap_or_default()
    }
}

impl FaceRig for MemoryRig {
    fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    fn mesh_name(&self, mesh: MeshId) -> String {
        self.meshes
            .get(mesh.0)
            .map(|v| v.name.clone())
            .unwrap_or_default()
    }

    fn morph_targets(&self, mesh: MeshId) -> Vec<(String, usize)> {
        self.meshes
            .get(mesh.0)
            .map(|v| {
                v.morph_names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.clone(), i))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn influence(&self, morph: MorphRef) -> f32 {
        self.meshes
            .get(morph.mesh.0)
            .and_then(|v| v.influences.get(morph.index))
            .copied()
            .unwrap_or_default()
    }

    fn set_influence(&mut self, morph: MorphRef, weight: f32) {
        if let Some(v) = self
            .meshes
            .get_mut(morph.mesh.0)
            .and_then(|v| v.influences.get_mut(morph.index))
        {
            *v = weight;
        }
    }

    fn nodes(&self) -> Vec<(NodeId, String)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, v)| (NodeId(i), v.name.clone()))
            .collect()
    }

    fn rotation(&self, node: NodeId) -> Rotation {
        self.nodes
            .get(node.0)
            .map(|v| v.rotation)
            .unwrap_or_default()
    }

    fn set_rotation(&mut self, node: NodeId, rotation: Rotation) {
        if let Some(v) = self.nodes.get_mut(node.0) {
            v.rotation = rotation;
        }
    }
}
