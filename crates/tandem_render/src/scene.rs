//! Scene-side capabilities the frame sync writes into.
//!
//! The sync never owns a renderer. It reads parent transforms and writes
//! local transforms and vertex attributes through these traits; the plain
//! structs below implement them for headless use.

use tandem_core::VisualMesh;
use tandem_shared::{Mat4, Quaternion, Vec3};

/// An object whose transform the simulation drives.
pub trait Transformable {
    /// World matrix of the parent, `None` at the scene root.
    fn parent_world_matrix(&self) -> Option<Mat4>;

    /// Sets the local position and rotation. Scale stays with the scene.
    fn apply_local(&mut self, position: Vec3, rotation: Quaternion);
}

/// A mesh whose vertices the simulation drives.
pub trait Deformable {
    /// Visual positions, xyz triples.
    fn positions_mut(&mut self) -> &mut [f32];

    /// Visual normals, when the mesh has them.
    fn normals_mut(&mut self) -> Option<&mut [f32]>;

    /// Flags attributes for re-upload.
    fn mark_dirty(&mut self) {}
}

/// Line geometry for debug drawing.
pub trait DebugGeometry {
    /// Replaces the drawn range with `positions.len() / 3` vertices.
    fn update(&mut self, positions: &[f32], colors: &[f32]);
}

// ============================================================================
// HEADLESS IMPLEMENTATIONS
// ============================================================================

/// Transform node.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneNode {
    /// Local position.
    pub position: Vec3,
    /// Local rotation.
    pub rotation: Quaternion,
    /// Local scale.
    pub scale: Vec3,
    /// Parent world matrix, `None` at the root.
    pub parent: Option<Mat4>,
    /// Times the sync wrote this node.
    pub updates: u64,
}

impl SceneNode {
    /// Root-level node at `position`.
    #[must_use]
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quaternion::IDENTITY,
            scale: Vec3::ONE,
            parent: None,
            updates: 0,
        }
    }

    /// Parents the node under `parent`.
    #[must_use]
    pub fn with_parent(mut self, parent: Mat4) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Local matrix.
    #[must_use]
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::compose(self.position, self.rotation, self.scale)
    }

    /// World matrix.
    #[must_use]
    pub fn world_matrix(&self) -> Mat4 {
        match self.parent {
            Some(parent) => parent * self.local_matrix(),
            None => self.local_matrix(),
        }
    }
}

impl Default for SceneNode {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

impl Transformable for SceneNode {
    fn parent_world_matrix(&self) -> Option<Mat4> {
        self.parent
    }

    fn apply_local(&mut self, position: Vec3, rotation: Quaternion) {
        self.position = position;
        self.rotation = rotation;
        self.updates += 1;
    }
}

/// Vertex attributes of a deformable mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SoftMesh {
    /// Positions.
    pub positions: Vec<f32>,
    /// Normals.
    pub normals: Option<Vec<f32>>,
    /// Bumped on every write.
    pub version: u64,
}

impl SoftMesh {
    /// Attribute arrays of a prepared visual mesh.
    #[must_use]
    pub fn from_visual(mesh: &VisualMesh) -> Self {
        Self {
            positions: mesh.positions.clone(),
            normals: mesh.normals.clone(),
            version: 0,
        }
    }

    /// Rope attributes: one vertex per physics node.
    #[must_use]
    pub fn rope(mesh: &VisualMesh) -> Self {
        Self {
            positions: mesh.rope_vertices().to_vec(),
            normals: None,
            version: 0,
        }
    }
}

impl Deformable for SoftMesh {
    fn positions_mut(&mut self) -> &mut [f32] {
        &mut self.positions
    }

    fn normals_mut(&mut self) -> Option<&mut [f32]> {
        self.normals.as_deref_mut()
    }

    fn mark_dirty(&mut self) {
        self.version += 1;
    }
}

/// Debug line buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DebugLines {
    /// Line vertex positions, pairs form segments.
    pub positions: Vec<f32>,
    /// Per-vertex colors.
    pub colors: Vec<f32>,
    /// Bumped on every update.
    pub version: u64,
}

impl DebugLines {
    /// Vertices in the draw range.
    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.positions.len() / 3
    }
}

impl DebugGeometry for DebugLines {
    fn update(&mut self, positions: &[f32], colors: &[f32]) {
        self.positions.clear();
        self.positions.extend_from_slice(positions);
        self.colors.clear();
        self.colors.extend_from_slice(colors);
        self.version += 1;
    }
}
