//! Visual mesh as handed over for soft-body registration.

use std::collections::HashMap;

use tandem_shared::constants::WELD_PRECISION;
use tandem_shared::{Mat4, Vec3};

use crate::error::{TopologyError, TopologyResult};

/// Flat vertex attributes of a renderable mesh.
///
/// `positions` and `normals` are xyz triples, `uvs` are uv pairs. For line
/// geometry `line_starts` optionally holds the start point of every segment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisualMesh {
    /// Vertex positions.
    pub positions: Vec<f32>,
    /// Vertex normals, parallel to `positions`.
    pub normals: Option<Vec<f32>>,
    /// Texture coordinates.
    pub uvs: Option<Vec<f32>>,
    /// Triangle indices.
    pub indices: Option<Vec<u32>>,
    /// Segment start points of line geometry.
    pub line_starts: Option<Vec<f32>>,
    baked: bool,
}

impl VisualMesh {
    /// Indexed triangle mesh.
    #[must_use]
    pub fn indexed(positions: Vec<f32>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices: Some(indices),
            ..Self::default()
        }
    }

    /// Triangle soup: every three vertices form a triangle.
    #[must_use]
    pub fn soup(positions: Vec<f32>) -> Self {
        Self {
            positions,
            ..Self::default()
        }
    }

    /// Polyline for ropes.
    #[must_use]
    pub fn line(positions: Vec<f32>) -> Self {
        Self::soup(positions)
    }

    /// Adds normals.
    #[must_use]
    pub fn with_normals(mut self, normals: Vec<f32>) -> Self {
        self.normals = Some(normals);
        self
    }

    /// Adds texture coordinates.
    #[must_use]
    pub fn with_uvs(mut self, uvs: Vec<f32>) -> Self {
        self.uvs = Some(uvs);
        self
    }

    /// Adds segment start points.
    #[must_use]
    pub fn with_line_starts(mut self, starts: Vec<f32>) -> Self {
        self.line_starts = Some(starts);
        self
    }

    /// Number of visual vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Whether the world transform has already been flattened in.
    #[must_use]
    pub const fn is_baked(&self) -> bool {
        self.baked
    }

    /// Flattens `world` into positions and normals once.
    ///
    /// Returns `false` if the mesh was already baked; the mesh is untouched.
    /// After a bake the caller resets the object's own transform to identity.
    pub fn bake(&mut self, world: &Mat4) -> bool {
        if self.baked {
            return false;
        }
        for p in self.positions.chunks_exact_mut(3) {
            let v = world.transform_point(Vec3::new(p[0], p[1], p[2]));
            p.copy_from_slice(&v.to_array());
        }
        if let Some(starts) = self.line_starts.as_mut() {
            for p in starts.chunks_exact_mut(3) {
                let v = world.transform_point(Vec3::new(p[0], p[1], p[2]));
                p.copy_from_slice(&v.to_array());
            }
        }
        if let Some(normals) = self.normals.as_mut() {
            for n in normals.chunks_exact_mut(3) {
                let v = world.transform_normal(Vec3::new(n[0], n[1], n[2]));
                n.copy_from_slice(&v.to_array());
            }
        }
        self.baked = true;
        true
    }

    /// Physics vertices of a rope: segment starts when present, otherwise
    /// the positions themselves.
    #[must_use]
    pub fn rope_vertices(&self) -> &[f32] {
        match &self.line_starts {
            Some(starts) if !starts.is_empty() => starts,
            _ => &self.positions,
        }
    }

    /// Synthesizes an index buffer for a triangle soup by merging vertices
    /// whose position, normal and uv all match after quantization.
    ///
    /// Attributes are rewritten to the merged vertex set. Already indexed
    /// meshes are left alone.
    ///
    /// # Errors
    ///
    /// Fails for empty geometry, attributes with mismatched lengths, or a
    /// vertex count that is not a whole number of triangles.
    pub fn ensure_indexed(&mut self) -> TopologyResult<()> {
        if self.indices.is_some() {
            return Ok(());
        }
        self.check_attributes()?;
        let count = self.vertex_count();
        if count % 3 != 0 {
            return Err(TopologyError::NotTriangulated(count));
        }

        let mut lookup: HashMap<Vec<i64>, u32> = HashMap::with_capacity(count);
        let mut indices = Vec::with_capacity(count);
        let mut positions = Vec::with_capacity(self.positions.len());
        let mut normals = self.normals.as_ref().map(|n| Vec::with_capacity(n.len()));
        let mut uvs = self.uvs.as_ref().map(|u| Vec::with_capacity(u.len()));

        for v in 0..count {
            let key = self.attribute_key(v);
            let next = (positions.len() / 3) as u32;
            let index = *lookup.entry(key).or_insert_with(|| {
                positions.extend_from_slice(&self.positions[v * 3..v * 3 + 3]);
                if let (Some(dst), Some(src)) = (normals.as_mut(), self.normals.as_ref()) {
                    dst.extend_from_slice(&src[v * 3..v * 3 + 3]);
                }
                if let (Some(dst), Some(src)) = (uvs.as_mut(), self.uvs.as_ref()) {
                    dst.extend_from_slice(&src[v * 2..v * 2 + 2]);
                }
                next
            });
            indices.push(index);
        }

        tracing::debug!(
            before = count,
            after = positions.len() / 3,
            "re-indexed triangle soup"
        );
        self.positions = positions;
        self.normals = normals;
        self.uvs = uvs;
        self.indices = Some(indices);
        Ok(())
    }

    fn check_attributes(&self) -> TopologyResult<()> {
        if self.positions.is_empty() {
            return Err(TopologyError::Empty);
        }
        if self.positions.len() % 3 != 0 {
            return Err(TopologyError::MissingAttribute("position"));
        }
        let count = self.vertex_count();
        if self.normals.as_ref().is_some_and(|n| n.len() != count * 3) {
            return Err(TopologyError::MissingAttribute("normal"));
        }
        if self.uvs.as_ref().is_some_and(|u| u.len() != count * 2) {
            return Err(TopologyError::MissingAttribute("uv"));
        }
        Ok(())
    }

    fn attribute_key(&self, v: usize) -> Vec<i64> {
        let mut key: Vec<i64> = self.positions[v * 3..v * 3 + 3]
            .iter()
            .map(|x| quantize(*x))
            .collect();
        if let Some(n) = &self.normals {
            key.extend(n[v * 3..v * 3 + 3].iter().map(|x| quantize(*x)));
        }
        if let Some(uv) = &self.uvs {
            key.extend(uv[v * 2..v * 2 + 2].iter().map(|x| quantize(*x)));
        }
        key
    }
}

/// Grid coordinate of one component at weld precision.
#[inline]
pub(crate) fn quantize(value: f32) -> i64 {
    (f64::from(value) * f64::from(WELD_PRECISION)).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_shared::Quaternion;

    #[test]
    fn test_bake_only_once() {
        let mut mesh = VisualMesh::indexed(vec![1.0, 0.0, 0.0], vec![0, 0, 0])
            .with_normals(vec![1.0, 0.0, 0.0]);
        let world = Mat4::compose(
            Vec3::new(0.0, 5.0, 0.0),
            Quaternion::from_axis_angle(Vec3::Y, std::f32::consts::FRAC_PI_2),
            Vec3::ONE,
        );

        assert!(mesh.bake(&world));
        let baked = mesh.positions.clone();
        assert!((baked[0]).abs() < 1e-5);
        assert!((baked[1] - 5.0).abs() < 1e-5);
        assert!((baked[2] + 1.0).abs() < 1e-5);
        let n = mesh.normals.as_ref().unwrap();
        assert!((n[2] + 1.0).abs() < 1e-5);

        assert!(!mesh.bake(&world));
        assert_eq!(mesh.positions, baked);
        assert!(mesh.is_baked());
    }

    #[test]
    fn test_soup_reindexes_on_all_attributes() {
        // two triangles sharing an edge; the shared corner at (1,0,0) has
        // different uvs on each side and must not merge
        let positions = vec![
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, //
            1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0,
        ];
        let uvs = vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.5, 0.0, 1.0, 1.0, 0.0, 1.0];
        let mut mesh = VisualMesh::soup(positions).with_uvs(uvs);
        mesh.ensure_indexed().unwrap();

        assert_eq!(mesh.vertex_count(), 5);
        assert_eq!(mesh.indices.as_deref(), Some(&[0, 1, 2, 3, 4, 2][..]));
        assert_eq!(mesh.uvs.as_ref().unwrap().len(), 10);
    }

    #[test]
    fn test_soup_must_be_triangulated() {
        let mut mesh = VisualMesh::soup(vec![0.0; 12]);
        assert_eq!(mesh.ensure_indexed(), Err(TopologyError::NotTriangulated(4)));

        let mut empty = VisualMesh::soup(Vec::new());
        assert_eq!(empty.ensure_indexed(), Err(TopologyError::Empty));
    }

    #[test]
    fn test_mismatched_normals_rejected() {
        let mut mesh = VisualMesh::soup(vec![0.0; 9]).with_normals(vec![0.0; 6]);
        assert_eq!(
            mesh.ensure_indexed(),
            Err(TopologyError::MissingAttribute("normal"))
        );
    }

    #[test]
    fn test_rope_vertices_prefer_line_starts() {
        let line = VisualMesh::line(vec![0.0; 12]);
        assert_eq!(line.rope_vertices().len(), 12);

        let segments = VisualMesh::line(vec![0.0; 12]).with_line_starts(vec![1.0; 6]);
        assert_eq!(segments.rope_vertices(), &[1.0; 6]);
    }
}
