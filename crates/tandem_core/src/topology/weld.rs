//! # Welding
//!
//! Collapses visual vertices that share a quantized position into one
//! physics vertex and records where every visual vertex went.
//!
//! ```text
//! visual   v0  v1  v2  v3  v4        (v3 sits on v1: UV seam)
//!           │   │   │  ╱   │
//! physics  p0  p1  p2      p3
//!
//! scatter  [0,  1,  2,  1,  3]       visual[v] = physics[scatter[v]]
//! ```
//!
//! The first visual vertex with a given key is canonical; its position and
//! normal seed the physics vertex. Output is deterministic for a given
//! input.

use std::collections::HashMap;

use crate::error::{TopologyError, TopologyResult};
use crate::topology::mesh::{quantize, VisualMesh};

/// Deduplicated physics topology plus the map back to the visual mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeldedTopology {
    /// Physics vertex positions (xyz).
    pub vertices: Vec<f32>,
    /// Physics vertex normals (xyz), zero where the visual mesh had none.
    pub normals: Vec<f32>,
    /// Triangle indices into `vertices`.
    pub indices: Vec<u32>,
    /// Physics vertex of each visual vertex.
    pub scatter: Vec<u32>,
}

impl WeldedTopology {
    /// Physics vertex count.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Visual vertex count.
    #[must_use]
    pub fn visual_count(&self) -> usize {
        self.scatter.len()
    }
}

/// Welds an indexed triangle mesh.
///
/// # Arguments
///
/// * `positions` - Visual positions, xyz
/// * `normals` - Optional visual normals parallel to `positions`
/// * `indices` - Triangle indices into the visual vertices
///
/// # Errors
///
/// Fails for empty or malformed attributes, an index count that is not a
/// multiple of three, or an index past the vertex array.
pub fn weld(
    positions: &[f32],
    normals: Option<&[f32]>,
    indices: &[u32],
) -> TopologyResult<WeldedTopology> {
    if positions.is_empty() {
        return Err(TopologyError::Empty);
    }
    if positions.len() % 3 != 0 {
        return Err(TopologyError::MissingAttribute("position"));
    }
    if normals.is_some_and(|n| n.len() != positions.len()) {
        return Err(TopologyError::MissingAttribute("normal"));
    }
    if indices.is_empty() {
        return Err(TopologyError::MissingIndex);
    }
    if indices.len() % 3 != 0 {
        return Err(TopologyError::NotTriangulated(indices.len()));
    }
    let visual_count = positions.len() / 3;
    if let Some(&index) = indices.iter().find(|&&i| i as usize >= visual_count) {
        return Err(TopologyError::IndexOutOfRange {
            index,
            vertex_count: visual_count,
        });
    }

    let mut canonical: HashMap<[i64; 3], u32> = HashMap::with_capacity(visual_count);
    let mut out = WeldedTopology {
        vertices: Vec::with_capacity(positions.len()),
        normals: Vec::with_capacity(positions.len()),
        indices: Vec::with_capacity(indices.len()),
        scatter: Vec::with_capacity(visual_count),
    };

    for (v, p) in positions.chunks_exact(3).enumerate() {
        let key = [quantize(p[0]), quantize(p[1]), quantize(p[2])];
        let next = out.vertex_count() as u32;
        let physics = *canonical.entry(key).or_insert_with(|| {
            out.vertices.extend_from_slice(p);
            match normals {
                Some(n) => out.normals.extend_from_slice(&n[v * 3..v * 3 + 3]),
                None => out.normals.extend_from_slice(&[0.0; 3]),
            }
            next
        });
        out.scatter.push(physics);
    }

    out.indices
        .extend(indices.iter().map(|&i| out.scatter[i as usize]));

    Ok(out)
}

/// Welds a visual mesh, synthesizing an index buffer first if it has none.
///
/// # Errors
///
/// Same as [`weld`], plus the re-indexing failures of
/// [`VisualMesh::ensure_indexed`].
pub fn weld_mesh(mesh: &mut VisualMesh) -> TopologyResult<WeldedTopology> {
    mesh.ensure_indexed()?;
    let indices = mesh.indices.as_deref().ok_or(TopologyError::MissingIndex)?;
    weld(&mesh.positions, mesh.normals.as_deref(), indices)
}

/// Fans physics xyz triples out to the visual array.
///
/// `visual[v] = physics[scatter[v]]` for every `v` that fits both arrays.
pub fn scatter(physics: &[f32], scatter: &[u32], visual: &mut [f32]) {
    for (dst, &p) in visual.chunks_exact_mut(3).zip(scatter) {
        let src = p as usize * 3;
        if let Some(values) = physics.get(src..src + 3) {
            dst.copy_from_slice(values);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two quads, four triangles. The second quad's diagonal is a UV seam,
    /// so visual vertex 8 repeats vertex 4: nine visual vertices, one
    /// coincident pair, eight distinct positions.
    fn seam_quads() -> (Vec<f32>, Vec<u32>) {
        let positions = vec![
            0.0, 0.0, 0.0, // 0
            1.0, 0.0, 0.0, // 1
            1.0, 1.0, 0.0, // 2
            0.0, 1.0, 0.0, // 3
            2.0, 0.0, 0.0, // 4
            3.0, 0.0, 0.0, // 5
            3.0, 1.0, 0.0, // 6
            2.0, 1.0, 0.0, // 7
            2.0, 0.0, 0.0, // 8, seam copy of 4
        ];
        let indices = vec![
            0, 1, 2, 0, 2, 3, // first quad
            4, 5, 6, 8, 6, 7, // second quad, upper triangle on the seam copy
        ];
        (positions, indices)
    }

    #[test]
    fn test_seam_vertices_share_physics_vertex() {
        let (positions, indices) = seam_quads();
        let welded = weld(&positions, None, &indices).unwrap();

        assert_eq!(indices.len() / 3, 4);
        assert_eq!(welded.vertex_count(), 8);
        assert_eq!(welded.scatter.len(), 9);
        assert_eq!(welded.scatter[4], welded.scatter[8]);
        let mut distinct = welded.scatter.clone();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(distinct.len(), 8);

        // both triangles of the seamed quad start on the same physics vertex
        assert_eq!(welded.indices.len(), indices.len());
        assert_eq!(welded.indices[6], welded.indices[9]);
        assert!(welded
            .indices
            .iter()
            .all(|&i| (i as usize) < welded.vertex_count()));
    }

    #[test]
    fn test_weld_is_deterministic() {
        let (positions, indices) = seam_quads();
        let a = weld(&positions, None, &indices).unwrap();
        let b = weld(&positions, None, &indices).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_near_duplicates_within_tolerance_merge() {
        let positions = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0 + 1e-7, 0.0, 0.0];
        let welded = weld(&positions, None, &[0, 1, 2]).unwrap();
        assert_eq!(welded.vertex_count(), 2);
        assert_eq!(welded.indices, vec![0, 1, 1]);
    }

    #[test]
    fn test_canonical_normal_seeds_physics() {
        let positions = vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        let normals = vec![0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0];
        let welded = weld(&positions, Some(&normals), &[0, 1, 2]).unwrap();
        assert_eq!(&welded.normals[..3], &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_rejects_bad_indices() {
        let positions = vec![0.0; 9];
        assert_eq!(weld(&positions, None, &[]), Err(TopologyError::MissingIndex));
        assert_eq!(
            weld(&positions, None, &[0, 1]),
            Err(TopologyError::NotTriangulated(2))
        );
        assert_eq!(
            weld(&positions, None, &[0, 1, 3]),
            Err(TopologyError::IndexOutOfRange {
                index: 3,
                vertex_count: 3
            })
        );
    }

    #[test]
    fn test_weld_mesh_reindexes_soup() {
        let mut mesh = VisualMesh::soup(vec![
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, //
            1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0,
        ]);
        let welded = weld_mesh(&mut mesh).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(welded.vertex_count(), 4);
        assert_eq!(welded.indices, vec![0, 1, 2, 1, 3, 2]);
    }

    #[test]
    fn test_scatter_ignores_out_of_range() {
        let physics = [1.0, 2.0, 3.0];
        let mut visual = [9.0; 6];
        scatter(&physics, &[0, 5], &mut visual);
        assert_eq!(visual, [1.0, 2.0, 3.0, 9.0, 9.0, 9.0]);
    }
}
