//! # Memory Layout
//!
//! Binary schema of every shared region, in 32-bit words. No behavior lives
//! here: regions and both sides compute offsets from these types only.
//!
//! ```text
//! Rigid-body region
//! ┌──────────── header (HEADER_LENGTH words) ────────────┐┌── slots ──────────────────────┐
//! │ state │ step ms (f32) │ substeps │ generation │ ...  ││ slot 0: 16 f32 │ slot 1 │ ... │
//! └──────────────────────────────────────────────────────┘└───────────────────────────────┘
//!
//! Debug region
//! ┌───────┬──────────────────────────┬──────────────────────────┐
//! │ count │ positions (3 x capacity) │ colors (3 x capacity)    │
//! └───────┴──────────────────────────┴──────────────────────────┘
//!
//! Soft-body region (one per body)
//! ┌──────────────────────────┬─────────────────────┬─────────────────────┐
//! │ indices (u16 x2 or u32)  │ vertices (3 x n f32)│ normals (3 x n f32) │
//! └──────────────────────────┴─────────────────────┴─────────────────────┘
//! ```
//!
//! All sizes are fixed at allocation time; nothing is ever resized.

use tandem_shared::constants::{BODY_DATA_SIZE, HEADER_LENGTH, MAX_BODIES, U16_INDEX_LIMIT};

use crate::error::{LayoutError, LayoutResult};

/// Header word holding the [`BufferState`](crate::memory::BufferState).
pub const HEADER_STATE: usize = 0;
/// Header word holding the last step duration in milliseconds (f32 bits).
pub const HEADER_STEP_DURATION: usize = 1;
/// Header word holding the monotonically increasing substep counter.
pub const HEADER_SUBSTEP_COUNTER: usize = 2;
/// Header word holding the publish count.
pub const HEADER_GENERATION: usize = 3;

/// Largest vertex count a single soft body may declare.
pub const MAX_SOFT_BODY_VERTICES: usize = 1 << 22;

/// Layout of the rigid-body region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RigidBodyLayout {
    max_bodies: usize,
}

impl RigidBodyLayout {
    /// Layout for `max_bodies` slots.
    ///
    /// # Errors
    ///
    /// Fails for zero slots or more than [`MAX_BODIES`].
    pub fn new(max_bodies: usize) -> LayoutResult<Self> {
        if max_bodies == 0 {
            return Err(LayoutError::Empty("rigid-body"));
        }
        if max_bodies > MAX_BODIES {
            return Err(LayoutError::CapacityExceeded {
                what: "rigid bodies",
                requested: max_bodies,
                capacity: MAX_BODIES,
            });
        }
        Ok(Self { max_bodies })
    }

    /// Slot count.
    #[must_use]
    pub const fn max_bodies(&self) -> usize {
        self.max_bodies
    }

    /// First word of `slot`.
    #[must_use]
    pub const fn slot_offset(&self, slot: usize) -> usize {
        HEADER_LENGTH + slot * BODY_DATA_SIZE
    }

    /// Total words.
    #[must_use]
    pub const fn total_words(&self) -> usize {
        HEADER_LENGTH + self.max_bodies * BODY_DATA_SIZE
    }
}

/// Layout of the debug-draw region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebugLayout {
    capacity: usize,
}

impl DebugLayout {
    /// Layout for `capacity` vertices.
    ///
    /// # Errors
    ///
    /// Fails for zero capacity.
    pub fn new(capacity: usize) -> LayoutResult<Self> {
        if capacity == 0 {
            return Err(LayoutError::Empty("debug"));
        }
        Ok(Self { capacity })
    }

    /// Vertex capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Word holding the valid vertex count.
    #[must_use]
    pub const fn count_offset(&self) -> usize {
        0
    }

    /// First position word.
    #[must_use]
    pub const fn positions_offset(&self) -> usize {
        1
    }

    /// First color word.
    #[must_use]
    pub const fn colors_offset(&self) -> usize {
        1 + self.capacity * 3
    }

    /// Total words.
    #[must_use]
    pub const fn total_words(&self) -> usize {
        1 + self.capacity * 6
    }
}

/// Width of the soft-body index section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexWidth {
    /// Two indices packed per word.
    U16,
    /// One index per word.
    U32,
}

impl IndexWidth {
    /// Narrowest width for a mesh of `index_count` indices over
    /// `vertex_count` vertices.
    ///
    /// Both bounds matter: a welded mesh can keep vertices no triangle
    /// references, so a short index list may still name a vertex above
    /// [`U16_INDEX_LIMIT`].
    #[must_use]
    pub const fn for_mesh(index_count: usize, vertex_count: usize) -> Self {
        if index_count > U16_INDEX_LIMIT || vertex_count > U16_INDEX_LIMIT + 1 {
            Self::U32
        } else {
            Self::U16
        }
    }

    /// Bytes per index.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// Words needed for `count` indices.
    #[must_use]
    pub const fn words_for(self, count: usize) -> usize {
        match self {
            Self::U16 => count.div_ceil(2),
            Self::U32 => count,
        }
    }
}

/// Layout of one soft body's region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SoftBodyLayout {
    index_count: usize,
    vertex_count: usize,
    has_normals: bool,
    index_width: IndexWidth,
}

impl SoftBodyLayout {
    /// Layout for a welded triangle mesh.
    ///
    /// # Errors
    ///
    /// Fails for an empty mesh or one above [`MAX_SOFT_BODY_VERTICES`].
    pub fn trimesh(index_count: usize, vertex_count: usize) -> LayoutResult<Self> {
        Self::check_vertices(vertex_count)?;
        Ok(Self {
            index_count,
            vertex_count,
            has_normals: true,
            index_width: IndexWidth::for_mesh(index_count, vertex_count),
        })
    }

    /// Layout for a rope: vertices only.
    ///
    /// # Errors
    ///
    /// Fails for an empty rope or one above [`MAX_SOFT_BODY_VERTICES`].
    pub fn rope(vertex_count: usize) -> LayoutResult<Self> {
        Self::check_vertices(vertex_count)?;
        Ok(Self {
            index_count: 0,
            vertex_count,
            has_normals: false,
            index_width: IndexWidth::U16,
        })
    }

    fn check_vertices(vertex_count: usize) -> LayoutResult<()> {
        if vertex_count == 0 {
            return Err(LayoutError::Empty("soft-body"));
        }
        if vertex_count > MAX_SOFT_BODY_VERTICES {
            return Err(LayoutError::CapacityExceeded {
                what: "soft-body vertices",
                requested: vertex_count,
                capacity: MAX_SOFT_BODY_VERTICES,
            });
        }
        Ok(())
    }

    /// Number of indices.
    #[must_use]
    pub const fn index_count(&self) -> usize {
        self.index_count
    }

    /// Number of physics vertices.
    #[must_use]
    pub const fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Whether the region carries a normal section.
    #[must_use]
    pub const fn has_normals(&self) -> bool {
        self.has_normals
    }

    /// Index width chosen for this body.
    #[must_use]
    pub const fn index_width(&self) -> IndexWidth {
        self.index_width
    }

    /// Words in the index section.
    #[must_use]
    pub const fn index_words(&self) -> usize {
        self.index_width.words_for(self.index_count)
    }

    /// First vertex word.
    #[must_use]
    pub const fn vertices_offset(&self) -> usize {
        self.index_words()
    }

    /// First normal word.
    #[must_use]
    pub const fn normals_offset(&self) -> usize {
        self.vertices_offset() + self.vertex_count * 3
    }

    /// Words in the normal section.
    #[must_use]
    pub const fn normal_words(&self) -> usize {
        if self.has_normals {
            self.vertex_count * 3
        } else {
            0
        }
    }

    /// Total words.
    #[must_use]
    pub const fn total_words(&self) -> usize {
        self.normals_offset() + self.normal_words()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rigid_layout_offsets() {
        let layout = RigidBodyLayout::new(4).unwrap();
        assert_eq!(layout.slot_offset(0), HEADER_LENGTH);
        assert_eq!(layout.slot_offset(3), HEADER_LENGTH + 3 * BODY_DATA_SIZE);
        assert_eq!(layout.total_words(), HEADER_LENGTH + 4 * BODY_DATA_SIZE);
    }

    #[test]
    fn test_rigid_layout_capacity() {
        assert!(matches!(
            RigidBodyLayout::new(MAX_BODIES + 1),
            Err(LayoutError::CapacityExceeded { .. })
        ));
        assert_eq!(RigidBodyLayout::new(0), Err(LayoutError::Empty("rigid-body")));
    }

    #[test]
    fn test_index_width_threshold() {
        assert_eq!(IndexWidth::for_mesh(U16_INDEX_LIMIT, 3), IndexWidth::U16);
        assert_eq!(IndexWidth::for_mesh(U16_INDEX_LIMIT + 1, 3), IndexWidth::U32);
        // last vertex id 65535 still fits
        assert_eq!(IndexWidth::for_mesh(3, U16_INDEX_LIMIT + 1), IndexWidth::U16);
        assert_eq!(IndexWidth::for_mesh(3, U16_INDEX_LIMIT + 2), IndexWidth::U32);
        assert_eq!(IndexWidth::U16.words_for(5), 3);
        assert_eq!(IndexWidth::U32.words_for(5), 5);
    }

    #[test]
    fn test_soft_layout_sections() {
        let layout = SoftBodyLayout::trimesh(6, 4).unwrap();
        assert_eq!(layout.index_words(), 3);
        assert_eq!(layout.vertices_offset(), 3);
        assert_eq!(layout.normals_offset(), 3 + 12);
        assert_eq!(layout.total_words(), 3 + 12 + 12);

        let rope = SoftBodyLayout::rope(10).unwrap();
        assert_eq!(rope.index_words(), 0);
        assert_eq!(rope.total_words(), 30);
    }

    #[test]
    fn test_debug_layout() {
        let layout = DebugLayout::new(10).unwrap();
        assert_eq!(layout.colors_offset(), 31);
        assert_eq!(layout.total_words(), 61);
    }
}
