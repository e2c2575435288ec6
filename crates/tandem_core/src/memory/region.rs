//! # Shared Regions
//!
//! Fixed-size arrays of 32-bit words that both execution contexts can hold
//! at once. Payload words use relaxed atomics; the state word of the
//! rigid-body region uses acquire/release and orders everything else.
//!
//! ## Ordering
//!
//! ```text
//! Producer                         Consumer
//!   load(state) != READY  (Acq)
//!   write payload         (Rlx)
//!   store(state, READY)   (Rel) ──► load(state) == READY  (Acq)
//!                                   read payload          (Rlx)
//!   load(state) != READY  (Acq) ◄── store(state, CONSUMED)(Rel)
//! ```
//!
//! A consumer that observes READY therefore observes every payload word of
//! that generation, and the producer never writes while READY is visible.

use std::sync::atomic::{AtomicU32, Ordering};

use tandem_shared::{Mat4, Vec3};

use crate::error::LayoutResult;
use crate::layout::{
    DebugLayout, IndexWidth, RigidBodyLayout, SoftBodyLayout, HEADER_GENERATION, HEADER_STATE,
    HEADER_STEP_DURATION, HEADER_SUBSTEP_COUNTER,
};

/// Handoff state stored in the first word of the rigid-body region.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferState {
    /// Nothing published yet.
    Uninitialized = 0,
    /// Producer published; consumer may read.
    Ready = 1,
    /// Consumer released; producer may write.
    Consumed = 2,
}

impl BufferState {
    /// Decodes a state word. Unknown values read as uninitialized.
    #[must_use]
    pub const fn from_word(word: u32) -> Self {
        match word {
            1 => Self::Ready,
            2 => Self::Consumed,
            _ => Self::Uninitialized,
        }
    }
}

/// Flat array of atomic words.
pub struct WordRegion {
    words: Box<[AtomicU32]>,
}

impl WordRegion {
    /// Zero-filled region of `len` words.
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Number of words.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the region has no words.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Relaxed load.
    #[inline]
    #[must_use]
    pub fn load(&self, index: usize) -> u32 {
        self.words[index].load(Ordering::Relaxed)
    }

    /// Relaxed store.
    #[inline]
    pub fn store(&self, index: usize, value: u32) {
        self.words[index].store(value, Ordering::Relaxed);
    }

    /// Relaxed float load.
    #[inline]
    #[must_use]
    pub fn load_f32(&self, index: usize) -> f32 {
        f32::from_bits(self.load(index))
    }

    /// Relaxed float store.
    #[inline]
    pub fn store_f32(&self, index: usize, value: f32) {
        self.store(index, value.to_bits());
    }

    /// Copies `src` into the region starting at `offset`.
    pub fn write_f32s(&self, offset: usize, src: &[f32]) {
        for (word, value) in self.words[offset..offset + src.len()].iter().zip(src) {
            word.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    /// Copies `dst.len()` floats from the region starting at `offset`.
    pub fn read_f32s(&self, offset: usize, dst: &mut [f32]) {
        let n = dst.len();
        for (value, word) in dst.iter_mut().zip(&self.words[offset..offset + n]) {
            *value = f32::from_bits(word.load(Ordering::Relaxed));
        }
    }

    /// Copies raw words into the region starting at `offset`.
    pub fn write_words(&self, offset: usize, src: &[u32]) {
        for (word, value) in self.words[offset..offset + src.len()].iter().zip(src) {
            word.store(*value, Ordering::Relaxed);
        }
    }

    /// Copies `dst.len()` raw words out of the region starting at `offset`.
    pub fn read_words(&self, offset: usize, dst: &mut [u32]) {
        let n = dst.len();
        for (value, word) in dst.iter_mut().zip(&self.words[offset..offset + n]) {
            *value = word.load(Ordering::Relaxed);
        }
    }

    fn atomic(&self, index: usize) -> &AtomicU32 {
        &self.words[index]
    }
}

impl std::fmt::Debug for WordRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordRegion").field("len", &self.len()).finish()
    }
}

// ============================================================================
// RIGID BODIES
// ============================================================================

/// Header + per-slot transform blocks.
#[derive(Debug)]
pub struct RigidBodyRegion {
    layout: RigidBodyLayout,
    words: WordRegion,
}

impl RigidBodyRegion {
    /// Allocates a region for `max_bodies` slots in the UNINITIALIZED state.
    ///
    /// # Errors
    ///
    /// Fails if `max_bodies` is zero or above the hard ceiling.
    pub fn new(max_bodies: usize) -> LayoutResult<Self> {
        let layout = RigidBodyLayout::new(max_bodies)?;
        Ok(Self {
            layout,
            words: WordRegion::zeroed(layout.total_words()),
        })
    }

    /// Region layout.
    #[must_use]
    pub const fn layout(&self) -> &RigidBodyLayout {
        &self.layout
    }

    /// Slot count.
    #[must_use]
    pub const fn max_bodies(&self) -> usize {
        self.layout.max_bodies()
    }

    /// Acquire-load of the handoff state.
    #[must_use]
    pub fn state(&self) -> BufferState {
        BufferState::from_word(self.words.atomic(HEADER_STATE).load(Ordering::Acquire))
    }

    /// Release-store of the handoff state.
    pub fn store_state(&self, state: BufferState) {
        self.words
            .atomic(HEADER_STATE)
            .store(state as u32, Ordering::Release);
    }

    /// Duration of the last published step, in milliseconds.
    #[must_use]
    pub fn step_duration_ms(&self) -> f32 {
        self.words.load_f32(HEADER_STEP_DURATION)
    }

    /// Records the step duration.
    pub fn set_step_duration_ms(&self, ms: f32) {
        self.words.store_f32(HEADER_STEP_DURATION, ms);
    }

    /// Substep counter of the last published generation.
    #[must_use]
    pub fn substep_counter(&self) -> u32 {
        self.words.load(HEADER_SUBSTEP_COUNTER)
    }

    /// Records the substep counter.
    pub fn set_substep_counter(&self, counter: u32) {
        self.words.store(HEADER_SUBSTEP_COUNTER, counter);
    }

    /// Number of publishes so far.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.words.load(HEADER_GENERATION)
    }

    /// Records the publish count.
    pub fn set_generation(&self, generation: u32) {
        self.words.store(HEADER_GENERATION, generation);
    }

    /// Writes the transform of `slot`. Out-of-range slots are ignored.
    pub fn write_matrix(&self, slot: usize, matrix: &Mat4) -> bool {
        if slot >= self.max_bodies() {
            return false;
        }
        self.words
            .write_words(self.layout.slot_offset(slot), bytemuck::cast_slice(&matrix.cols));
        true
    }

    /// Reads the transform of `slot`.
    #[must_use]
    pub fn read_matrix(&self, slot: usize) -> Option<Mat4> {
        if slot >= self.max_bodies() {
            return None;
        }
        let mut m: Mat4 = bytemuck::Zeroable::zeroed();
        self.words.read_words(
            self.layout.slot_offset(slot),
            bytemuck::cast_slice_mut(&mut m.cols),
        );
        Some(m)
    }
}

// ============================================================================
// DEBUG DRAW
// ============================================================================

/// Count word + parallel position/color arrays.
#[derive(Debug)]
pub struct DebugRegion {
    layout: DebugLayout,
    words: WordRegion,
}

impl DebugRegion {
    /// Allocates a region for `capacity` vertices.
    ///
    /// # Errors
    ///
    /// Fails for zero capacity.
    pub fn new(capacity: usize) -> LayoutResult<Self> {
        let layout = DebugLayout::new(capacity)?;
        Ok(Self {
            layout,
            words: WordRegion::zeroed(layout.total_words()),
        })
    }

    /// Vertex capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.layout.capacity()
    }

    /// Published vertex count (acquire).
    #[must_use]
    pub fn count(&self) -> usize {
        self.words
            .atomic(self.layout.count_offset())
            .load(Ordering::Acquire) as usize
    }

    /// Publishes a vertex count (release), clamped to capacity.
    pub fn set_count(&self, count: usize) {
        let count = count.min(self.capacity()) as u32;
        self.words
            .atomic(self.layout.count_offset())
            .store(count, Ordering::Release);
    }

    /// Writes vertex `index`. Returns `false` past capacity.
    pub fn write_vertex(&self, index: usize, position: Vec3, color: Vec3) -> bool {
        if index >= self.capacity() {
            return false;
        }
        self.words
            .write_f32s(self.layout.positions_offset() + index * 3, &position.to_array());
        self.words
            .write_f32s(self.layout.colors_offset() + index * 3, &color.to_array());
        true
    }

    /// Copies the first `count` vertices out. `positions` and `colors` are
    /// cleared and refilled with `3 * count` floats each.
    pub fn read_vertices(&self, count: usize, positions: &mut Vec<f32>, colors: &mut Vec<f32>) {
        let count = count.min(self.capacity());
        positions.clear();
        positions.resize(count * 3, 0.0);
        colors.clear();
        colors.resize(count * 3, 0.0);
        self.words.read_f32s(self.layout.positions_offset(), positions);
        self.words.read_f32s(self.layout.colors_offset(), colors);
    }
}

// ============================================================================
// SOFT BODIES
// ============================================================================

/// Index + vertex + normal sections of one soft body.
#[derive(Debug)]
pub struct SoftBodyRegion {
    layout: SoftBodyLayout,
    words: WordRegion,
}

impl SoftBodyRegion {
    /// Allocates a zeroed region for `layout`.
    #[must_use]
    pub fn new(layout: SoftBodyLayout) -> Self {
        Self {
            layout,
            words: WordRegion::zeroed(layout.total_words()),
        }
    }

    /// Region layout; tells readers how to interpret the index section.
    #[must_use]
    pub const fn layout(&self) -> &SoftBodyLayout {
        &self.layout
    }

    /// Physics vertex count.
    #[must_use]
    pub const fn vertex_count(&self) -> usize {
        self.layout.vertex_count()
    }

    /// Stores the index section using the layout's width.
    /// Extra indices beyond the layout's count are ignored.
    pub fn write_indices(&self, indices: &[u32]) {
        let count = indices.len().min(self.layout.index_count());
        match self.layout.index_width() {
            IndexWidth::U32 => {
                for (i, index) in indices[..count].iter().enumerate() {
                    self.words.store(i, *index);
                }
            }
            IndexWidth::U16 => {
                for (w, pair) in indices[..count].chunks(2).enumerate() {
                    let lo = pair[0] & 0xFFFF;
                    let hi = pair.get(1).map_or(0, |v| v & 0xFFFF);
                    self.words.store(w, lo | (hi << 16));
                }
            }
        }
    }

    /// Decodes the index section.
    #[must_use]
    pub fn read_indices(&self) -> Vec<u32> {
        let count = self.layout.index_count();
        match self.layout.index_width() {
            IndexWidth::U32 => (0..count).map(|i| self.words.load(i)).collect(),
            IndexWidth::U16 => (0..count)
                .map(|i| {
                    let word = self.words.load(i / 2);
                    if i % 2 == 0 {
                        word & 0xFFFF
                    } else {
                        word >> 16
                    }
                })
                .collect(),
        }
    }

    /// Stores vertex positions (flat xyz).
    pub fn write_vertices(&self, src: &[f32]) {
        let n = src.len().min(self.layout.vertex_count() * 3);
        self.words.write_f32s(self.layout.vertices_offset(), &src[..n]);
    }

    /// Reads vertex positions into `dst`.
    pub fn read_vertices(&self, dst: &mut [f32]) {
        let n = dst.len().min(self.layout.vertex_count() * 3);
        self.words.read_f32s(self.layout.vertices_offset(), &mut dst[..n]);
    }

    /// Stores vertex normals. No-op for regions without normals.
    pub fn write_normals(&self, src: &[f32]) {
        let n = src.len().min(self.layout.normal_words());
        self.words.write_f32s(self.layout.normals_offset(), &src[..n]);
    }

    /// Reads vertex normals into `dst`. Returns `false` if the region has none.
    pub fn read_normals(&self, dst: &mut [f32]) -> bool {
        if !self.layout.has_normals() {
            return false;
        }
        let n = dst.len().min(self.layout.normal_words());
        self.words.read_f32s(self.layout.normals_offset(), &mut dst[..n]);
        true
    }
}
