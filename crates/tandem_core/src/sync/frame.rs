//! One generation's worth of published state.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tandem_shared::{Mat4, ObjectId};

use crate::error::LayoutResult;
use crate::memory::{BufferState, DebugRegion, RigidBodyRegion, SoftBodyRegion};

/// Bundle that moves between the two sides.
///
/// Under the shared-memory protocol both ends hold the same bundle and the
/// state word arbitrates; under the transfer protocol exactly one end owns
/// it at a time. Soft-body and debug regions live inside the bundle, so they
/// travel with it and neither side keeps a handle of its own.
///
/// The locks are never contended: only the end holding a guard touches the
/// tables.
#[derive(Debug)]
pub struct FrameBuffers {
    rigid: RigidBodyRegion,
    soft: RwLock<BTreeMap<ObjectId, SoftBodyRegion>>,
    debug: RwLock<Option<DebugRegion>>,
}

impl FrameBuffers {
    /// Allocates the bundle for `max_bodies` rigid-body slots.
    ///
    /// # Errors
    ///
    /// Fails if `max_bodies` does not fit the region ceiling.
    pub fn new(max_bodies: usize) -> LayoutResult<Self> {
        Ok(Self {
            rigid: RigidBodyRegion::new(max_bodies)?,
            soft: RwLock::new(BTreeMap::new()),
            debug: RwLock::new(None),
        })
    }

    /// Rigid-body region.
    #[must_use]
    pub const fn rigid(&self) -> &RigidBodyRegion {
        &self.rigid
    }

    /// Handoff state word.
    #[must_use]
    pub fn state(&self) -> BufferState {
        self.rigid.state()
    }

    /// Substep counter of the last published generation.
    #[must_use]
    pub fn substep_counter(&self) -> u32 {
        self.rigid.substep_counter()
    }

    /// Publish count stamped on this generation.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.rigid.generation()
    }

    /// Step duration of the last published generation.
    #[must_use]
    pub fn step_duration_ms(&self) -> f32 {
        self.rigid.step_duration_ms()
    }

    /// Reads the transform in `slot`.
    #[must_use]
    pub fn read_matrix(&self, slot: usize) -> Option<Mat4> {
        self.rigid.read_matrix(slot)
    }

    /// Runs `f` on the soft-body region of `object`, if the bundle carries
    /// one.
    pub fn with_soft_region<T>(
        &self,
        object: ObjectId,
        f: impl FnOnce(&SoftBodyRegion) -> T,
    ) -> Option<T> {
        self.soft.read().get(&object).map(f)
    }

    /// Soft-body regions carried.
    #[must_use]
    pub fn soft_region_count(&self) -> usize {
        self.soft.read().len()
    }

    /// Runs `f` on the debug region, if one was installed.
    pub fn with_debug_region<T>(&self, f: impl FnOnce(&DebugRegion) -> T) -> Option<T> {
        self.debug.read().as_ref().map(f)
    }

    pub(crate) fn insert_soft_region(
        &self,
        object: ObjectId,
        region: SoftBodyRegion,
    ) -> Option<SoftBodyRegion> {
        self.soft.write().insert(object, region)
    }

    pub(crate) fn remove_soft_region(&self, object: ObjectId) -> Option<SoftBodyRegion> {
        self.soft.write().remove(&object)
    }

    pub(crate) fn replace_debug_region(&self, region: DebugRegion) -> Option<DebugRegion> {
        self.debug.write().replace(region)
    }
}

/// Header values written alongside a publish.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PublishStats {
    /// Monotonic (wrapping) substep counter after this step.
    pub substep_counter: u32,
    /// Wall time spent stepping, in milliseconds.
    pub step_duration_ms: f32,
}
