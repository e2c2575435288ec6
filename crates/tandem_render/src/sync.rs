//! # Render Sync
//!
//! Applies one published generation to the scene per render frame.
//!
//! ```text
//! try_acquire ──none──► NotReady
//!      │
//!      ▼
//! drain deferred (slots, soft-body layouts)
//! consume debug lines (count → 0)
//! counter unchanged? ──yes──► release, Unchanged
//!      │
//!      ▼
//! rigid: slot matrix → parent-local → decompose → apply position, rotation
//! soft:  bundle region → scatter (welded) or direct copy (ropes)
//! release, Applied
//! ```
//!
//! Notifications can arrive at any point between frames, so slot and
//! layout announcements are queued and only applied while the bundle is
//! held. Soft-body and debug regions are looked up in the held bundle by
//! identity; nothing here keeps a handle to them between frames.
//!
//! A slot is read starting with the generation after the one its
//! assignment was drained under. The held generation may predate the
//! registration, in which case the slot still holds its previous occupant.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tandem_core::topology::scatter;
use tandem_core::{ConsumerEnd, FrameBuffers, SoftBodyLayout, SoftBodyRegion};
use tandem_shared::ObjectId;

use crate::scene::{DebugGeometry, Deformable, Transformable};

/// Outcome of one [`RenderSync::sync_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameSync {
    /// No generation was waiting.
    NotReady,
    /// A generation was waiting but the simulation had not advanced.
    Unchanged,
    /// Scene objects were written.
    Applied {
        /// Rigid bodies written.
        rigid_bodies: usize,
        /// Soft bodies written.
        soft_bodies: usize,
    },
}

/// Step statistics as last observed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerformanceInfo {
    /// Wall time of the last published step, in milliseconds.
    pub step_duration_ms: f32,
    /// Substep counter of the last published generation.
    pub substep_counter: u32,
    /// Frames that wrote the scene.
    pub frames_applied: u64,
    /// Ready frames skipped because the counter had not moved.
    pub frames_unchanged: u64,
}

/// Handle queued until the bundle is next held.
#[derive(Debug)]
enum Deferred {
    Slot { object: ObjectId, slot: usize },
    Region { object: ObjectId, layout: SoftBodyLayout },
}

struct RigidEntry<R> {
    object: R,
    slot: Option<usize>,
    /// Generation the slot assignment was drained under.
    armed_at: Option<u32>,
    driven: bool,
}

struct SoftEntry<S> {
    object: S,
    scatter: Option<Vec<u32>>,
    /// Set once the region's layout has been drained.
    ready: bool,
    positions: Vec<f32>,
    normals: Vec<f32>,
}

struct DebugSink {
    geometry: Box<dyn DebugGeometry + Send>,
    positions: Vec<f32>,
    colors: Vec<f32>,
}

/// Consumer side of the simulation.
pub struct RenderSync<R, S> {
    consumer: ConsumerEnd,
    rigid: HashMap<ObjectId, RigidEntry<R>>,
    soft: BTreeMap<ObjectId, SoftEntry<S>>,
    deferred: VecDeque<Deferred>,
    debug: Option<DebugSink>,
    last_substep: Option<u32>,
    performance: PerformanceInfo,
}

impl<R: Transformable, S: Deformable> RenderSync<R, S> {
    /// Sync reading from `consumer`.
    #[must_use]
    pub fn new(consumer: ConsumerEnd) -> Self {
        Self {
            consumer,
            rigid: HashMap::new(),
            soft: BTreeMap::new(),
            deferred: VecDeque::new(),
            debug: None,
            last_substep: None,
            performance: PerformanceInfo::default(),
        }
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Tracks a rigid body. `driven` is false for static and kinematic
    /// bodies, whose transforms the scene owns.
    pub fn track_rigid(&mut self, object_id: ObjectId, object: R, driven: bool) {
        self.rigid.insert(
            object_id,
            RigidEntry {
                object,
                slot: None,
                armed_at: None,
                driven,
            },
        );
    }

    /// Tracks a soft body. `scatter` maps visual vertices to physics
    /// vertices; `None` copies the region directly.
    pub fn track_soft(&mut self, object_id: ObjectId, object: S, scatter: Option<Vec<u32>>) {
        self.soft.insert(
            object_id,
            SoftEntry {
                object,
                scatter,
                ready: false,
                positions: Vec::new(),
                normals: Vec::new(),
            },
        );
    }

    /// Stops tracking a rigid body and hands it back.
    pub fn untrack_rigid(&mut self, object_id: ObjectId) -> Option<R> {
        self.rigid.remove(&object_id).map(|entry| entry.object)
    }

    /// Stops tracking a soft body and hands it back.
    pub fn untrack_soft(&mut self, object_id: ObjectId) -> Option<S> {
        self.soft.remove(&object_id).map(|entry| entry.object)
    }

    /// Changes whether the simulation drives a rigid body.
    pub fn set_driven(&mut self, object_id: ObjectId, driven: bool) {
        if let Some(entry) = self.rigid.get_mut(&object_id) {
            entry.driven = driven;
        }
    }

    /// Queues a slot assignment.
    pub fn defer_slot(&mut self, object: ObjectId, slot: usize) {
        self.deferred.push_back(Deferred::Slot { object, slot });
    }

    /// Queues the announcement that `object`'s region is in the bundle.
    pub fn defer_region(&mut self, object: ObjectId, layout: SoftBodyLayout) {
        self.deferred.push_back(Deferred::Region { object, layout });
    }

    /// Draws debug lines from the bundle's debug region into `geometry`.
    pub fn enable_debug(&mut self, geometry: Box<dyn DebugGeometry + Send>) {
        self.debug = Some(DebugSink {
            geometry,
            positions: Vec::new(),
            colors: Vec::new(),
        });
    }

    /// Stops debug drawing and returns the geometry.
    pub fn disable_debug(&mut self) -> Option<Box<dyn DebugGeometry + Send>> {
        self.debug.take().map(|sink| sink.geometry)
    }

    // ------------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------------

    /// Tracked rigid body.
    #[must_use]
    pub fn rigid(&self, object_id: ObjectId) -> Option<&R> {
        self.rigid.get(&object_id).map(|entry| &entry.object)
    }

    /// Tracked rigid body, mutably.
    pub fn rigid_mut(&mut self, object_id: ObjectId) -> Option<&mut R> {
        self.rigid.get_mut(&object_id).map(|entry| &mut entry.object)
    }

    /// Tracked soft body.
    #[must_use]
    pub fn soft(&self, object_id: ObjectId) -> Option<&S> {
        self.soft.get(&object_id).map(|entry| &entry.object)
    }

    /// Slot of a rigid body once its assignment has been applied.
    #[must_use]
    pub fn slot_of(&self, object_id: ObjectId) -> Option<usize> {
        self.rigid.get(&object_id).and_then(|entry| entry.slot)
    }

    /// Whether a soft body's region has been announced and drained.
    #[must_use]
    pub fn has_region(&self, object_id: ObjectId) -> bool {
        self.soft.get(&object_id).is_some_and(|entry| entry.ready)
    }

    /// Tracked rigid bodies.
    #[must_use]
    pub fn rigid_count(&self) -> usize {
        self.rigid.len()
    }

    /// Tracked soft bodies.
    #[must_use]
    pub fn soft_count(&self) -> usize {
        self.soft.len()
    }

    /// Handles waiting for the next held bundle.
    #[must_use]
    pub fn pending_deferred(&self) -> usize {
        self.deferred.len()
    }

    /// Step statistics.
    #[must_use]
    pub const fn performance(&self) -> PerformanceInfo {
        self.performance
    }

    // ------------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------------

    /// Runs once per render frame. Never blocks.
    pub fn sync_frame(&mut self) -> FrameSync {
        let Self {
            consumer,
            rigid,
            soft,
            deferred,
            debug,
            last_substep,
            performance,
        } = self;

        let Some(guard) = consumer.try_acquire() else {
            return FrameSync::NotReady;
        };
        let frame = guard.buffers();

        apply_deferred(deferred, rigid, soft, frame.generation());

        performance.step_duration_ms = frame.step_duration_ms();
        let counter = frame.substep_counter();
        performance.substep_counter = counter;

        if let Some(sink) = debug.as_mut() {
            consume_debug(frame, sink);
        }

        if *last_substep == Some(counter) {
            performance.frames_unchanged += 1;
            guard.release();
            return FrameSync::Unchanged;
        }

        let rigid_bodies = apply_rigid(frame, rigid);
        let soft_bodies = apply_soft(frame, soft);

        *last_substep = Some(counter);
        performance.frames_applied += 1;
        guard.release();
        FrameSync::Applied {
            rigid_bodies,
            soft_bodies,
        }
    }
}

fn apply_deferred<R, S>(
    deferred: &mut VecDeque<Deferred>,
    rigid: &mut HashMap<ObjectId, RigidEntry<R>>,
    soft: &mut BTreeMap<ObjectId, SoftEntry<S>>,
    generation: u32,
) {
    for item in deferred.drain(..) {
        match item {
            Deferred::Slot { object, slot } => match rigid.get_mut(&object) {
                Some(entry) => {
                    entry.slot = Some(slot);
                    entry.armed_at = Some(generation);
                }
                None => tracing::debug!(%object, slot, "slot for removed body ignored"),
            },
            Deferred::Region { object, layout } => match soft.get_mut(&object) {
                Some(entry) => {
                    let count = layout.vertex_count() * 3;
                    entry.positions = vec![0.0; count];
                    entry.normals = if layout.has_normals() {
                        vec![0.0; count]
                    } else {
                        Vec::new()
                    };
                    entry.ready = true;
                }
                None => tracing::debug!(%object, "region for removed body ignored"),
            },
        }
    }
}

fn consume_debug(frame: &FrameBuffers, sink: &mut DebugSink) {
    let drawn = frame.with_debug_region(|region| {
        let count = region.count();
        if count == 0 {
            return false;
        }
        region.read_vertices(count, &mut sink.positions, &mut sink.colors);
        region.set_count(0);
        true
    });
    if drawn == Some(true) {
        sink.geometry.update(&sink.positions, &sink.colors);
    }
}

fn apply_rigid<R: Transformable>(
    frame: &FrameBuffers,
    rigid: &mut HashMap<ObjectId, RigidEntry<R>>,
) -> usize {
    let generation = frame.generation();
    let mut written = 0;
    for (object, entry) in rigid.iter_mut() {
        let (Some(slot), true) = (entry.slot, entry.driven) else {
            continue;
        };
        match entry.armed_at {
            Some(armed) if armed == generation => continue,
            Some(_) => entry.armed_at = None,
            None => {}
        }
        let Some(world) = frame.read_matrix(slot) else {
            continue;
        };
        let local = match entry.object.parent_world_matrix() {
            Some(parent) => match parent.inverse() {
                Some(inverse) => inverse * world,
                None => {
                    tracing::debug!(%object, "singular parent; applying world transform");
                    world
                }
            },
            None => world,
        };
        let (position, rotation, _) = local.decompose();
        entry.object.apply_local(position, rotation);
        written += 1;
    }
    written
}

fn apply_soft<S: Deformable>(
    frame: &FrameBuffers,
    soft: &mut BTreeMap<ObjectId, SoftEntry<S>>,
) -> usize {
    let mut written = 0;
    for (&object, entry) in soft.iter_mut() {
        if !entry.ready {
            continue;
        }
        let read = frame.with_soft_region(object, |region| read_region(region, &mut *entry));
        let has_normals = match read {
            Some(Some(has_normals)) => has_normals,
            Some(None) => {
                tracing::debug!(%object, "region size does not match its layout");
                continue;
            }
            None => continue,
        };

        match &entry.scatter {
            Some(map) => {
                scatter(&entry.positions, map, entry.object.positions_mut());
                if has_normals {
                    if let Some(normals) = entry.object.normals_mut() {
                        scatter(&entry.normals, map, normals);
                    }
                }
            }
            None => {
                copy_prefix(&entry.positions, entry.object.positions_mut());
                if has_normals {
                    if let Some(normals) = entry.object.normals_mut() {
                        copy_prefix(&entry.normals, normals);
                    }
                }
            }
        }
        entry.object.mark_dirty();
        written += 1;
    }
    written
}

/// Copies a region into the entry's read buffers; `None` when the sizes
/// disagree. Returns whether normals were read.
fn read_region<S>(region: &SoftBodyRegion, entry: &mut SoftEntry<S>) -> Option<bool> {
    if region.vertex_count() * 3 != entry.positions.len() {
        return None;
    }
    region.read_vertices(&mut entry.positions);
    Some(!entry.normals.is_empty() && region.read_normals(&mut entry.normals))
}

fn copy_prefix(src: &[f32], dst: &mut [f32]) {
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
}

impl<R, S> std::fmt::Debug for RenderSync<R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSync")
            .field("protocol", &self.consumer.protocol())
            .field("rigid", &self.rigid.len())
            .field("soft", &self.soft.len())
            .field("deferred", &self.deferred.len())
            .field("performance", &self.performance)
            .finish_non_exhaustive()
    }
}
