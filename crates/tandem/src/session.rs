//! # Simulation Session
//!
//! Owns both sides of one simulation and every per-identity table.
//!
//! ```text
//!            caller (render thread)
//!                    │
//!   register / mutate / raycast / sync_frame
//!                    │
//!        ┌───────────┴────────────┐
//!        │   SimulationSession    │  live tables, capacity, geometry prep
//!        │                        │
//!        │  RenderSync ◄── pump ◄─┼──── notifications ◄──┐
//!        │  RequestBus ◄──────────┤                      │
//!        └───────────┬────────────┘                      │
//!                    │ commands                          │
//!                    ▼                                   │
//!            SimulationWorker (tandem-sim thread) ───────┘
//! ```
//!
//! Registration errors are returned synchronously. A fault on the simulation
//! side is terminal: every later call returns [`SessionError::Faulted`].
//!
//! A removed identity stays reserved until the simulation acknowledges the
//! removal, so a late notification for the old registration can never land
//! on a new one.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TrySendError};
use tandem_core::topology::weld_mesh;
use tandem_core::{
    buffer_channel, BufferProtocol, Command, DebugRegion, Notification, SoftBodyLayout,
    SoftBodyRegion, TopologyError, VisualMesh,
};
use tandem_render::{DebugGeometry, FrameSync, PerformanceInfo, RenderSync, SceneNode, SoftMesh};
use tandem_shared::{
    BodyConfig, BodyType, ConstraintConfig, ConstraintId, ConstraintUpdate, Mat4, ObjectId,
    RaycastHitMessage, RaycastOptions, ShapeDescriptor, SoftBodyConfig, SoftBodyKind,
    UpdateBodyOptions, Vec3,
};
use tandem_sim::{BallisticWorld, SimulationWorker, WorkerStatus, WorldFactory};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::requests::{RaycastTicket, RequestBus};

/// One simulation, from INIT to teardown.
///
/// Dropping the session stops the worker and cancels pending requests.
pub struct SimulationSession {
    config: SessionConfig,
    protocol: BufferProtocol,
    sync: RenderSync<SceneNode, SoftMesh>,
    requests: RequestBus,
    rigid: HashMap<ObjectId, BodyType>,
    soft: BTreeMap<ObjectId, SoftBodyKind>,
    /// Removed identities awaiting BODY_REMOVED.
    removing: HashSet<ObjectId>,
    /// Constraint to the bodies it links.
    constraints: HashMap<ConstraintId, (ObjectId, Option<ObjectId>)>,
    next_object: u64,
    next_constraint: u64,
    debug_allocated: bool,
    ready: bool,
    fault: Option<String>,
    registration_failures: Vec<(ObjectId, String)>,
    // must drop before `worker` so a blocked notification send fails
    notifications: Receiver<Notification>,
    worker: SimulationWorker,
}

impl SimulationSession {
    /// Starts a session on the ballistic reference world.
    ///
    /// # Errors
    ///
    /// Invalid config, a region that does not fit, or a failed thread spawn.
    pub fn start(config: SessionConfig) -> SessionResult<Self> {
        Self::start_with(config, BallisticWorld::factory())
    }

    /// Starts a session on the world `factory` builds.
    ///
    /// INIT is queued before this returns; [`wait_ready`](Self::wait_ready)
    /// blocks until it is accepted.
    ///
    /// # Errors
    ///
    /// Invalid config, a region that does not fit, or a failed thread spawn.
    pub fn start_with(config: SessionConfig, factory: WorldFactory) -> SessionResult<Self> {
        config.validate()?;
        let protocol = config.protocol.resolve();
        let (producer, consumer) = buffer_channel(protocol, config.max_bodies)?;
        let (notify_tx, notify_rx) = bounded(config.notification_capacity);
        let worker = SimulationWorker::spawn(factory, config.command_capacity, notify_tx)?;

        let mut session = Self {
            protocol,
            sync: RenderSync::new(consumer),
            requests: RequestBus::new(),
            rigid: HashMap::new(),
            soft: BTreeMap::new(),
            removing: HashSet::new(),
            constraints: HashMap::new(),
            next_object: 0,
            next_constraint: 0,
            debug_allocated: false,
            ready: false,
            fault: None,
            registration_failures: Vec::new(),
            notifications: notify_rx,
            worker,
            config,
        };
        session.send(Command::Init {
            world: session.config.world.clone(),
            buffers: producer,
            max_bodies: session.config.max_bodies,
            simulation_speed: session.config.simulation_speed,
            max_frame_delta_ms: session.config.max_frame_delta_ms,
        })?;

        tracing::info!(
            ?protocol,
            max_bodies = session.config.max_bodies,
            "simulation session started"
        );
        Ok(session)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Blocks until the worker accepted INIT.
    ///
    /// # Errors
    ///
    /// Timeout, fault, or a dead worker.
    pub fn wait_ready(&mut self, timeout: Duration) -> SessionResult<()> {
        self.wait_until("READY", timeout, |s| s.ready)
    }

    /// Routes notifications until `done` holds.
    ///
    /// Does not touch the buffer; call [`sync_frame`](Self::sync_frame) in
    /// between if the condition depends on a new generation.
    ///
    /// # Errors
    ///
    /// Timeout, fault, or a dead worker.
    pub fn wait_until(
        &mut self,
        what: &'static str,
        timeout: Duration,
        mut done: impl FnMut(&Self) -> bool,
    ) -> SessionResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if done(self) {
                return Ok(());
            }
            self.ensure_live()?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SessionError::Timeout(what));
            }
            match self.notifications.recv_timeout(remaining) {
                Ok(notification) => self.route(notification),
                Err(RecvTimeoutError::Timeout) => return Err(SessionError::Timeout(what)),
                Err(RecvTimeoutError::Disconnected) => return Err(SessionError::Disconnected),
            }
        }
    }

    /// Whether INIT has been accepted.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    /// Fault reason once the simulation has stopped for good.
    #[must_use]
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    /// Protocol in use.
    #[must_use]
    pub const fn protocol(&self) -> BufferProtocol {
        self.protocol
    }

    /// Configuration the session started with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Worker snapshot; never blocks on the simulation.
    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        self.worker.status()
    }

    /// Last observed step statistics.
    #[must_use]
    pub const fn performance(&self) -> PerformanceInfo {
        self.sync.performance()
    }

    /// Registrations the simulation side rejected since the last call.
    pub fn take_registration_failures(&mut self) -> Vec<(ObjectId, String)> {
        std::mem::take(&mut self.registration_failures)
    }

    // ------------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------------

    /// Applies the latest generation to the scene. Call once per frame.
    ///
    /// # Errors
    ///
    /// [`SessionError::Faulted`] once the simulation has faulted.
    pub fn sync_frame(&mut self) -> SessionResult<FrameSync> {
        self.pump();
        self.ensure_live()?;
        Ok(self.sync.sync_frame())
    }

    // ------------------------------------------------------------------------
    // Rigid bodies
    // ------------------------------------------------------------------------

    /// An identity no tracked object uses.
    pub fn new_object_id(&mut self) -> ObjectId {
        loop {
            self.next_object += 1;
            let id = ObjectId(self.next_object);
            if self.ensure_unused(id).is_ok() {
                return id;
            }
        }
    }

    /// Registers a rigid body placed where `node` is.
    ///
    /// Capacity is checked here, before anything is sent.
    ///
    /// # Errors
    ///
    /// Full region, duplicate identity, fault, or a dead worker.
    pub fn add_rigid_body(
        &mut self,
        object: ObjectId,
        node: SceneNode,
        shape: ShapeDescriptor,
        config: BodyConfig,
    ) -> SessionResult<()> {
        self.pump();
        self.ensure_live()?;
        self.ensure_unused(object)?;
        if self.rigid.len() >= self.config.max_bodies {
            return Err(SessionError::CapacityExceeded {
                what: "rigid bodies",
                requested: self.rigid.len() + 1,
                capacity: self.config.max_bodies,
            });
        }

        let transform = node.world_matrix();
        self.rigid.insert(object, config.body_type);
        self.sync
            .track_rigid(object, node, config.body_type.is_simulation_driven());
        self.send(Command::AddRigidBody {
            object,
            transform,
            shape,
            config,
        })
    }

    /// Unregisters a rigid body and hands its node back. Unknown identities
    /// return `None`. Constraints on the body go with it, and the identity
    /// cannot be registered again until the simulation confirms.
    ///
    /// # Errors
    ///
    /// Dead worker.
    pub fn remove_rigid_body(&mut self, object: ObjectId) -> SessionResult<Option<SceneNode>> {
        if self.rigid.remove(&object).is_none() {
            tracing::debug!(%object, "remove of unknown rigid body");
            return Ok(None);
        }
        let node = self.sync.untrack_rigid(object);
        self.forget_constraints_on(object);
        if self.fault.is_none() {
            self.removing.insert(object);
            self.send(Command::RemoveRigidBody { object })?;
        }
        Ok(node)
    }

    /// Patches body settings.
    ///
    /// # Errors
    ///
    /// Fault or a dead worker.
    pub fn update_rigid_body(
        &mut self,
        object: ObjectId,
        options: UpdateBodyOptions,
    ) -> SessionResult<()> {
        if let (Some(body_type), Some(tracked)) = (options.body_type, self.rigid.get_mut(&object)) {
            *tracked = body_type;
            self.sync
                .set_driven(object, body_type.is_simulation_driven());
        }
        self.mutate(object, Command::UpdateRigidBody { object, options })
    }

    /// Teleports a body.
    ///
    /// # Errors
    ///
    /// Fault or a dead worker.
    pub fn set_motion_state(&mut self, object: ObjectId, transform: Mat4) -> SessionResult<()> {
        self.mutate(object, Command::SetMotionState { object, transform })
    }

    /// Overrides linear velocity.
    ///
    /// # Errors
    ///
    /// Fault or a dead worker.
    pub fn set_linear_velocity(&mut self, object: ObjectId, velocity: Vec3) -> SessionResult<()> {
        self.mutate(object, Command::SetLinearVelocity { object, velocity })
    }

    /// Applies an impulse.
    ///
    /// # Errors
    ///
    /// Fault or a dead worker.
    pub fn apply_impulse(
        &mut self,
        object: ObjectId,
        impulse: Vec3,
        relative_position: Vec3,
    ) -> SessionResult<()> {
        self.mutate(
            object,
            Command::ApplyImpulse {
                object,
                impulse,
                relative_position,
            },
        )
    }

    /// Applies a force for the next step.
    ///
    /// # Errors
    ///
    /// Fault or a dead worker.
    pub fn apply_force(
        &mut self,
        object: ObjectId,
        force: Vec3,
        relative_position: Vec3,
    ) -> SessionResult<()> {
        self.mutate(
            object,
            Command::ApplyForce {
                object,
                force,
                relative_position,
            },
        )
    }

    /// Zeroes velocities and forces.
    ///
    /// # Errors
    ///
    /// Fault or a dead worker.
    pub fn reset_dynamic_body(&mut self, object: ObjectId) -> SessionResult<()> {
        self.mutate(object, Command::ResetDynamicBody { object })
    }

    /// Wakes a sleeping body.
    ///
    /// # Errors
    ///
    /// Fault or a dead worker.
    pub fn activate_body(&mut self, object: ObjectId) -> SessionResult<()> {
        self.mutate(object, Command::ActivateBody { object })
    }

    /// Offsets every collision shape of a body.
    ///
    /// # Errors
    ///
    /// Fault or a dead worker.
    pub fn set_shapes_offset(&mut self, object: ObjectId, offset: Vec3) -> SessionResult<()> {
        self.mutate(object, Command::SetShapesOffset { object, offset })
    }

    /// Tracked node of a rigid body.
    #[must_use]
    pub fn node(&self, object: ObjectId) -> Option<&SceneNode> {
        self.sync.rigid(object)
    }

    /// Tracked node of a rigid body, mutably. Moving a kinematic node needs a
    /// matching [`set_motion_state`](Self::set_motion_state).
    pub fn node_mut(&mut self, object: ObjectId) -> Option<&mut SceneNode> {
        self.sync.rigid_mut(object)
    }

    /// Slot of a rigid body once the simulation confirmed it.
    #[must_use]
    pub fn slot_of(&self, object: ObjectId) -> Option<usize> {
        self.sync.slot_of(object)
    }

    /// Live rigid bodies.
    #[must_use]
    pub fn rigid_body_count(&self) -> usize {
        self.rigid.len()
    }

    /// Whether `object` was removed and the simulation has not confirmed it.
    #[must_use]
    pub fn is_removal_pending(&self, object: ObjectId) -> bool {
        self.removing.contains(&object)
    }

    // ------------------------------------------------------------------------
    // Soft bodies
    // ------------------------------------------------------------------------

    /// Registers a soft body built from `mesh` placed at `world`.
    ///
    /// The world transform is baked into the mesh once. Triangle meshes are
    /// re-indexed when needed and welded; ropes map one node per vertex.
    ///
    /// # Errors
    ///
    /// Geometry that cannot be welded, an oversized mesh, duplicate
    /// identity, fault, or a dead worker.
    pub fn add_soft_body(
        &mut self,
        object: ObjectId,
        mut mesh: VisualMesh,
        world: &Mat4,
        config: SoftBodyConfig,
    ) -> SessionResult<()> {
        self.pump();
        self.ensure_live()?;
        self.ensure_unused(object)?;

        if !mesh.bake(world) {
            tracing::debug!(%object, "mesh already baked");
        }

        let (region, visual, topology) = match config.kind {
            SoftBodyKind::Trimesh => {
                let topology = weld_mesh(&mut mesh)?;
                let layout =
                    SoftBodyLayout::trimesh(topology.indices.len(), topology.vertex_count())?;
                let region = SoftBodyRegion::new(layout);
                region.write_indices(&topology.indices);
                region.write_vertices(&topology.vertices);
                region.write_normals(&topology.normals);
                (region, SoftMesh::from_visual(&mesh), Some(topology))
            }
            SoftBodyKind::Rope => {
                let vertices = mesh.rope_vertices();
                if vertices.len() % 3 != 0 {
                    return Err(TopologyError::MissingAttribute("rope positions").into());
                }
                let region = SoftBodyRegion::new(SoftBodyLayout::rope(vertices.len() / 3)?);
                region.write_vertices(vertices);
                (region, SoftMesh::rope(&mesh), None)
            }
        };

        let scatter = topology.as_ref().map(|t| t.scatter.clone());
        self.soft.insert(object, config.kind);
        self.sync.track_soft(object, visual, scatter);
        self.send(Command::AddSoftBody {
            object,
            region,
            config,
            topology,
        })
    }

    /// Unregisters a soft body and hands its mesh back.
    ///
    /// # Errors
    ///
    /// Dead worker.
    pub fn remove_soft_body(&mut self, object: ObjectId) -> SessionResult<Option<SoftMesh>> {
        if self.soft.remove(&object).is_none() {
            tracing::debug!(%object, "remove of unknown soft body");
            return Ok(None);
        }
        let mesh = self.sync.untrack_soft(object);
        if self.fault.is_none() {
            self.removing.insert(object);
            self.send(Command::RemoveSoftBody { object })?;
        }
        Ok(mesh)
    }

    /// Tracked mesh of a soft body.
    #[must_use]
    pub fn soft_mesh(&self, object: ObjectId) -> Option<&SoftMesh> {
        self.sync.soft(object)
    }

    /// Live soft bodies.
    #[must_use]
    pub fn soft_body_count(&self) -> usize {
        self.soft.len()
    }

    // ------------------------------------------------------------------------
    // Constraints
    // ------------------------------------------------------------------------

    /// Links `body_a` to `body_b`, or to the world when `body_b` is `None`.
    /// The constraint is dropped when either body is removed.
    ///
    /// # Errors
    ///
    /// Fault or a dead worker.
    pub fn add_constraint(
        &mut self,
        body_a: ObjectId,
        body_b: Option<ObjectId>,
        config: ConstraintConfig,
    ) -> SessionResult<ConstraintId> {
        self.pump();
        self.ensure_live()?;
        self.next_constraint += 1;
        let constraint = ConstraintId(self.next_constraint);
        self.constraints.insert(constraint, (body_a, body_b));
        self.send(Command::AddConstraint {
            constraint,
            body_a,
            body_b,
            config,
        })?;
        Ok(constraint)
    }

    /// Changes runtime constraint settings. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Fault or a dead worker.
    pub fn update_constraint(
        &mut self,
        constraint: ConstraintId,
        update: ConstraintUpdate,
    ) -> SessionResult<()> {
        self.pump();
        self.ensure_live()?;
        if !self.constraints.contains_key(&constraint) {
            tracing::debug!(?constraint, "update of unknown constraint");
            return Ok(());
        }
        self.send(Command::UpdateConstraint { constraint, update })
    }

    /// Removes a constraint. Returns whether it was live.
    ///
    /// # Errors
    ///
    /// Dead worker.
    pub fn remove_constraint(&mut self, constraint: ConstraintId) -> SessionResult<bool> {
        if self.constraints.remove(&constraint).is_none() {
            return Ok(false);
        }
        if self.fault.is_none() {
            self.send(Command::RemoveConstraint { constraint })?;
        }
        Ok(true)
    }

    /// Live constraints.
    #[must_use]
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    // ------------------------------------------------------------------------
    // Debug, speed, queries
    // ------------------------------------------------------------------------

    /// Starts debug drawing into `geometry`.
    ///
    /// # Errors
    ///
    /// Invalid debug capacity, fault, or a dead worker.
    pub fn enable_debug(&mut self, geometry: Box<dyn DebugGeometry + Send>) -> SessionResult<()> {
        self.pump();
        self.ensure_live()?;
        // allocated once; it lives in the bundle from then on
        let buffer = if self.debug_allocated {
            None
        } else {
            Some(DebugRegion::new(self.config.debug_buffer_vertices)?)
        };
        self.sync.enable_debug(geometry);
        self.send(Command::EnableDebug {
            enabled: true,
            buffer,
        })?;
        self.debug_allocated = true;
        Ok(())
    }

    /// Stops debug drawing and returns the geometry.
    ///
    /// # Errors
    ///
    /// Dead worker.
    pub fn disable_debug(&mut self) -> SessionResult<Option<Box<dyn DebugGeometry + Send>>> {
        let geometry = self.sync.disable_debug();
        if self.fault.is_none() {
            self.send(Command::EnableDebug {
                enabled: false,
                buffer: None,
            })?;
        }
        Ok(geometry)
    }

    /// Changes the speed factor; 1.0 is real time, 0.0 pauses.
    ///
    /// # Errors
    ///
    /// Fault or a dead worker.
    pub fn set_simulation_speed(&mut self, speed: f32) -> SessionResult<()> {
        self.pump();
        self.ensure_live()?;
        self.send(Command::SetSimulationSpeed { speed })
    }

    /// Casts a ray against the current world.
    ///
    /// Hits on objects removed before the answer is routed are dropped, so a
    /// query against a removed body resolves empty.
    ///
    /// # Errors
    ///
    /// Fault or a dead worker.
    pub fn raycast(
        &mut self,
        origin: Vec3,
        direction: Vec3,
        options: RaycastOptions,
    ) -> SessionResult<RaycastTicket> {
        self.pump();
        self.ensure_live()?;
        let (request, ticket) = self.requests.register();
        if let Err(err) = self.send(Command::RaycastRequest {
            request,
            origin,
            direction,
            options,
        }) {
            self.requests.cancel(request);
            return Err(err);
        }
        Ok(ticket)
    }

    /// Routes notifications until `ticket` resolves.
    ///
    /// # Errors
    ///
    /// Cancelled ticket, timeout, or a dead worker.
    pub fn wait_for_raycast(
        &mut self,
        ticket: &mut RaycastTicket,
        timeout: Duration,
    ) -> SessionResult<Vec<RaycastHitMessage>> {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if let Some(result) = ticket.try_result() {
                return result;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SessionError::Timeout("RAYCAST_RESPONSE"));
            }
            match self.notifications.recv_timeout(remaining) {
                Ok(notification) => self.route(notification),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(SessionError::Timeout("RAYCAST_RESPONSE"))
                }
                Err(RecvTimeoutError::Disconnected) => return Err(SessionError::Disconnected),
            }
        }
    }

    /// Ray queries awaiting an answer.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn ensure_live(&self) -> SessionResult<()> {
        match &self.fault {
            Some(reason) => Err(SessionError::Faulted(reason.clone())),
            None => Ok(()),
        }
    }

    fn ensure_unused(&self, object: ObjectId) -> SessionResult<()> {
        if self.rigid.contains_key(&object) || self.soft.contains_key(&object) {
            return Err(SessionError::AlreadyRegistered(object));
        }
        if self.removing.contains(&object) {
            return Err(SessionError::RemovalPending(object));
        }
        Ok(())
    }

    fn forget_constraints_on(&mut self, object: ObjectId) {
        let before = self.constraints.len();
        self.constraints
            .retain(|_, (a, b)| *a != object && *b != Some(object));
        let dropped = before - self.constraints.len();
        if dropped > 0 {
            tracing::debug!(%object, dropped, "constraints dropped with their body");
        }
    }

    /// Sends a per-body mutation. Untracked identities are stale references.
    fn mutate(&mut self, object: ObjectId, command: Command) -> SessionResult<()> {
        self.pump();
        self.ensure_live()?;
        if !self.rigid.contains_key(&object) {
            tracing::debug!(%object, command = command.kind(), "mutation of unknown body");
            return Ok(());
        }
        self.send(command)
    }

    /// Queues a command. While the queue is full, notifications are drained
    /// so the worker can never block on us while we block on it.
    fn send(&mut self, mut command: Command) -> SessionResult<()> {
        loop {
            match self.worker.try_send(command) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(back)) => {
                    command = back;
                    self.pump();
                    thread::yield_now();
                }
                Err(TrySendError::Disconnected(_)) => return Err(SessionError::Disconnected),
            }
        }
    }

    fn pump(&mut self) {
        while let Ok(notification) = self.notifications.try_recv() {
            self.route(notification);
        }
    }

    fn route(&mut self, notification: Notification) {
        match notification {
            Notification::Ready { protocol } => {
                self.ready = true;
                tracing::info!(?protocol, "simulation ready");
            }
            Notification::RigidBodyReady { object, slot } => {
                self.sync.defer_slot(object, slot);
            }
            Notification::SoftBodyReady { object, layout } => {
                self.sync.defer_region(object, layout);
            }
            Notification::BodyRemoved { object } => {
                self.removing.remove(&object);
            }
            Notification::RegistrationFailed { object, reason } => {
                tracing::debug!(%object, %reason, "registration rejected by simulation");
                if self.rigid.remove(&object).is_some() {
                    self.sync.untrack_rigid(object);
                    self.forget_constraints_on(object);
                }
                if self.soft.remove(&object).is_some() {
                    self.sync.untrack_soft(object);
                }
                self.registration_failures.push((object, reason));
            }
            Notification::RaycastResponse { request, mut hits } => {
                hits.retain(|hit| self.rigid.contains_key(&hit.object));
                self.requests.resolve(request, hits);
            }
            Notification::SimulationFault { reason } => {
                let cancelled = self.requests.cancel_all();
                tracing::error!(%reason, cancelled, "simulation faulted");
                self.fault = Some(reason);
            }
        }
    }
}

impl Drop for SimulationSession {
    fn drop(&mut self) {
        let cancelled = self.requests.cancel_all();
        tracing::info!(
            cancelled,
            rigid_bodies = self.rigid.len(),
            soft_bodies = self.soft.len(),
            "simulation session torn down"
        );
    }
}

impl std::fmt::Debug for SimulationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationSession")
            .field("protocol", &self.protocol)
            .field("ready", &self.ready)
            .field("rigid_bodies", &self.rigid.len())
            .field("soft_bodies", &self.soft.len())
            .field("constraints", &self.constraints.len())
            .field("pending_requests", &self.requests.len())
            .field("fault", &self.fault)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolChoice;

    const WAIT: Duration = Duration::from_secs(5);

    fn session(max_bodies: usize) -> SimulationSession {
        let config = SessionConfig::default()
            .with_max_bodies(max_bodies)
            .with_protocol(ProtocolChoice::SharedMemory);
        let mut session = SimulationSession::start(config).unwrap();
        session.wait_ready(WAIT).unwrap();
        session
    }

    #[test]
    fn test_ready_after_start() {
        let s = session(4);
        assert!(s.is_ready());
        assert_eq!(s.protocol(), BufferProtocol::SharedMemory);
    }

    #[test]
    fn test_capacity_is_checked_synchronously() {
        let mut s = session(2);
        let a = s.new_object_id();
        let b = s.new_object_id();
        let c = s.new_object_id();
        let shape = ShapeDescriptor::sphere(0.5);

        s.add_rigid_body(a, SceneNode::default(), shape.clone(), BodyConfig::default())
            .unwrap();
        s.add_rigid_body(b, SceneNode::default(), shape.clone(), BodyConfig::default())
            .unwrap();
        assert!(matches!(
            s.add_rigid_body(c, SceneNode::default(), shape.clone(), BodyConfig::default()),
            Err(SessionError::CapacityExceeded { capacity: 2, .. })
        ));
        assert_eq!(s.rigid_body_count(), 2);

        assert!(s.remove_rigid_body(a).unwrap().is_some());
        s.add_rigid_body(c, SceneNode::default(), shape, BodyConfig::default())
            .unwrap();
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let mut s = session(4);
        let id = s.new_object_id();
        s.add_rigid_body(id, SceneNode::default(), ShapeDescriptor::sphere(1.0), BodyConfig::default())
            .unwrap();
        assert!(matches!(
            s.add_rigid_body(id, SceneNode::default(), ShapeDescriptor::sphere(1.0), BodyConfig::default()),
            Err(SessionError::AlreadyRegistered(_))
        ));
        assert_ne!(s.new_object_id(), id);
    }

    #[test]
    fn test_removed_identity_is_reserved_until_confirmed() {
        let mut s = session(4);
        let id = s.new_object_id();
        let shape = ShapeDescriptor::sphere(0.5);
        s.add_rigid_body(id, SceneNode::default(), shape.clone(), BodyConfig::default())
            .unwrap();
        assert!(s.remove_rigid_body(id).unwrap().is_some());

        // nothing has been routed since the remove
        assert!(s.is_removal_pending(id));
        assert!(matches!(
            s.ensure_unused(id),
            Err(SessionError::RemovalPending(pending)) if pending == id
        ));
        assert_ne!(s.new_object_id(), id);

        s.wait_until("BODY_REMOVED", WAIT, |s| !s.is_removal_pending(id))
            .unwrap();
        s.add_rigid_body(id, SceneNode::default(), shape, BodyConfig::default())
            .unwrap();
        let deadline = Instant::now() + WAIT;
        while s.slot_of(id).is_none() {
            assert!(Instant::now() < deadline, "slot never applied");
            s.sync_frame().unwrap();
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(s.slot_of(id), Some(0));
    }

    #[test]
    fn test_constraints_go_with_their_body() {
        let mut s = session(4);
        let a = s.new_object_id();
        let b = s.new_object_id();
        for id in [a, b] {
            s.add_rigid_body(id, SceneNode::default(), ShapeDescriptor::sphere(0.5), BodyConfig::default())
                .unwrap();
        }
        let fixed = ConstraintConfig::new(tandem_shared::ConstraintKind::Fixed);
        let link = s.add_constraint(a, Some(b), fixed.clone()).unwrap();
        let pin = s.add_constraint(b, None, fixed).unwrap();
        assert_eq!(s.constraint_count(), 2);

        s.remove_rigid_body(a).unwrap();
        assert_eq!(s.constraint_count(), 1);
        assert!(!s.remove_constraint(link).unwrap());

        s.remove_rigid_body(b).unwrap();
        assert_eq!(s.constraint_count(), 0);
        assert!(!s.remove_constraint(pin).unwrap());
    }

    #[test]
    fn test_unweldable_geometry_is_rejected() {
        let mut s = session(4);
        let id = s.new_object_id();
        let mesh = VisualMesh::soup(vec![0.0; 12]);
        assert!(matches!(
            s.add_soft_body(id, mesh, &Mat4::IDENTITY, SoftBodyConfig::default()),
            Err(SessionError::InvalidGeometry(TopologyError::NotTriangulated(4)))
        ));
        assert_eq!(s.soft_body_count(), 0);
    }

    #[test]
    fn test_stale_references_are_no_ops() {
        let mut s = session(4);
        let ghost = ObjectId(999);
        assert!(s.remove_rigid_body(ghost).unwrap().is_none());
        assert!(s.remove_soft_body(ghost).unwrap().is_none());
        s.apply_impulse(ghost, Vec3::Y, Vec3::ZERO).unwrap();
        s.update_constraint(ConstraintId(5), ConstraintUpdate::default())
            .unwrap();
        assert!(!s.remove_constraint(ConstraintId(5)).unwrap());
    }

    #[test]
    fn test_teardown_cancels_pending_requests() {
        let mut s = session(4);
        s.set_simulation_speed(0.0).unwrap();
        let mut ticket = s
            .raycast(Vec3::ZERO, Vec3::Y, RaycastOptions::default())
            .unwrap();
        // drop without ever routing the answer
        drop(s);
        assert!(matches!(ticket.try_result(), Some(Err(SessionError::Cancelled(_)))));
    }
}
