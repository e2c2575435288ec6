//! # Simulation Driver
//!
//! The producer state machine. Owns the dynamics world, the slot allocator
//! and the producer end of the buffer channel.
//!
//! ## States
//!
//! ```text
//! STOPPED ──INIT──► INITIALIZING ──world built──► RUNNING ──step error──► FAULTED
//!    │                    │
//!    └── other commands   └── factory error ─────────────────────────────► FAULTED
//!        dropped (warn)
//! ```
//!
//! ## Tick
//!
//! 1. Skip unless the consumer released the bundle (backpressure).
//! 2. Move queued soft-body and debug regions into or out of the bundle.
//!    Registration and removal can arrive while the consumer holds it, so
//!    region changes wait for the next acquire.
//! 3. Advance the world by wall time since the last step, clamped and
//!    scaled by the speed factor.
//! 4. If any substep ran, write every live transform and soft-body region.
//! 5. Publish, stamping the substep counter and step duration.

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use crossbeam_channel::Sender;
use tandem_core::{
    BufferProtocol, Command, DebugRegion, Notification, ProducerEnd, PublishStats,
    SlotAllocator, SoftBodyRegion, WeldedTopology, WriteGuard,
};
use tandem_shared::{
    BodyConfig, Mat4, ObjectId, ShapeDescriptor, SoftBodyAnchor, SoftBodyConfig,
    WorldConfig, MAX_FRAME_DELTA_MS,
};

use crate::dynamics::{DynamicsWorld, WorldFactory};
use crate::error::{DriverError, DriverResult, DynamicsError};

/// Producer lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    /// Waiting for INIT.
    Stopped,
    /// Building the world.
    Initializing,
    /// Ticking and accepting commands.
    Running,
    /// Terminal.
    Faulted,
}

/// What one tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running yet, or stopped.
    NotRunning,
    /// The consumer still holds the bundle.
    Skipped,
    /// Published a generation.
    Stepped {
        /// Fixed substeps taken by the world.
        substeps: u32,
    },
    /// Stepping failed; the driver is now FAULTED.
    Faulted,
}

/// Scratch for reading a soft body out of the world.
#[derive(Debug)]
struct SoftRecord {
    positions: Vec<f32>,
    normals: Option<Vec<f32>>,
}

/// Bundle change applied at the next acquire.
#[derive(Debug)]
enum RegionOp {
    InstallSoft {
        object: ObjectId,
        region: SoftBodyRegion,
    },
    RemoveSoft(ObjectId),
    InstallDebug(DebugRegion),
}

/// Producer side of the simulation.
pub struct SimulationDriver {
    state: DriverState,
    factory: Option<WorldFactory>,
    world: Option<Box<dyn DynamicsWorld>>,
    buffers: Option<ProducerEnd>,
    slots: SlotAllocator,
    soft: BTreeMap<ObjectId, SoftRecord>,
    region_ops: VecDeque<RegionOp>,
    has_debug_region: bool,
    debug_enabled: bool,
    fixed_time_step: f32,
    simulation_speed: f32,
    max_frame_delta_ms: f32,
    last_tick: Option<Instant>,
    substep_counter: u32,
    fault: Option<String>,
    notifications: Sender<Notification>,
}

impl SimulationDriver {
    /// Driver in STOPPED that builds its world with `factory` on INIT.
    #[must_use]
    pub fn new(factory: WorldFactory, notifications: Sender<Notification>) -> Self {
        Self {
            state: DriverState::Stopped,
            factory: Some(factory),
            world: None,
            buffers: None,
            slots: SlotAllocator::new(0),
            soft: BTreeMap::new(),
            region_ops: VecDeque::new(),
            has_debug_region: false,
            debug_enabled: false,
            fixed_time_step: WorldConfig::default().fixed_time_step,
            simulation_speed: 1.0,
            max_frame_delta_ms: MAX_FRAME_DELTA_MS,
            last_tick: None,
            substep_counter: 0,
            fault: None,
            notifications,
        }
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> DriverState {
        self.state
    }

    /// Protocol of the producer end, once INIT arrived.
    #[must_use]
    pub fn protocol(&self) -> Option<BufferProtocol> {
        self.buffers.as_ref().map(ProducerEnd::protocol)
    }

    /// Substep counter as last published.
    #[inline]
    #[must_use]
    pub const fn substep_counter(&self) -> u32 {
        self.substep_counter
    }

    /// World fixed timestep in seconds; the tick interval.
    #[inline]
    #[must_use]
    pub const fn fixed_time_step(&self) -> f32 {
        self.fixed_time_step
    }

    /// Speed factor.
    #[inline]
    #[must_use]
    pub const fn simulation_speed(&self) -> f32 {
        self.simulation_speed
    }

    /// Live rigid bodies.
    #[must_use]
    pub fn rigid_body_count(&self) -> usize {
        self.slots.len()
    }

    /// Live soft bodies.
    #[must_use]
    pub fn soft_body_count(&self) -> usize {
        self.soft.len()
    }

    /// Slot owned by a rigid body.
    #[must_use]
    pub fn slot_of(&self, object: ObjectId) -> Option<usize> {
        self.slots.slot_of(object)
    }

    /// Fault reason, once FAULTED.
    #[must_use]
    pub fn fault_reason(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    /// Handles one command.
    ///
    /// # Errors
    ///
    /// - [`DriverError::ProtocolViolation`] for commands not valid in the
    ///   current state; the command is dropped.
    /// - [`DriverError::Faulted`] once FAULTED.
    /// - Registration failures, which are also posted as
    ///   [`Notification::RegistrationFailed`].
    pub fn handle(&mut self, command: Command) -> DriverResult<()> {
        match (self.state, command) {
            (_, Command::Shutdown) => Ok(()),
            (DriverState::Faulted, command) => {
                tracing::debug!(command = command.kind(), "dropped; simulation faulted");
                Err(DriverError::Faulted(self.fault.clone().unwrap_or_default()))
            }
            (
                DriverState::Stopped,
                Command::Init {
                    world,
                    buffers,
                    max_bodies,
                    simulation_speed,
                    max_frame_delta_ms,
                },
            ) => self.init(world, buffers, max_bodies, simulation_speed, max_frame_delta_ms),
            (DriverState::Running, Command::Init { .. }) => {
                tracing::warn!("INIT while running ignored");
                Ok(())
            }
            (DriverState::Running, command) => self.handle_running(command),
            (state, command) => {
                tracing::warn!(command = command.kind(), ?state, "command dropped");
                Err(DriverError::ProtocolViolation {
                    command: command.kind(),
                    state,
                })
            }
        }
    }

    fn init(
        &mut self,
        world: WorldConfig,
        buffers: ProducerEnd,
        max_bodies: usize,
        simulation_speed: f32,
        max_frame_delta_ms: f32,
    ) -> DriverResult<()> {
        self.state = DriverState::Initializing;
        let Some(factory) = self.factory.take() else {
            self.enter_fault("world factory already consumed".to_owned());
            return Err(DriverError::Faulted("world factory already consumed".to_owned()));
        };

        let built = match factory(&world) {
            Ok(built) => built,
            Err(err) => {
                self.enter_fault(err.to_string());
                return Err(err.into());
            }
        };

        let protocol = buffers.protocol();
        self.world = Some(built);
        self.buffers = Some(buffers);
        self.slots = SlotAllocator::new(max_bodies);
        self.fixed_time_step = world.fixed_time_step;
        self.simulation_speed = sanitize_speed(simulation_speed).unwrap_or(1.0);
        self.max_frame_delta_ms = if max_frame_delta_ms.is_finite() && max_frame_delta_ms > 0.0 {
            max_frame_delta_ms
        } else {
            MAX_FRAME_DELTA_MS
        };
        self.last_tick = Some(Instant::now());
        self.state = DriverState::Running;

        tracing::info!(?protocol, max_bodies, "simulation initialized");
        self.notify(Notification::Ready { protocol });
        Ok(())
    }

    fn handle_running(&mut self, command: Command) -> DriverResult<()> {
        let kind = command.kind();
        match command {
            Command::AddRigidBody {
                object,
                transform,
                shape,
                config,
            } => {
                let result = self
                    .add_rigid_body(object, &transform, &shape, &config)
                    .map(|slot| Some(Notification::RigidBodyReady { object, slot }));
                self.report_registration(object, result)
            }
            Command::RemoveRigidBody { object } => {
                if self.slots.release(object).is_some() {
                    if let Some(world) = self.world.as_mut() {
                        world.remove_rigid_body(object);
                    }
                } else {
                    tracing::debug!(%object, "remove of unknown rigid body ignored");
                }
                self.notify(Notification::BodyRemoved { object });
                Ok(())
            }
            Command::AddSoftBody {
                object,
                region,
                config,
                topology,
            } => {
                // SOFTBODY_READY follows once the region is in the bundle
                let result = self
                    .add_soft_body(object, region, config, topology.as_ref())
                    .map(|()| None);
                self.report_registration(object, result)
            }
            Command::RemoveSoftBody { object } => {
                if self.soft.remove(&object).is_some() {
                    if let Some(world) = self.world.as_mut() {
                        world.remove_soft_body(object);
                    }
                    // acknowledged once the region is out of the bundle
                    self.region_ops.push_back(RegionOp::RemoveSoft(object));
                } else {
                    tracing::debug!(%object, "remove of unknown soft body ignored");
                    self.notify(Notification::BodyRemoved { object });
                }
                Ok(())
            }
            Command::EnableDebug { enabled, buffer } => {
                if let Some(buffer) = buffer {
                    self.region_ops.push_back(RegionOp::InstallDebug(buffer));
                    self.has_debug_region = true;
                }
                if enabled && !self.has_debug_region {
                    tracing::warn!("debug draw enabled without a buffer");
                    return Err(DriverError::ProtocolViolation {
                        command: kind,
                        state: self.state,
                    });
                }
                self.debug_enabled = enabled;
                Ok(())
            }
            Command::SetSimulationSpeed { speed } => {
                match sanitize_speed(speed) {
                    Some(speed) => self.simulation_speed = speed,
                    None => tracing::warn!(speed, "invalid simulation speed ignored"),
                }
                Ok(())
            }
            Command::RaycastRequest {
                request,
                origin,
                direction,
                options,
            } => {
                let hits = self
                    .world
                    .as_ref()
                    .map(|world| world.ray_test(origin, direction, &options))
                    .unwrap_or_default();
                self.notify(Notification::RaycastResponse { request, hits });
                Ok(())
            }
            command => self.mutate(command),
        }
    }

    /// Per-body and per-constraint mutations. Unknown identities are stale
    /// references and resolve as no-ops.
    fn mutate(&mut self, command: Command) -> DriverResult<()> {
        let kind = command.kind();
        let Some(world) = self.world.as_mut() else {
            return Err(DriverError::ProtocolViolation {
                command: kind,
                state: self.state,
            });
        };
        let result = match command {
            Command::UpdateRigidBody { object, options } => {
                world.update_rigid_body(object, &options)
            }
            Command::SetMotionState { object, transform } => {
                world.set_motion_state(object, &transform)
            }
            Command::SetLinearVelocity { object, velocity } => {
                world.set_linear_velocity(object, velocity)
            }
            Command::ApplyImpulse {
                object,
                impulse,
                relative_position,
            } => world.apply_impulse(object, impulse, relative_position),
            Command::ApplyForce {
                object,
                force,
                relative_position,
            } => world.apply_force(object, force, relative_position),
            Command::ResetDynamicBody { object } => world.reset_dynamic_body(object),
            Command::ActivateBody { object } => world.activate_body(object),
            Command::SetShapesOffset { object, offset } => world.set_shapes_offset(object, offset),
            Command::AddConstraint {
                constraint,
                body_a,
                body_b,
                config,
            } => world.add_constraint(constraint, body_a, body_b, &config),
            Command::UpdateConstraint { constraint, update } => {
                world.update_constraint(constraint, &update)
            }
            Command::RemoveConstraint { constraint } => {
                if !world.remove_constraint(constraint) {
                    tracing::debug!(?constraint, "remove of unknown constraint ignored");
                }
                Ok(())
            }
            other => {
                return Err(DriverError::ProtocolViolation {
                    command: other.kind(),
                    state: self.state,
                })
            }
        };

        match result {
            Err(DynamicsError::UnknownObject(object)) => {
                tracing::debug!(command = kind, %object, "stale reference ignored");
                Ok(())
            }
            Err(DynamicsError::UnknownConstraint(constraint)) => {
                tracing::debug!(command = kind, ?constraint, "stale reference ignored");
                Ok(())
            }
            other => other.map_err(DriverError::from),
        }
    }

    fn add_rigid_body(
        &mut self,
        object: ObjectId,
        transform: &Mat4,
        shape: &ShapeDescriptor,
        config: &BodyConfig,
    ) -> DriverResult<usize> {
        if self.soft.contains_key(&object) {
            return Err(DynamicsError::AlreadyRegistered(object).into());
        }
        let world = self.world.as_mut().ok_or(DriverError::ProtocolViolation {
            command: "ADD_RIGID_BODY",
            state: self.state,
        })?;

        let slot = self.slots.allocate(object)?;
        if let Err(err) = world.add_rigid_body(object, transform, shape, config) {
            self.slots.release(object);
            return Err(err.into());
        }
        Ok(slot)
    }

    fn add_soft_body(
        &mut self,
        object: ObjectId,
        region: SoftBodyRegion,
        mut config: SoftBodyConfig,
        topology: Option<&WeldedTopology>,
    ) -> DriverResult<()> {
        if self.soft.contains_key(&object) || self.slots.slot_of(object).is_some() {
            return Err(DynamicsError::AlreadyRegistered(object).into());
        }

        let (vertices, indices) = match topology {
            Some(topology) => (topology.vertices.clone(), topology.indices.clone()),
            None => {
                let mut vertices = vec![0.0; region.vertex_count() * 3];
                region.read_vertices(&mut vertices);
                let indices = if region.layout().index_count() > 0 {
                    region.read_indices()
                } else {
                    Vec::new()
                };
                (vertices, indices)
            }
        };
        if vertices.len() != region.vertex_count() * 3 {
            return Err(DynamicsError::InvalidSoftBody(format!(
                "{} physics vertices for a region of {}",
                vertices.len() / 3,
                region.vertex_count()
            ))
            .into());
        }

        let slots = &self.slots;
        config.anchors.retain(|anchor| match anchor {
            SoftBodyAnchor::World { .. } => true,
            SoftBodyAnchor::RigidBody { body, .. } => {
                let live = slots.slot_of(*body).is_some();
                if !live {
                    tracing::debug!(%object, %body, "anchor to unknown body dropped");
                }
                live
            }
        });

        let world = self.world.as_mut().ok_or(DriverError::ProtocolViolation {
            command: "ADD_SOFT_BODY",
            state: self.state,
        })?;
        world.add_soft_body(object, &vertices, &indices, &config)?;

        let normals = region
            .layout()
            .has_normals()
            .then(|| vec![0.0; region.vertex_count() * 3]);
        self.soft.insert(
            object,
            SoftRecord {
                positions: vertices,
                normals,
            },
        );
        self.region_ops
            .push_back(RegionOp::InstallSoft { object, region });
        Ok(())
    }

    fn report_registration(
        &mut self,
        object: ObjectId,
        result: DriverResult<Option<Notification>>,
    ) -> DriverResult<()> {
        match result {
            Ok(ready) => {
                tracing::debug!(%object, "registered");
                if let Some(ready) = ready {
                    self.notify(ready);
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%object, error = %err, "registration failed");
                self.notify(Notification::RegistrationFailed {
                    object,
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    // ========================================================================
    // TICK
    // ========================================================================

    /// Runs one producer tick at `now`.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        match self.state {
            DriverState::Running => {}
            DriverState::Faulted => return TickOutcome::Faulted,
            DriverState::Stopped | DriverState::Initializing => return TickOutcome::NotRunning,
        }
        let (Some(world), Some(end)) = (self.world.as_mut(), self.buffers.as_mut()) else {
            return TickOutcome::NotRunning;
        };
        let Some(guard) = end.acquire() else {
            return TickOutcome::Skipped;
        };
        apply_region_ops(&guard, &mut self.region_ops, &self.notifications);

        let started = Instant::now();
        let elapsed_ms = self
            .last_tick
            .map_or(0.0, |last| now.saturating_duration_since(last).as_secs_f32() * 1000.0);
        let clamped_ms = elapsed_ms.min(self.max_frame_delta_ms);

        let substeps = match world.step(clamped_ms * self.simulation_speed / 1000.0) {
            Ok(substeps) => substeps,
            Err(err) => {
                drop(guard);
                self.enter_fault(err.to_string());
                return TickOutcome::Faulted;
            }
        };
        self.last_tick = Some(now);
        self.substep_counter = self.substep_counter.wrapping_add(substeps);

        let buffers = guard.buffers();
        if substeps > 0 {
            for (slot, object) in self.slots.iter() {
                if let Some(transform) = world.rigid_body_transform(object) {
                    buffers.rigid().write_matrix(slot, &transform);
                }
            }
            for (&object, record) in &mut self.soft {
                if world.read_soft_body(object, &mut record.positions, record.normals.as_deref_mut())
                {
                    let written = buffers.with_soft_region(object, |region| {
                        region.write_vertices(&record.positions);
                        if let Some(normals) = &record.normals {
                            region.write_normals(normals);
                        }
                    });
                    if written.is_none() {
                        tracing::debug!(%object, "soft body has no region in the bundle");
                    }
                }
            }
        }

        if self.debug_enabled {
            buffers.with_debug_region(|debug| {
                // restart the fill every write; the consumer reads at most `count`
                let mut written = 0;
                world.debug_draw(&mut |position, color| {
                    let ok = debug.write_vertex(written, position, color);
                    if ok {
                        written += 1;
                    }
                    ok
                });
                debug.set_count(written);
            });
        }

        guard.publish(PublishStats {
            substep_counter: self.substep_counter,
            step_duration_ms: started.elapsed().as_secs_f32() * 1000.0,
        });
        TickOutcome::Stepped { substeps }
    }

    fn enter_fault(&mut self, reason: String) {
        tracing::error!(%reason, "simulation faulted");
        self.state = DriverState::Faulted;
        self.world = None;
        self.fault = Some(reason.clone());
        self.notify(Notification::SimulationFault { reason });
    }

    fn notify(&self, notification: Notification) {
        send_notification(&self.notifications, notification);
    }
}

/// Moves queued regions into or out of the bundle `guard` holds.
fn apply_region_ops(
    guard: &WriteGuard<'_>,
    ops: &mut VecDeque<RegionOp>,
    notifications: &Sender<Notification>,
) {
    for op in ops.drain(..) {
        match op {
            RegionOp::InstallSoft { object, region } => {
                let layout = *region.layout();
                if guard.install_soft_region(object, region).is_some() {
                    tracing::debug!(%object, "soft region replaced");
                }
                send_notification(notifications, Notification::SoftBodyReady { object, layout });
            }
            RegionOp::RemoveSoft(object) => {
                if guard.remove_soft_region(object).is_none() {
                    tracing::debug!(%object, "soft region already gone");
                }
                send_notification(notifications, Notification::BodyRemoved { object });
            }
            RegionOp::InstallDebug(region) => {
                guard.install_debug_region(region);
            }
        }
    }
}

fn send_notification(notifications: &Sender<Notification>, notification: Notification) {
    if notifications.send(notification).is_err() {
        tracing::debug!("notification dropped; session gone");
    }
}

impl std::fmt::Debug for SimulationDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationDriver")
            .field("state", &self.state)
            .field("rigid_bodies", &self.slots.len())
            .field("soft_bodies", &self.soft.len())
            .field("substep_counter", &self.substep_counter)
            .finish_non_exhaustive()
    }
}

fn sanitize_speed(speed: f32) -> Option<f32> {
    (speed.is_finite() && speed >= 0.0).then_some(speed)
}
