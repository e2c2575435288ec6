//! # Wire Protocol
//!
//! Commands flow render side to simulation side; notifications flow back.
//! Both travel over bounded channels. Regions ride inside the messages by
//! value, so this lives here rather than in `tandem_shared`.
//!
//! ```text
//! Render side                               Simulation side
//!   Init ───────────────────────────────────►  STOPPED → RUNNING
//!        ◄─────────────────────────────────── Ready
//!   AddRigidBody ───────────────────────────►  slot allocated
//!        ◄─────────────────────────────────── RigidBodyReady { slot }
//!   RemoveRigidBody ────────────────────────►  slot released
//!        ◄─────────────────────────────────── BodyRemoved
//!   RaycastRequest { id } ──────────────────►  queried
//!        ◄─────────────────────────────────── RaycastResponse { id }
//! ```

use tandem_shared::{
    BodyConfig, ConstraintConfig, ConstraintId, ConstraintUpdate, Mat4, ObjectId,
    RaycastHitMessage, RaycastOptions, RequestId, ShapeDescriptor, SoftBodyConfig,
    UpdateBodyOptions, Vec3, WorldConfig,
};

use crate::layout::SoftBodyLayout;
use crate::memory::{DebugRegion, SoftBodyRegion};
use crate::sync::{BufferProtocol, ProducerEnd};
use crate::topology::WeldedTopology;

/// Render side to simulation side.
#[derive(Debug)]
pub enum Command {
    /// One-time world construction.
    Init {
        /// World settings.
        world: WorldConfig,
        /// Producer end of the buffer channel.
        buffers: ProducerEnd,
        /// Rigid-body slot count.
        max_bodies: usize,
        /// Initial speed factor.
        simulation_speed: f32,
        /// Elapsed-time clamp per tick, in milliseconds.
        max_frame_delta_ms: f32,
    },

    /// Registers a rigid body.
    AddRigidBody {
        /// Caller-assigned identity.
        object: ObjectId,
        /// Initial world transform.
        transform: Mat4,
        /// Collision shape.
        shape: ShapeDescriptor,
        /// Body settings.
        config: BodyConfig,
    },
    /// Unregisters a rigid body; answered with [`Notification::BodyRemoved`]
    /// even for unknown identities.
    RemoveRigidBody {
        /// Identity to remove.
        object: ObjectId,
    },
    /// Patches body settings.
    UpdateRigidBody {
        /// Target.
        object: ObjectId,
        /// Fields to change.
        options: UpdateBodyOptions,
    },
    /// Teleports a body (kinematic bodies each frame).
    SetMotionState {
        /// Target.
        object: ObjectId,
        /// New world transform.
        transform: Mat4,
    },
    /// Overrides linear velocity.
    SetLinearVelocity {
        /// Target.
        object: ObjectId,
        /// New velocity.
        velocity: Vec3,
    },
    /// Instant velocity change.
    ApplyImpulse {
        /// Target.
        object: ObjectId,
        /// Impulse.
        impulse: Vec3,
        /// Application point relative to the center of mass.
        relative_position: Vec3,
    },
    /// Force accumulated until the next step.
    ApplyForce {
        /// Target.
        object: ObjectId,
        /// Force.
        force: Vec3,
        /// Application point relative to the center of mass.
        relative_position: Vec3,
    },
    /// Zeroes velocities and clears accumulated forces.
    ResetDynamicBody {
        /// Target.
        object: ObjectId,
    },
    /// Wakes a sleeping body.
    ActivateBody {
        /// Target.
        object: ObjectId,
    },
    /// Moves every collision shape of a body by a local offset.
    SetShapesOffset {
        /// Target.
        object: ObjectId,
        /// Local offset.
        offset: Vec3,
    },

    /// Registers a soft body whose region the render side already allocated
    /// and filled. The region moves into the buffer bundle.
    AddSoftBody {
        /// Caller-assigned identity.
        object: ObjectId,
        /// Region the simulation writes each tick.
        region: SoftBodyRegion,
        /// Soft-body settings.
        config: SoftBodyConfig,
        /// Welded topology with its scatter map; `None` for ropes, whose
        /// vertices are read from the region.
        topology: Option<WeldedTopology>,
    },
    /// Unregisters a soft body; answered with [`Notification::BodyRemoved`]
    /// once its region has left the bundle.
    RemoveSoftBody {
        /// Identity to remove.
        object: ObjectId,
    },

    /// Registers a constraint; `body_b` absent means single-body.
    AddConstraint {
        /// Caller-assigned identity.
        constraint: ConstraintId,
        /// First body.
        body_a: ObjectId,
        /// Optional second body.
        body_b: Option<ObjectId>,
        /// Constraint settings.
        config: ConstraintConfig,
    },
    /// Changes runtime constraint settings.
    UpdateConstraint {
        /// Target.
        constraint: ConstraintId,
        /// Fields to change.
        update: ConstraintUpdate,
    },
    /// Unregisters a constraint.
    RemoveConstraint {
        /// Target.
        constraint: ConstraintId,
    },

    /// Toggles debug drawing.
    EnableDebug {
        /// On or off.
        enabled: bool,
        /// Region to install in the bundle; required the first time.
        buffer: Option<DebugRegion>,
    },
    /// Changes the speed factor.
    SetSimulationSpeed {
        /// New factor; 1.0 is real time.
        speed: f32,
    },
    /// Ray query answered with [`Notification::RaycastResponse`].
    RaycastRequest {
        /// Correlation id.
        request: RequestId,
        /// Ray origin.
        origin: Vec3,
        /// Ray direction (need not be normalized).
        direction: Vec3,
        /// Query options.
        options: RaycastOptions,
    },

    /// Stops the worker.
    Shutdown,
}

impl Command {
    /// Short tag for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "INIT",
            Self::AddRigidBody { .. } => "ADD_RIGID_BODY",
            Self::RemoveRigidBody { .. } => "REMOVE_RIGID_BODY",
            Self::UpdateRigidBody { .. } => "UPDATE_RIGID_BODY",
            Self::SetMotionState { .. } => "SET_MOTION_STATE",
            Self::SetLinearVelocity { .. } => "SET_LINEAR_VELOCITY",
            Self::ApplyImpulse { .. } => "APPLY_IMPULSE",
            Self::ApplyForce { .. } => "APPLY_FORCE",
            Self::ResetDynamicBody { .. } => "RESET_DYNAMIC_BODY",
            Self::ActivateBody { .. } => "ACTIVATE_BODY",
            Self::SetShapesOffset { .. } => "SET_SHAPES_OFFSET",
            Self::AddSoftBody { .. } => "ADD_SOFT_BODY",
            Self::RemoveSoftBody { .. } => "REMOVE_SOFT_BODY",
            Self::AddConstraint { .. } => "ADD_CONSTRAINT",
            Self::UpdateConstraint { .. } => "UPDATE_CONSTRAINT",
            Self::RemoveConstraint { .. } => "REMOVE_CONSTRAINT",
            Self::EnableDebug { .. } => "ENABLE_DEBUG",
            Self::SetSimulationSpeed { .. } => "SET_SIMULATION_SPEED",
            Self::RaycastRequest { .. } => "RAYCAST_REQUEST",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

/// Simulation side to render side.
#[derive(Debug)]
pub enum Notification {
    /// INIT accepted; the tick loop is armed.
    Ready {
        /// Protocol the producer end runs.
        protocol: BufferProtocol,
    },
    /// A rigid body owns `slot`.
    RigidBodyReady {
        /// Registered identity.
        object: ObjectId,
        /// Slot in the rigid-body region.
        slot: usize,
    },
    /// A soft body's region is in the bundle and being written.
    SoftBodyReady {
        /// Registered identity.
        object: ObjectId,
        /// Layout of the region, for sizing read buffers.
        layout: SoftBodyLayout,
    },
    /// A removal went through; the identity may be registered again.
    BodyRemoved {
        /// Removed identity.
        object: ObjectId,
    },
    /// Registration failed on the simulation side.
    RegistrationFailed {
        /// Identity that was not added.
        object: ObjectId,
        /// Why.
        reason: String,
    },
    /// Ray query result.
    RaycastResponse {
        /// Correlation id of the request.
        request: RequestId,
        /// Hits, nearest first.
        hits: Vec<RaycastHitMessage>,
    },
    /// The simulation stopped for good.
    SimulationFault {
        /// Engine error text.
        reason: String,
    },
}
