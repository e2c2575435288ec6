//! Payload types carried by commands and notifications.
//!
//! Every variant-dependent configuration is a tagged enum carrying exactly
//! the fields valid for that tag.

use crate::constants::{
    DEFAULT_EPSILON, DEFAULT_MAX_SUB_STEPS, DEFAULT_SOLVER_ITERATIONS, DEFAULT_TIMESTEP,
};
use crate::math::{Mat4, Quaternion, Vec3};
use serde::{Deserialize, Serialize};

/// Caller-assigned identity of a simulated object.
///
/// The only stable cross-thread reference to an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Caller-assigned identity of a constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstraintId(pub u64);

/// Correlation id of an out-of-band request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

// ============================================================================
// WORLD
// ============================================================================

/// World configuration carried by INIT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Gravity acceleration.
    pub gravity: Vec3,
    /// Fixed substep length in seconds; also the tick interval.
    pub fixed_time_step: f32,
    /// Maximum fixed substeps per tick.
    pub max_sub_steps: u32,
    /// Constraint solver iterations.
    pub solver_iterations: u32,
    /// Contact epsilon.
    pub epsilon: f32,
    /// Debug-draw bitmask handed to the engine's debug drawer.
    pub debug_draw_mode: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.8, 0.0),
            fixed_time_step: DEFAULT_TIMESTEP,
            max_sub_steps: DEFAULT_MAX_SUB_STEPS,
            solver_iterations: DEFAULT_SOLVER_ITERATIONS,
            epsilon: DEFAULT_EPSILON,
            debug_draw_mode: 1,
        }
    }
}

// ============================================================================
// RIGID BODIES
// ============================================================================

/// How a rigid body's transform is driven.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyType {
    /// Driven by the simulation; the render side follows it.
    #[default]
    Dynamic,
    /// Driven by the caller; the simulation follows it.
    Kinematic,
    /// Never moves.
    Static,
}

impl BodyType {
    /// Whether the render side must pull this body's transform from the region.
    #[must_use]
    pub const fn is_simulation_driven(self) -> bool {
        matches!(self, Self::Dynamic)
    }
}

/// Sleep/activation state requested for a body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    /// Awake, may fall asleep.
    #[default]
    Active,
    /// Asleep.
    Sleeping,
    /// Never sleeps.
    DisableDeactivation,
    /// Excluded from simulation.
    DisableSimulation,
}

/// Rigid-body settings fixed at registration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyConfig {
    /// Body type tag.
    pub body_type: BodyType,
    /// Mass in kg; ignored for kinematic and static bodies.
    pub mass: f32,
    /// Per-body gravity override.
    pub gravity: Option<Vec3>,
    /// Linear damping per second (0..1).
    pub linear_damping: f32,
    /// Angular damping per second (0..1).
    pub angular_damping: f32,
    /// Friction coefficient.
    pub friction: f32,
    /// Restitution coefficient.
    pub restitution: f32,
    /// Collision group bits.
    pub collision_group: u32,
    /// Collision mask bits.
    pub collision_mask: u32,
    /// Skip collision response entirely.
    pub disable_collision: bool,
    /// Initial activation state.
    pub activation_state: ActivationState,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            mass: 1.0,
            gravity: None,
            linear_damping: 0.01,
            angular_damping: 0.01,
            friction: 0.5,
            restitution: 0.0,
            collision_group: 1,
            collision_mask: u32::MAX,
            disable_collision: false,
            activation_state: ActivationState::Active,
        }
    }
}

/// Partial update for a registered body; `None` leaves a field unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateBodyOptions {
    /// New body type.
    pub body_type: Option<BodyType>,
    /// New mass.
    pub mass: Option<f32>,
    /// New gravity override.
    pub gravity: Option<Vec3>,
    /// New linear damping.
    pub linear_damping: Option<f32>,
    /// New angular damping.
    pub angular_damping: Option<f32>,
    /// New friction.
    pub friction: Option<f32>,
    /// New restitution.
    pub restitution: Option<f32>,
    /// New collision group.
    pub collision_group: Option<u32>,
    /// New collision mask.
    pub collision_mask: Option<u32>,
    /// New activation state.
    pub activation_state: Option<ActivationState>,
}

/// Collision shape variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeKind {
    /// Axis-aligned box.
    Box {
        /// Half extents.
        half_extents: Vec3,
    },
    /// Sphere.
    Sphere {
        /// Radius.
        radius: f32,
    },
    /// Y-aligned cylinder.
    Cylinder {
        /// Radius.
        radius: f32,
        /// Half height.
        half_height: f32,
    },
    /// Y-aligned capsule.
    Capsule {
        /// Radius.
        radius: f32,
        /// Half height of the cylindrical part.
        half_height: f32,
    },
    /// Y-aligned cone.
    Cone {
        /// Base radius.
        radius: f32,
        /// Height.
        height: f32,
    },
    /// Convex hull of points.
    Hull {
        /// Hull points in body space.
        points: Vec<Vec3>,
    },
    /// Static triangle mesh.
    Mesh {
        /// Flat xyz positions.
        vertices: Vec<f32>,
        /// Triangle indices.
        indices: Vec<u32>,
    },
    /// Several child shapes.
    Compound {
        /// Children with their own offsets.
        children: Vec<ShapeDescriptor>,
    },
}

impl ShapeKind {
    /// Radius of a sphere around the body origin that encloses the shape.
    #[must_use]
    pub fn bounding_radius(&self) -> f32 {
        match self {
            Self::Box { half_extents } => half_extents.length(),
            Self::Sphere { radius } => *radius,
            Self::Cylinder { radius, half_height } => Vec3::new(*radius, *half_height, 0.0).length(),
            Self::Capsule { radius, half_height } => *half_height + *radius,
            Self::Cone { radius, height } => Vec3::new(*radius, *height, 0.0).length(),
            Self::Hull { points } => points.iter().map(|p| p.length()).fold(0.0, f32::max),
            Self::Mesh { vertices, .. } => vertices
                .chunks_exact(3)
                .map(|v| Vec3::new(v[0], v[1], v[2]).length())
                .fold(0.0, f32::max),
            Self::Compound { children } => children
                .iter()
                .map(|c| c.offset.length() + c.kind.bounding_radius())
                .fold(0.0, f32::max),
        }
    }
}

/// Shape plus its placement relative to the body origin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapeDescriptor {
    /// Shape variant.
    pub kind: ShapeKind,
    /// Collision margin.
    pub margin: f32,
    /// Local offset.
    pub offset: Vec3,
    /// Local orientation.
    pub orientation: Quaternion,
}

impl ShapeDescriptor {
    /// Shape with no offset and the default margin.
    #[must_use]
    pub fn new(kind: ShapeKind) -> Self {
        Self {
            kind,
            margin: 0.01,
            offset: Vec3::ZERO,
            orientation: Quaternion::IDENTITY,
        }
    }

    /// Sphere shortcut.
    #[must_use]
    pub fn sphere(radius: f32) -> Self {
        Self::new(ShapeKind::Sphere { radius })
    }

    /// Box shortcut.
    #[must_use]
    pub fn cuboid(half_extents: Vec3) -> Self {
        Self::new(ShapeKind::Box { half_extents })
    }
}

// ============================================================================
// SOFT BODIES
// ============================================================================

/// Soft body variant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftBodyKind {
    /// Triangle mesh (cloth, volumes); welded before simulation.
    #[default]
    Trimesh,
    /// Line/rope; 1:1 vertex correspondence, never welded.
    Rope,
}

/// Pin for a soft-body node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SoftBodyAnchor {
    /// Fixed in world space at its baked position.
    World {
        /// Physics node index.
        node_index: u32,
    },
    /// Attached to a rigid body.
    RigidBody {
        /// Physics node index.
        node_index: u32,
        /// Body the node follows.
        body: ObjectId,
        /// Offset in the body's local frame.
        local_offset: Vec3,
        /// Ignore collisions between the node and the body.
        disable_collision_between_linked_bodies: bool,
        /// Attachment influence (0..1).
        influence: f32,
    },
}

impl SoftBodyAnchor {
    /// Pinned physics node.
    #[must_use]
    pub const fn node_index(&self) -> u32 {
        match self {
            Self::World { node_index } | Self::RigidBody { node_index, .. } => *node_index,
        }
    }
}

/// Soft-body settings fixed at registration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftBodyConfig {
    /// Variant tag.
    pub kind: SoftBodyKind,
    /// Total mass spread over the nodes.
    pub mass: f32,
    /// Collision margin.
    pub margin: f32,
    /// Internal pressure (volumes).
    pub pressure: f32,
    /// Linear stiffness (0..1).
    pub linear_stiffness: f32,
    /// Damping (0..1).
    pub damping: f32,
    /// Position solver iterations.
    pub position_iterations: u32,
    /// Velocity solver iterations.
    pub velocity_iterations: u32,
    /// Node pins.
    pub anchors: Vec<SoftBodyAnchor>,
}

impl Default for SoftBodyConfig {
    fn default() -> Self {
        Self {
            kind: SoftBodyKind::Trimesh,
            mass: 1.0,
            margin: 0.05,
            pressure: 0.0,
            linear_stiffness: 0.9,
            damping: 0.0,
            position_iterations: 10,
            velocity_iterations: 0,
            anchors: Vec::new(),
        }
    }
}

// ============================================================================
// CONSTRAINTS
// ============================================================================

/// Constraint variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Locks all relative motion.
    Lock,
    /// Fixed relative frame.
    Fixed,
    /// Spring on all linear axes.
    Spring {
        /// Spring stiffness.
        stiffness: f32,
        /// Spring damping.
        damping: f32,
    },
    /// Slides along the frames' X axis.
    Slider {
        /// Lower linear limit.
        lower_limit: f32,
        /// Upper linear limit.
        upper_limit: f32,
    },
    /// Rotates around an axis.
    Hinge {
        /// Pivot in body A space.
        pivot: Vec3,
        /// Axis in body A space.
        axis: Vec3,
        /// Pivot in body B space.
        pivot_b: Vec3,
        /// Axis in body B space.
        axis_b: Vec3,
    },
    /// Cone + twist limits.
    ConeTwist {
        /// Swing limit around Y.
        swing_span1: f32,
        /// Swing limit around Z.
        swing_span2: f32,
        /// Twist limit.
        twist_span: f32,
    },
    /// Ball joint.
    PointToPoint {
        /// Pivot in body A space.
        pivot: Vec3,
        /// Pivot in body B space (or world space for single-body).
        pivot_b: Vec3,
    },
    /// Six degrees of freedom with limits.
    Generic6Dof {
        /// Lower linear limits.
        linear_lower_limit: Vec3,
        /// Upper linear limits.
        linear_upper_limit: Vec3,
        /// Lower angular limits.
        angular_lower_limit: Vec3,
        /// Upper angular limits.
        angular_upper_limit: Vec3,
    },
}

/// Constraint settings fixed at registration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstraintConfig {
    /// Variant.
    pub kind: ConstraintKind,
    /// Frame in body A space.
    pub frame_a: Mat4,
    /// Frame in body B space (world space for single-body).
    pub frame_b: Mat4,
    /// Skip collisions between the linked bodies.
    pub disable_collisions_between_linked_bodies: bool,
    /// Impulse above which the constraint breaks.
    pub breaking_threshold: Option<f32>,
}

impl ConstraintConfig {
    /// Config with identity frames.
    #[must_use]
    pub fn new(kind: ConstraintKind) -> Self {
        Self {
            kind,
            frame_a: Mat4::IDENTITY,
            frame_b: Mat4::IDENTITY,
            disable_collisions_between_linked_bodies: true,
            breaking_threshold: None,
        }
    }
}

/// Runtime-adjustable constraint settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintUpdate {
    /// Enable or disable.
    pub enabled: Option<bool>,
    /// Motor target velocity.
    pub motor_target_velocity: Option<f32>,
    /// Motor impulse cap.
    pub max_motor_impulse: Option<f32>,
    /// New breaking threshold.
    pub breaking_threshold: Option<f32>,
}

// ============================================================================
// QUERIES
// ============================================================================

/// Which hits a ray query reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaycastMode {
    /// Nearest hit only.
    #[default]
    Closest,
    /// Every hit, nearest first.
    All,
    /// First hit found, any order.
    Any,
}

/// Ray query options.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaycastOptions {
    /// Ray length.
    pub max_distance: f32,
    /// Hit selection.
    pub mode: RaycastMode,
    /// Group bits of the ray.
    pub collision_group: u32,
    /// Mask of groups the ray hits.
    pub collision_mask: u32,
}

impl Default for RaycastOptions {
    fn default() -> Self {
        Self {
            max_distance: 1000.0,
            mode: RaycastMode::Closest,
            collision_group: u32::MAX,
            collision_mask: u32::MAX,
        }
    }
}

/// One ray hit as posted by the simulation side.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaycastHitMessage {
    /// Object that was hit.
    pub object: ObjectId,
    /// World-space hit point.
    pub position: Vec3,
    /// World-space surface normal.
    pub normal: Vec3,
}
