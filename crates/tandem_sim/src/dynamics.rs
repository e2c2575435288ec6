//! # Dynamics Capability
//!
//! The driver never touches a concrete engine. It steps and mutates the
//! world only through [`DynamicsWorld`], and builds it through a
//! [`WorldFactory`] when INIT arrives.

use tandem_shared::{
    BodyConfig, ConstraintConfig, ConstraintId, ConstraintUpdate, Mat4, ObjectId,
    RaycastHitMessage, RaycastOptions, ShapeDescriptor, SoftBodyConfig, UpdateBodyOptions, Vec3,
    WorldConfig,
};

use crate::error::DynamicsResult;

/// Builds the world once INIT arrives.
pub type WorldFactory =
    Box<dyn FnOnce(&WorldConfig) -> DynamicsResult<Box<dyn DynamicsWorld>> + Send>;

/// Operations the simulation driver needs from an engine.
///
/// Mutators on unknown identities return
/// [`DynamicsError::UnknownObject`](crate::DynamicsError::UnknownObject);
/// removals return whether anything was removed.
pub trait DynamicsWorld: Send {
    /// Advances by `dt` seconds and returns the fixed substeps taken.
    ///
    /// # Errors
    ///
    /// Any error is unrecoverable and faults the driver.
    fn step(&mut self, dt: f32) -> DynamicsResult<u32>;

    // ---- rigid bodies -----------------------------------------------------

    /// Creates a rigid body.
    ///
    /// # Errors
    ///
    /// Duplicate identity or a shape the engine cannot build.
    fn add_rigid_body(
        &mut self,
        object: ObjectId,
        transform: &Mat4,
        shape: &ShapeDescriptor,
        config: &BodyConfig,
    ) -> DynamicsResult<()>;

    /// Destroys a rigid body.
    fn remove_rigid_body(&mut self, object: ObjectId) -> bool;

    /// Applies an options patch.
    ///
    /// # Errors
    ///
    /// Unknown identity.
    fn update_rigid_body(&mut self, object: ObjectId, options: &UpdateBodyOptions)
        -> DynamicsResult<()>;

    /// Current world transform.
    fn rigid_body_transform(&self, object: ObjectId) -> Option<Mat4>;

    /// Teleports a body.
    ///
    /// # Errors
    ///
    /// Unknown identity.
    fn set_motion_state(&mut self, object: ObjectId, transform: &Mat4) -> DynamicsResult<()>;

    /// Overrides linear velocity.
    ///
    /// # Errors
    ///
    /// Unknown identity.
    fn set_linear_velocity(&mut self, object: ObjectId, velocity: Vec3) -> DynamicsResult<()>;

    /// Applies an impulse at `relative_position`.
    ///
    /// # Errors
    ///
    /// Unknown identity.
    fn apply_impulse(
        &mut self,
        object: ObjectId,
        impulse: Vec3,
        relative_position: Vec3,
    ) -> DynamicsResult<()>;

    /// Accumulates a force at `relative_position` until the next step.
    ///
    /// # Errors
    ///
    /// Unknown identity.
    fn apply_force(
        &mut self,
        object: ObjectId,
        force: Vec3,
        relative_position: Vec3,
    ) -> DynamicsResult<()>;

    /// Zeroes velocities and clears forces.
    ///
    /// # Errors
    ///
    /// Unknown identity.
    fn reset_dynamic_body(&mut self, object: ObjectId) -> DynamicsResult<()>;

    /// Wakes a body.
    ///
    /// # Errors
    ///
    /// Unknown identity.
    fn activate_body(&mut self, object: ObjectId) -> DynamicsResult<()>;

    /// Moves every collision shape by a local offset.
    ///
    /// # Errors
    ///
    /// Unknown identity.
    fn set_shapes_offset(&mut self, object: ObjectId, offset: Vec3) -> DynamicsResult<()>;

    // ---- soft bodies ------------------------------------------------------

    /// Creates a soft body from physics vertices (xyz) and triangle indices
    /// (empty for ropes). Anchors in `config` reference live bodies only.
    ///
    /// # Errors
    ///
    /// Duplicate identity or unusable topology.
    fn add_soft_body(
        &mut self,
        object: ObjectId,
        vertices: &[f32],
        indices: &[u32],
        config: &SoftBodyConfig,
    ) -> DynamicsResult<()>;

    /// Destroys a soft body.
    fn remove_soft_body(&mut self, object: ObjectId) -> bool;

    /// Copies node positions, and normals when requested, out of the world.
    /// Returns `false` for unknown identities.
    fn read_soft_body(
        &self,
        object: ObjectId,
        positions: &mut [f32],
        normals: Option<&mut [f32]>,
    ) -> bool;

    // ---- constraints ------------------------------------------------------

    /// Creates a constraint; `body_b` absent means single-body.
    ///
    /// # Errors
    ///
    /// Unknown bodies or duplicate identity.
    fn add_constraint(
        &mut self,
        constraint: ConstraintId,
        body_a: ObjectId,
        body_b: Option<ObjectId>,
        config: &ConstraintConfig,
    ) -> DynamicsResult<()>;

    /// Changes runtime settings.
    ///
    /// # Errors
    ///
    /// Unknown constraint.
    fn update_constraint(
        &mut self,
        constraint: ConstraintId,
        update: &ConstraintUpdate,
    ) -> DynamicsResult<()>;

    /// Destroys a constraint.
    fn remove_constraint(&mut self, constraint: ConstraintId) -> bool;

    // ---- queries ----------------------------------------------------------

    /// Casts a ray against the current state.
    fn ray_test(&self, origin: Vec3, direction: Vec3, options: &RaycastOptions)
        -> Vec<RaycastHitMessage>;

    /// Emits debug line vertices as `(position, color)` pairs until `sink`
    /// returns `false`.
    fn debug_draw(&self, sink: &mut dyn FnMut(Vec3, Vec3) -> bool);
}
