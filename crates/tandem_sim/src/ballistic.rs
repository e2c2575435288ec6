//! # Ballistic World
//!
//! Reference [`DynamicsWorld`]: semi-implicit Euler under gravity, damping,
//! forces and impulses. No collision response and no constraint solving;
//! it exists to drive demos and tests, not to be physically correct.
//!
//! Stepping follows the fixed-substep scheme of the usual engines:
//!
//! ```text
//! local_time += dt
//! n          = floor(local_time / fixed)
//! local_time -= n * fixed            (excess beyond max_sub_steps is dropped)
//! run min(n, max_sub_steps) substeps of `fixed`
//! ```
//!
//! With `max_sub_steps == 0` it takes one variable step of `dt` instead.

use std::collections::{BTreeMap, HashMap};

use tandem_shared::{
    ActivationState, BodyConfig, BodyType, ConstraintConfig, ConstraintId, ConstraintUpdate, Mat4,
    ObjectId, Quaternion, RaycastHitMessage, RaycastMode, RaycastOptions, ShapeDescriptor,
    SoftBodyAnchor, SoftBodyConfig, SoftBodyKind, UpdateBodyOptions, Vec3, WorldConfig,
};

use crate::dynamics::{DynamicsWorld, WorldFactory};
use crate::error::{DynamicsError, DynamicsResult};

const AXIS_COLORS: [Vec3; 3] = [
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
];
const SOFT_BODY_COLOR: Vec3 = Vec3::new(1.0, 1.0, 1.0);

#[derive(Debug)]
struct Body {
    body_type: BodyType,
    position: Vec3,
    rotation: Quaternion,
    scale: Vec3,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    force: Vec3,
    torque: Vec3,
    mass: f32,
    gravity: Option<Vec3>,
    linear_damping: f32,
    angular_damping: f32,
    collision_group: u32,
    collision_mask: u32,
    disable_collision: bool,
    activation: ActivationState,
    shape: ShapeDescriptor,
    shapes_offset: Vec3,
}

impl Body {
    fn new(transform: &Mat4, shape: &ShapeDescriptor, config: &BodyConfig) -> Self {
        let (position, rotation, scale) = transform.decompose();
        Self {
            body_type: config.body_type,
            position,
            rotation,
            scale,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            mass: config.mass,
            gravity: config.gravity,
            linear_damping: config.linear_damping,
            angular_damping: config.angular_damping,
            collision_group: config.collision_group,
            collision_mask: config.collision_mask,
            disable_collision: config.disable_collision,
            activation: config.activation_state,
            shape: shape.clone(),
            shapes_offset: Vec3::ZERO,
        }
    }

    fn inverse_mass(&self) -> f32 {
        if self.body_type == BodyType::Dynamic && self.mass > 0.0 {
            1.0 / self.mass
        } else {
            0.0
        }
    }

    fn is_integrated(&self) -> bool {
        self.body_type == BodyType::Dynamic
            && !matches!(
                self.activation,
                ActivationState::Sleeping | ActivationState::DisableSimulation
            )
    }

    fn transform(&self) -> Mat4 {
        Mat4::compose(self.position, self.rotation, self.scale)
    }

    fn bounding_sphere(&self) -> (Vec3, f32) {
        let center = self
            .transform()
            .transform_point(self.shape.offset + self.shapes_offset);
        let s = self.scale.x.abs().max(self.scale.y.abs()).max(self.scale.z.abs());
        (center, self.shape.kind.bounding_radius() * s + self.shape.margin)
    }

    fn integrate(&mut self, gravity: Vec3, h: f32) {
        let inv_mass = self.inverse_mass();
        let g = self.gravity.unwrap_or(gravity);
        self.linear_velocity += (g + self.force * inv_mass) * h;
        self.linear_velocity = self.linear_velocity * damping_factor(self.linear_damping, h);
        self.position += self.linear_velocity * h;

        self.angular_velocity += self.torque * (inv_mass * h);
        self.angular_velocity = self.angular_velocity * damping_factor(self.angular_damping, h);
        self.rotation = self.rotation.integrate(self.angular_velocity, h);
    }

    fn is_finite(&self) -> bool {
        [self.position, self.linear_velocity, self.angular_velocity]
            .iter()
            .all(|v| v.x.is_finite() && v.y.is_finite() && v.z.is_finite())
    }
}

fn damping_factor(damping: f32, h: f32) -> f32 {
    (1.0 - damping.clamp(0.0, 1.0)).powf(h)
}

#[derive(Clone, Copy, Debug)]
enum Pin {
    World,
    Body { body: ObjectId, local: Vec3 },
}

#[derive(Debug)]
struct SoftBody {
    kind: SoftBodyKind,
    positions: Vec<Vec3>,
    velocities: Vec<Vec3>,
    normals: Vec<Vec3>,
    indices: Vec<u32>,
    pins: Vec<Option<Pin>>,
    damping: f32,
}

impl SoftBody {
    fn recompute_normals(&mut self) {
        if self.kind != SoftBodyKind::Trimesh {
            return;
        }
        self.normals.iter_mut().for_each(|n| *n = Vec3::ZERO);
        for tri in self.indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let face = (self.positions[b] - self.positions[a])
                .cross(self.positions[c] - self.positions[a]);
            self.normals[a] += face;
            self.normals[b] += face;
            self.normals[c] += face;
        }
        self.normals
            .iter_mut()
            .for_each(|n| *n = n.normalize_or_zero());
    }
}

#[derive(Debug)]
struct Constraint {
    body_a: ObjectId,
    body_b: Option<ObjectId>,
    enabled: bool,
    motor_target_velocity: f32,
    max_motor_impulse: f32,
    breaking_threshold: Option<f32>,
}

/// Deterministic reference world.
#[derive(Debug)]
pub struct BallisticWorld {
    config: WorldConfig,
    local_time: f32,
    bodies: BTreeMap<ObjectId, Body>,
    soft_bodies: BTreeMap<ObjectId, SoftBody>,
    constraints: HashMap<ConstraintId, Constraint>,
}

impl BallisticWorld {
    /// Empty world.
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        Self {
            config,
            local_time: 0.0,
            bodies: BTreeMap::new(),
            soft_bodies: BTreeMap::new(),
            constraints: HashMap::new(),
        }
    }

    /// Factory for the simulation driver.
    #[must_use]
    pub fn factory() -> WorldFactory {
        Box::new(|config: &WorldConfig| -> DynamicsResult<Box<dyn DynamicsWorld>> {
            if !(config.fixed_time_step > 0.0 && config.fixed_time_step.is_finite()) {
                return Err(DynamicsError::Engine(format!(
                    "fixed time step must be positive, got {}",
                    config.fixed_time_step
                )));
            }
            Ok(Box::new(Self::new(config.clone())))
        })
    }

    /// Number of rigid bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of soft bodies.
    #[must_use]
    pub fn soft_body_count(&self) -> usize {
        self.soft_bodies.len()
    }

    /// Number of constraints.
    #[must_use]
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Linear velocity of a rigid body.
    #[must_use]
    pub fn linear_velocity(&self, object: ObjectId) -> Option<Vec3> {
        self.bodies.get(&object).map(|b| b.linear_velocity)
    }

    /// Whether a constraint is enabled.
    #[must_use]
    pub fn constraint_enabled(&self, constraint: ConstraintId) -> Option<bool> {
        self.constraints.get(&constraint).map(|c| c.enabled)
    }

    fn body_mut(&mut self, object: ObjectId) -> DynamicsResult<&mut Body> {
        self.bodies
            .get_mut(&object)
            .ok_or(DynamicsError::UnknownObject(object))
    }

    fn substep(&mut self, h: f32) {
        let gravity = self.config.gravity;
        for body in self.bodies.values_mut().filter(|b| b.is_integrated()) {
            body.integrate(gravity, h);
        }

        for soft in self.soft_bodies.values_mut() {
            let keep = damping_factor(soft.damping, h);
            for i in 0..soft.positions.len() {
                match soft.pins[i] {
                    Some(Pin::World) => {}
                    Some(Pin::Body { body, local }) => {
                        if let Some(b) = self.bodies.get(&body) {
                            soft.positions[i] = b.transform().transform_point(local);
                            soft.velocities[i] = b.linear_velocity;
                        }
                    }
                    None => {
                        soft.velocities[i] += gravity * h;
                        soft.velocities[i] = soft.velocities[i] * keep;
                        soft.positions[i] += soft.velocities[i] * h;
                    }
                }
            }
            soft.recompute_normals();
        }
    }

    fn check_finite(&self) -> DynamicsResult<()> {
        if let Some((id, _)) = self.bodies.iter().find(|(_, b)| !b.is_finite()) {
            return Err(DynamicsError::Diverged(format!("{id} left finite range")));
        }
        for (id, soft) in &self.soft_bodies {
            if soft
                .positions
                .iter()
                .any(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
            {
                return Err(DynamicsError::Diverged(format!("{id} left finite range")));
            }
        }
        Ok(())
    }
}

impl DynamicsWorld for BallisticWorld {
    fn step(&mut self, dt: f32) -> DynamicsResult<u32> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(DynamicsError::Engine(format!("invalid step {dt}")));
        }

        let substeps = if self.config.max_sub_steps == 0 {
            if dt > 0.0 {
                self.substep(dt);
                1
            } else {
                0
            }
        } else {
            let fixed = self.config.fixed_time_step;
            self.local_time += dt;
            let due = (self.local_time / fixed).floor();
            self.local_time -= due * fixed;
            let clamped = (due as u32).min(self.config.max_sub_steps);
            for _ in 0..clamped {
                self.substep(fixed);
            }
            clamped
        };

        for body in self.bodies.values_mut() {
            body.force = Vec3::ZERO;
            body.torque = Vec3::ZERO;
        }
        self.check_finite()?;
        Ok(substeps)
    }

    fn add_rigid_body(
        &mut self,
        object: ObjectId,
        transform: &Mat4,
        shape: &ShapeDescriptor,
        config: &BodyConfig,
    ) -> DynamicsResult<()> {
        if self.bodies.contains_key(&object) || self.soft_bodies.contains_key(&object) {
            return Err(DynamicsError::AlreadyRegistered(object));
        }
        let radius = shape.kind.bounding_radius();
        if !radius.is_finite() || radius < 0.0 {
            return Err(DynamicsError::InvalidShape(format!(
                "bounding radius {radius} for {object}"
            )));
        }
        self.bodies
            .insert(object, Body::new(transform, shape, config));
        Ok(())
    }

    fn remove_rigid_body(&mut self, object: ObjectId) -> bool {
        if self.bodies.remove(&object).is_none() {
            return false;
        }
        // nodes pinned to the body stay where they are
        for soft in self.soft_bodies.values_mut() {
            for pin in &mut soft.pins {
                if matches!(pin, Some(Pin::Body { body, .. }) if *body == object) {
                    *pin = Some(Pin::World);
                }
            }
        }
        self.constraints
            .retain(|_, c| c.body_a != object && c.body_b != Some(object));
        true
    }

    fn update_rigid_body(
        &mut self,
        object: ObjectId,
        options: &UpdateBodyOptions,
    ) -> DynamicsResult<()> {
        let body = self.body_mut(object)?;
        if let Some(v) = options.body_type {
            body.body_type = v;
        }
        if let Some(v) = options.mass {
            body.mass = v;
        }
        if let Some(v) = options.gravity {
            body.gravity = Some(v);
        }
        if let Some(v) = options.linear_damping {
            body.linear_damping = v;
        }
        if let Some(v) = options.angular_damping {
            body.angular_damping = v;
        }
        if let Some(v) = options.collision_group {
            body.collision_group = v;
        }
        if let Some(v) = options.collision_mask {
            body.collision_mask = v;
        }
        if let Some(v) = options.activation_state {
            body.activation = v;
        }
        // friction and restitution only matter to a contact solver
        Ok(())
    }

    fn rigid_body_transform(&self, object: ObjectId) -> Option<Mat4> {
        self.bodies.get(&object).map(Body::transform)
    }

    fn set_motion_state(&mut self, object: ObjectId, transform: &Mat4) -> DynamicsResult<()> {
        let body = self.body_mut(object)?;
        let (position, rotation, scale) = transform.decompose();
        body.position = position;
        body.rotation = rotation;
        body.scale = scale;
        Ok(())
    }

    fn set_linear_velocity(&mut self, object: ObjectId, velocity: Vec3) -> DynamicsResult<()> {
        self.body_mut(object)?.linear_velocity = velocity;
        Ok(())
    }

    fn apply_impulse(
        &mut self,
        object: ObjectId,
        impulse: Vec3,
        relative_position: Vec3,
    ) -> DynamicsResult<()> {
        let body = self.body_mut(object)?;
        let inv_mass = body.inverse_mass();
        body.linear_velocity += impulse * inv_mass;
        body.angular_velocity += relative_position.cross(impulse) * inv_mass;
        if body.activation == ActivationState::Sleeping {
            body.activation = ActivationState::Active;
        }
        Ok(())
    }

    fn apply_force(
        &mut self,
        object: ObjectId,
        force: Vec3,
        relative_position: Vec3,
    ) -> DynamicsResult<()> {
        let body = self.body_mut(object)?;
        body.force += force;
        body.torque += relative_position.cross(force);
        Ok(())
    }

    fn reset_dynamic_body(&mut self, object: ObjectId) -> DynamicsResult<()> {
        let body = self.body_mut(object)?;
        body.linear_velocity = Vec3::ZERO;
        body.angular_velocity = Vec3::ZERO;
        body.force = Vec3::ZERO;
        body.torque = Vec3::ZERO;
        Ok(())
    }

    fn activate_body(&mut self, object: ObjectId) -> DynamicsResult<()> {
        let body = self.body_mut(object)?;
        if body.activation == ActivationState::Sleeping {
            body.activation = ActivationState::Active;
        }
        Ok(())
    }

    fn set_shapes_offset(&mut self, object: ObjectId, offset: Vec3) -> DynamicsResult<()> {
        self.body_mut(object)?.shapes_offset = offset;
        Ok(())
    }

    fn add_soft_body(
        &mut self,
        object: ObjectId,
        vertices: &[f32],
        indices: &[u32],
        config: &SoftBodyConfig,
    ) -> DynamicsResult<()> {
        if self.bodies.contains_key(&object) || self.soft_bodies.contains_key(&object) {
            return Err(DynamicsError::AlreadyRegistered(object));
        }
        if vertices.is_empty() || vertices.len() % 3 != 0 {
            return Err(DynamicsError::InvalidSoftBody(format!(
                "{} position floats",
                vertices.len()
            )));
        }
        let count = vertices.len() / 3;
        if config.kind == SoftBodyKind::Trimesh && (indices.is_empty() || indices.len() % 3 != 0)
        {
            return Err(DynamicsError::InvalidSoftBody(format!(
                "{} triangle indices",
                indices.len()
            )));
        }
        if let Some(&i) = indices.iter().find(|&&i| i as usize >= count) {
            return Err(DynamicsError::InvalidSoftBody(format!(
                "index {i} past {count} nodes"
            )));
        }

        let mut pins = vec![None; count];
        for anchor in &config.anchors {
            let node = anchor.node_index() as usize;
            if node >= count {
                return Err(DynamicsError::InvalidSoftBody(format!(
                    "anchor on node {node} past {count} nodes"
                )));
            }
            pins[node] = match anchor {
                SoftBodyAnchor::World { .. } => Some(Pin::World),
                SoftBodyAnchor::RigidBody {
                    body, local_offset, ..
                } => {
                    if !self.bodies.contains_key(body) {
                        return Err(DynamicsError::UnknownObject(*body));
                    }
                    Some(Pin::Body {
                        body: *body,
                        local: *local_offset,
                    })
                }
            };
        }

        let mut soft = SoftBody {
            kind: config.kind,
            positions: vertices
                .chunks_exact(3)
                .map(|v| Vec3::new(v[0], v[1], v[2]))
                .collect(),
            velocities: vec![Vec3::ZERO; count],
            normals: vec![Vec3::ZERO; count],
            indices: indices.to_vec(),
            pins,
            damping: config.damping,
        };
        soft.recompute_normals();
        self.soft_bodies.insert(object, soft);
        Ok(())
    }

    fn remove_soft_body(&mut self, object: ObjectId) -> bool {
        self.soft_bodies.remove(&object).is_some()
    }

    fn read_soft_body(
        &self,
        object: ObjectId,
        positions: &mut [f32],
        normals: Option<&mut [f32]>,
    ) -> bool {
        let Some(soft) = self.soft_bodies.get(&object) else {
            return false;
        };
        for (dst, p) in positions.chunks_exact_mut(3).zip(&soft.positions) {
            dst.copy_from_slice(&p.to_array());
        }
        if let Some(normals) = normals {
            for (dst, n) in normals.chunks_exact_mut(3).zip(&soft.normals) {
                dst.copy_from_slice(&n.to_array());
            }
        }
        true
    }

    fn add_constraint(
        &mut self,
        constraint: ConstraintId,
        body_a: ObjectId,
        body_b: Option<ObjectId>,
        config: &ConstraintConfig,
    ) -> DynamicsResult<()> {
        if self.constraints.contains_key(&constraint) {
            return Err(DynamicsError::Engine(format!(
                "constraint {constraint:?} already exists"
            )));
        }
        for body in std::iter::once(body_a).chain(body_b) {
            if !self.bodies.contains_key(&body) {
                return Err(DynamicsError::UnknownObject(body));
            }
        }
        self.constraints.insert(
            constraint,
            Constraint {
                body_a,
                body_b,
                enabled: true,
                motor_target_velocity: 0.0,
                max_motor_impulse: 0.0,
                breaking_threshold: config.breaking_threshold,
            },
        );
        Ok(())
    }

    fn update_constraint(
        &mut self,
        constraint: ConstraintId,
        update: &ConstraintUpdate,
    ) -> DynamicsResult<()> {
        let c = self
            .constraints
            .get_mut(&constraint)
            .ok_or(DynamicsError::UnknownConstraint(constraint))?;
        if let Some(v) = update.enabled {
            c.enabled = v;
        }
        if let Some(v) = update.motor_target_velocity {
            c.motor_target_velocity = v;
        }
        if let Some(v) = update.max_motor_impulse {
            c.max_motor_impulse = v;
        }
        if let Some(v) = update.breaking_threshold {
            c.breaking_threshold = Some(v);
        }
        Ok(())
    }

    fn remove_constraint(&mut self, constraint: ConstraintId) -> bool {
        self.constraints.remove(&constraint).is_some()
    }

    fn ray_test(
        &self,
        origin: Vec3,
        direction: Vec3,
        options: &RaycastOptions,
    ) -> Vec<RaycastHitMessage> {
        let dir = direction.normalize_or_zero();
        if dir == Vec3::ZERO {
            return Vec::new();
        }

        let mut hits: Vec<(f32, RaycastHitMessage)> = Vec::new();
        for (id, body) in &self.bodies {
            if body.disable_collision
                || body.collision_group & options.collision_mask == 0
                || options.collision_group & body.collision_mask == 0
            {
                continue;
            }
            let (center, radius) = body.bounding_sphere();
            let oc = origin - center;
            let b = oc.dot(dir);
            let disc = b * b - (oc.dot(oc) - radius * radius);
            if disc < 0.0 {
                continue;
            }
            let root = disc.sqrt();
            let t = if -b - root >= 0.0 { -b - root } else { -b + root };
            if t < 0.0 || t > options.max_distance {
                continue;
            }
            let position = origin + dir * t;
            let hit = RaycastHitMessage {
                object: *id,
                position,
                normal: (position - center).normalize_or_zero(),
            };
            if options.mode == RaycastMode::Any {
                return vec![hit];
            }
            hits.push((t, hit));
        }

        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        if options.mode == RaycastMode::Closest {
            hits.truncate(1);
        }
        hits.into_iter().map(|(_, hit)| hit).collect()
    }

    fn debug_draw(&self, sink: &mut dyn FnMut(Vec3, Vec3) -> bool) {
        if self.config.debug_draw_mode == 0 {
            return;
        }
        for body in self.bodies.values() {
            let (center, radius) = body.bounding_sphere();
            let frame = Mat4::compose(center, body.rotation, Vec3::ONE);
            let axes = [
                Vec3::new(radius, 0.0, 0.0),
                Vec3::new(0.0, radius, 0.0),
                Vec3::new(0.0, 0.0, radius),
            ];
            for (axis, color) in axes.iter().zip(AXIS_COLORS) {
                if !sink(center, color) || !sink(frame.transform_point(*axis), color) {
                    return;
                }
            }
        }
        for soft in self.soft_bodies.values() {
            let mut edge = |a: usize, b: usize| {
                sink(soft.positions[a], SOFT_BODY_COLOR) && sink(soft.positions[b], SOFT_BODY_COLOR)
            };
            let complete = match soft.kind {
                SoftBodyKind::Rope => (1..soft.positions.len()).all(|i| edge(i - 1, i)),
                SoftBodyKind::Trimesh => soft.indices.chunks_exact(3).all(|t| {
                    let (a, b, c) = (t[0] as usize, t[1] as usize, t[2] as usize);
                    edge(a, b) && edge(b, c) && edge(c, a)
                }),
            };
            if !complete {
                return;
            }
        }
    }
}
