//! # Tandem Shared
//!
//! Common types used by both the simulation side and the render side.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on:
//! - a dynamics engine
//! - a scene graph
//! - threads, channels or shared regions
//!
//! Regions and the message enums that carry them live in `tandem_core`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;
pub mod protocol;

pub use constants::{BODY_DATA_SIZE, HEADER_LENGTH, MAX_BODIES, MAX_FRAME_DELTA_MS};
pub use math::{Mat4, Quaternion, Vec3};
pub use protocol::{
    ActivationState, BodyConfig, BodyType, ConstraintConfig, ConstraintId, ConstraintKind,
    ConstraintUpdate, ObjectId, RaycastHitMessage, RaycastMode, RaycastOptions, RequestId,
    ShapeDescriptor, ShapeKind, SoftBodyAnchor, SoftBodyConfig, SoftBodyKind, UpdateBodyOptions,
    WorldConfig,
};
