//! # Simulation Error Types

use tandem_core::{LayoutError, SlotError};
use tandem_shared::{ConstraintId, ObjectId};
use thiserror::Error;

use crate::driver::DriverState;

/// Failures reported by a dynamics world.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DynamicsError {
    /// No body with this identity.
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),

    /// No constraint with this identity.
    #[error("unknown constraint {0:?}")]
    UnknownConstraint(ConstraintId),

    /// Identity already registered.
    #[error("{0} is already registered")]
    AlreadyRegistered(ObjectId),

    /// Shape the world cannot build.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Soft-body data the world cannot build.
    #[error("invalid soft body: {0}")]
    InvalidSoftBody(String),

    /// The world state went non-finite.
    #[error("simulation diverged: {0}")]
    Diverged(String),

    /// Anything else the engine reports.
    #[error("engine error: {0}")]
    Engine(String),
}

/// Failures while the driver handles a command.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Command not valid in the current state.
    #[error("protocol violation: {command} in state {state:?}")]
    ProtocolViolation {
        /// Command tag.
        command: &'static str,
        /// State it arrived in.
        state: DriverState,
    },

    /// Slot allocation failed.
    #[error("slot allocation failed: {0}")]
    Capacity(#[from] SlotError),

    /// A region did not fit.
    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),

    /// The world rejected the command.
    #[error("dynamics error: {0}")]
    Dynamics(#[from] DynamicsError),

    /// The driver is in its terminal state.
    #[error("simulation faulted: {0}")]
    Faulted(String),
}

/// Result type for dynamics operations.
pub type DynamicsResult<T> = Result<T, DynamicsError>;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;
