//! # Session Error Types
//!
//! Registration failures are returned from the call that caused them.
//! Failures inside a tick only ever reach the caller as [`SessionError::Faulted`].

use tandem_core::{LayoutError, TopologyError};
use tandem_shared::{ObjectId, RequestId};
use thiserror::Error;

/// Errors surfaced by a [`SimulationSession`](crate::SimulationSession).
#[derive(Error, Debug)]
pub enum SessionError {
    /// A fixed-size region has no room left.
    #[error("capacity exceeded for {what}: requested {requested}, capacity {capacity}")]
    CapacityExceeded {
        /// What was full.
        what: &'static str,
        /// Requested count.
        requested: usize,
        /// Hard ceiling.
        capacity: usize,
    },

    /// Geometry that cannot become a physics topology.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(#[from] TopologyError),

    /// The simulation stopped for good.
    #[error("simulation faulted: {0}")]
    Faulted(String),

    /// The worker thread is gone.
    #[error("simulation worker disconnected")]
    Disconnected,

    /// The identity is already tracked.
    #[error("{0} is already registered")]
    AlreadyRegistered(ObjectId),

    /// The identity was removed and the simulation has not confirmed it yet.
    #[error("{0} is still being removed")]
    RemovalPending(ObjectId),

    /// The request was dropped before an answer arrived.
    #[error("request {0:?} cancelled")]
    Cancelled(RequestId),

    /// Waited too long for the worker.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O failure (config file, thread spawn).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LayoutError> for SessionError {
    fn from(err: LayoutError) -> Self {
        match err {
            LayoutError::CapacityExceeded {
                what,
                requested,
                capacity,
            } => Self::CapacityExceeded {
                what,
                requested,
                capacity,
            },
            LayoutError::Empty(_) => Self::InvalidGeometry(TopologyError::Empty),
        }
    }
}

impl From<toml::de::Error> for SessionError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_capacity_maps_to_capacity_exceeded() {
        let err: SessionError = LayoutError::CapacityExceeded {
            what: "rigid bodies",
            requested: 20_000,
            capacity: 10_000,
        }
        .into();
        assert!(matches!(
            err,
            SessionError::CapacityExceeded {
                requested: 20_000,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_region_is_invalid_geometry() {
        let err: SessionError = LayoutError::Empty("soft-body").into();
        assert!(matches!(err, SessionError::InvalidGeometry(TopologyError::Empty)));
    }
}
