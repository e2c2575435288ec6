//! # Core Error Types
//!
//! Registration-time failures. All of these are reported synchronously to the
//! caller; nothing here is raised from inside a tick.

use thiserror::Error;

/// A region could not be laid out for the requested size.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Requested more than the fixed ceiling allows.
    #[error("capacity exceeded for {what}: requested {requested}, capacity {capacity}")]
    CapacityExceeded {
        /// What was being sized.
        what: &'static str,
        /// Requested count.
        requested: usize,
        /// Hard ceiling.
        capacity: usize,
    },

    /// A region with no room at all.
    #[error("{0} region must not be empty")]
    Empty(&'static str),
}

/// Slot allocation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    /// Every slot is owned.
    #[error("all {capacity} body slots are in use")]
    CapacityExceeded {
        /// Allocator capacity.
        capacity: usize,
    },

    /// The identity already owns a slot.
    #[error("{0} already owns slot {1}")]
    DuplicateIdentity(tandem_shared::ObjectId, usize),
}

/// Geometry that cannot become a physics topology.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// Triangle geometry without an index buffer.
    #[error("triangle geometry requires an index buffer")]
    MissingIndex,

    /// Vertex or index data not grouped in triangles.
    #[error("geometry is not triangulated: {0} entries is not a multiple of 3")]
    NotTriangulated(usize),

    /// An index points past the vertex array.
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        /// Offending index.
        index: u32,
        /// Vertex count.
        vertex_count: usize,
    },

    /// A per-vertex attribute has the wrong length.
    #[error("attribute '{0}' is missing or has the wrong length")]
    MissingAttribute(&'static str),

    /// No vertices at all.
    #[error("geometry has no vertices")]
    Empty,
}

/// Result type for layout operations.
pub type LayoutResult<T> = Result<T, LayoutError>;

/// Result type for topology operations.
pub type TopologyResult<T> = Result<T, TopologyError>;
