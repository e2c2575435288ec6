//! # Shared Memory
//!
//! Fixed-size word regions readable from both sides, and the simulation-side
//! slot allocator that decides where each rigid body's transform lives.
//!
//! ## Design Philosophy
//!
//! Every region is sized once when it is created:
//! - No resizing
//! - No per-tick heap allocation
//! - Offsets computed from [`crate::layout`] only

mod region;
mod slots;

pub use region::{BufferState, DebugRegion, RigidBodyRegion, SoftBodyRegion, WordRegion};
pub use slots::SlotAllocator;
