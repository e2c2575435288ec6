//! # Tandem Core
//!
//! The handoff layer between a simulation that ticks on its own thread and a
//! renderer that must never wait for it.
//!
//! - Binary layout of every shared region
//! - Atomic word regions and the tri-state buffer flag
//! - Identity to slot allocation for rigid bodies
//! - Welding visual meshes into physics topology, and scattering back
//! - A buffer channel with a shared-memory and a transfer-ownership backend
//!
//! ## Architecture Rules
//!
//! 1. **Fixed sizes** - every region is sized at registration, never resized
//! 2. **One writer at a time** - the state word or bundle ownership decides who
//! 3. **No blocking** - both sides poll; neither ever waits on the other
//!
//! ## Example
//!
//! ```rust,ignore
//! use tandem_core::sync::{buffer_channel, BufferProtocol, PublishStats};
//!
//! let (mut producer, mut consumer) = buffer_channel(BufferProtocol::detect(), 128)?;
//!
//! if let Some(guard) = producer.acquire() {
//!     guard.buffers().rigid().write_matrix(0, &transform);
//!     guard.publish(PublishStats::default());
//! }
//! if let Some(read) = consumer.try_acquire() {
//!     let m = read.buffers().read_matrix(0);
//!     read.release();
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod layout;
pub mod memory;
pub mod protocol;
pub mod sync;
pub mod topology;

pub use error::{LayoutError, LayoutResult, SlotError, TopologyError, TopologyResult};
pub use layout::{DebugLayout, IndexWidth, RigidBodyLayout, SoftBodyLayout};
pub use memory::{BufferState, DebugRegion, RigidBodyRegion, SlotAllocator, SoftBodyRegion};
pub use protocol::{Command, Notification};
pub use sync::{
    buffer_channel, BufferProtocol, ConsumerEnd, FrameBuffers, ProducerEnd, PublishStats,
    ReadGuard, WriteGuard,
};
pub use topology::{VisualMesh, WeldedTopology};
