//! # Buffer Handoff
//!
//! ## The Problem
//!
//! ```text
//! Simulation thread:  WRITE transforms every tick
//! Render thread:      READ transforms every frame
//!
//! Without a protocol: torn reads, half of one step and half of the next
//! With a lock:        the renderer waits on the simulation
//! ```
//!
//! ## The Solution: Single-Slot Mailbox
//!
//! ```text
//! Producer:  not READY? write everything, then READY
//! Consumer:  READY?     read everything,  then CONSUMED
//! ```
//!
//! A producer that finds the slot still READY skips its tick instead of
//! overwriting. Never torn, at most one generation stale.

mod channel;
mod frame;

pub use channel::{
    buffer_channel, BufferProtocol, ConsumerEnd, ProducerEnd, ReadGuard, WriteGuard,
};
pub use frame::{FrameBuffers, PublishStats};
