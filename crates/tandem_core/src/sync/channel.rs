//! # Buffer Channel
//!
//! Single-slot mailbox between the simulation and the render side, with the
//! backend chosen once at startup.
//!
//! ```text
//!              SharedMemory                      TransferOwnership
//!
//!   Producer ──► Arc<FrameBuffers> ◄── Consumer   Producer ══Arc══► Consumer
//!               state word arbitrates               ◄══Arc══
//!                                                   ownership arbitrates
//! ```
//!
//! Both backends expose the same guards: the producer acquires a
//! [`WriteGuard`] only when the consumer has released the bundle, and the
//! consumer acquires a [`ReadGuard`] only when a generation is ready. A guard
//! dropped without `publish`/`release` leaves the bundle where it was.
//!
//! Under the transfer protocol the bundle handle is unique while it is in
//! flight: a guard's clone never leaves the side that took it.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use tandem_shared::ObjectId;

use crate::error::LayoutResult;
use crate::memory::{BufferState, DebugRegion, SoftBodyRegion};
use crate::sync::frame::{FrameBuffers, PublishStats};

/// Handoff protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferProtocol {
    /// One bundle in shared memory, arbitrated by the atomic state word.
    SharedMemory,
    /// The bundle is moved back and forth by message.
    TransferOwnership,
}

impl BufferProtocol {
    /// Shared memory where 32-bit atomics exist, transfer otherwise.
    #[must_use]
    pub const fn detect() -> Self {
        if cfg!(target_has_atomic = "32") {
            Self::SharedMemory
        } else {
            Self::TransferOwnership
        }
    }
}

impl Default for BufferProtocol {
    fn default() -> Self {
        Self::detect()
    }
}

/// Creates both ends of a channel for `max_bodies` slots.
///
/// # Errors
///
/// Fails if `max_bodies` does not fit the rigid-body region.
pub fn buffer_channel(
    protocol: BufferProtocol,
    max_bodies: usize,
) -> LayoutResult<(ProducerEnd, ConsumerEnd)> {
    let buffers = FrameBuffers::new(max_bodies)?;
    let ends = match protocol {
        BufferProtocol::SharedMemory => {
            let shared = Arc::new(buffers);
            (
                ProducerEnd {
                    backend: ProducerBackend::Shared(Arc::clone(&shared)),
                    generation: 0,
                },
                ConsumerEnd {
                    backend: ConsumerBackend::Shared(shared),
                },
            )
        }
        BufferProtocol::TransferOwnership => {
            let (to_consumer, from_producer) = bounded(1);
            let (to_producer, from_consumer) = bounded(1);
            (
                ProducerEnd {
                    backend: ProducerBackend::Transfer {
                        held: Some(Arc::new(buffers)),
                        to_consumer,
                        from_consumer,
                    },
                    generation: 0,
                },
                ConsumerEnd {
                    backend: ConsumerBackend::Transfer {
                        held: None,
                        from_producer,
                        to_producer,
                    },
                },
            )
        }
    };
    tracing::debug!(?protocol, max_bodies, "buffer channel created");
    Ok(ends)
}

// ============================================================================
// PRODUCER
// ============================================================================

enum ProducerBackend {
    Shared(Arc<FrameBuffers>),
    Transfer {
        held: Option<Arc<FrameBuffers>>,
        to_consumer: Sender<Arc<FrameBuffers>>,
        from_consumer: Receiver<Arc<FrameBuffers>>,
    },
}

/// Simulation side of the channel.
pub struct ProducerEnd {
    backend: ProducerBackend,
    generation: u32,
}

impl ProducerEnd {
    /// Active protocol.
    #[must_use]
    pub const fn protocol(&self) -> BufferProtocol {
        match self.backend {
            ProducerBackend::Shared(_) => BufferProtocol::SharedMemory,
            ProducerBackend::Transfer { .. } => BufferProtocol::TransferOwnership,
        }
    }

    /// Generations published so far.
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Whether the consumer has released the bundle.
    ///
    /// Under the transfer protocol this also takes back a returned bundle.
    pub fn is_released(&mut self) -> bool {
        match &mut self.backend {
            ProducerBackend::Shared(buffers) => buffers.state() != BufferState::Ready,
            ProducerBackend::Transfer {
                held,
                from_consumer,
                ..
            } => {
                if held.is_none() {
                    if let Ok(returned) = from_consumer.try_recv() {
                        *held = Some(returned);
                    }
                }
                held.is_some()
            }
        }
    }

    /// Write access to the bundle, or `None` while the consumer still holds it.
    pub fn acquire(&mut self) -> Option<WriteGuard<'_>> {
        if !self.is_released() {
            return None;
        }
        let buffers = match &self.backend {
            ProducerBackend::Shared(buffers) => Arc::clone(buffers),
            ProducerBackend::Transfer { held, .. } => Arc::clone(held.as_ref()?),
        };
        Some(WriteGuard { end: self, buffers })
    }
}

impl std::fmt::Debug for ProducerEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerEnd")
            .field("protocol", &self.protocol())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Exclusive write access for one generation.
pub struct WriteGuard<'a> {
    end: &'a mut ProducerEnd,
    buffers: Arc<FrameBuffers>,
}

impl WriteGuard<'_> {
    /// The bundle being written.
    #[must_use]
    pub fn buffers(&self) -> &FrameBuffers {
        &self.buffers
    }

    /// Adds the soft-body region of `object` to the bundle, returning the
    /// region it replaced.
    pub fn install_soft_region(
        &self,
        object: ObjectId,
        region: SoftBodyRegion,
    ) -> Option<SoftBodyRegion> {
        self.buffers.insert_soft_region(object, region)
    }

    /// Takes the soft-body region of `object` out of the bundle.
    pub fn remove_soft_region(&self, object: ObjectId) -> Option<SoftBodyRegion> {
        self.buffers.remove_soft_region(object)
    }

    /// Installs the debug region, returning the one it replaced.
    pub fn install_debug_region(&self, region: DebugRegion) -> Option<DebugRegion> {
        self.buffers.replace_debug_region(region)
    }

    /// Stamps the header and hands the generation to the consumer.
    pub fn publish(self, stats: PublishStats) {
        let Self { end, buffers } = self;
        end.generation = end.generation.wrapping_add(1);
        stamp(&buffers, stats, end.generation);
        buffers.rigid().store_state(BufferState::Ready);
        drop(buffers);

        if let ProducerBackend::Transfer {
            held, to_consumer, ..
        } = &mut end.backend
        {
            if let Some(bundle) = held.take() {
                if to_consumer.send(bundle).is_err() {
                    tracing::debug!("consumer end gone; generation dropped");
                }
            }
        }
    }
}

fn stamp(buffers: &FrameBuffers, stats: PublishStats, generation: u32) {
    let rigid = buffers.rigid();
    rigid.set_substep_counter(stats.substep_counter);
    rigid.set_step_duration_ms(stats.step_duration_ms);
    rigid.set_generation(generation);
}

// ============================================================================
// CONSUMER
// ============================================================================

enum ConsumerBackend {
    Shared(Arc<FrameBuffers>),
    Transfer {
        held: Option<Arc<FrameBuffers>>,
        from_producer: Receiver<Arc<FrameBuffers>>,
        to_producer: Sender<Arc<FrameBuffers>>,
    },
}

/// Render side of the channel.
pub struct ConsumerEnd {
    backend: ConsumerBackend,
}

impl ConsumerEnd {
    /// Active protocol.
    #[must_use]
    pub const fn protocol(&self) -> BufferProtocol {
        match self.backend {
            ConsumerBackend::Shared(_) => BufferProtocol::SharedMemory,
            ConsumerBackend::Transfer { .. } => BufferProtocol::TransferOwnership,
        }
    }

    /// Whether a published generation is waiting.
    pub fn is_ready(&mut self) -> bool {
        match &mut self.backend {
            ConsumerBackend::Shared(buffers) => buffers.state() == BufferState::Ready,
            ConsumerBackend::Transfer {
                held,
                from_producer,
                ..
            } => {
                if held.is_none() {
                    match from_producer.try_recv() {
                        Ok(buffers) => *held = Some(buffers),
                        Err(TryRecvError::Empty) => {}
                        Err(TryRecvError::Disconnected) => {
                            tracing::debug!("producer end gone");
                        }
                    }
                }
                held.is_some()
            }
        }
    }

    /// Read access to a ready generation.
    pub fn try_acquire(&mut self) -> Option<ReadGuard<'_>> {
        if !self.is_ready() {
            return None;
        }
        let buffers = match &self.backend {
            ConsumerBackend::Shared(buffers) => Arc::clone(buffers),
            ConsumerBackend::Transfer { held, .. } => Arc::clone(held.as_ref()?),
        };
        Some(ReadGuard { end: self, buffers })
    }
}

impl std::fmt::Debug for ConsumerEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerEnd")
            .field("protocol", &self.protocol())
            .finish_non_exhaustive()
    }
}

/// Read access to one generation.
pub struct ReadGuard<'a> {
    end: &'a mut ConsumerEnd,
    buffers: Arc<FrameBuffers>,
}

impl ReadGuard<'_> {
    /// The generation being read.
    #[must_use]
    pub fn buffers(&self) -> &FrameBuffers {
        &self.buffers
    }

    /// Hands the bundle back to the producer.
    pub fn release(self) {
        let Self { end, buffers } = self;
        buffers.rigid().store_state(BufferState::Consumed);
        drop(buffers);

        if let ConsumerBackend::Transfer {
            held, to_producer, ..
        } = &mut end.backend
        {
            if let Some(bundle) = held.take() {
                if to_producer.send(bundle).is_err() {
                    tracing::debug!("producer end gone; bundle dropped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SoftBodyLayout;
    use tandem_shared::{Mat4, Vec3};

    fn roundtrip(protocol: BufferProtocol) {
        let (mut producer, mut consumer) = buffer_channel(protocol, 4).unwrap();
        assert!(consumer.try_acquire().is_none());

        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let guard = producer.acquire().unwrap();
        guard.buffers().rigid().write_matrix(1, &m);
        guard.publish(PublishStats {
            substep_counter: 7,
            step_duration_ms: 0.5,
        });

        assert!(producer.acquire().is_none());

        let read = consumer.try_acquire().unwrap();
        assert_eq!(read.buffers().read_matrix(1), Some(m));
        assert_eq!(read.buffers().substep_counter(), 7);
        read.release();

        assert!(consumer.try_acquire().is_none());
        assert!(producer.acquire().is_some());
        assert_eq!(producer.generation(), 1);
    }

    #[test]
    fn test_shared_memory_roundtrip() {
        roundtrip(BufferProtocol::SharedMemory);
    }

    #[test]
    fn test_transfer_roundtrip() {
        roundtrip(BufferProtocol::TransferOwnership);
    }

    #[test]
    fn test_unreleased_read_blocks_producer() {
        for protocol in [BufferProtocol::SharedMemory, BufferProtocol::TransferOwnership] {
            let (mut producer, mut consumer) = buffer_channel(protocol, 1).unwrap();
            producer.acquire().unwrap().publish(PublishStats::default());

            // guard dropped without release
            drop(consumer.try_acquire().unwrap());
            assert!(producer.acquire().is_none());
            assert!(consumer.try_acquire().is_some());
        }
    }

    #[test]
    fn test_regions_travel_with_the_bundle() {
        let (mut producer, mut consumer) =
            buffer_channel(BufferProtocol::TransferOwnership, 1).unwrap();

        let guard = producer.acquire().unwrap();
        let rope = SoftBodyRegion::new(SoftBodyLayout::rope(2).unwrap());
        rope.write_vertices(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(guard.install_soft_region(ObjectId(9), rope).is_none());
        assert!(guard
            .install_debug_region(DebugRegion::new(4).unwrap())
            .is_none());
        guard.publish(PublishStats::default());

        // in flight: the producer has nothing left to write into
        assert!(producer.acquire().is_none());

        let read = consumer.try_acquire().unwrap();
        let mut out = [0.0; 6];
        let found = read
            .buffers()
            .with_soft_region(ObjectId(9), |region| region.read_vertices(&mut out));
        assert!(found.is_some());
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(read.buffers().with_debug_region(|debug| debug.capacity()), Some(4));
        assert!(read.buffers().with_soft_region(ObjectId(1), |_| ()).is_none());
        read.release();

        let guard = producer.acquire().unwrap();
        assert!(guard.remove_soft_region(ObjectId(9)).is_some());
        assert_eq!(guard.buffers().soft_region_count(), 0);
    }

    #[test]
    fn test_detect_prefers_shared_memory() {
        if cfg!(target_has_atomic = "32") {
            assert_eq!(BufferProtocol::detect(), BufferProtocol::SharedMemory);
        }
    }
}
