//! Frame sync against a producer thread publishing as fast as it can.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tandem_core::{buffer_channel, BufferProtocol, PublishStats};
use tandem_render::{FrameSync, RenderSync, SceneNode, SoftMesh};
use tandem_shared::{Mat4, ObjectId, Vec3};

const SLOTS: usize = 64;

/// Every slot of generation `n` carries translation x = n.
fn run_producer(protocol: BufferProtocol) {
    let (mut producer, consumer) = buffer_channel(protocol, SLOTS).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let producer_stop = Arc::clone(&stop);
    let handle = thread::spawn(move || {
        let mut counter = 0u32;
        while !producer_stop.load(Ordering::Relaxed) {
            if let Some(guard) = producer.acquire() {
                counter += 1;
                let m = Mat4::from_translation(Vec3::new(counter as f32, 0.0, 0.0));
                for slot in 0..SLOTS {
                    guard.buffers().rigid().write_matrix(slot, &m);
                }
                guard.publish(PublishStats {
                    substep_counter: counter,
                    step_duration_ms: 0.1,
                });
            } else {
                thread::yield_now();
            }
        }
    });

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut sync: RenderSync<SceneNode, SoftMesh> = RenderSync::new(consumer);
    let tracked: Vec<u64> = (0..SLOTS as u64).filter(|_| rng.gen_bool(0.5)).collect();
    for &id in &tracked {
        sync.track_rigid(ObjectId(id), SceneNode::default(), true);
        sync.defer_slot(ObjectId(id), id as usize);
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut applied = 0;
    let mut last_x = 0.0f32;
    while applied < 200 && Instant::now() < deadline {
        if let FrameSync::Applied { rigid_bodies, .. } = sync.sync_frame() {
            if rigid_bodies == 0 {
                // slots drained under this generation are read from the next
                continue;
            }
            assert_eq!(rigid_bodies, tracked.len());
            let x = sync.rigid(ObjectId(tracked[0])).unwrap().position.x;
            for &id in &tracked {
                let node = sync.rigid(ObjectId(id)).unwrap();
                assert_eq!(node.position.x, x, "torn generation at body {id}");
            }
            assert!(x > last_x, "generation went backwards");
            last_x = x;
            applied += 1;
        }
    }

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
    assert_eq!(applied, 200);
    assert_eq!(sync.performance().frames_applied, 201);
}

#[test]
fn test_shared_memory_frames_are_never_torn() {
    run_producer(BufferProtocol::SharedMemory);
}

#[test]
fn test_transfer_frames_are_never_torn() {
    run_producer(BufferProtocol::TransferOwnership);
}

#[test]
fn test_tracking_survives_slot_reuse() {
    let (mut producer, consumer) = buffer_channel(BufferProtocol::SharedMemory, 4).unwrap();
    let mut sync: RenderSync<SceneNode, SoftMesh> = RenderSync::new(consumer);

    sync.track_rigid(ObjectId(1), SceneNode::default(), true);
    sync.defer_slot(ObjectId(1), 0);
    // removed before the slot was applied, then slot 0 reused by another body
    assert!(sync.untrack_rigid(ObjectId(1)).is_some());
    sync.track_rigid(ObjectId(2), SceneNode::default(), true);
    sync.defer_slot(ObjectId(2), 0);

    let lifted = Mat4::from_translation(Vec3::new(0.0, 3.0, 0.0));
    for counter in 1..=2 {
        let guard = producer.acquire().unwrap();
        guard.buffers().rigid().write_matrix(0, &lifted);
        guard.publish(PublishStats {
            substep_counter: counter,
            step_duration_ms: 0.0,
        });
        let expected = if counter == 1 { 0 } else { 1 };
        assert_eq!(
            sync.sync_frame(),
            FrameSync::Applied {
                rigid_bodies: expected,
                soft_bodies: 0
            }
        );
    }
    assert!(sync.rigid(ObjectId(1)).is_none());
    assert_eq!(sync.slot_of(ObjectId(2)), Some(0));
    assert_eq!(sync.rigid(ObjectId(2)).unwrap().position.y, 3.0);
}
