//! Driver under a seeded random schedule of commands, ticks and releases.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tandem_core::{buffer_channel, BufferProtocol, Command, ConsumerEnd, Notification};
use tandem_shared::{BodyConfig, BodyType, Mat4, ObjectId, ShapeDescriptor, Vec3, WorldConfig};
use tandem_sim::{BallisticWorld, DriverState, SimulationDriver, TickOutcome};

const MAX_BODIES: usize = 32;

fn start(protocol: BufferProtocol) -> (SimulationDriver, ConsumerEnd, Receiver<Notification>) {
    let (tx, rx) = unbounded();
    let mut driver = SimulationDriver::new(BallisticWorld::factory(), tx);
    let (producer, consumer) = buffer_channel(protocol, MAX_BODIES).unwrap();
    driver
        .handle(Command::Init {
            world: WorldConfig::default(),
            buffers: producer,
            max_bodies: MAX_BODIES,
            simulation_speed: 1.0,
            max_frame_delta_ms: 100.0,
        })
        .unwrap();
    (driver, consumer, rx)
}

/// Static body parked at `x`, so the published translation identifies it.
fn add_marker(driver: &mut SimulationDriver, id: u64) {
    let _ = driver.handle(Command::AddRigidBody {
        object: ObjectId(id),
        transform: Mat4::from_translation(Vec3::new(id as f32, 0.0, 0.0)),
        shape: ShapeDescriptor::sphere(0.5),
        config: BodyConfig {
            body_type: BodyType::Static,
            ..BodyConfig::default()
        },
    });
}

#[test]
fn test_random_schedule_keeps_slots_and_counter_consistent() {
    for protocol in [BufferProtocol::SharedMemory, BufferProtocol::TransferOwnership] {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let (mut driver, mut consumer, events) = start(protocol);
        let mut clock = Instant::now();
        let mut next_id = 1u64;
        let mut live: Vec<u64> = Vec::new();
        let mut slots: HashMap<u64, usize> = HashMap::new();
        let mut last_counter = 0u32;

        for _ in 0..2_000 {
            match rng.gen_range(0..10) {
                0..=2 if live.len() < MAX_BODIES => {
                    add_marker(&mut driver, next_id);
                    live.push(next_id);
                    next_id += 1;
                }
                3 if !live.is_empty() => {
                    let id = live.swap_remove(rng.gen_range(0..live.len()));
                    driver
                        .handle(Command::RemoveRigidBody {
                            object: ObjectId(id),
                        })
                        .unwrap();
                    slots.remove(&id);
                }
                4..=6 => {
                    clock += Duration::from_millis(rng.gen_range(0..40));
                    let outcome = driver.tick(clock);
                    assert_ne!(outcome, TickOutcome::Faulted);
                }
                _ => {
                    if let Some(guard) = consumer.try_acquire() {
                        let counter = guard.buffers().substep_counter();
                        assert!(counter >= last_counter);
                        last_counter = counter;
                        guard.release();
                    }
                }
            }

            for event in events.try_iter() {
                if let Notification::RigidBodyReady { object, slot } = event {
                    // removal may have raced ahead of the notification
                    if live.contains(&object.0) {
                        slots.insert(object.0, slot);
                    }
                }
            }

            let mut seen: Vec<usize> = slots.values().copied().collect();
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), slots.len(), "two live bodies share a slot");
        }

        assert_eq!(driver.state(), DriverState::Running);
        assert_eq!(driver.rigid_body_count(), live.len());
    }
}

#[test]
fn test_published_slots_hold_their_owner() {
    let (mut driver, mut consumer, events) = start(BufferProtocol::SharedMemory);
    for id in 1..=10 {
        add_marker(&mut driver, id);
    }
    for id in [2, 5, 9] {
        driver
            .handle(Command::RemoveRigidBody {
                object: ObjectId(id),
            })
            .unwrap();
    }
    add_marker(&mut driver, 11);

    let mut slots = HashMap::new();
    for event in events.try_iter() {
        if let Notification::RigidBodyReady { object, slot } = event {
            slots.insert(object.0, slot);
        }
    }
    for id in [2, 5, 9] {
        slots.remove(&id);
    }

    let clock = Instant::now() + Duration::from_millis(50);
    assert!(matches!(driver.tick(clock), TickOutcome::Stepped { .. }));

    let guard = consumer.try_acquire().unwrap();
    for (id, slot) in &slots {
        let x = guard.buffers().read_matrix(*slot).unwrap().translation().x;
        assert_eq!(x, *id as f32, "slot {slot} should hold body {id}");
    }
    guard.release();
}

#[test]
fn test_consumer_starvation_never_overwrites() {
    let (mut driver, mut consumer, _events) = start(BufferProtocol::TransferOwnership);
    driver
        .handle(Command::AddRigidBody {
            object: ObjectId(1),
            transform: Mat4::from_translation(Vec3::new(0.0, 100.0, 0.0)),
            shape: ShapeDescriptor::sphere(0.5),
            config: BodyConfig::default(),
        })
        .unwrap();

    let mut clock = Instant::now();
    clock += Duration::from_millis(20);
    assert!(matches!(driver.tick(clock), TickOutcome::Stepped { .. }));

    let guard = consumer.try_acquire().unwrap();
    let held = guard.buffers().read_matrix(0).unwrap();
    let counter = guard.buffers().substep_counter();

    for _ in 0..50 {
        clock += Duration::from_millis(20);
        assert_eq!(driver.tick(clock), TickOutcome::Skipped);
    }
    assert_eq!(guard.buffers().read_matrix(0).unwrap(), held);
    assert_eq!(guard.buffers().substep_counter(), counter);
    assert_eq!(driver.substep_counter(), counter);
    guard.release();

    clock += Duration::from_millis(20);
    assert!(matches!(driver.tick(clock), TickOutcome::Stepped { .. }));
    assert!(driver.substep_counter() > counter);
}
