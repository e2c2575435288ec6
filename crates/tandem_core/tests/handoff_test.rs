//! Handoff guarantees under adversarial interleaving.
//!
//! Every generation writes the same value into every slot, so a consumer
//! that ever sees two different values inside one read has observed a torn
//! generation.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tandem_core::{buffer_channel, BufferProtocol, PublishStats, ReadGuard, WriteGuard};
use tandem_shared::{Mat4, Vec3};

const SLOTS: usize = 16;

struct Writing<'a> {
    guard: WriteGuard<'a>,
    next: usize,
    generation: u32,
}

struct Reading<'a> {
    guard: ReadGuard<'a>,
    next: usize,
    seen: Vec<f32>,
}

#[derive(Debug, Default)]
struct Outcome {
    published: u32,
    consumed: u32,
    skipped: u32,
}

/// Producer and consumer each advance one slot per step; a seeded RNG picks
/// who moves next.
fn interleave(protocol: BufferProtocol, seed: u64, steps: usize, consumer_bias: f64) -> Outcome {
    let (mut producer, mut consumer) = buffer_channel(protocol, SLOTS).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut writing: Option<Writing<'_>> = None;
    let mut reading: Option<Reading<'_>> = None;
    let mut outcome = Outcome::default();
    let mut generation = 0u32;
    let mut last_seen = 0u32;

    for _ in 0..steps {
        if rng.gen_bool(1.0 - consumer_bias) {
            writing = match writing {
                None => match producer.acquire() {
                    Some(guard) => {
                        generation += 1;
                        Some(Writing {
                            guard,
                            next: 0,
                            generation,
                        })
                    }
                    None => {
                        outcome.skipped += 1;
                        None
                    }
                },
                Some(mut w) => {
                    let m = Mat4::from_translation(Vec3::new(
                        w.generation as f32,
                        w.next as f32,
                        0.0,
                    ));
                    assert!(w.guard.buffers().rigid().write_matrix(w.next, &m));
                    w.next += 1;
                    if w.next == SLOTS {
                        w.guard.publish(PublishStats {
                            substep_counter: w.generation,
                            step_duration_ms: 0.0,
                        });
                        outcome.published += 1;
                        None
                    } else {
                        Some(w)
                    }
                }
            };
        } else {
            reading = match reading {
                None => consumer.try_acquire().map(|guard| Reading {
                    guard,
                    next: 0,
                    seen: Vec::with_capacity(SLOTS),
                }),
                Some(mut r) => {
                    let m = r.guard.buffers().read_matrix(r.next).unwrap();
                    assert_eq!(m.cols[13], r.next as f32);
                    r.seen.push(m.cols[12]);
                    r.next += 1;
                    if r.next == SLOTS {
                        let counter = r.guard.buffers().substep_counter();
                        assert!(
                            r.seen.iter().all(|&g| g == counter as f32),
                            "torn generation {counter}: {:?}",
                            r.seen
                        );
                        assert!(counter > last_seen, "generations out of order");
                        last_seen = counter;
                        r.guard.release();
                        outcome.consumed += 1;
                        None
                    } else {
                        Some(r)
                    }
                }
            };
        }
    }
    outcome
}

#[test]
fn test_no_tear_shared_memory() {
    for seed in 0..16 {
        let outcome = interleave(BufferProtocol::SharedMemory, seed, 20_000, 0.5);
        assert!(outcome.consumed > 0, "seed {seed}: {outcome:?}");
    }
}

#[test]
fn test_no_tear_transfer_ownership() {
    for seed in 0..16 {
        let outcome = interleave(BufferProtocol::TransferOwnership, seed, 20_000, 0.5);
        assert!(outcome.consumed > 0, "seed {seed}: {outcome:?}");
    }
}

#[test]
fn test_slow_consumer_makes_producer_skip() {
    let outcome = interleave(BufferProtocol::SharedMemory, 7, 20_000, 0.1);
    assert!(outcome.skipped > 0, "{outcome:?}");
    assert!(outcome.published <= outcome.consumed + 1);
}

#[test]
fn test_backpressure_without_release() {
    for protocol in [BufferProtocol::SharedMemory, BufferProtocol::TransferOwnership] {
        let (mut producer, mut consumer) = buffer_channel(protocol, 2).unwrap();
        let m = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));

        let guard = producer.acquire().unwrap();
        guard.buffers().rigid().write_matrix(0, &m);
        guard.publish(PublishStats {
            substep_counter: 1,
            step_duration_ms: 0.0,
        });

        for _ in 0..1_000 {
            assert!(producer.acquire().is_none());
        }
        assert_eq!(producer.generation(), 1);

        // the consumer looks but never releases
        let read = consumer.try_acquire().unwrap();
        assert_eq!(read.buffers().substep_counter(), 1);
        assert_eq!(read.buffers().read_matrix(0), Some(m));
        drop(read);
        assert!(producer.acquire().is_none());
    }
}

#[test]
fn test_no_tear_across_threads() {
    let (mut producer, mut consumer) = buffer_channel(BufferProtocol::SharedMemory, SLOTS).unwrap();
    let stop = Arc::new(AtomicBool::new(false));
    let stop_producer = Arc::clone(&stop);

    let handle = thread::spawn(move || {
        let mut generation = 0u32;
        while !stop_producer.load(Ordering::Relaxed) {
            let Some(guard) = producer.acquire() else {
                thread::yield_now();
                continue;
            };
            generation += 1;
            for slot in 0..SLOTS {
                let m = Mat4::from_translation(Vec3::new(generation as f32, slot as f32, 0.0));
                guard.buffers().rigid().write_matrix(slot, &m);
            }
            guard.publish(PublishStats {
                substep_counter: generation,
                step_duration_ms: 0.0,
            });
        }
        generation
    });

    let mut consumed = 0;
    while consumed < 500 {
        let Some(read) = consumer.try_acquire() else {
            thread::yield_now();
            continue;
        };
        let counter = read.buffers().substep_counter() as f32;
        for slot in 0..SLOTS {
            let m = read.buffers().read_matrix(slot).unwrap();
            assert_eq!(m.cols[12], counter);
        }
        read.release();
        consumed += 1;
    }

    stop.store(true, Ordering::Relaxed);
    let produced = handle.join().unwrap();
    assert!(produced >= 500);
}
