//! # Headless Soak
//!
//! Runs a session without a renderer at 60 Hz frame pacing and churns
//! bodies the whole time: spheres dropping, a rope hanging from a static
//! post, a cloth pinned at two corners, periodic ray queries.
//!
//! ```text
//! headless_soak [config.toml] [seconds]
//! ```

use std::time::{Duration, Instant};

use tandem::{FrameSync, SceneNode, SessionConfig, SessionResult, SimulationSession};
use tandem_core::VisualMesh;
use tandem_shared::{
    BodyConfig, BodyType, Mat4, ObjectId, RaycastMode, RaycastOptions, ShapeDescriptor,
    SoftBodyAnchor, SoftBodyConfig, SoftBodyKind, Vec3,
};

/// Render frame interval.
const FRAME: Duration = Duration::from_micros(16_667);
/// Spheres kept alive at once.
const SPHERES: usize = 64;
/// Frames between churn rounds.
const CHURN_EVERY: u64 = 30;

#[derive(Debug, Default)]
struct SoakStats {
    frames: u64,
    applied: u64,
    unchanged: u64,
    not_ready: u64,
    added: u64,
    removed: u64,
    raycasts: u64,
    raycast_hits: u64,
}

fn main() {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => match SessionConfig::from_toml_file(&path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("failed to load {path}: {err}");
                std::process::exit(2);
            }
        },
        None => SessionConfig::default().with_max_bodies(256),
    };
    let seconds = args.next().and_then(|s| s.parse().ok()).unwrap_or(10u64);

    println!("═══════════════════════════════════════════════════════");
    println!("  TANDEM HEADLESS SOAK");
    println!("  protocol: {:?}", config.protocol.resolve());
    println!("  duration: {seconds}s");
    println!("═══════════════════════════════════════════════════════");

    match run(config, Duration::from_secs(seconds)) {
        Ok(stats) => report(&stats),
        Err(err) => {
            eprintln!("soak failed: {err}");
            std::process::exit(1);
        }
    }
}

fn run(config: SessionConfig, duration: Duration) -> SessionResult<SoakStats> {
    let mut session = SimulationSession::start(config)?;
    session.wait_ready(Duration::from_secs(5))?;

    let mut stats = SoakStats::default();
    let post = session.new_object_id();
    session.add_rigid_body(
        post,
        SceneNode::at(Vec3::new(-5.0, 8.0, 0.0)),
        ShapeDescriptor::cuboid(Vec3::new(0.2, 0.2, 0.2)),
        BodyConfig {
            body_type: BodyType::Static,
            ..BodyConfig::default()
        },
    )?;
    add_rope(&mut session, post)?;
    add_cloth(&mut session)?;

    let mut live: Vec<ObjectId> = Vec::with_capacity(SPHERES);
    let start = Instant::now();
    let mut next_frame = start;

    while start.elapsed() < duration {
        if stats.frames % CHURN_EVERY == 0 {
            churn(&mut session, &mut live, &mut stats)?;
            let mut ticket = session.raycast(
                Vec3::new(0.0, 50.0, 0.0),
                Vec3::new(0.0, -1.0, 0.0),
                RaycastOptions {
                    mode: RaycastMode::All,
                    ..RaycastOptions::default()
                },
            )?;
            stats.raycasts += 1;
            let hits = session.wait_for_raycast(&mut ticket, Duration::from_secs(1))?;
            stats.raycast_hits += hits.len() as u64;
        }

        match session.sync_frame()? {
            FrameSync::Applied { .. } => stats.applied += 1,
            FrameSync::Unchanged => stats.unchanged += 1,
            FrameSync::NotReady => stats.not_ready += 1,
        }
        stats.frames += 1;

        next_frame += FRAME;
        if let Some(wait) = next_frame.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
    }

    let status = session.status();
    println!("  simulation ticks: {}", status.ticks);
    println!("  skipped ticks:    {}", status.skipped_ticks);
    println!("  substep counter:  {}", status.substep_counter);
    println!("  avg tick:         {}µs", status.tick_stats.avg_tick_us);
    println!("  late ticks:       {}", status.tick_stats.late_ticks);
    Ok(stats)
}

/// Removes the oldest third of the spheres and refills to [`SPHERES`].
fn churn(
    session: &mut SimulationSession,
    live: &mut Vec<ObjectId>,
    stats: &mut SoakStats,
) -> SessionResult<()> {
    let drop_count = live.len() / 3;
    for id in live.drain(..drop_count) {
        session.remove_rigid_body(id)?;
        stats.removed += 1;
    }
    while live.len() < SPHERES {
        let id = session.new_object_id();
        let i = id.0 as f32;
        session.add_rigid_body(
            id,
            SceneNode::at(Vec3::new(
                (i * 0.37).sin() * 4.0,
                20.0 + (i % 7.0),
                (i * 0.61).cos() * 4.0,
            )),
            ShapeDescriptor::sphere(0.5),
            BodyConfig::default(),
        )?;
        live.push(id);
        stats.added += 1;
    }
    Ok(())
}

fn add_rope(session: &mut SimulationSession, post: ObjectId) -> SessionResult<()> {
    let nodes = 12;
    let positions: Vec<f32> = (0..nodes)
        .flat_map(|i| [-5.0, 8.0 - i as f32 * 0.4, 0.0])
        .collect();
    let rope = session.new_object_id();
    session.add_soft_body(
        rope,
        VisualMesh::line(positions),
        &Mat4::IDENTITY,
        SoftBodyConfig {
            kind: SoftBodyKind::Rope,
            anchors: vec![SoftBodyAnchor::RigidBody {
                node_index: 0,
                body: post,
                local_offset: Vec3::ZERO,
                disable_collision_between_linked_bodies: true,
                influence: 1.0,
            }],
            ..SoftBodyConfig::default()
        },
    )
}

fn add_cloth(session: &mut SimulationSession) -> SessionResult<()> {
    let n = 8usize;
    let mut positions = Vec::with_capacity(n * n * 3);
    for z in 0..n {
        for x in 0..n {
            positions.extend_from_slice(&[x as f32 * 0.5, 0.0, z as f32 * 0.5]);
        }
    }
    let mut indices = Vec::with_capacity((n - 1) * (n - 1) * 6);
    for z in 0..n - 1 {
        for x in 0..n - 1 {
            let i = (z * n + x) as u32;
            let row = n as u32;
            indices.extend_from_slice(&[i, i + row, i + 1, i + 1, i + row, i + row + 1]);
        }
    }
    let cloth = session.new_object_id();
    session.add_soft_body(
        cloth,
        VisualMesh::indexed(positions, indices),
        &Mat4::from_translation(Vec3::new(2.0, 6.0, 0.0)),
        SoftBodyConfig {
            anchors: vec![
                SoftBodyAnchor::World { node_index: 0 },
                SoftBodyAnchor::World {
                    node_index: (n - 1) as u32,
                },
            ],
            ..SoftBodyConfig::default()
        },
    )
}

fn report(stats: &SoakStats) {
    println!("───────────────────────────────────────────────────────");
    println!("  frames:      {}", stats.frames);
    println!("  applied:     {}", stats.applied);
    println!("  unchanged:   {}", stats.unchanged);
    println!("  not ready:   {}", stats.not_ready);
    println!("  bodies +/-:  {} / {}", stats.added, stats.removed);
    println!("  raycasts:    {} ({} hits)", stats.raycasts, stats.raycast_hits);
    println!("═══════════════════════════════════════════════════════");
}
