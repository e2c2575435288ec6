//! End-to-end session behavior against the ballistic world on a live worker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tandem::{
    DebugGeometry, FrameSync, ProtocolChoice, SceneNode, SessionConfig, SessionError,
    SimulationSession,
};
use tandem_core::VisualMesh;
use tandem_shared::{
    BodyConfig, BodyType, Mat4, ObjectId, RaycastOptions, ShapeDescriptor, SoftBodyAnchor,
    SoftBodyConfig, SoftBodyKind, Vec3,
};

const WAIT: Duration = Duration::from_secs(5);

fn start(protocol: ProtocolChoice) -> SimulationSession {
    let config = SessionConfig::default()
        .with_max_bodies(64)
        .with_protocol(protocol);
    let mut session = SimulationSession::start(config).unwrap();
    session.wait_ready(WAIT).unwrap();
    session
}

/// Runs render frames until `done` holds.
fn frames_until(session: &mut SimulationSession, mut done: impl FnMut(&SimulationSession) -> bool) {
    let deadline = Instant::now() + WAIT;
    while !done(session) {
        assert!(Instant::now() < deadline, "condition not reached in time");
        session.sync_frame().unwrap();
        thread::sleep(Duration::from_millis(2));
    }
}

fn static_config() -> BodyConfig {
    BodyConfig {
        body_type: BodyType::Static,
        ..BodyConfig::default()
    }
}

#[test]
fn test_falling_body_reaches_the_scene_under_both_protocols() {
    for protocol in [ProtocolChoice::SharedMemory, ProtocolChoice::TransferOwnership] {
        let mut session = start(protocol);
        let ball = session.new_object_id();
        session
            .add_rigid_body(
                ball,
                SceneNode::at(Vec3::new(0.0, 10.0, 0.0)),
                ShapeDescriptor::sphere(0.5),
                BodyConfig::default(),
            )
            .unwrap();

        frames_until(&mut session, |s| {
            s.node(ball).is_some_and(|node| node.position.y < 9.9)
        });
        assert_eq!(session.slot_of(ball), Some(0));
        assert!(session.performance().frames_applied > 0);
    }
}

#[test]
fn test_parented_node_receives_local_transform() {
    let mut session = start(ProtocolChoice::SharedMemory);
    let parent = Mat4::from_translation(Vec3::new(100.0, 0.0, 0.0));
    let ball = session.new_object_id();
    // world position (100, 5, 0), local (0, 5, 0)
    session
        .add_rigid_body(
            ball,
            SceneNode::at(Vec3::new(0.0, 5.0, 0.0)).with_parent(parent),
            ShapeDescriptor::sphere(0.5),
            static_config(),
        )
        .unwrap();
    let dropped = session.new_object_id();
    session
        .add_rigid_body(
            dropped,
            SceneNode::at(Vec3::new(1.0, 1.0, 1.0)),
            ShapeDescriptor::sphere(0.5),
            BodyConfig::default(),
        )
        .unwrap();

    frames_until(&mut session, |s| s.node(dropped).is_some_and(|n| n.updates > 0));
    // static bodies stay under scene control
    let node = session.node(ball).unwrap();
    assert_eq!(node.updates, 0);
    assert_eq!(node.position, Vec3::new(0.0, 5.0, 0.0));
}

#[test]
fn test_dynamic_parented_body_stays_in_parent_space() {
    let config = SessionConfig::default()
        .with_max_bodies(8)
        .with_gravity(Vec3::ZERO);
    let mut session = SimulationSession::start(config).unwrap();
    session.wait_ready(WAIT).unwrap();
    let parent = Mat4::from_translation(Vec3::new(100.0, 0.0, 0.0));
    let ball = session.new_object_id();
    session
        .add_rigid_body(
            ball,
            SceneNode::at(Vec3::new(0.0, 5.0, 0.0)).with_parent(parent),
            ShapeDescriptor::sphere(0.5),
            BodyConfig::default(),
        )
        .unwrap();

    // weightless: every written frame carries the registration transform
    frames_until(&mut session, |s| s.node(ball).is_some_and(|n| n.updates > 0));
    let node = session.node(ball).unwrap();
    assert!((node.position.x - 0.0).abs() < 1e-3);
    assert!((node.position.y - 5.0).abs() < 1e-3);
    assert!((node.world_matrix().translation().x - 100.0).abs() < 1e-3);
}

#[test]
fn test_raycast_hits_and_removed_target_resolves_empty() {
    let mut session = start(ProtocolChoice::SharedMemory);
    let target = session.new_object_id();
    session
        .add_rigid_body(
            target,
            SceneNode::default(),
            ShapeDescriptor {
                margin: 0.0,
                ..ShapeDescriptor::sphere(1.0)
            },
            static_config(),
        )
        .unwrap();

    let mut ticket = session
        .raycast(Vec3::new(0.0, 10.0, 0.0), Vec3::new(0.0, -1.0, 0.0), RaycastOptions::default())
        .unwrap();
    let hits = session.wait_for_raycast(&mut ticket, WAIT).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].object, target);
    // surface of the unit sphere, no collision margin
    assert!((hits[0].position.y - 1.0).abs() < 1e-4);

    // the world still answers with the body; the session drops the stale hit
    let mut ticket = session
        .raycast(Vec3::new(0.0, 10.0, 0.0), Vec3::new(0.0, -1.0, 0.0), RaycastOptions::default())
        .unwrap();
    session.remove_rigid_body(target).unwrap();
    let hits = session.wait_for_raycast(&mut ticket, WAIT).unwrap();
    assert!(hits.is_empty());
    assert_eq!(session.pending_requests(), 0);
}

#[test]
fn test_cloth_scatter_keeps_seam_vertices_together() {
    for protocol in [ProtocolChoice::SharedMemory, ProtocolChoice::TransferOwnership] {
        cloth_scatter(protocol);
    }
}

fn cloth_scatter(protocol: ProtocolChoice) {
    let mut session = start(protocol);

    // two triangles as a soup: the shared edge is duplicated in the visual mesh
    let soup = vec![
        0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, //
        1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0,
    ];
    let cloth = session.new_object_id();
    session
        .add_soft_body(
            cloth,
            VisualMesh::soup(soup),
            &Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0)),
            SoftBodyConfig {
                anchors: vec![SoftBodyAnchor::World { node_index: 0 }],
                ..SoftBodyConfig::default()
            },
        )
        .unwrap();

    // re-indexing merged the seam: four distinct visual vertices remain
    assert_eq!(session.soft_mesh(cloth).unwrap().positions.len(), 12);

    frames_until(&mut session, |s| {
        s.soft_mesh(cloth)
            .is_some_and(|m| m.version > 0 && m.positions[4] < 4.9)
    });
    let mesh = session.soft_mesh(cloth).unwrap();
    // pinned node stays at its baked position
    assert!(mesh.positions[0].abs() < 1e-4);
    assert!((mesh.positions[1] - 5.0).abs() < 1e-4);
    assert!(mesh.positions[2].abs() < 1e-4);
}

#[test]
fn test_rope_hangs_from_its_anchor_body() {
    let mut session = start(ProtocolChoice::TransferOwnership);
    let post = session.new_object_id();
    session
        .add_rigid_body(
            post,
            SceneNode::at(Vec3::new(0.0, 10.0, 0.0)),
            ShapeDescriptor::sphere(0.1),
            static_config(),
        )
        .unwrap();

    let positions: Vec<f32> = (0..6).flat_map(|i| [0.0, 10.0 - i as f32, 0.0]).collect();
    let rope = session.new_object_id();
    session
        .add_soft_body(
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
        .unwrap();

    frames_until(&mut session, |s| {
        s.soft_mesh(rope)
            .is_some_and(|m| m.version > 0 && m.positions[16] < 4.9)
    });
    let mesh = session.soft_mesh(rope).unwrap();
    assert!((mesh.positions[1] - 10.0).abs() < 1e-4);
    assert!(mesh.normals.is_none());
}

/// Remembers how many vertices the last debug update carried.
struct DrawCounter(Arc<AtomicUsize>);

impl DebugGeometry for DrawCounter {
    fn update(&mut self, positions: &[f32], _colors: &[f32]) {
        self.0.store(positions.len() / 3, Ordering::Relaxed);
    }
}

#[test]
fn test_debug_lines_travel_with_the_bundle() {
    for protocol in [ProtocolChoice::SharedMemory, ProtocolChoice::TransferOwnership] {
        let mut session = start(protocol);
        let ball = session.new_object_id();
        session
            .add_rigid_body(
                ball,
                SceneNode::at(Vec3::new(0.0, 10.0, 0.0)),
                ShapeDescriptor::sphere(0.5),
                BodyConfig::default(),
            )
            .unwrap();

        let drawn = Arc::new(AtomicUsize::new(0));
        session
            .enable_debug(Box::new(DrawCounter(Arc::clone(&drawn))))
            .unwrap();
        frames_until(&mut session, |_| drawn.load(Ordering::Relaxed) > 0);
        // one body: three axis lines
        assert_eq!(drawn.load(Ordering::Relaxed), 6);
        assert!(session.disable_debug().unwrap().is_some());
    }
}

#[test]
fn test_rejected_registration_is_forgotten() {
    let mut session = start(ProtocolChoice::SharedMemory);
    let bad = session.new_object_id();
    session
        .add_rigid_body(
            bad,
            SceneNode::default(),
            ShapeDescriptor::sphere(f32::NAN),
            BodyConfig::default(),
        )
        .unwrap();
    assert_eq!(session.rigid_body_count(), 1);

    session
        .wait_until("REGISTRATION_FAILED", WAIT, |s| s.rigid_body_count() == 0)
        .unwrap();
    let failures = session.take_registration_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, bad);
    assert!(session.node(bad).is_none());
}

#[test]
fn test_fault_is_terminal() {
    let mut session = start(ProtocolChoice::SharedMemory);
    let ball = session.new_object_id();
    session
        .add_rigid_body(
            ball,
            SceneNode::default(),
            ShapeDescriptor::sphere(0.5),
            BodyConfig::default(),
        )
        .unwrap();
    session
        .set_linear_velocity(ball, Vec3::new(f32::NAN, 0.0, 0.0))
        .unwrap();

    let deadline = Instant::now() + WAIT;
    let reason = loop {
        assert!(Instant::now() < deadline, "no fault reported");
        match session.sync_frame() {
            Ok(_) => thread::sleep(Duration::from_millis(2)),
            Err(SessionError::Faulted(reason)) => break reason,
            Err(other) => panic!("unexpected error: {other}"),
        }
    };
    assert!(!reason.is_empty());
    assert_eq!(session.fault(), Some(reason.as_str()));

    let next = session.new_object_id();
    assert!(matches!(
        session.add_rigid_body(next, SceneNode::default(), ShapeDescriptor::sphere(0.5), BodyConfig::default()),
        Err(SessionError::Faulted(_))
    ));
    assert!(matches!(
        session.raycast(Vec3::ZERO, Vec3::Y, RaycastOptions::default()),
        Err(SessionError::Faulted(_))
    ));
    // removals stay safe after a fault
    assert!(session.remove_rigid_body(ball).unwrap().is_some());
}

#[test]
fn test_tiny_queues_never_deadlock() {
    let config = SessionConfig {
        command_capacity: 1,
        notification_capacity: 1,
        ..SessionConfig::default().with_max_bodies(128)
    };
    let mut session = SimulationSession::start(config).unwrap();
    session.wait_ready(WAIT).unwrap();

    let ids: Vec<ObjectId> = (0..128).map(|_| session.new_object_id()).collect();
    for (i, &id) in ids.iter().enumerate() {
        session
            .add_rigid_body(
                id,
                SceneNode::at(Vec3::new(i as f32, 0.0, 0.0)),
                ShapeDescriptor::sphere(0.25),
                static_config(),
            )
            .unwrap();
    }

    frames_until(&mut session, |s| ids.iter().all(|&id| s.slot_of(id).is_some()));
    let mut slots: Vec<usize> = ids.iter().filter_map(|&id| session.slot_of(id)).collect();
    slots.sort_unstable();
    slots.dedup();
    assert_eq!(slots.len(), 128);
}

#[test]
fn test_paused_simulation_reports_unchanged_frames() {
    let mut session = start(ProtocolChoice::SharedMemory);
    let ball = session.new_object_id();
    session
        .add_rigid_body(
            ball,
            SceneNode::at(Vec3::new(0.0, 3.0, 0.0)),
            ShapeDescriptor::sphere(0.5),
            BodyConfig::default(),
        )
        .unwrap();
    frames_until(&mut session, |s| s.node(ball).is_some_and(|n| n.updates > 0));

    session.set_simulation_speed(0.0).unwrap();
    // let the speed change land, then a paused generation must not move anything
    thread::sleep(Duration::from_millis(100));
    while session.sync_frame().unwrap() != FrameSync::NotReady {}
    let y = session.node(ball).unwrap().position.y;

    let deadline = Instant::now() + Duration::from_millis(300);
    while Instant::now() < deadline {
        session.sync_frame().unwrap();
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(session.node(ball).unwrap().position.y, y);
}
