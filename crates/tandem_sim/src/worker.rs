//! # Simulation Worker
//!
//! Runs a [`SimulationDriver`] on its own thread.
//!
//! ```text
//! commands ──► recv_timeout(time until next tick) ──► driver.handle
//!                         │
//!                  tick due? ──► driver.tick ──► status snapshot
//! ```
//!
//! The tick timer is armed once the driver reaches RUNNING and cancelled
//! when it faults; after that commands are still drained and dropped.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendError, Sender, TrySendError};
use parking_lot::RwLock;
use tandem_core::{Command, Notification};

use crate::driver::{DriverState, SimulationDriver, TickOutcome};
use crate::dynamics::WorldFactory;
use crate::error::DriverError;
use crate::tick::{TickLoop, TickStats};

/// Snapshot of the worker, refreshed after every command and tick.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerStatus {
    /// Driver state.
    pub state: DriverState,
    /// Substep counter as last published.
    pub substep_counter: u32,
    /// Live rigid bodies.
    pub rigid_bodies: usize,
    /// Live soft bodies.
    pub soft_bodies: usize,
    /// Ticks run.
    pub ticks: u64,
    /// Ticks skipped because the consumer held the bundle.
    pub skipped_ticks: u64,
    /// Tick timing.
    pub tick_stats: TickStats,
    /// Fault reason once FAULTED.
    pub fault: Option<String>,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self {
            state: DriverState::Stopped,
            substep_counter: 0,
            rigid_bodies: 0,
            soft_bodies: 0,
            ticks: 0,
            skipped_ticks: 0,
            tick_stats: TickStats::default(),
            fault: None,
        }
    }
}

/// Handle to the simulation thread.
///
/// Dropping it stops the thread and joins it.
pub struct SimulationWorker {
    commands: Option<Sender<Command>>,
    status: Arc<RwLock<WorkerStatus>>,
    handle: Option<JoinHandle<()>>,
}

impl SimulationWorker {
    /// Spawns the worker with a command queue of `command_capacity`.
    ///
    /// # Errors
    ///
    /// Fails if the OS refuses the thread.
    pub fn spawn(
        factory: WorldFactory,
        command_capacity: usize,
        notifications: Sender<Notification>,
    ) -> std::io::Result<Self> {
        let (command_tx, command_rx) = bounded(command_capacity.max(1));
        let status = Arc::new(RwLock::new(WorkerStatus::default()));

        let worker_status = Arc::clone(&status);
        let handle = thread::Builder::new()
            .name("tandem-sim".to_owned())
            .spawn(move || {
                let driver = SimulationDriver::new(factory, notifications);
                Self::run(driver, &command_rx, &worker_status);
            })?;

        Ok(Self {
            commands: Some(command_tx),
            status,
            handle: Some(handle),
        })
    }

    /// Queues a command, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns the command if the worker is gone.
    pub fn send(&self, command: Command) -> Result<(), SendError<Command>> {
        match &self.commands {
            Some(tx) => tx.send(command),
            None => Err(SendError(command)),
        }
    }

    /// Queues a command without blocking.
    ///
    /// # Errors
    ///
    /// Returns the command if the queue is full or the worker is gone.
    pub fn try_send(&self, command: Command) -> Result<(), TrySendError<Command>> {
        match &self.commands {
            Some(tx) => tx.try_send(command),
            None => Err(TrySendError::Disconnected(command)),
        }
    }

    /// Latest status snapshot.
    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        self.status.read().clone()
    }

    /// Whether the thread is still running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the thread and waits for it.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.commands.take() {
            // a full queue still drains to a disconnect once `tx` drops
            let _ = tx.try_send(Command::Shutdown);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("simulation worker panicked");
            }
        }
    }

    /// Worker thread main loop.
    fn run(
        mut driver: SimulationDriver,
        commands: &Receiver<Command>,
        status: &RwLock<WorkerStatus>,
    ) {
        let mut tick_loop: Option<TickLoop> = None;
        let mut skipped_ticks = 0u64;

        loop {
            let received = match &tick_loop {
                Some(ticks) => commands.recv_timeout(ticks.time_until_next_tick()),
                None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => {
                    let kind = command.kind();
                    match driver.handle(command) {
                        Ok(()) | Err(DriverError::Faulted(_)) => {}
                        Err(err) => tracing::warn!(command = kind, error = %err, "command rejected"),
                    }
                    if tick_loop.is_none() && driver.state() == DriverState::Running {
                        tick_loop = Some(TickLoop::from_fixed_time_step(driver.fixed_time_step()));
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
            }

            if let Some(ticks) = tick_loop.as_mut() {
                if ticks.should_tick() {
                    let start = ticks.begin_tick();
                    let outcome = driver.tick(Instant::now());
                    ticks.end_tick(start);
                    match outcome {
                        TickOutcome::Skipped => skipped_ticks += 1,
                        TickOutcome::Faulted => {
                            tracing::info!("tick timer cancelled");
                            Self::publish_status(&driver, Some(&*ticks), skipped_ticks, status);
                            tick_loop = None;
                            continue;
                        }
                        TickOutcome::NotRunning | TickOutcome::Stepped { .. } => {}
                    }
                }
            }

            Self::publish_status(&driver, tick_loop.as_ref(), skipped_ticks, status);
        }

        tracing::info!(ticks = status.read().ticks, "simulation worker stopped");
    }

    fn publish_status(
        driver: &SimulationDriver,
        ticks: Option<&TickLoop>,
        skipped_ticks: u64,
        status: &RwLock<WorkerStatus>,
    ) {
        let mut s = status.write();
        s.state = driver.state();
        s.substep_counter = driver.substep_counter();
        s.rigid_bodies = driver.rigid_body_count();
        s.soft_bodies = driver.soft_body_count();
        s.skipped_ticks = skipped_ticks;
        if let Some(ticks) = ticks {
            s.ticks = ticks.tick_count();
            s.tick_stats = *ticks.stats();
        }
        if s.fault.is_none() {
            s.fault = driver.fault_reason().map(str::to_owned);
        }
    }
}

impl Drop for SimulationWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SimulationWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationWorker")
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam_channel::unbounded;
    use tandem_core::{buffer_channel, BufferProtocol};
    use tandem_shared::{BodyConfig, Mat4, ObjectId, ShapeDescriptor, Vec3, WorldConfig};

    use super::*;
    use crate::ballistic::BallisticWorld;

    #[test]
    fn test_worker_runs_and_stops() {
        let (tx, rx) = unbounded();
        let mut worker = SimulationWorker::spawn(BallisticWorld::factory(), 16, tx).unwrap();
        let (producer, mut consumer) = buffer_channel(BufferProtocol::SharedMemory, 8).unwrap();

        worker
            .send(Command::Init {
                world: WorldConfig::default(),
                buffers: producer,
                max_bodies: 8,
                simulation_speed: 1.0,
                max_frame_delta_ms: 100.0,
            })
            .unwrap();
        worker
            .send(Command::AddRigidBody {
                object: ObjectId(1),
                transform: Mat4::from_translation(Vec3::new(0.0, 10.0, 0.0)),
                shape: ShapeDescriptor::sphere(1.0),
                config: BodyConfig::default(),
            })
            .unwrap();

        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(Notification::Ready { .. })
        ));
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(Notification::RigidBodyReady { slot: 0, .. })
        ));

        // consume a few generations
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut consumed = 0;
        while consumed < 3 && Instant::now() < deadline {
            if let Some(guard) = consumer.try_acquire() {
                guard.release();
                consumed += 1;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(consumed, 3);

        let status = worker.status();
        assert_eq!(status.state, DriverState::Running);
        assert_eq!(status.rigid_bodies, 1);

        worker.shutdown();
        assert!(!worker.is_alive());
        assert!(worker.send(Command::Shutdown).is_err());
    }

    #[test]
    fn test_dropping_worker_joins_thread() {
        let (tx, _rx) = unbounded();
        let worker = SimulationWorker::spawn(BallisticWorld::factory(), 4, tx).unwrap();
        drop(worker);
    }
}
