//! # Tandem Sim
//!
//! The producer side: a dynamics world stepped at a fixed cadence on its own
//! thread, publishing transforms and soft-body vertices through the buffer
//! channel.
//!
//! - [`DynamicsWorld`] is the only seam to a physics engine
//! - [`BallisticWorld`] is a small deterministic engine for demos and tests
//! - [`SimulationDriver`] is the STOPPED → RUNNING → FAULTED state machine
//! - [`SimulationWorker`] runs the driver and its [`TickLoop`] on a thread
//!
//! ## Example
//!
//! ```rust,ignore
//! use tandem_sim::{BallisticWorld, SimulationWorker};
//!
//! let (events_tx, events_rx) = crossbeam_channel::unbounded();
//! let worker = SimulationWorker::spawn(BallisticWorld::factory(), 256, events_tx)?;
//! worker.send(Command::Init { .. })?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod ballistic;
pub mod driver;
pub mod dynamics;
pub mod error;
pub mod tick;
pub mod worker;

pub use ballistic::BallisticWorld;
pub use driver::{DriverState, SimulationDriver, TickOutcome};
pub use dynamics::{DynamicsWorld, WorldFactory};
pub use error::{DriverError, DriverResult, DynamicsError, DynamicsResult};
pub use tick::{TickLoop, TickStats};
pub use worker::{SimulationWorker, WorkerStatus};
