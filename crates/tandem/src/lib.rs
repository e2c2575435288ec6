//! # Tandem
//!
//! A physics simulation ticking on its own thread, observed by a render loop
//! that never waits for it.
//!
//! - [`SimulationSession`] owns the worker, the render sync and every table
//! - [`SessionConfig`] loads from TOML with defaults for everything
//! - [`RaycastTicket`] resolves exactly once, or reports cancellation
//!
//! ## Example
//!
//! ```rust,ignore
//! use tandem::{SessionConfig, SimulationSession};
//!
//! let mut session = SimulationSession::start(SessionConfig::default())?;
//! session.wait_ready(Duration::from_secs(1))?;
//!
//! let ball = session.new_object_id();
//! session.add_rigid_body(ball, SceneNode::at(Vec3::new(0.0, 10.0, 0.0)), shape, config)?;
//!
//! loop {
//!     session.sync_frame()?;
//!     draw(session.node(ball));
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod requests;
pub mod session;

pub use config::{ProtocolChoice, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use requests::{RaycastTicket, RequestBus};
pub use session::SimulationSession;

pub use tandem_render::{DebugGeometry, DebugLines, FrameSync, PerformanceInfo, SceneNode, SoftMesh};
