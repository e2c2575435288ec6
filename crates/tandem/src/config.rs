//! Session configuration, loaded once at startup.
//!
//! ```toml
//! protocol = "shared_memory"
//! max_bodies = 512
//!
//! [world]
//! fixed_time_step = 0.008333
//! gravity = { x = 0.0, y = -9.8, z = 0.0 }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tandem_core::BufferProtocol;
use tandem_shared::constants::{DEFAULT_DEBUG_VERTICES, MAX_BODIES, MAX_FRAME_DELTA_MS};
use tandem_shared::{Vec3, WorldConfig};

use crate::error::{SessionError, SessionResult};

/// Which handoff protocol to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolChoice {
    /// Shared memory when the platform has 32-bit atomics.
    #[default]
    Auto,
    /// Always shared memory.
    SharedMemory,
    /// Always ownership transfer.
    TransferOwnership,
}

impl ProtocolChoice {
    /// Concrete protocol for this platform.
    #[must_use]
    pub const fn resolve(self) -> BufferProtocol {
        match self {
            Self::Auto => BufferProtocol::detect(),
            Self::SharedMemory => BufferProtocol::SharedMemory,
            Self::TransferOwnership => BufferProtocol::TransferOwnership,
        }
    }
}

/// Everything a session needs before INIT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// World settings sent with INIT.
    pub world: WorldConfig,
    /// Handoff protocol.
    pub protocol: ProtocolChoice,
    /// Rigid-body slots.
    pub max_bodies: usize,
    /// Elapsed-time clamp per tick, in milliseconds.
    pub max_frame_delta_ms: f32,
    /// Initial speed factor.
    pub simulation_speed: f32,
    /// Debug-line vertex capacity.
    pub debug_buffer_vertices: usize,
    /// Bounded command queue length.
    pub command_capacity: usize,
    /// Bounded notification queue length.
    pub notification_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            protocol: ProtocolChoice::Auto,
            max_bodies: MAX_BODIES,
            max_frame_delta_ms: MAX_FRAME_DELTA_MS,
            simulation_speed: 1.0,
            debug_buffer_vertices: DEFAULT_DEBUG_VERTICES,
            command_capacity: 1024,
            notification_capacity: 1024,
        }
    }
}

impl SessionConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Malformed TOML or values that fail [`validate`](Self::validate).
    pub fn from_toml_str(source: &str) -> SessionResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// I/O failure, malformed TOML or invalid values.
    pub fn from_toml_file(path: impl AsRef<Path>) -> SessionResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`SessionError::Config`] naming the first bad field.
    pub fn validate(&self) -> SessionResult<()> {
        let step = self.world.fixed_time_step;
        if !step.is_finite() || step <= 0.0 {
            return Err(SessionError::Config(format!(
                "world.fixed_time_step must be positive, got {step}"
            )));
        }
        if self.max_bodies == 0 || self.max_bodies > MAX_BODIES {
            return Err(SessionError::Config(format!(
                "max_bodies must be in 1..={MAX_BODIES}, got {}",
                self.max_bodies
            )));
        }
        if !self.max_frame_delta_ms.is_finite() || self.max_frame_delta_ms <= 0.0 {
            return Err(SessionError::Config(format!(
                "max_frame_delta_ms must be positive, got {}",
                self.max_frame_delta_ms
            )));
        }
        if !self.simulation_speed.is_finite() || self.simulation_speed < 0.0 {
            return Err(SessionError::Config(format!(
                "simulation_speed must be non-negative, got {}",
                self.simulation_speed
            )));
        }
        if self.debug_buffer_vertices == 0 {
            return Err(SessionError::Config("debug_buffer_vertices must be non-zero".into()));
        }
        if self.command_capacity == 0 || self.notification_capacity == 0 {
            return Err(SessionError::Config("channel capacities must be non-zero".into()));
        }
        Ok(())
    }

    /// Sets gravity.
    #[must_use]
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.world.gravity = gravity;
        self
    }

    /// Sets the fixed substep length (also the tick interval).
    #[must_use]
    pub fn with_fixed_time_step(mut self, seconds: f32) -> Self {
        self.world.fixed_time_step = seconds;
        self
    }

    /// Sets the substep cap per tick.
    #[must_use]
    pub fn with_max_sub_steps(mut self, max_sub_steps: u32) -> Self {
        self.world.max_sub_steps = max_sub_steps;
        self
    }

    /// Forces a protocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: ProtocolChoice) -> Self {
        self.protocol = protocol;
        self
    }

    /// Sets the rigid-body slot count.
    #[must_use]
    pub fn with_max_bodies(mut self, max_bodies: usize) -> Self {
        self.max_bodies = max_bodies;
        self
    }

    /// Sets the initial speed factor.
    #[must_use]
    pub fn with_simulation_speed(mut self, speed: f32) -> Self {
        self.simulation_speed = speed;
        self
    }

    /// Sets the debug-line vertex capacity.
    #[must_use]
    pub fn with_debug_buffer_vertices(mut self, vertices: usize) -> Self {
        self.debug_buffer_vertices = vertices;
        self
    }
}
