//! Protocol-wide constants.
//!
//! Both sides size their regions from these, so changing one is a
//! protocol change.

/// Maximum number of rigid bodies the rigid-body region can hold.
pub const MAX_BODIES: usize = 10_000;

/// Words per rigid-body slot (one 4x4 column-major matrix).
pub const BODY_DATA_SIZE: usize = 16;

/// Words reserved at the front of the rigid-body region for control words.
pub const HEADER_LENGTH: usize = 10;

/// Default fixed simulation timestep in seconds (60Hz).
pub const DEFAULT_TIMESTEP: f32 = 1.0 / 60.0;

/// Default maximum number of fixed substeps per tick.
pub const DEFAULT_MAX_SUB_STEPS: u32 = 4;

/// Default solver iteration count.
pub const DEFAULT_SOLVER_ITERATIONS: u32 = 10;

/// Default contact epsilon.
pub const DEFAULT_EPSILON: f32 = 1e-5;

/// Elapsed wall time per tick is clamped to this (milliseconds).
///
/// Keeps a suspended process from stepping a huge delta on resume.
pub const MAX_FRAME_DELTA_MS: f32 = 100.0;

/// Default capacity of the debug-draw region, in vertices.
pub const DEFAULT_DEBUG_VERTICES: usize = 100_000;

/// Largest index count that still fits a 16-bit index section.
pub const U16_INDEX_LIMIT: usize = 65_535;

/// Quantization grid used when welding vertices (1 / 100 000 units).
pub const WELD_PRECISION: f32 = 1e5;
