//! # Topology Mapper
//!
//! Turns a visual mesh into the welded topology the deformable solver needs
//! and keeps the scatter map that fans results back out to the visual mesh.
//!
//! Ropes skip welding: their vertices map 1:1.

mod mesh;
mod weld;

pub use mesh::VisualMesh;
pub use weld::{scatter, weld, weld_mesh, WeldedTopology};
