//! # Tandem Render
//!
//! The consumer side: once per render frame, take the published generation
//! if there is one, write it into the scene, and hand it back.
//!
//! - [`Transformable`], [`Deformable`] and [`DebugGeometry`] are the scene seams
//! - [`RenderSync`] owns the consumer end and the tracked objects
//! - [`SceneNode`], [`SoftMesh`] and [`DebugLines`] are headless scene objects
//!
//! ## Example
//!
//! ```rust,ignore
//! use tandem_render::{FrameSync, RenderSync, SceneNode, SoftMesh};
//!
//! let mut sync: RenderSync<SceneNode, SoftMesh> = RenderSync::new(consumer);
//! sync.track_rigid(id, SceneNode::default(), true);
//!
//! loop {
//!     if let FrameSync::Applied { .. } = sync.sync_frame() {
//!         // draw
//!     }
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod scene;
pub mod sync;

pub use scene::{DebugGeometry, DebugLines, Deformable, SceneNode, SoftMesh, Transformable};
pub use sync::{FrameSync, PerformanceInfo, RenderSync};
