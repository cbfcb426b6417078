//! # shape-graph
//!
//! Retained-mode shape scene graph.
//!
//! Shapes are authored into an arena of nodes, tessellated into fill, line
//! and point streams, packed into the combined buffers of their root and drawn
//! in as few calls as the tree allows. Rendering goes through the
//! [`GpuBackend`] trait; `shape-graph-wgpu` provides the real backend and
//! [`RecordingBackend`] an in-memory one.

mod aggregate;
mod buffers;
mod color;
mod config;
mod curve;
mod error;
mod input;
mod node;
mod primitives;
mod recording;
mod render;
mod scene;
mod style;
mod tess_geometry;
mod tessellate;
mod update_cache;

pub use buffers::*;
pub use color::*;
pub use config::*;
pub use curve::*;
pub use error::*;
pub use input::*;
pub use node::*;
pub use primitives::*;
pub use recording::*;
pub use scene::*;
pub use style::*;
pub use tess_geometry::*;
pub use tessellate::*;
pub use update_cache::*;
