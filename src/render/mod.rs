//! GPU plumbing: surface management and the solid-color mesh pipeline.

pub mod gpu;
pub mod mesh_renderer;

pub use gpu::Gpu;
pub use mesh_renderer::{DrawBatch, MeshRenderer};
