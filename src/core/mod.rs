//! Core data structures for batch geometry.
//! Contains the CPU-side geometry buffer and facing tags.

pub mod facing;
pub mod mesh;

// Re-export commonly used types
pub use facing::Facing;
pub use mesh::{CustomChannel, DrawMode, MeshData, MeshDataRecycler, ModelTransform, VertexFlags};
