//! Rendering-related modules
//! Contains the graphics backend boundary, vertex layouts, frustum culling, and the headless and wgpu backends.

pub mod backend;
pub mod frustum;
pub mod headless;
pub mod layout;
pub mod wgpu_backend;

// Re-export commonly used types
pub use backend::{GraphicsBackend, MatrixSwap, MeshAllocation, MeshHandle, UploadRange};
pub use frustum::{AABB, CullMode, Frustum, FrustumCuller, Sphere, extract_frustum_planes};
pub use headless::HeadlessBackend;
pub use layout::AttributeLayout;
pub use wgpu_backend::WgpuBackend;
