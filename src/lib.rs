// Core module with geometry buffers
pub mod core;

// Render module with the graphics backend boundary and culling
pub mod render;

// Pool module with placement, packing and batched drawing
pub mod pool;

// Worker-thread mesh building
pub mod loader;

// Other modules
pub mod constants;
pub mod utils;

// Re-exports
pub use constants::*;
pub use crate::core::{Facing, MeshData, MeshDataRecycler};
pub use loader::{MeshBuildQueue, MeshBuildResult};
pub use pool::{
    FrameContext, FrameMatrices, MeshDataPool, MeshDataPoolManager, MeshDataPoolMasterManager,
    PoolId, PoolLocation, PoolRegion, PoolStats, Region, SubworldController,
};
pub use render::{
    AABB, AttributeLayout, CullMode, Frustum, FrustumCuller, GraphicsBackend, HeadlessBackend,
    Sphere, WgpuBackend,
};
pub use utils::{PoolSettings, SettingsError};
