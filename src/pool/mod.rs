//! Pooled GPU storage for many small batches.
//! Contains placements, pools, per-layout managers, and the master registry.

pub mod location;
pub mod manager;
pub mod master;
#[allow(clippy::module_inception)]
pub mod pool;
pub mod region;

// Re-export commonly used types
pub use location::{PoolId, PoolLocation};
pub use manager::{FrameContext, MeshDataPoolManager, PoolStats};
pub use master::{FrameMatrices, ManagerId, MeshDataPoolMasterManager, PoolRegistry};
pub use pool::MeshDataPool;
pub use region::{PoolRegion, Region, SubworldController};
