use crate::render::frustum::Sphere;

/// Globally unique pool id, handed out by the pool registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(pub u32);

/// The vertex/index sub-range one batch occupies inside a pool.
///
/// Ranges are half-open. The culling sphere is in the pool's local,
/// origin-relative space. Hand it back to the manager to free the range.
/// A placement stays tied to the insert that produced it: once freed, a
/// later batch landing on the same offsets is a different placement.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolLocation {
    pool_id: PoolId,
    vertices_start: u32,
    vertices_end: u32,
    indices_start: u32,
    indices_end: u32,
    cull_sphere: Sphere,
    /// Per-pool insert counter.
    serial: u64,
}

impl PoolLocation {
    pub(crate) fn new(
        pool_id: PoolId,
        vertices: (u32, u32),
        indices: (u32, u32),
        cull_sphere: Sphere,
        serial: u64,
    ) -> Self {
        Self {
            pool_id,
            vertices_start: vertices.0,
            vertices_end: vertices.0 + vertices.1,
            indices_start: indices.0,
            indices_end: indices.0 + indices.1,
            cull_sphere,
            serial,
        }
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub fn vertices_start(&self) -> u32 {
        self.vertices_start
    }

    pub fn vertices_end(&self) -> u32 {
        self.vertices_end
    }

    pub fn indices_start(&self) -> u32 {
        self.indices_start
    }

    pub fn indices_end(&self) -> u32 {
        self.indices_end
    }

    pub fn vertices_count(&self) -> u32 {
        self.vertices_end - self.vertices_start
    }

    pub fn indices_count(&self) -> u32 {
        self.indices_end - self.indices_start
    }

    pub fn cull_sphere(&self) -> &Sphere {
        &self.cull_sphere
    }

    /// Same placement: same pool and same insert.
    pub(crate) fn same_slot(&self, other: &PoolLocation) -> bool {
        self.pool_id == other.pool_id && self.serial == other.serial
    }
}
