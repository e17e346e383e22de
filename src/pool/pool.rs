//! One fixed-capacity vertex/index buffer pair packed with many batches.
//!
//! Placements are kept sorted by offset. New batches are appended at the
//! cursor, or squeezed into the first interior gap that fits once enough of
//! the used span is wasted. Removing the tail placement retracts the cursor;
//! removing anything else leaves a gap for a later squeeze-insert.

use glam::{IVec3, Vec3};

use crate::core::mesh::MeshData;
use crate::pool::location::{PoolId, PoolLocation};
use crate::pool::region::{PoolRegion, Region};
use crate::render::backend::{GraphicsBackend, MeshAllocation, MeshHandle, UploadRange};
use crate::render::frustum::{CullMode, FrustumCuller, Sphere};
use crate::render::layout::AttributeLayout;
use crate::utils::settings::PoolSettings;

pub struct MeshDataPool {
    id: PoolId,
    mesh: MeshHandle,
    vertex_stride: u32,

    vertices_capacity: u32,
    indices_capacity: u32,
    /// Append cursor, always the end of the last placement.
    vertices_position: u32,
    indices_position: u32,

    /// Sorted by ascending offset, never overlapping.
    locations: Vec<PoolLocation>,
    max_parts: usize,
    next_serial: u64,

    /// Set by the first placement, never changed afterwards.
    origin: Option<IVec3>,
    region: PoolRegion,
    max_origin_distance_sq: f64,

    fragmentation_threshold: f32,
    current_fragmentation: f32,

    // Draw ranges of the current frame: index-buffer byte offsets and index counts
    draw_starts: Vec<u32>,
    draw_lengths: Vec<u32>,
    rendered_triangles: u64,
    allocated_triangles: u64,
}

impl MeshDataPool {
    /// Allocates the GPU buffer pair and an empty pool over it.
    pub fn allocate<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        id: PoolId,
        layout: &AttributeLayout,
        vertices_capacity: u32,
        indices_capacity: u32,
        region: PoolRegion,
        settings: &PoolSettings,
    ) -> Self {
        let mesh = backend.allocate_empty_mesh(&MeshAllocation {
            vertex_capacity: vertices_capacity,
            index_capacity: indices_capacity,
            layout: layout.clone(),
        });
        Self {
            id,
            mesh,
            vertex_stride: layout.vertex_stride(),
            vertices_capacity,
            indices_capacity,
            vertices_position: 0,
            indices_position: 0,
            locations: Vec::new(),
            max_parts: settings.max_parts_per_pool,
            next_serial: 0,
            origin: None,
            region,
            max_origin_distance_sq: settings.max_origin_distance_sq(),
            fragmentation_threshold: settings.fragmentation_threshold,
            current_fragmentation: 0.0,
            draw_starts: Vec::new(),
            draw_lengths: Vec::new(),
            rendered_triangles: 0,
            allocated_triangles: 0,
        }
    }

    /// Packs `data` into this pool.
    ///
    /// On success the buffer's indices are rewritten to absolute positions
    /// and its positions rebased onto the pool origin, then it is uploaded.
    /// Returns `None`, leaving `data` untouched, when the pool is full, in
    /// another region, or too far away.
    pub fn try_add<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        data: &mut MeshData,
        origin: IVec3,
        region: Region,
        cull_sphere: Sphere,
    ) -> Option<PoolLocation> {
        if self.locations.len() >= self.max_parts || region != self.region.tag() {
            return None;
        }
        let vcount = u32::try_from(data.vertices_count()).ok()?;
        let icount = u32::try_from(data.indices_count()).ok()?;
        if (vcount == 0 && icount == 0)
            || vcount > self.vertices_capacity
            || icount > self.indices_capacity
        {
            return None;
        }

        let pool_origin = self.origin.unwrap_or(origin);
        let d = (origin - pool_origin).as_i64vec3();
        let dist_sq = (d.x * d.x + d.y * d.y + d.z * d.z) as f64;
        if dist_sq > self.max_origin_distance_sq {
            return None;
        }

        let mut slot = None;
        if self.current_fragmentation > self.fragmentation_threshold {
            slot = self.find_gap(vcount, icount);
        }
        if slot.is_none()
            && self.vertices_position as u64 + vcount as u64 <= self.vertices_capacity as u64
            && self.indices_position as u64 + icount as u64 <= self.indices_capacity as u64
        {
            slot = Some((self.locations.len(), self.vertices_position, self.indices_position));
        }
        let (at, vstart, istart) = slot?;

        for index in data.indices_mut() {
            *index += vstart;
        }
        let delta = (origin - pool_origin).as_vec3();
        data.translate(delta);

        backend.update_mesh(
            self.mesh,
            data,
            UploadRange {
                vertex_offset: vstart,
                index_offset: istart,
            },
        );

        let location = PoolLocation::new(
            self.id,
            (vstart, vcount),
            (istart, icount),
            cull_sphere.translated(delta),
            self.next_serial,
        );
        self.next_serial += 1;
        self.locations.insert(at, location.clone());
        if at == self.locations.len() - 1 {
            self.vertices_position = location.vertices_end();
            self.indices_position = location.indices_end();
        }
        self.origin = Some(pool_origin);
        self.update_stats();

        tracing::trace!(
            pool = self.id.0,
            vstart,
            vcount,
            squeezed = at + 1 < self.locations.len(),
            "placed batch"
        );
        Some(location)
    }

    /// First interior gap that holds `vcount`/`icount`: the insertion index
    /// and the start offsets.
    fn find_gap(&self, vcount: u32, icount: u32) -> Option<(usize, u32, u32)> {
        let mut prev_v = 0;
        let mut prev_i = 0;
        for (i, loc) in self.locations.iter().enumerate() {
            if loc.vertices_start() - prev_v >= vcount && loc.indices_start() - prev_i >= icount {
                return Some((i, prev_v, prev_i));
            }
            prev_v = loc.vertices_end();
            prev_i = loc.indices_end();
        }
        None
    }

    /// Frees a placement.
    ///
    /// # Panics
    /// If `location` belongs to another pool or is not resident here.
    pub fn remove_location(&mut self, location: &PoolLocation) {
        assert_eq!(
            location.pool_id(),
            self.id,
            "placement {:?} removed from pool {:?}",
            location,
            self.id
        );
        let Some(pos) = self.locations.iter().position(|l| l.same_slot(location)) else {
            panic!(
                "placement {:?} is not resident in pool {:?}",
                location, self.id
            );
        };
        let removed = self.locations.remove(pos);

        if removed.vertices_end() == self.vertices_position
            && removed.indices_end() == self.indices_position
        {
            let (v, i) = self
                .locations
                .last()
                .map(|l| (l.vertices_end(), l.indices_end()))
                .unwrap_or((0, 0));
            self.vertices_position = v;
            self.indices_position = i;
        }
        self.update_stats();
    }

    fn update_stats(&mut self) {
        let mut gaps = 0u64;
        let mut prev = 0u32;
        let mut indices = 0u64;
        for loc in &self.locations {
            gaps += (loc.vertices_start() - prev) as u64;
            prev = loc.vertices_end();
            indices += loc.indices_count() as u64;
        }
        self.current_fragmentation = if self.vertices_position == 0 {
            0.0
        } else {
            gaps as f32 / self.vertices_position as f32
        };
        self.allocated_triangles = indices / 3;
    }

    /// Rebuilds this frame's draw ranges from placements whose sphere,
    /// shifted by `origin_offset` into camera-relative space, passes `culler`.
    pub fn frustum_cull<C: FrustumCuller + ?Sized>(
        &mut self,
        culler: &C,
        origin_offset: Vec3,
        mode: CullMode,
    ) {
        self.draw_starts.clear();
        self.draw_lengths.clear();
        self.rendered_triangles = 0;

        for loc in &self.locations {
            let sphere = loc.cull_sphere().translated(origin_offset);
            if mode == CullMode::ForceAllVisible || culler.sphere_in_frustum(&sphere, mode) {
                self.draw_starts
                    .push(loc.indices_start() * std::mem::size_of::<u32>() as u32);
                self.draw_lengths.push(loc.indices_count());
                self.rendered_triangles += loc.indices_count() as u64 / 3;
            }
        }
    }

    /// Marks every placement visible without testing.
    pub fn set_fully_visible(&mut self) {
        self.draw_starts.clear();
        self.draw_lengths.clear();
        self.rendered_triangles = 0;
        for loc in &self.locations {
            self.draw_starts
                .push(loc.indices_start() * std::mem::size_of::<u32>() as u32);
            self.draw_lengths.push(loc.indices_count());
            self.rendered_triangles += loc.indices_count() as u64 / 3;
        }
    }

    /// Issues one multi-range draw for the visible placements. Returns false
    /// (and draws nothing) when none survived culling.
    pub fn draw<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) -> bool {
        if self.draw_starts.is_empty() {
            return false;
        }
        backend.render_mesh(self.mesh, &self.draw_starts, &self.draw_lengths);
        true
    }

    /// Releases the GPU buffers.
    pub fn dispose<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        backend.delete_mesh(self.mesh);
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn mesh(&self) -> MeshHandle {
        self.mesh
    }

    pub fn origin(&self) -> Option<IVec3> {
        self.origin
    }

    pub fn region(&self) -> &PoolRegion {
        &self.region
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn locations(&self) -> &[PoolLocation] {
        &self.locations
    }

    pub fn vertices_capacity(&self) -> u32 {
        self.vertices_capacity
    }

    pub fn indices_capacity(&self) -> u32 {
        self.indices_capacity
    }

    pub fn vertices_position(&self) -> u32 {
        self.vertices_position
    }

    pub fn indices_position(&self) -> u32 {
        self.indices_position
    }

    pub fn current_fragmentation(&self) -> f32 {
        self.current_fragmentation
    }

    pub fn draw_ranges(&self) -> (&[u32], &[u32]) {
        (&self.draw_starts, &self.draw_lengths)
    }

    pub fn visible_count(&self) -> usize {
        self.draw_starts.len()
    }

    pub fn rendered_triangles(&self) -> u64 {
        self.rendered_triangles
    }

    pub fn allocated_triangles(&self) -> u64 {
        self.allocated_triangles
    }

    /// Estimated GPU bytes of the buffer pair.
    pub fn gpu_bytes(&self, dedicated_index_buffer: bool) -> u64 {
        let vertex = self.vertices_capacity as u64 * self.vertex_stride as u64;
        let index = if dedicated_index_buffer {
            self.indices_capacity as u64 * crate::constants::INDEX_BYTES
        } else {
            0
        };
        vertex + index
    }
}
