use glam::{DVec3, IVec3, Mat4};

use crate::core::mesh::MeshData;
use crate::pool::location::PoolLocation;
use crate::pool::master::{ManagerId, PoolRegistry};
use crate::pool::pool::MeshDataPool;
use crate::pool::region::{PoolRegion, Region};
use crate::render::backend::{GraphicsBackend, MatrixSwap};
use crate::render::frustum::{CullMode, FrustumCuller, Sphere};
use crate::render::layout::AttributeLayout;
use crate::utils::settings::PoolSettings;

/// Per-frame camera state a manager renders with.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrameContext {
    /// Viewer position in absolute world coordinates.
    pub viewer: DVec3,
    /// Fraction of the current tick elapsed, for interpolating subworlds.
    pub delta_time: f32,
    pub model_view: Mat4,
}

/// Telemetry summed over pools.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub gpu_bytes: u64,
    pub rendered_triangles: u64,
    pub allocated_triangles: u64,
    pub pool_count: usize,
    pub placement_count: usize,
}

impl std::ops::AddAssign for PoolStats {
    fn add_assign(&mut self, rhs: Self) {
        self.gpu_bytes += rhs.gpu_bytes;
        self.rendered_triangles += rhs.rendered_triangles;
        self.allocated_triangles += rhs.allocated_triangles;
        self.pool_count += rhs.pool_count;
        self.placement_count += rhs.placement_count;
    }
}

/// Owns every pool of one vertex layout and routes batches into them.
pub struct MeshDataPoolManager {
    id: ManagerId,
    layout: AttributeLayout,
    settings: PoolSettings,
    /// In creation order.
    pools: Vec<MeshDataPool>,
    model_view_uniform: String,
}

impl MeshDataPoolManager {
    pub fn new(id: ManagerId, layout: AttributeLayout, settings: PoolSettings) -> Self {
        Self {
            id,
            layout,
            settings,
            pools: Vec::new(),
            model_view_uniform: crate::constants::MODEL_VIEW_UNIFORM.to_string(),
        }
    }

    /// Uniform swapped while drawing subworld pools.
    pub fn with_model_view_uniform(mut self, name: impl Into<String>) -> Self {
        self.model_view_uniform = name.into();
        self
    }

    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn layout(&self) -> &AttributeLayout {
        &self.layout
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Places `data` in the first pool that takes it, opening a new pool
    /// when none does.
    ///
    /// `cull_sphere` is relative to `origin`. The caller keeps `data` and
    /// should dispose of it afterwards; its indices and positions have been
    /// rewritten for the pool. Returns `None` when the content cannot be
    /// rendered at all.
    pub fn add_model<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        registry: &mut PoolRegistry,
        data: &mut MeshData,
        origin: IVec3,
        region: Region,
        cull_sphere: Sphere,
    ) -> Option<PoolLocation> {
        if data.vertices_count() == 0 && data.indices_count() == 0 {
            tracing::debug!(?origin, "empty batch not placed");
            return None;
        }
        if !self.layout.matches(data) {
            tracing::error!(
                manager = self.id.0,
                expected = ?self.layout,
                actual = ?AttributeLayout::from_mesh(data),
                "batch layout does not match its manager"
            );
            return None;
        }

        for pool in &mut self.pools {
            if let Some(location) = pool.try_add(backend, data, origin, region, cull_sphere) {
                return Some(location);
            }
        }

        let pool_region = match region {
            Region::World => PoolRegion::World,
            Region::Subworld(id) => {
                let Some(controller) = registry.subworld(id) else {
                    tracing::warn!(subworld = id, "no controller registered, batch dropped");
                    return None;
                };
                PoolRegion::Subworld { id, controller }
            }
        };

        let (Some(vertices), Some(indices)) = (
            pool_capacity(data.vertices_count(), self.settings.default_vertex_capacity),
            pool_capacity(data.indices_count(), self.settings.default_index_capacity),
        ) else {
            tracing::error!(
                manager = self.id.0,
                vertices = data.vertices_count(),
                indices = data.indices_count(),
                "batch exceeds the 32-bit range of a pool"
            );
            return None;
        };
        let pool_id = registry.next_pool_id(self.id);
        let mut pool = MeshDataPool::allocate(
            backend,
            pool_id,
            &self.layout,
            vertices,
            indices,
            pool_region,
            &self.settings,
        );
        tracing::debug!(
            manager = self.id.0,
            pool = pool_id.0,
            vertices,
            indices,
            ?region,
            "opened pool"
        );

        let location = pool.try_add(backend, data, origin, region, cull_sphere);
        self.pools.push(pool);
        if location.is_none() {
            tracing::error!(
                manager = self.id.0,
                pool = pool_id.0,
                ?origin,
                ?region,
                vertices = data.vertices_count(),
                indices = data.indices_count(),
                default_vertices = self.settings.default_vertex_capacity,
                default_indices = self.settings.default_index_capacity,
                "fresh pool rejected batch, content will not render"
            );
        }
        location
    }

    /// Frees a placement made by this manager.
    ///
    /// # Panics
    /// If no pool of this manager has the placement's id, or the pool does
    /// not hold it.
    pub fn remove_location(&mut self, location: &PoolLocation) {
        let Some(pool) = self
            .pools
            .iter_mut()
            .find(|p| p.id() == location.pool_id())
        else {
            panic!(
                "manager {:?} has no pool {:?}",
                self.id,
                location.pool_id()
            );
        };
        pool.remove_location(location);
    }

    /// Culls and draws every pool.
    ///
    /// World pools are frustum culled and drawn with `origin_uniform` set to
    /// the pool origin relative to the viewer. Subworld pools are drawn
    /// whole with their controller's transform swapped into the model-view
    /// uniform for the duration of the draw.
    pub fn render<B, C>(
        &mut self,
        backend: &mut B,
        culler: &C,
        frame: &FrameContext,
        origin_uniform: &str,
        mode: CullMode,
    ) where
        B: GraphicsBackend + ?Sized,
        C: FrustumCuller + ?Sized,
    {
        for pool in &mut self.pools {
            let Some(origin) = pool.origin() else {
                continue;
            };
            let relative = origin.as_dvec3() - frame.viewer;

            let controller = match pool.region() {
                PoolRegion::World => None,
                PoolRegion::Subworld { controller, .. } => Some(controller.clone()),
            };
            match controller {
                None => {
                    pool.frustum_cull(culler, relative.as_vec3(), mode);
                    if pool.visible_count() == 0 {
                        continue;
                    }
                    backend.set_uniform_vec3(origin_uniform, relative.as_vec3());
                    pool.draw(backend);
                }
                Some(controller) => {
                    pool.set_fully_visible();
                    if pool.visible_count() == 0 {
                        continue;
                    }
                    let offset = relative + controller.render_offset(frame.delta_time);
                    let transform = controller.render_transform(
                        &frame.model_view,
                        frame.viewer,
                        frame.delta_time,
                    );
                    let mut swap = MatrixSwap::new(
                        backend,
                        &self.model_view_uniform,
                        transform,
                        frame.model_view,
                    );
                    swap.set_uniform_vec3(origin_uniform, offset.as_vec3());
                    pool.draw(&mut *swap);
                }
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats::default();
        for pool in &self.pools {
            stats.gpu_bytes += pool.gpu_bytes(self.settings.dedicated_index_buffer);
            stats.rendered_triangles += pool.rendered_triangles();
            stats.allocated_triangles += pool.allocated_triangles();
            stats.placement_count += pool.locations().len();
        }
        stats.pool_count = self.pools.len();
        stats
    }

    /// Releases pools that hold no placements. Returns how many were freed.
    pub fn dispose_empty_pools<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        registry: &mut PoolRegistry,
    ) -> usize {
        let (empty, kept): (Vec<_>, Vec<_>) =
            self.pools.drain(..).partition(MeshDataPool::is_empty);
        self.pools = kept;
        let freed = empty.len();
        for pool in empty {
            registry.forget_pool(pool.id());
            pool.dispose(backend);
        }
        if freed > 0 {
            tracing::debug!(manager = self.id.0, freed, "disposed empty pools");
        }
        freed
    }

    /// Releases every pool, including ones still holding placements.
    pub fn dispose<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        registry: &mut PoolRegistry,
    ) {
        for pool in self.pools.drain(..) {
            registry.forget_pool(pool.id());
            pool.dispose(backend);
        }
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn placement_count(&self) -> usize {
        self.pools.iter().map(|p| p.locations().len()).sum()
    }

    pub fn pools(&self) -> &[MeshDataPool] {
        &self.pools
    }
}

/// Capacity of a fresh pool for a batch of `count` elements: the configured
/// default, or exactly the batch when it is larger. `None` past `u32::MAX`.
fn pool_capacity(count: usize, default: u32) -> Option<u32> {
    u32::try_from(count).ok().map(|count| count.max(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{MODEL_VIEW_UNIFORM, ORIGIN_UNIFORM};
    use crate::pool::region::SubworldController;
    use crate::render::headless::HeadlessBackend;
    use glam::{Vec2, Vec3};
    use std::rc::Rc;

    struct AlwaysVisible;

    impl FrustumCuller for AlwaysVisible {
        fn sphere_in_frustum(&self, _: &Sphere, _: CullMode) -> bool {
            true
        }
    }

    struct NeverVisible;

    impl FrustumCuller for NeverVisible {
        fn sphere_in_frustum(&self, _: &Sphere, _: CullMode) -> bool {
            false
        }
    }

    struct Ship {
        offset: DVec3,
    }

    impl SubworldController for Ship {
        fn render_offset(&self, delta_time: f32) -> DVec3 {
            self.offset * delta_time as f64
        }

        fn render_transform(&self, model_view: &Mat4, _viewer: DVec3, _delta_time: f32) -> Mat4 {
            *model_view * Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2)
        }
    }

    fn batch(v: usize, i: usize) -> MeshData {
        let mut m = MeshData::new(v, i);
        for n in 0..v {
            m.add_vertex(Vec3::new(n as f32, 0.0, 0.0), Vec2::ZERO);
        }
        for n in 0..i {
            m.add_index((n % v) as u32);
        }
        m
    }

    fn small_settings() -> PoolSettings {
        PoolSettings {
            default_vertex_capacity: 1000,
            default_index_capacity: 1500,
            max_parts_per_pool: 64,
            ..Default::default()
        }
    }

    fn manager() -> MeshDataPoolManager {
        MeshDataPoolManager::new(
            ManagerId(0),
            AttributeLayout::from_mesh(&MeshData::new(0, 0)),
            small_settings(),
        )
    }

    fn sphere() -> Sphere {
        Sphere::new(Vec3::ZERO, 4.0)
    }

    fn frame(viewer: DVec3) -> FrameContext {
        FrameContext {
            viewer,
            delta_time: 0.5,
            model_view: Mat4::IDENTITY,
        }
    }

    #[test]
    fn full_pool_spills_into_a_new_pool() {
        let mut b = HeadlessBackend::new();
        let mut r = PoolRegistry::new();
        let mut m = manager();
        let add = |m: &mut MeshDataPoolManager, b: &mut HeadlessBackend, r: &mut PoolRegistry, v, i| {
            m.add_model(b, r, &mut batch(v, i), IVec3::ZERO, Region::World, sphere())
        };

        let a = add(&mut m, &mut b, &mut r, 400, 600).unwrap();
        let bb = add(&mut m, &mut b, &mut r, 400, 600).unwrap();
        assert_eq!(a.pool_id(), bb.pool_id());

        let c = add(&mut m, &mut b, &mut r, 300, 450).unwrap();
        assert_ne!(c.pool_id(), a.pool_id());
        assert_eq!(m.pool_count(), 2);
        assert_eq!(r.owner_of(c.pool_id()), Some(ManagerId(0)));

        m.remove_location(&a);
        let d = add(&mut m, &mut b, &mut r, 350, 525).unwrap();
        assert_eq!(d.pool_id(), a.pool_id());
        assert_eq!(d.vertices_start(), 0);
        assert_eq!(m.placement_count(), 3);
    }

    #[test]
    fn oversized_batch_gets_a_dedicated_pool() {
        let mut b = HeadlessBackend::new();
        let mut r = PoolRegistry::new();
        let mut m = manager();
        let loc = m
            .add_model(&mut b, &mut r, &mut batch(3000, 4000), IVec3::ZERO, Region::World, sphere())
            .unwrap();
        let pool = &m.pools()[0];
        assert_eq!(loc.pool_id(), pool.id());
        assert_eq!(pool.vertices_capacity(), 3000);
        assert_eq!(pool.indices_capacity(), 4000);
    }

    #[test]
    fn far_origin_opens_a_new_pool() {
        let mut b = HeadlessBackend::new();
        let mut r = PoolRegistry::new();
        let mut m = manager();
        let near = m
            .add_model(&mut b, &mut r, &mut batch(4, 6), IVec3::ZERO, Region::World, sphere())
            .unwrap();
        let far = m
            .add_model(
                &mut b,
                &mut r,
                &mut batch(4, 6),
                IVec3::new(0, 0, 6000),
                Region::World,
                sphere(),
            )
            .unwrap();
        assert_ne!(near.pool_id(), far.pool_id());
        assert_eq!(m.pools()[1].origin(), Some(IVec3::new(0, 0, 6000)));
    }

    #[test]
    fn empty_and_mismatched_batches_are_not_placed() {
        let mut b = HeadlessBackend::new();
        let mut r = PoolRegistry::new();
        let mut m = manager();
        assert!(
            m.add_model(&mut b, &mut r, &mut MeshData::new(0, 0), IVec3::ZERO, Region::World, sphere())
                .is_none()
        );
        let mut coloured = batch(4, 6).with_rgba();
        assert!(
            m.add_model(&mut b, &mut r, &mut coloured, IVec3::ZERO, Region::World, sphere())
                .is_none()
        );
        assert_eq!(m.pool_count(), 0);
    }

    #[test]
    fn world_pools_draw_with_viewer_relative_origin() {
        let mut b = HeadlessBackend::new();
        let mut r = PoolRegistry::new();
        let mut m = manager();
        let origin = IVec3::new(100_000, 64, -50_000);
        m.add_model(&mut b, &mut r, &mut batch(4, 6), origin, Region::World, sphere())
            .unwrap();

        let viewer = DVec3::new(100_010.25, 70.0, -50_003.5);
        m.render(&mut b, &AlwaysVisible, &frame(viewer), ORIGIN_UNIFORM, CullMode::Normal);
        let draws = b.take_draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(
            draws[0].uniform_vec3(ORIGIN_UNIFORM),
            Some(Vec3::new(-10.25, -6.0, 3.5))
        );

        m.render(&mut b, &NeverVisible, &frame(viewer), ORIGIN_UNIFORM, CullMode::Normal);
        assert!(b.draws().is_empty());
        let stats = m.stats();
        assert_eq!(stats.rendered_triangles, 0);
        assert_eq!(stats.allocated_triangles, 2);
    }

    #[test]
    fn subworld_pools_swap_the_model_view_matrix() {
        let mut b = HeadlessBackend::new();
        let mut r = PoolRegistry::new();
        let mut m = manager();
        r.register_subworld(
            7,
            Rc::new(Ship {
                offset: DVec3::new(2.0, 0.0, 0.0),
            }),
        );
        let world = m
            .add_model(&mut b, &mut r, &mut batch(4, 6), IVec3::ZERO, Region::World, sphere())
            .unwrap();
        let ship = m
            .add_model(&mut b, &mut r, &mut batch(4, 6), IVec3::ZERO, Region::Subworld(7), sphere())
            .unwrap();
        assert_ne!(world.pool_id(), ship.pool_id());

        let before = Mat4::from_translation(Vec3::Y);
        b.set_uniform_mat4(MODEL_VIEW_UNIFORM, before);
        // culling never applies to subworld pools
        m.render(&mut b, &NeverVisible, &frame(DVec3::ZERO), ORIGIN_UNIFORM, CullMode::Normal);

        let draws = b.take_draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].uniform_vec3(ORIGIN_UNIFORM), Some(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(
            draws[0].uniform_mat4(MODEL_VIEW_UNIFORM),
            Some(Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2))
        );
        assert_eq!(b.uniform_mat4(MODEL_VIEW_UNIFORM), Some(before));
    }

    #[test]
    fn unregistered_subworld_is_dropped() {
        let mut b = HeadlessBackend::new();
        let mut r = PoolRegistry::new();
        let mut m = manager();
        assert!(
            m.add_model(&mut b, &mut r, &mut batch(4, 6), IVec3::ZERO, Region::Subworld(3), sphere())
                .is_none()
        );
        assert_eq!(m.pool_count(), 0);
    }

    #[test]
    fn stats_and_disposal() {
        let mut b = HeadlessBackend::new();
        let mut r = PoolRegistry::new();
        let mut m = manager();
        let a = m
            .add_model(&mut b, &mut r, &mut batch(900, 900), IVec3::ZERO, Region::World, sphere())
            .unwrap();
        m.add_model(&mut b, &mut r, &mut batch(900, 900), IVec3::ZERO, Region::World, sphere())
            .unwrap();

        let stride = m.layout().vertex_stride() as u64;
        let stats = m.stats();
        assert_eq!(stats.pool_count, 2);
        assert_eq!(stats.gpu_bytes, 2 * (1000 * stride + 1500 * 4));
        assert_eq!(stats.allocated_triangles, 600);

        m.remove_location(&a);
        assert_eq!(m.dispose_empty_pools(&mut b, &mut r), 1);
        assert_eq!(m.pool_count(), 1);
        assert_eq!(b.live_meshes(), 1);
        assert_eq!(b.deleted_meshes(), 1);
        assert_eq!(r.owner_of(a.pool_id()), None);

        m.dispose(&mut b, &mut r);
        assert_eq!(b.live_meshes(), 0);
        assert_eq!(b.deleted_meshes(), 2);
    }

    #[test]
    fn pool_capacity_refuses_counts_past_u32() {
        assert_eq!(pool_capacity(10, 1000), Some(1000));
        assert_eq!(pool_capacity(4000, 1000), Some(4000));
        assert_eq!(pool_capacity(u32::MAX as usize, 0), Some(u32::MAX));
        assert_eq!(pool_capacity(u32::MAX as usize + 1, 0), None);
        assert_eq!(pool_capacity(usize::MAX, 1000), None);
    }

    #[test]
    #[should_panic(expected = "has no pool")]
    fn removing_a_foreign_placement_is_a_fault() {
        let mut b = HeadlessBackend::new();
        let mut r = PoolRegistry::new();
        let mut m = manager();
        let loc = m
            .add_model(&mut b, &mut r, &mut batch(4, 6), IVec3::ZERO, Region::World, sphere())
            .unwrap();
        let mut other = MeshDataPoolManager::new(ManagerId(1), m.layout().clone(), small_settings());
        other.remove_location(&loc);
    }
}
