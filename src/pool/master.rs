//! Top-level registry over every pool manager.
//!
//! Hands out globally unique pool ids, remembers which manager owns which
//! pool so placements can be freed without knowing their manager, and keeps
//! the per-frame matrices and subworld controllers the managers render with.

use std::rc::Rc;

use glam::{DVec3, IVec3, Mat4};
use rustc_hash::FxHashMap;

use crate::constants::ORIGIN_UNIFORM;
use crate::core::mesh::MeshData;
use crate::pool::location::{PoolId, PoolLocation};
use crate::pool::manager::{FrameContext, MeshDataPoolManager, PoolStats};
use crate::pool::region::{Region, SubworldController};
use crate::render::backend::GraphicsBackend;
use crate::render::frustum::{CullMode, FrustumCuller, Sphere};
use crate::render::layout::AttributeLayout;
use crate::utils::settings::PoolSettings;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagerId(pub u32);

/// Pool ownership and subworld controllers shared by all managers.
#[derive(Default)]
pub struct PoolRegistry {
    next_pool_id: u32,
    owners: FxHashMap<PoolId, ManagerId>,
    subworlds: FxHashMap<u32, Rc<dyn SubworldController>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh pool id owned by `owner`. Ids are never reused.
    pub fn next_pool_id(&mut self, owner: ManagerId) -> PoolId {
        let id = PoolId(self.next_pool_id);
        self.next_pool_id += 1;
        self.owners.insert(id, owner);
        id
    }

    pub fn owner_of(&self, pool: PoolId) -> Option<ManagerId> {
        self.owners.get(&pool).copied()
    }

    pub fn forget_pool(&mut self, pool: PoolId) {
        self.owners.remove(&pool);
    }

    pub fn pool_count(&self) -> usize {
        self.owners.len()
    }

    pub fn register_subworld(&mut self, id: u32, controller: Rc<dyn SubworldController>) {
        if self.subworlds.insert(id, controller).is_some() {
            tracing::debug!(subworld = id, "replaced subworld controller");
        }
    }

    /// Pools already created for the subworld keep their controller.
    pub fn unregister_subworld(&mut self, id: u32) -> Option<Rc<dyn SubworldController>> {
        self.subworlds.remove(&id)
    }

    pub fn subworld(&self, id: u32) -> Option<Rc<dyn SubworldController>> {
        self.subworlds.get(&id).cloned()
    }
}

/// Camera matrices of the frame being rendered.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrameMatrices {
    pub model_view: Mat4,
    pub projection: Mat4,
}

impl Default for FrameMatrices {
    fn default() -> Self {
        Self {
            model_view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }
}

pub struct MeshDataPoolMasterManager {
    settings: PoolSettings,
    registry: PoolRegistry,
    /// Indexed by `ManagerId`.
    managers: Vec<MeshDataPoolManager>,
    frame: FrameMatrices,
}

impl MeshDataPoolMasterManager {
    pub fn new(settings: PoolSettings) -> Self {
        tracing::info!(
            vertices = settings.default_vertex_capacity,
            indices = settings.default_index_capacity,
            max_parts = settings.max_parts_per_pool,
            "mesh pools ready"
        );
        Self {
            settings,
            registry: PoolRegistry::new(),
            managers: Vec::new(),
            frame: FrameMatrices::default(),
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    /// Adds a manager for `layout`, even if one already exists.
    pub fn create_manager(&mut self, layout: AttributeLayout) -> ManagerId {
        let id = ManagerId(self.managers.len() as u32);
        tracing::debug!(manager = id.0, stride = layout.vertex_stride(), "created pool manager");
        self.managers
            .push(MeshDataPoolManager::new(id, layout, self.settings.clone()));
        id
    }

    /// First manager for `layout`, created on demand.
    pub fn manager_for_layout(&mut self, layout: &AttributeLayout) -> ManagerId {
        match self.managers.iter().find(|m| m.layout() == layout) {
            Some(m) => m.id(),
            None => self.create_manager(layout.clone()),
        }
    }

    pub fn manager(&self, id: ManagerId) -> Option<&MeshDataPoolManager> {
        self.managers.get(id.0 as usize)
    }

    pub fn managers(&self) -> &[MeshDataPoolManager] {
        &self.managers
    }

    /// Places `data` through the manager matching its vertex layout.
    pub fn add_model<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        data: &mut MeshData,
        origin: IVec3,
        region: Region,
        cull_sphere: Sphere,
    ) -> Option<PoolLocation> {
        let id = self.manager_for_layout(&AttributeLayout::from_mesh(data));
        self.add_model_to(backend, id, data, origin, region, cull_sphere)
    }

    /// Places `data` through a specific manager.
    pub fn add_model_to<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        manager: ManagerId,
        data: &mut MeshData,
        origin: IVec3,
        region: Region,
        cull_sphere: Sphere,
    ) -> Option<PoolLocation> {
        let Some(m) = self.managers.get_mut(manager.0 as usize) else {
            tracing::error!(manager = manager.0, "unknown pool manager");
            return None;
        };
        m.add_model(backend, &mut self.registry, data, origin, region, cull_sphere)
    }

    /// Frees a placement made by any manager.
    ///
    /// # Panics
    /// If the placement's pool is unknown or does not hold it.
    pub fn remove_location(&mut self, location: &PoolLocation) {
        let Some(owner) = self.registry.owner_of(location.pool_id()) else {
            panic!("placement {:?} refers to an unknown pool", location);
        };
        self.managers[owner.0 as usize].remove_location(location);
    }

    pub fn register_subworld(&mut self, id: u32, controller: Rc<dyn SubworldController>) {
        self.registry.register_subworld(id, controller);
    }

    pub fn unregister_subworld(&mut self, id: u32) -> Option<Rc<dyn SubworldController>> {
        self.registry.unregister_subworld(id)
    }

    pub fn set_frame(&mut self, frame: FrameMatrices) {
        self.frame = frame;
    }

    pub fn frame(&self) -> &FrameMatrices {
        &self.frame
    }

    /// Renders every manager with the stored frame matrices.
    pub fn render_all<B, C>(
        &mut self,
        backend: &mut B,
        culler: &C,
        viewer: DVec3,
        delta_time: f32,
        mode: CullMode,
    ) where
        B: GraphicsBackend + ?Sized,
        C: FrustumCuller + ?Sized,
    {
        let frame = FrameContext {
            viewer,
            delta_time,
            model_view: self.frame.model_view,
        };
        for manager in &mut self.managers {
            manager.render(backend, culler, &frame, ORIGIN_UNIFORM, mode);
        }
    }

    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats::default();
        for manager in &self.managers {
            stats += manager.stats();
        }
        stats
    }

    pub fn dispose_empty_pools<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> usize {
        let mut freed = 0;
        for manager in &mut self.managers {
            freed += manager.dispose_empty_pools(backend, &mut self.registry);
        }
        freed
    }

    /// Releases every pool of every manager.
    pub fn dispose<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        for manager in &mut self.managers {
            manager.dispose(backend, &mut self.registry);
        }
        tracing::info!("mesh pools disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::HeadlessBackend;
    use glam::{Vec2, Vec3};

    struct Everything;

    impl FrustumCuller for Everything {
        fn sphere_in_frustum(&self, _: &Sphere, _: CullMode) -> bool {
            true
        }
    }

    fn batch(v: usize) -> MeshData {
        let mut m = MeshData::new(v, v);
        for n in 0..v {
            m.add_vertex(Vec3::new(n as f32, 0.0, 0.0), Vec2::ZERO);
            m.add_index(n as u32);
        }
        m
    }

    fn master() -> MeshDataPoolMasterManager {
        MeshDataPoolMasterManager::new(PoolSettings {
            default_vertex_capacity: 100,
            default_index_capacity: 100,
            ..Default::default()
        })
    }

    fn sphere() -> Sphere {
        Sphere::new(Vec3::ZERO, 1.0)
    }

    #[test]
    fn layouts_route_to_separate_managers() {
        let mut b = HeadlessBackend::new();
        let mut m = master();
        let plain = m
            .add_model(&mut b, &mut batch(3), IVec3::ZERO, Region::World, sphere())
            .unwrap();
        let mut coloured = MeshData::new(3, 3).with_rgba();
        for n in 0..3 {
            coloured.add_vertex_with_color(Vec3::splat(n as f32), Vec2::ZERO, [1, 2, 3, 4]);
            coloured.add_index(n);
        }
        let tinted = m
            .add_model(&mut b, &mut coloured, IVec3::ZERO, Region::World, sphere())
            .unwrap();

        assert_eq!(m.managers().len(), 2);
        assert_ne!(plain.pool_id(), tinted.pool_id());
        assert_eq!(m.registry().owner_of(plain.pool_id()), Some(ManagerId(0)));
        assert_eq!(m.registry().owner_of(tinted.pool_id()), Some(ManagerId(1)));
        assert_eq!(m.stats().pool_count, 2);
        assert_eq!(m.stats().placement_count, 2);

        m.remove_location(&tinted);
        assert_eq!(m.stats().placement_count, 1);
        assert_eq!(m.dispose_empty_pools(&mut b), 1);
        assert_eq!(m.registry().pool_count(), 1);
    }

    #[test]
    fn pool_ids_are_unique_across_managers() {
        let mut b = HeadlessBackend::new();
        let mut m = master();
        let a = m.create_manager(AttributeLayout::from_mesh(&MeshData::new(0, 0)));
        let c = m.create_manager(AttributeLayout::from_mesh(&MeshData::new(0, 0)));
        let first = m
            .add_model_to(&mut b, a, &mut batch(3), IVec3::ZERO, Region::World, sphere())
            .unwrap();
        let second = m
            .add_model_to(&mut b, c, &mut batch(3), IVec3::ZERO, Region::World, sphere())
            .unwrap();
        assert_ne!(first.pool_id(), second.pool_id());

        m.remove_location(&second);
        assert_eq!(m.manager(c).map(|m| m.placement_count()), Some(0));
        assert_eq!(m.manager(a).map(|m| m.placement_count()), Some(1));
    }

    #[test]
    fn render_all_uses_stored_frame() {
        let mut b = HeadlessBackend::new();
        let mut m = master();
        m.add_model(&mut b, &mut batch(3), IVec3::new(16, 0, 16), Region::World, sphere())
            .unwrap();
        m.set_frame(FrameMatrices {
            model_view: Mat4::from_translation(Vec3::Z),
            projection: Mat4::IDENTITY,
        });
        m.render_all(&mut b, &Everything, DVec3::new(16.0, 0.0, 0.0), 0.0, CullMode::Normal);
        assert_eq!(b.draws().len(), 1);
        assert_eq!(
            b.draws()[0].uniform_vec3(ORIGIN_UNIFORM),
            Some(Vec3::new(0.0, 0.0, 16.0))
        );
        assert_eq!(m.stats().rendered_triangles, 1);

        m.dispose(&mut b);
        assert_eq!(b.live_meshes(), 0);
        assert_eq!(m.stats().pool_count, 0);
    }

    #[test]
    #[should_panic(expected = "unknown pool")]
    fn removing_from_an_unknown_pool_is_a_fault() {
        let mut b = HeadlessBackend::new();
        let mut m = master();
        let loc = m
            .add_model(&mut b, &mut batch(3), IVec3::ZERO, Region::World, sphere())
            .unwrap();
        m.remove_location(&loc);
        m.dispose_empty_pools(&mut b);
        m.remove_location(&loc);
    }
}
