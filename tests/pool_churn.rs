use glam::{DVec3, IVec3, Mat4, Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use voxel_meshpool::{
    CullMode, Frustum, HeadlessBackend, MeshData, MeshDataPoolMasterManager, PoolLocation,
    PoolSettings, Region, Sphere,
};

fn batch(vertices: usize, indices: usize) -> MeshData {
    let mut mesh = MeshData::new(vertices, indices);
    for v in 0..vertices {
        mesh.add_vertex(Vec3::new(v as f32, 1.0, 2.0), Vec2::ZERO);
    }
    for i in 0..indices {
        mesh.add_index((i % vertices) as u32);
    }
    mesh
}

fn small_pools() -> PoolSettings {
    PoolSettings {
        default_vertex_capacity: 1000,
        default_index_capacity: 1500,
        max_parts_per_pool: 64,
        ..Default::default()
    }
}

fn assert_packing_invariants(master: &MeshDataPoolMasterManager) {
    for manager in master.managers() {
        for pool in manager.pools() {
            let locations = pool.locations();
            let vertices: u32 = locations.iter().map(|l| l.vertices_count()).sum();
            let indices: u32 = locations.iter().map(|l| l.indices_count()).sum();
            assert!(vertices <= pool.vertices_capacity());
            assert!(indices <= pool.indices_capacity());
            assert!(pool.vertices_position() <= pool.vertices_capacity());
            assert!(pool.indices_position() <= pool.indices_capacity());
            assert!(locations.len() <= master.settings().max_parts_per_pool);

            for pair in locations.windows(2) {
                assert!(pair[0].vertices_end() <= pair[1].vertices_start());
                assert!(pair[0].indices_end() <= pair[1].indices_start());
            }
            if let Some(last) = locations.last() {
                assert_eq!(last.vertices_end(), pool.vertices_position());
                assert_eq!(last.indices_end(), pool.indices_position());
            } else {
                assert_eq!(pool.vertices_position(), 0);
            }
        }
    }
}

#[test]
fn worked_example_places_spills_and_squeezes() {
    let mut backend = HeadlessBackend::new();
    let mut master = MeshDataPoolMasterManager::new(small_pools());
    let sphere = Sphere::new(Vec3::ZERO, 1.0);
    let mut add = |master: &mut MeshDataPoolMasterManager, v, i| {
        master
            .add_model(&mut backend, &mut batch(v, i), IVec3::ZERO, Region::World, sphere)
            .unwrap()
    };

    let a = add(&mut master, 400, 600);
    let b = add(&mut master, 400, 600);
    let c = add(&mut master, 300, 450);
    assert_eq!(a.pool_id(), b.pool_id());
    assert_ne!(c.pool_id(), a.pool_id());

    master.remove_location(&a);
    let first = &master.managers()[0].pools()[0];
    assert_eq!((first.vertices_position(), first.indices_position()), (800, 1200));
    assert_eq!(first.current_fragmentation(), 0.5);

    let d = add(&mut master, 350, 525);
    assert_eq!(d.pool_id(), a.pool_id());
    assert_eq!((d.vertices_start(), d.indices_start()), (0, 0));
    let first = &master.managers()[0].pools()[0];
    assert_eq!(first.locations(), &[d, b][..]);
    assert_eq!((first.vertices_position(), first.indices_position()), (800, 1200));
    assert_packing_invariants(&master);
}

#[test]
fn randomized_churn_keeps_pools_consistent() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut backend = HeadlessBackend::new();
    let mut master = MeshDataPoolMasterManager::new(small_pools());
    let mut live: Vec<PoolLocation> = Vec::new();

    let projection = Mat4::perspective_rh(1.2, 1.0, 0.1, 400.0);
    let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
    let frustum = Frustum::from_view_proj(&(projection * view));

    for step in 0..2000 {
        if live.is_empty() || rng.random_bool(0.6) {
            let vertices = rng.random_range(1..=300);
            let indices = rng.random_range(1..=450);
            let origin = IVec3::new(
                rng.random_range(-8000..8000),
                rng.random_range(-64..64),
                rng.random_range(-8000..8000),
            );
            let location = master
                .add_model(
                    &mut backend,
                    &mut batch(vertices, indices),
                    origin,
                    Region::World,
                    Sphere::new(Vec3::new(150.0, 1.0, 2.0), 150.0),
                )
                .expect("ordinary batches always find a pool");
            live.push(location);
        } else {
            let location = live.swap_remove(rng.random_range(0..live.len()));
            master.remove_location(&location);
        }
        assert_packing_invariants(&master);

        if step % 100 == 0 {
            let viewer = DVec3::new(
                rng.random_range(-8000.0..8000.0),
                0.0,
                rng.random_range(-8000.0..8000.0),
            );
            master.render_all(&mut backend, &frustum, viewer, 0.0, CullMode::Normal);
            for draw in backend.take_draws() {
                assert_eq!(draw.starts.len(), draw.lengths.len());
                assert!(draw.starts.windows(2).all(|w| w[0] < w[1]));
            }
            master.dispose_empty_pools(&mut backend);
        }
    }

    assert_eq!(master.stats().placement_count, live.len());
    for location in &live {
        let resident = master
            .managers()
            .iter()
            .flat_map(|m| m.pools())
            .filter(|p| p.id() == location.pool_id())
            .any(|p| p.locations().contains(location));
        assert!(resident, "{location:?} went missing");
    }
}

#[test]
fn force_all_visible_draws_every_placement() {
    let mut backend = HeadlessBackend::new();
    let mut master = MeshDataPoolMasterManager::new(small_pools());
    for x in 0..10 {
        master
            .add_model(
                &mut backend,
                &mut batch(30, 30),
                IVec3::new(x * 16, 0, 0),
                Region::World,
                Sphere::new(Vec3::ZERO, 1.0),
            )
            .unwrap();
    }
    // camera faces away from everything
    let frustum = Frustum::from_view_proj(
        &(Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0)
            * Mat4::look_at_rh(Vec3::ZERO, Vec3::Z, Vec3::Y)),
    );
    let viewer = DVec3::new(-50.0, 0.0, 0.0);

    master.render_all(&mut backend, &frustum, viewer, 0.0, CullMode::Normal);
    let culled: u32 = backend.take_draws().iter().map(|d| d.index_count()).sum();
    master.render_all(&mut backend, &frustum, viewer, 0.0, CullMode::ForceAllVisible);
    let all: u32 = backend.take_draws().iter().map(|d| d.index_count()).sum();

    assert_eq!(all, 300);
    assert!(culled < all);
}
