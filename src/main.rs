//! Headless mesh pool soak.
//!
//! Worker threads build random block geometry, the main thread places it
//! into pools, removes some of it again and renders every step through a
//! moving camera, logging pool statistics along the way.

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use clap::Parser;
use glam::{DVec3, IVec3, Mat4, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use voxel_meshpool::{
    CullMode, Facing, Frustum, FrameMatrices, GraphicsBackend, HeadlessBackend, MeshBuildQueue,
    MeshData, MeshDataPoolMasterManager, MeshDataRecycler, PoolLocation, PoolSettings, Region,
    SETTINGS_FILE, SubworldController,
};

/// Mesh pool churn soak
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of simulated frames
    #[arg(long, default_value_t = 2000)]
    steps: usize,

    /// Seed for content and churn
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Mesh worker threads (default: one per core, minus the render thread)
    #[arg(long)]
    workers: Option<usize>,

    /// Pool settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Far plane and content spread, in blocks
    #[arg(long, default_value_t = 256.0)]
    view_distance: f32,
}

const CHUNK: i32 = 16;
const SHIP_ID: u32 = 1;

struct ChunkRequest {
    origin: IVec3,
    region: Region,
    seed: u64,
}

/// A platform drifting along +X.
struct Ship {
    speed: f64,
}

impl SubworldController for Ship {
    fn render_offset(&self, delta_time: f32) -> DVec3 {
        DVec3::new(self.speed * delta_time as f64, 0.0, 0.0)
    }

    fn render_transform(&self, model_view: &Mat4, _viewer: DVec3, delta_time: f32) -> Mat4 {
        *model_view * Mat4::from_rotation_y(0.01 * delta_time)
    }
}

fn box_faces(min: Vec3, max: Vec3) -> [(Facing, [Vec3; 4]); 6] {
    let (a, b) = (min, max);
    [
        (
            Facing::North,
            [
                Vec3::new(b.x, a.y, a.z),
                Vec3::new(a.x, a.y, a.z),
                Vec3::new(a.x, b.y, a.z),
                Vec3::new(b.x, b.y, a.z),
            ],
        ),
        (
            Facing::East,
            [
                Vec3::new(b.x, a.y, b.z),
                Vec3::new(b.x, a.y, a.z),
                Vec3::new(b.x, b.y, a.z),
                Vec3::new(b.x, b.y, b.z),
            ],
        ),
        (
            Facing::South,
            [
                Vec3::new(a.x, a.y, b.z),
                Vec3::new(b.x, a.y, b.z),
                Vec3::new(b.x, b.y, b.z),
                Vec3::new(a.x, b.y, b.z),
            ],
        ),
        (
            Facing::West,
            [
                Vec3::new(a.x, a.y, a.z),
                Vec3::new(a.x, a.y, b.z),
                Vec3::new(a.x, b.y, b.z),
                Vec3::new(a.x, b.y, a.z),
            ],
        ),
        (
            Facing::Up,
            [
                Vec3::new(a.x, b.y, b.z),
                Vec3::new(b.x, b.y, b.z),
                Vec3::new(b.x, b.y, a.z),
                Vec3::new(a.x, b.y, a.z),
            ],
        ),
        (
            Facing::Down,
            [
                Vec3::new(a.x, a.y, a.z),
                Vec3::new(b.x, a.y, a.z),
                Vec3::new(b.x, a.y, b.z),
                Vec3::new(a.x, a.y, b.z),
            ],
        ),
    ]
}

/// Random boxes inside one chunk, in chunk-local coordinates.
fn build_chunk(
    request: &ChunkRequest,
    recycler: &MeshDataRecycler,
    template: &MeshData,
) -> MeshData {
    let mut rng = StdRng::seed_from_u64(request.seed);
    let boxes = rng.random_range(1..=12usize);
    let mut mesh = recycler.get_or_create(boxes * 24, boxes * 36, template);
    for _ in 0..boxes {
        let min = Vec3::new(
            rng.random_range(0..CHUNK - 1) as f32,
            rng.random_range(0..CHUNK - 1) as f32,
            rng.random_range(0..CHUNK - 1) as f32,
        );
        let max = min + Vec3::splat(rng.random_range(1..=3) as f32);
        let texture = rng.random_range(0..8);
        let rgba = [rng.random(), rng.random(), rng.random(), 255];
        for (facing, corners) in box_faces(min, max) {
            mesh.add_quad(corners, rgba, 0, texture, facing.mesh_index());
        }
    }
    mesh
}

fn random_origin(rng: &mut StdRng, center: IVec3, spread: i32) -> IVec3 {
    let chunks = (spread / CHUNK).max(1);
    center
        + IVec3::new(
            rng.random_range(-chunks..=chunks) * CHUNK,
            rng.random_range(-2..=2) * CHUNK,
            rng.random_range(-chunks..=chunks) * CHUNK,
        )
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let settings = PoolSettings::load_or_default(
        args.settings
            .clone()
            .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE)),
    );
    let workers = args
        .workers
        .unwrap_or_else(|| num_cpus::get().saturating_sub(1).max(1));
    tracing::info!(
        "Starting mesh pool soak: {} steps, seed {}, {} workers",
        args.steps,
        args.seed,
        workers
    );

    let recycler = Arc::new(MeshDataRecycler::new(
        settings.recycle_tolerance,
        settings.recycler_max_retained,
    ));
    let template = MeshData::with_standard_channels(0, 0);
    let queue = {
        let recycler = Arc::clone(&recycler);
        MeshBuildQueue::new(workers, move |request: &ChunkRequest| {
            build_chunk(request, &recycler, &template)
        })
    };

    let mut backend = HeadlessBackend::new();
    let mut master = MeshDataPoolMasterManager::new(settings);
    master.register_subworld(SHIP_ID, Rc::new(Ship { speed: 4.0 }));

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut placements: Vec<PoolLocation> = Vec::new();
    let mut in_flight = 0usize;
    let mut dropped = 0usize;
    let mut draw_calls = 0usize;
    let target = 400usize;
    let spread = args.view_distance as i32;

    let projection =
        Mat4::perspective_rh(70f32.to_radians(), 16.0 / 9.0, 0.1, args.view_distance);

    for step in 0..args.steps {
        // Far from the world origin, so every pool relies on rebasing.
        let angle = step as f64 * 0.01;
        let viewer = DVec3::new(
            1_000_000.0 + angle.cos() * 200.0,
            80.0,
            -1_000_000.0 + angle.sin() * 200.0,
        );
        let center = viewer.as_ivec3();

        while in_flight < 32 {
            let region = if rng.random_bool(0.05) {
                Region::Subworld(SHIP_ID)
            } else {
                Region::World
            };
            let request = ChunkRequest {
                origin: random_origin(&mut rng, center, spread),
                region,
                seed: rng.random(),
            };
            if !queue.request(request) {
                break;
            }
            in_flight += 1;
        }

        while let Some(mut result) = queue.poll_result() {
            in_flight -= 1;
            let Some(sphere) = result.mesh.bounding_sphere() else {
                result.mesh.dispose(Some(&recycler));
                continue;
            };
            match master.add_model(
                &mut backend,
                &mut result.mesh,
                result.request.origin,
                result.request.region,
                sphere,
            ) {
                Some(location) => placements.push(location),
                None => dropped += 1,
            }
            result.mesh.dispose(Some(&recycler));
        }

        while placements.len() > target || (!placements.is_empty() && rng.random_bool(0.2)) {
            let location = placements.swap_remove(rng.random_range(0..placements.len()));
            master.remove_location(&location);
        }

        let forward = Vec3::new(angle.sin() as f32, -0.2, -(angle.cos() as f32)).normalize();
        let model_view = Mat4::look_at_rh(Vec3::ZERO, forward, Vec3::Y);
        master.set_frame(FrameMatrices {
            model_view,
            projection,
        });
        let frustum = Frustum::from_view_proj(&(projection * model_view));
        backend.set_uniform_mat4(voxel_meshpool::MODEL_VIEW_UNIFORM, model_view);
        master.render_all(&mut backend, &frustum, viewer, 0.5, CullMode::Normal);
        draw_calls += backend.take_draws().len();

        if step % 250 == 0 {
            let stats = master.stats();
            tracing::info!(
                step,
                pools = stats.pool_count,
                placements = stats.placement_count,
                gpu_mib = stats.gpu_bytes as f64 / (1024.0 * 1024.0),
                rendered = stats.rendered_triangles,
                allocated = stats.allocated_triangles,
                "pool stats"
            );
            let freed = master.dispose_empty_pools(&mut backend);
            if freed > 0 {
                tracing::info!("Disposed {} empty pools", freed);
            }
        }
    }

    let stats = master.stats();
    let recycled = recycler.stats();
    tracing::info!(
        pools = stats.pool_count,
        placements = stats.placement_count,
        draw_calls,
        dropped,
        reused = recycled.reused,
        created = recycled.created,
        "soak finished"
    );
    master.dispose(&mut backend);
}
