//! A graphics backend that keeps everything on the CPU.
//!
//! Uploads land in plain vectors and draw calls are recorded instead of
//! submitted, which makes pool behavior observable without a GPU.

use glam::{Mat4, Vec3};
use rustc_hash::FxHashMap;

use crate::core::mesh::MeshData;
use crate::render::backend::{
    GraphicsBackend, MeshAllocation, MeshHandle, UniformValue, UploadRange,
};

pub struct HeadlessMesh {
    pub alloc: MeshAllocation,
    /// Three floats per vertex slot.
    pub positions: Vec<f32>,
    pub indices: Vec<u32>,
    pub uploads: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedDraw {
    pub mesh: MeshHandle,
    pub starts: Vec<u32>,
    pub lengths: Vec<u32>,
    /// Uniform state at the time of the draw, sorted by name.
    pub uniforms: Vec<(String, UniformValue)>,
}

impl RecordedDraw {
    pub fn uniform_vec3(&self, name: &str) -> Option<Vec3> {
        self.uniforms.iter().find_map(|(n, v)| match v {
            UniformValue::Vec3(v) if n == name => Some(*v),
            _ => None,
        })
    }

    pub fn uniform_mat4(&self, name: &str) -> Option<Mat4> {
        self.uniforms.iter().find_map(|(n, v)| match v {
            UniformValue::Mat4(m) if n == name => Some(*m),
            _ => None,
        })
    }

    pub fn index_count(&self) -> u32 {
        self.lengths.iter().sum()
    }
}

#[derive(Default)]
pub struct HeadlessBackend {
    meshes: FxHashMap<MeshHandle, HeadlessMesh>,
    next_handle: u32,
    draws: Vec<RecordedDraw>,
    uniforms: FxHashMap<String, UniformValue>,
    deleted: usize,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mesh(&self, handle: MeshHandle) -> Option<&HeadlessMesh> {
        self.meshes.get(&handle)
    }

    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn deleted_meshes(&self) -> usize {
        self.deleted
    }

    pub fn draws(&self) -> &[RecordedDraw] {
        &self.draws
    }

    /// Returns and forgets the draws recorded so far, e.g. at frame end.
    pub fn take_draws(&mut self) -> Vec<RecordedDraw> {
        std::mem::take(&mut self.draws)
    }

    pub fn uniform_vec3(&self, name: &str) -> Option<Vec3> {
        match self.uniforms.get(name) {
            Some(UniformValue::Vec3(v)) => Some(*v),
            _ => None,
        }
    }

    /// Uploaded position of one vertex slot.
    pub fn vertex_position(&self, handle: MeshHandle, vertex: u32) -> Option<Vec3> {
        let mesh = self.meshes.get(&handle)?;
        let i = vertex as usize * 3;
        mesh.positions.get(i..i + 3).map(Vec3::from_slice)
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn allocate_empty_mesh(&mut self, alloc: &MeshAllocation) -> MeshHandle {
        let handle = MeshHandle(self.next_handle);
        self.next_handle += 1;
        self.meshes.insert(
            handle,
            HeadlessMesh {
                alloc: alloc.clone(),
                positions: vec![0.0; alloc.vertex_capacity as usize * 3],
                indices: vec![0; alloc.index_capacity as usize],
                uploads: 0,
            },
        );
        handle
    }

    fn update_mesh(&mut self, handle: MeshHandle, data: &MeshData, range: UploadRange) {
        let Some(mesh) = self.meshes.get_mut(&handle) else {
            tracing::warn!(?handle, "upload to unknown mesh ignored");
            return;
        };
        let v0 = range.vertex_offset as usize * 3;
        let i0 = range.index_offset as usize;
        assert!(
            v0 + data.xyz().len() <= mesh.positions.len()
                && i0 + data.indices_count() <= mesh.indices.len(),
            "upload of {}v/{}i at {:?} overflows mesh {:?}",
            data.vertices_count(),
            data.indices_count(),
            range,
            handle
        );
        mesh.positions[v0..v0 + data.xyz().len()].copy_from_slice(data.xyz());
        mesh.indices[i0..i0 + data.indices_count()].copy_from_slice(data.indices());
        mesh.uploads += 1;
    }

    fn render_mesh(&mut self, handle: MeshHandle, starts: &[u32], lengths: &[u32]) {
        let mut uniforms: Vec<(String, UniformValue)> = self
            .uniforms
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        uniforms.sort_by(|a, b| a.0.cmp(&b.0));
        self.draws.push(RecordedDraw {
            mesh: handle,
            starts: starts.to_vec(),
            lengths: lengths.to_vec(),
            uniforms,
        });
    }

    fn delete_mesh(&mut self, handle: MeshHandle) {
        if self.meshes.remove(&handle).is_some() {
            self.deleted += 1;
        }
    }

    fn set_uniform_vec3(&mut self, name: &str, value: Vec3) {
        self.uniforms.insert(name.to_string(), UniformValue::Vec3(value));
    }

    fn set_uniform_mat4(&mut self, name: &str, value: Mat4) {
        self.uniforms.insert(name.to_string(), UniformValue::Mat4(value));
    }

    fn uniform_mat4(&self, name: &str) -> Option<Mat4> {
        match self.uniforms.get(name) {
            Some(UniformValue::Mat4(m)) => Some(*m),
            _ => None,
        }
    }
}
