//! wgpu implementation of the graphics backend.
//!
//! Each pool owns one vertex/index buffer pair created here. Uploads go
//! through `queue.write_buffer` at the pool-chosen offsets; draws are queued
//! with a snapshot of the uniform state and replayed into a render pass.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use rustc_hash::FxHashMap;

use crate::core::mesh::MeshData;
use crate::render::backend::{
    GraphicsBackend, MeshAllocation, MeshHandle, UniformValue, UploadRange,
};
use crate::render::layout::AttributeLayout;

/// wgpu DrawIndexedIndirect command structure (matches GPU layout)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq, Eq)]
pub struct DrawIndexedIndirect {
    /// Number of indices to draw
    pub index_count: u32,
    /// Number of instances to draw (always 1 for us)
    pub instance_count: u32,
    /// First index in the index buffer
    pub first_index: u32,
    /// Value added to vertex indices before indexing into vertex buffer
    /// (always 0: pools rewrite indices to absolute positions)
    pub base_vertex: i32,
    /// First instance to draw (always 0)
    pub first_instance: u32,
}

/// GPU side of one pool.
struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    layout: AttributeLayout,
    vertex_stride: u64,
}

/// A draw waiting to be encoded.
#[derive(Clone, Debug)]
pub struct QueuedDraw {
    pub mesh: MeshHandle,
    pub commands: Vec<DrawIndexedIndirect>,
    pub uniforms: Vec<(String, UniformValue)>,
}

impl QueuedDraw {
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    meshes: FxHashMap<MeshHandle, GpuMesh>,
    next_handle: u32,
    queued: Vec<QueuedDraw>,
    uniforms: FxHashMap<String, UniformValue>,
    // Reused interleaving buffer for uploads
    scratch: Vec<u8>,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            meshes: FxHashMap::default(),
            next_handle: 0,
            queued: Vec::new(),
            uniforms: FxHashMap::default(),
            scratch: Vec::new(),
        }
    }

    /// Vertex buffer layout for pipelines drawing pools of `layout`.
    pub fn vertex_buffer_layout<'a>(
        layout: &AttributeLayout,
        attributes: &'a [wgpu::VertexAttribute],
    ) -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: layout.vertex_stride() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        }
    }

    pub fn queued_draws(&self) -> &[QueuedDraw] {
        &self.queued
    }

    /// Replays every queued draw into `pass`. `bind_uniforms` is called before
    /// each draw so the caller can push that draw's uniform snapshot.
    pub fn encode<F>(&self, pass: &mut wgpu::RenderPass<'_>, mut bind_uniforms: F)
    where
        F: FnMut(&mut wgpu::RenderPass<'_>, &QueuedDraw),
    {
        for draw in &self.queued {
            let Some(mesh) = self.meshes.get(&draw.mesh) else {
                continue;
            };
            bind_uniforms(pass, draw);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            for cmd in &draw.commands {
                pass.draw_indexed(
                    cmd.first_index..cmd.first_index + cmd.index_count,
                    cmd.base_vertex,
                    cmd.first_instance..cmd.first_instance + cmd.instance_count,
                );
            }
        }
    }

    /// Drops the queued draws (call once the frame is submitted).
    pub fn clear_queue(&mut self) {
        self.queued.clear();
    }

    pub fn mesh_layout(&self, handle: MeshHandle) -> Option<&AttributeLayout> {
        self.meshes.get(&handle).map(|m| &m.layout)
    }
}

impl GraphicsBackend for WgpuBackend {
    fn allocate_empty_mesh(&mut self, alloc: &MeshAllocation) -> MeshHandle {
        let handle = MeshHandle(self.next_handle);
        self.next_handle += 1;

        let vertex_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("Pool Vertex Buffer {}", handle.0)),
            size: alloc.vertex_bytes().max(4),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let index_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("Pool Index Buffer {}", handle.0)),
            size: alloc.index_bytes().max(4),
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        tracing::debug!(
            mesh = handle.0,
            vertex_bytes = alloc.vertex_bytes(),
            index_bytes = alloc.index_bytes(),
            "allocated pool buffers"
        );

        self.meshes.insert(
            handle,
            GpuMesh {
                vertex_buffer,
                index_buffer,
                vertex_stride: alloc.layout.vertex_stride() as u64,
                layout: alloc.layout.clone(),
            },
        );
        handle
    }

    fn update_mesh(&mut self, handle: MeshHandle, data: &MeshData, range: UploadRange) {
        let Some(mesh) = self.meshes.get(&handle) else {
            tracing::warn!(mesh = handle.0, "upload to unknown mesh ignored");
            return;
        };

        // Upload vertex data
        self.scratch.clear();
        mesh.layout.write_vertices(data, &mut self.scratch);
        if !self.scratch.is_empty() {
            let vertex_byte_offset = range.vertex_offset as u64 * mesh.vertex_stride;
            self.queue
                .write_buffer(&mesh.vertex_buffer, vertex_byte_offset, &self.scratch);
        }

        // Upload index data (already absolute, base_vertex stays 0)
        if data.indices_count() > 0 {
            let index_byte_offset = range.index_offset as u64 * std::mem::size_of::<u32>() as u64;
            self.queue.write_buffer(
                &mesh.index_buffer,
                index_byte_offset,
                bytemuck::cast_slice(data.indices()),
            );
        }
    }

    fn render_mesh(&mut self, handle: MeshHandle, starts: &[u32], lengths: &[u32]) {
        let commands = starts
            .iter()
            .zip(lengths)
            .map(|(&start, &len)| DrawIndexedIndirect {
                index_count: len,
                instance_count: 1,
                first_index: start / std::mem::size_of::<u32>() as u32,
                base_vertex: 0,
                first_instance: 0,
            })
            .collect();
        let uniforms = self
            .uniforms
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        self.queued.push(QueuedDraw {
            mesh: handle,
            commands,
            uniforms,
        });
    }

    fn delete_mesh(&mut self, handle: MeshHandle) {
        if let Some(mesh) = self.meshes.remove(&handle) {
            mesh.vertex_buffer.destroy();
            mesh.index_buffer.destroy();
        }
        self.queued.retain(|d| d.mesh != handle);
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
