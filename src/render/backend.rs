//! Boundary to the graphics API.
//!
//! Pools never talk to the GPU directly. They allocate, fill and draw
//! through a [`GraphicsBackend`], which owns the real buffers and shader
//! state.

use std::ops::{Deref, DerefMut};

use glam::{Mat4, Vec3};

use crate::core::mesh::MeshData;
use crate::render::layout::AttributeLayout;

/// Opaque id of a vertex/index buffer pair owned by the backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub u32);

/// Sizes of a buffer pair to allocate.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshAllocation {
    pub vertex_capacity: u32,
    pub index_capacity: u32,
    pub layout: AttributeLayout,
}

impl MeshAllocation {
    pub fn vertex_bytes(&self) -> u64 {
        self.vertex_capacity as u64 * self.layout.vertex_stride() as u64
    }

    pub fn index_bytes(&self) -> u64 {
        self.index_capacity as u64 * std::mem::size_of::<u32>() as u64
    }
}

/// Where in a buffer pair an upload lands, in elements.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct UploadRange {
    pub vertex_offset: u32,
    pub index_offset: u32,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum UniformValue {
    Vec3(Vec3),
    Mat4(Mat4),
}

pub trait GraphicsBackend {
    /// Allocates an empty vertex/index buffer pair.
    fn allocate_empty_mesh(&mut self, alloc: &MeshAllocation) -> MeshHandle;

    /// Uploads all of `data` at `range` inside the pair. Fire-and-forget.
    fn update_mesh(&mut self, handle: MeshHandle, data: &MeshData, range: UploadRange);

    /// Draws `lengths[i]` indices starting at byte offset `starts[i]` of the
    /// index buffer, for every `i`, in one submission.
    fn render_mesh(&mut self, handle: MeshHandle, starts: &[u32], lengths: &[u32]);

    fn delete_mesh(&mut self, handle: MeshHandle);

    fn set_uniform_vec3(&mut self, name: &str, value: Vec3);

    fn set_uniform_mat4(&mut self, name: &str, value: Mat4);

    fn uniform_mat4(&self, name: &str) -> Option<Mat4>;
}

/// Temporarily replaces a matrix uniform, restoring the previous value when
/// dropped, including during unwinding.
pub struct MatrixSwap<'a, B: GraphicsBackend + ?Sized> {
    backend: &'a mut B,
    name: &'a str,
    previous: Mat4,
}

impl<'a, B: GraphicsBackend + ?Sized> MatrixSwap<'a, B> {
    /// `fallback` is restored when the backend had no value for `name`.
    pub fn new(backend: &'a mut B, name: &'a str, value: Mat4, fallback: Mat4) -> Self {
        let previous = backend.uniform_mat4(name).unwrap_or(fallback);
        backend.set_uniform_mat4(name, value);
        Self {
            backend,
            name,
            previous,
        }
    }
}

impl<B: GraphicsBackend + ?Sized> Deref for MatrixSwap<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backend
    }
}

impl<B: GraphicsBackend + ?Sized> DerefMut for MatrixSwap<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.backend
    }
}

impl<B: GraphicsBackend + ?Sized> Drop for MatrixSwap<'_, B> {
    fn drop(&mut self) {
        self.backend.set_uniform_mat4(self.name, self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::HeadlessBackend;

    #[test]
    fn matrix_swap_restores_previous_value() {
        let mut backend = HeadlessBackend::new();
        let original = Mat4::from_translation(Vec3::X);
        backend.set_uniform_mat4("modelViewMatrix", original);
        {
            let mut swap = MatrixSwap::new(
                &mut backend,
                "modelViewMatrix",
                Mat4::IDENTITY,
                Mat4::ZERO,
            );
            assert_eq!(swap.uniform_mat4("modelViewMatrix"), Some(Mat4::IDENTITY));
            swap.set_uniform_vec3("origin", Vec3::ONE);
        }
        assert_eq!(backend.uniform_mat4("modelViewMatrix"), Some(original));
    }

    #[test]
    fn matrix_swap_restores_on_panic() {
        let mut backend = HeadlessBackend::new();
        backend.set_uniform_mat4("m", Mat4::IDENTITY);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _swap = MatrixSwap::new(&mut backend, "m", Mat4::ZERO, Mat4::IDENTITY);
            panic!("draw failed");
        }));
        assert!(result.is_err());
        assert_eq!(backend.uniform_mat4("m"), Some(Mat4::IDENTITY));
    }
}
