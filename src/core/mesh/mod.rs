//! CPU-side geometry buffer builder.
//!
//! A [`MeshData`] holds parallel attribute arrays for one batch of geometry
//! (positions, packed normals, UVs, colors, flags, custom channels) plus
//! per-face bookkeeping. Content systems fill one on a worker thread and hand
//! it to a pool manager on the render thread, which copies it into a shared
//! GPU buffer.

pub mod custom;
pub mod flags;
pub mod recycler;
pub mod transform;

use glam::{Vec2, Vec3};

use crate::render::frustum::{AABB, Sphere};
pub use custom::CustomChannel;
pub use flags::{VertexFlags, WindMode};
pub use recycler::MeshDataRecycler;
pub use transform::ModelTransform;

/// Primitive topology of a buffer. Fixed once the buffer is created.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum DrawMode {
    #[default]
    Triangles,
    Lines,
    Points,
}

impl DrawMode {
    pub fn indices_per_primitive(self) -> u32 {
        match self {
            DrawMode::Triangles => 3,
            DrawMode::Lines => 2,
            DrawMode::Points => 1,
        }
    }
}

/// Render pass tag meaning "use the block's default pass".
pub const DEFAULT_RENDER_PASS: i16 = -1;

/// Growable multi-attribute vertex/index buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshData {
    pub(crate) xyz: Vec<f32>,
    pub(crate) normals: Option<Vec<i32>>,
    pub(crate) uv: Option<Vec<f32>>,
    pub(crate) rgba: Option<Vec<u8>>,
    pub(crate) flags: Option<Vec<i32>>,
    pub(crate) indices: Vec<u32>,

    pub custom_floats: Option<CustomChannel<f32>>,
    pub custom_ints: Option<CustomChannel<i32>>,
    pub custom_shorts: Option<CustomChannel<i16>>,
    pub custom_bytes: Option<CustomChannel<u8>>,

    /// GPU texture ids referenced by `texture_indices`.
    pub(crate) texture_ids: Vec<i32>,
    pub(crate) texture_indices: Option<Vec<u8>>,
    pub(crate) xyz_faces: Option<Vec<u8>>,
    pub(crate) render_passes: Option<Vec<i16>>,
    pub(crate) climate_color_map_ids: Option<Vec<u8>>,
    pub(crate) season_color_map_ids: Option<Vec<u8>>,

    vertices_max: usize,
    indices_max: usize,

    pub mode: DrawMode,
    pub vertices_per_face: usize,
    pub indices_per_face: usize,
    /// Set by the recycler; decides what `dispose` does.
    pub recyclable: bool,
}

impl Default for MeshData {
    fn default() -> Self {
        MeshData::new(0, 0)
    }
}

fn reserve_to<T>(v: &mut Vec<T>, total: usize) {
    if v.capacity() < total {
        v.reserve_exact(total - v.len());
    }
}

impl MeshData {
    /// Creates a buffer with positions and indices only.
    pub fn new(capacity_vertices: usize, capacity_indices: usize) -> Self {
        Self {
            xyz: Vec::with_capacity(capacity_vertices * 3),
            normals: None,
            uv: None,
            rgba: None,
            flags: None,
            indices: Vec::with_capacity(capacity_indices),
            custom_floats: None,
            custom_ints: None,
            custom_shorts: None,
            custom_bytes: None,
            texture_ids: Vec::new(),
            texture_indices: None,
            xyz_faces: None,
            render_passes: None,
            climate_color_map_ids: None,
            season_color_map_ids: None,
            vertices_max: capacity_vertices,
            indices_max: capacity_indices,
            mode: DrawMode::Triangles,
            vertices_per_face: 4,
            indices_per_face: 6,
            recyclable: false,
        }
    }

    /// Typical block-geometry buffer: uv, rgba, flags and per-face tables.
    pub fn with_standard_channels(capacity_vertices: usize, capacity_indices: usize) -> Self {
        MeshData::new(capacity_vertices, capacity_indices)
            .with_uv()
            .with_rgba()
            .with_flags()
            .with_texture_indices()
            .with_xyz_faces()
            .with_render_passes()
    }

    pub fn with_normals(mut self) -> Self {
        self.normals = Some(Vec::with_capacity(self.vertices_max));
        self
    }

    pub fn with_uv(mut self) -> Self {
        self.uv = Some(Vec::with_capacity(self.vertices_max * 2));
        self
    }

    pub fn with_rgba(mut self) -> Self {
        self.rgba = Some(Vec::with_capacity(self.vertices_max * 4));
        self
    }

    pub fn with_flags(mut self) -> Self {
        self.flags = Some(Vec::with_capacity(self.vertices_max));
        self
    }

    pub fn with_texture_indices(mut self) -> Self {
        self.texture_indices = Some(Vec::new());
        self
    }

    pub fn with_xyz_faces(mut self) -> Self {
        self.xyz_faces = Some(Vec::new());
        self
    }

    pub fn with_render_passes(mut self) -> Self {
        self.render_passes = Some(Vec::new());
        self
    }

    pub fn with_color_maps(mut self) -> Self {
        self.climate_color_map_ids = Some(Vec::new());
        self.season_color_map_ids = Some(Vec::new());
        self
    }

    pub fn with_mode(mut self, mode: DrawMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_face_shape(mut self, vertices_per_face: usize, indices_per_face: usize) -> Self {
        self.vertices_per_face = vertices_per_face.max(1);
        self.indices_per_face = indices_per_face.max(1);
        self
    }

    // ------------------------------------------------------------------
    // Counts and accessors
    // ------------------------------------------------------------------

    pub fn vertices_count(&self) -> usize {
        self.xyz.len() / 3
    }

    pub fn indices_count(&self) -> usize {
        self.indices.len()
    }

    pub fn vertices_max(&self) -> usize {
        self.vertices_max
    }

    pub fn indices_max(&self) -> usize {
        self.indices_max
    }

    pub fn is_empty(&self) -> bool {
        self.xyz.is_empty() && self.indices.is_empty()
    }

    /// Number of faces, derived from the fixed vertices-per-face shape.
    pub fn faces_count(&self) -> usize {
        self.vertices_count() / self.vertices_per_face
    }

    pub fn xyz(&self) -> &[f32] {
        &self.xyz
    }

    pub fn position(&self, vertex: usize) -> Vec3 {
        Vec3::from_slice(&self.xyz[vertex * 3..vertex * 3 + 3])
    }

    pub fn normals(&self) -> Option<&[i32]> {
        self.normals.as_deref()
    }

    pub fn uv(&self) -> Option<&[f32]> {
        self.uv.as_deref()
    }

    pub fn rgba(&self) -> Option<&[u8]> {
        self.rgba.as_deref()
    }

    pub fn flags(&self) -> Option<&[i32]> {
        self.flags.as_deref()
    }

    pub fn flags_mut(&mut self) -> Option<&mut [i32]> {
        self.flags.as_deref_mut()
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn indices_mut(&mut self) -> &mut [u32] {
        &mut self.indices
    }

    pub fn texture_ids(&self) -> &[i32] {
        &self.texture_ids
    }

    pub fn texture_indices(&self) -> Option<&[u8]> {
        self.texture_indices.as_deref()
    }

    pub fn xyz_faces(&self) -> Option<&[u8]> {
        self.xyz_faces.as_deref()
    }

    pub fn render_passes(&self) -> Option<&[i16]> {
        self.render_passes.as_deref()
    }

    pub fn climate_color_map_ids(&self) -> Option<&[u8]> {
        self.climate_color_map_ids.as_deref()
    }

    pub fn season_color_map_ids(&self) -> Option<&[u8]> {
        self.season_color_map_ids.as_deref()
    }

    /// Texture id of a face, if the buffer tracks per-face textures.
    pub fn face_texture_id(&self, face: usize) -> Option<i32> {
        let idx = *self.texture_indices.as_ref()?.get(face)?;
        self.texture_ids.get(idx as usize).copied()
    }

    // ------------------------------------------------------------------
    // Growth
    // ------------------------------------------------------------------

    /// Makes room for `count` vertices in every present vertex channel,
    /// doubling the capacity until it fits.
    pub fn grow_vertices(&mut self, count: usize) {
        if count <= self.vertices_max {
            return;
        }
        let mut new_max = self.vertices_max.max(1);
        while new_max < count {
            new_max *= 2;
        }
        self.vertices_max = new_max;

        reserve_to(&mut self.xyz, new_max * 3);
        if let Some(n) = &mut self.normals {
            reserve_to(n, new_max);
        }
        if let Some(uv) = &mut self.uv {
            reserve_to(uv, new_max * 2);
        }
        if let Some(rgba) = &mut self.rgba {
            reserve_to(rgba, new_max * 4);
        }
        if let Some(flags) = &mut self.flags {
            reserve_to(flags, new_max);
        }
    }

    /// Sets the capacity to exactly `vertices`/`indices`, never below the content.
    pub fn reserve_exact(&mut self, vertices: usize, indices: usize) {
        let vertices = vertices.max(self.vertices_count());
        let indices = indices.max(self.indices_count());
        self.vertices_max = vertices;
        self.indices_max = indices;
        reserve_to(&mut self.xyz, vertices * 3);
        reserve_to(&mut self.indices, indices);
        if let Some(n) = &mut self.normals {
            reserve_to(n, vertices);
        }
        if let Some(uv) = &mut self.uv {
            reserve_to(uv, vertices * 2);
        }
        if let Some(rgba) = &mut self.rgba {
            reserve_to(rgba, vertices * 4);
        }
        if let Some(flags) = &mut self.flags {
            reserve_to(flags, vertices);
        }
    }

    pub fn grow_indices(&mut self, count: usize) {
        if count <= self.indices_max {
            return;
        }
        let mut new_max = self.indices_max.max(1);
        while new_max < count {
            new_max *= 2;
        }
        self.indices_max = new_max;
        reserve_to(&mut self.indices, new_max);
    }

    // ------------------------------------------------------------------
    // Appending
    // ------------------------------------------------------------------

    /// Appends a vertex. Present channels that are not supplied get a neutral
    /// value (white, no flags) so all vertex arrays stay aligned.
    pub fn add_vertex(&mut self, pos: Vec3, uv: Vec2) {
        self.push_vertex(pos, uv, [255; 4], 0);
    }

    pub fn add_vertex_with_color(&mut self, pos: Vec3, uv: Vec2, rgba: [u8; 4]) {
        self.push_vertex(pos, uv, rgba, 0);
    }

    pub fn add_vertex_with_flags(&mut self, pos: Vec3, uv: Vec2, rgba: [u8; 4], flags: i32) {
        self.push_vertex(pos, uv, rgba, flags);
    }

    fn push_vertex(&mut self, pos: Vec3, uv: Vec2, rgba: [u8; 4], flags: i32) {
        let count = self.vertices_count();
        self.grow_vertices(count + 1);
        self.xyz.extend_from_slice(&[pos.x, pos.y, pos.z]);
        if let Some(buf) = &mut self.uv {
            buf.extend_from_slice(&[uv.x, uv.y]);
        }
        if let Some(buf) = &mut self.rgba {
            buf.extend_from_slice(&rgba);
        }
        if let Some(buf) = &mut self.flags {
            buf.push(flags);
        }
    }

    /// Appends a packed normal to the normals channel, creating it if needed.
    pub fn add_normal(&mut self, normal: Vec3) {
        self.add_packed_normal(flags::pack_normal(normal));
    }

    pub fn add_packed_normal(&mut self, packed: i32) {
        let max = self.vertices_max;
        let normals = self.normals.get_or_insert_with(|| Vec::with_capacity(max));
        if normals.len() >= normals.capacity() {
            let target = (normals.capacity() * 2).max(max).max(1);
            reserve_to(normals, target);
        }
        normals.push(packed);
    }

    pub fn add_index(&mut self, index: u32) {
        let count = self.indices.len();
        self.grow_indices(count + 1);
        self.indices.push(index);
    }

    pub fn add_indices(&mut self, indices: &[u32]) {
        if indices.is_empty() {
            return;
        }
        let count = self.indices.len();
        self.grow_indices(count + indices.len());
        self.indices.extend_from_slice(indices);
    }

    /// Two triangles covering the quad starting at vertex `base`.
    pub fn add_quad_indices(&mut self, base: u32) {
        self.add_indices(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Interns a GPU texture id into this buffer's table and returns its local index.
    pub fn get_texture_index(&mut self, texture_id: i32) -> u8 {
        if let Some(i) = self.texture_ids.iter().position(|&t| t == texture_id) {
            return i as u8;
        }
        assert!(
            self.texture_ids.len() < u8::MAX as usize,
            "mesh references more than {} distinct textures",
            u8::MAX
        );
        self.texture_ids.push(texture_id);
        (self.texture_ids.len() - 1) as u8
    }

    /// Records the texture of the next face.
    pub fn add_texture_id(&mut self, texture_id: i32) {
        let idx = self.get_texture_index(texture_id);
        self.texture_indices.get_or_insert_with(Vec::new).push(idx);
    }

    pub fn add_xyz_face(&mut self, facing_index: u8) {
        self.xyz_faces.get_or_insert_with(Vec::new).push(facing_index);
    }

    pub fn add_render_pass(&mut self, pass: i16) {
        self.render_passes.get_or_insert_with(Vec::new).push(pass);
    }

    pub fn add_color_map_data(&mut self, climate_map: u8, season_map: u8) {
        self.climate_color_map_ids
            .get_or_insert_with(Vec::new)
            .push(climate_map);
        self.season_color_map_ids
            .get_or_insert_with(Vec::new)
            .push(season_map);
    }

    /// Appends a textured quad: four vertices, six indices and one face entry
    /// in every per-face table the buffer tracks.
    pub fn add_quad(
        &mut self,
        corners: [Vec3; 4],
        rgba: [u8; 4],
        flags: i32,
        texture_id: i32,
        facing_index: u8,
    ) {
        let base = self.vertices_count() as u32;
        let uvs = [
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 0.0),
        ];
        for (pos, uv) in corners.into_iter().zip(uvs) {
            self.push_vertex(pos, uv, rgba, flags);
        }
        self.add_quad_indices(base);
        if self.texture_indices.is_some() {
            self.add_texture_id(texture_id);
        }
        if self.xyz_faces.is_some() {
            self.add_xyz_face(facing_index);
        }
        if self.render_passes.is_some() {
            self.add_render_pass(DEFAULT_RENDER_PASS);
        }
        if self.climate_color_map_ids.is_some() {
            self.add_color_map_data(0, 0);
        }
    }

    // ------------------------------------------------------------------
    // Merging
    // ------------------------------------------------------------------

    /// Appends all of `source`, rebasing its indices past this buffer's vertices.
    pub fn add_mesh_data(&mut self, source: &MeshData) {
        self.add_mesh_data_offset(source, Vec3::ZERO);
    }

    /// Like [`add_mesh_data`](Self::add_mesh_data), translating the copied
    /// positions by `offset`.
    pub fn add_mesh_data_offset(&mut self, source: &MeshData, offset: Vec3) {
        if source.is_empty() {
            return;
        }
        let base = self.vertices_count() as u32;
        let vcount = source.vertices_count();
        self.grow_vertices(base as usize + vcount);

        if offset == Vec3::ZERO {
            self.xyz.extend_from_slice(&source.xyz);
        } else {
            for p in source.xyz.chunks_exact(3) {
                self.xyz
                    .extend_from_slice(&[p[0] + offset.x, p[1] + offset.y, p[2] + offset.z]);
            }
        }
        self.copy_vertex_channels(source, 0, vcount);

        let icount = self.indices.len();
        self.grow_indices(icount + source.indices.len());
        self.indices.extend(source.indices.iter().map(|&i| i + base));

        let remap: Vec<u8> = source
            .texture_ids
            .iter()
            .map(|&id| self.get_texture_index(id))
            .collect();
        for face in 0..source.faces_count() {
            let texture_index = source
                .face_texture_slot(face)
                .and_then(|slot| remap.get(slot).copied())
                .unwrap_or(0);
            self.copy_face_tables(source, face, texture_index);
        }
        self.copy_custom_channels(source, 0, vcount);
    }

    /// Appends only the faces of `source` for which `keep(face)` is true.
    /// Only the texture ids of kept faces are interned.
    ///
    /// Assumes face-structured geometry: the indices of face `f` only reference
    /// the vertices of face `f`.
    pub fn add_mesh_data_filtered<F>(&mut self, source: &MeshData, mut keep: F)
    where
        F: FnMut(usize) -> bool,
    {
        if source.is_empty() {
            return;
        }
        let vpf = source.vertices_per_face;
        let ipf = source.indices_per_face;
        let mut remap: Vec<Option<u8>> = vec![None; source.texture_ids.len()];

        for face in 0..source.faces_count() {
            if !keep(face) {
                continue;
            }
            let src_v0 = face * vpf;
            let src_i0 = face * ipf;
            if src_i0 + ipf > source.indices.len() {
                break;
            }
            let base = self.vertices_count();
            self.grow_vertices(base + vpf);
            self.xyz
                .extend_from_slice(&source.xyz[src_v0 * 3..(src_v0 + vpf) * 3]);
            self.copy_vertex_channels(source, src_v0, vpf);

            let icount = self.indices.len();
            self.grow_indices(icount + ipf);
            for &i in &source.indices[src_i0..src_i0 + ipf] {
                self.indices.push(i - src_v0 as u32 + base as u32);
            }
            let texture_index = match source.face_texture_slot(face) {
                Some(slot) => match remap.get_mut(slot) {
                    Some(Some(index)) => *index,
                    Some(entry) => {
                        let index = self.get_texture_index(source.texture_ids[slot]);
                        *entry = Some(index);
                        index
                    }
                    None => 0,
                },
                None => 0,
            };
            self.copy_face_tables(source, face, texture_index);
            self.copy_custom_channels(source, src_v0, vpf);
        }
    }

    /// Slot in `texture_ids` the face points at.
    fn face_texture_slot(&self, face: usize) -> Option<usize> {
        self.texture_indices
            .as_ref()
            .and_then(|t| t.get(face))
            .map(|&i| i as usize)
    }

    /// Called after `count` positions were appended; keeps every present
    /// channel aligned with them.
    fn copy_vertex_channels(&mut self, source: &MeshData, first: usize, count: usize) {
        let range = first..first + count;
        let base = self.vertices_count() - count;
        if let Some(dst) = &mut self.uv {
            match &source.uv {
                Some(src) => dst.extend_from_slice(&src[range.start * 2..range.end * 2]),
                None => dst.resize(dst.len() + count * 2, 0.0),
            }
        }
        if let Some(dst) = &mut self.rgba {
            match &source.rgba {
                Some(src) => dst.extend_from_slice(&src[range.start * 4..range.end * 4]),
                None => dst.resize(dst.len() + count * 4, 255),
            }
        }
        if let Some(dst) = &mut self.flags {
            match &source.flags {
                Some(src) => dst.extend_from_slice(&src[range.clone()]),
                None => dst.resize(dst.len() + count, 0),
            }
        }
        let zero = flags::pack_normal(Vec3::ZERO);
        match &source.normals {
            Some(src) => {
                let dst = self.normals.get_or_insert_with(Vec::new);
                if dst.len() < base {
                    dst.resize(base, zero);
                }
                let end = range.end.min(src.len());
                let start = range.start.min(end);
                dst.extend_from_slice(&src[start..end]);
                dst.resize(base + count, zero);
            }
            None => {
                if let Some(dst) = &mut self.normals {
                    dst.resize(base + count, zero);
                }
            }
        }
    }

    fn copy_face_tables(&mut self, source: &MeshData, face: usize, texture_index: u8) {
        if let Some(dst) = &mut self.texture_indices {
            dst.push(texture_index);
        }
        if let Some(dst) = &mut self.xyz_faces {
            let v = source
                .xyz_faces
                .as_ref()
                .and_then(|t| t.get(face).copied());
            dst.push(v.unwrap_or(0));
        }
        if let Some(dst) = &mut self.render_passes {
            let v = source
                .render_passes
                .as_ref()
                .and_then(|t| t.get(face).copied());
            dst.push(v.unwrap_or(DEFAULT_RENDER_PASS));
        }
        if let Some(dst) = &mut self.climate_color_map_ids {
            let v = source
                .climate_color_map_ids
                .as_ref()
                .and_then(|t| t.get(face).copied());
            dst.push(v.unwrap_or(0));
        }
        if let Some(dst) = &mut self.season_color_map_ids {
            let v = source
                .season_color_map_ids
                .as_ref()
                .and_then(|t| t.get(face).copied());
            dst.push(v.unwrap_or(0));
        }
    }

    fn copy_custom_channels(&mut self, source: &MeshData, first: usize, count: usize) {
        fn copy<T: Copy + Default>(
            dst: &mut Option<CustomChannel<T>>,
            src: &Option<CustomChannel<T>>,
            first: usize,
            count: usize,
        ) {
            let Some(dst) = dst.as_mut() else {
                return;
            };
            if dst.instanced {
                // instanced data is not tied to vertices; keep whole runs
                if let Some(src) = src.as_ref().filter(|s| s.instanced && first == 0) {
                    dst.extend_from_slice(src.as_slice());
                }
                return;
            }
            let wanted = count * dst.values_per_vertex();
            match src.as_ref().filter(|s| !s.instanced) {
                Some(src) => {
                    let per = src.values_per_vertex();
                    let start = (first * per).min(src.count);
                    let end = ((first + count) * per).min(src.count);
                    let copied = end.saturating_sub(start);
                    dst.extend_from_slice(&src.values[start..start + copied]);
                    dst.extend_default(wanted.saturating_sub(copied));
                }
                None => dst.extend_default(wanted),
            }
        }
        copy(&mut self.custom_floats, &source.custom_floats, first, count);
        copy(&mut self.custom_ints, &source.custom_ints, first, count);
        copy(&mut self.custom_shorts, &source.custom_shorts, first, count);
        copy(&mut self.custom_bytes, &source.custom_bytes, first, count);
    }

    // ------------------------------------------------------------------
    // Structural copies
    // ------------------------------------------------------------------

    /// Same channels and face shape, zero length.
    pub fn empty_clone(&self) -> MeshData {
        MeshData {
            xyz: Vec::new(),
            normals: self.normals.as_ref().map(|_| Vec::new()),
            uv: self.uv.as_ref().map(|_| Vec::new()),
            rgba: self.rgba.as_ref().map(|_| Vec::new()),
            flags: self.flags.as_ref().map(|_| Vec::new()),
            indices: Vec::new(),
            custom_floats: self.custom_floats.as_ref().map(CustomChannel::empty_clone),
            custom_ints: self.custom_ints.as_ref().map(CustomChannel::empty_clone),
            custom_shorts: self.custom_shorts.as_ref().map(CustomChannel::empty_clone),
            custom_bytes: self.custom_bytes.as_ref().map(CustomChannel::empty_clone),
            texture_ids: Vec::new(),
            texture_indices: self.texture_indices.as_ref().map(|_| Vec::new()),
            xyz_faces: self.xyz_faces.as_ref().map(|_| Vec::new()),
            render_passes: self.render_passes.as_ref().map(|_| Vec::new()),
            climate_color_map_ids: self.climate_color_map_ids.as_ref().map(|_| Vec::new()),
            season_color_map_ids: self.season_color_map_ids.as_ref().map(|_| Vec::new()),
            vertices_max: 0,
            indices_max: 0,
            mode: self.mode,
            vertices_per_face: self.vertices_per_face,
            indices_per_face: self.indices_per_face,
            recyclable: false,
        }
    }

    /// True when both buffers carry the same set of channels and face shape.
    pub fn same_layout(&self, other: &MeshData) -> bool {
        fn both<T>(a: &Option<T>, b: &Option<T>) -> bool {
            a.is_some() == b.is_some()
        }
        fn custom<T>(a: &Option<CustomChannel<T>>, b: &Option<CustomChannel<T>>) -> bool {
            match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => {
                    a.interleave_sizes == b.interleave_sizes && a.instanced == b.instanced
                }
                _ => false,
            }
        }
        both(&self.normals, &other.normals)
            && both(&self.uv, &other.uv)
            && both(&self.rgba, &other.rgba)
            && both(&self.flags, &other.flags)
            && both(&self.texture_indices, &other.texture_indices)
            && both(&self.xyz_faces, &other.xyz_faces)
            && both(&self.render_passes, &other.render_passes)
            && both(&self.climate_color_map_ids, &other.climate_color_map_ids)
            && custom(&self.custom_floats, &other.custom_floats)
            && custom(&self.custom_ints, &other.custom_ints)
            && custom(&self.custom_shorts, &other.custom_shorts)
            && custom(&self.custom_bytes, &other.custom_bytes)
            && self.mode == other.mode
            && self.vertices_per_face == other.vertices_per_face
            && self.indices_per_face == other.indices_per_face
    }

    /// Deep copy that draws its storage from `recycler` when a tight fit exists.
    pub fn clone_using_recycler(&self, recycler: &MeshDataRecycler) -> MeshData {
        let mut out = recycler.get_or_create(self.vertices_count(), self.indices_count(), self);
        out.add_mesh_data(self);
        out
    }

    /// Splits a multi-texture buffer into one buffer per distinct texture id,
    /// in the order the ids were first interned.
    pub fn split_by_texture_id(&self) -> Vec<MeshData> {
        let Some(tex) = &self.texture_indices else {
            return vec![self.clone()];
        };
        if self.texture_ids.len() <= 1 {
            return vec![self.clone()];
        }
        (0..self.texture_ids.len())
            .map(|t| {
                let mut part = self.empty_clone();
                part.add_mesh_data_filtered(self, |face| {
                    tex.get(face).copied() == Some(t as u8)
                });
                part
            })
            .filter(|part| !part.is_empty())
            .collect()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Resets all counts while keeping the allocated storage.
    pub fn clear(&mut self) {
        self.xyz.clear();
        self.indices.clear();
        if let Some(v) = &mut self.uv {
            v.clear();
        }
        if let Some(v) = &mut self.normals {
            v.clear();
        }
        if let Some(v) = &mut self.rgba {
            v.clear();
        }
        if let Some(v) = &mut self.flags {
            v.clear();
        }
        for v in [
            &mut self.texture_indices,
            &mut self.xyz_faces,
            &mut self.climate_color_map_ids,
            &mut self.season_color_map_ids,
        ]
        .into_iter()
        .flatten()
        {
            v.clear();
        }
        if let Some(v) = &mut self.render_passes {
            v.clear();
        }
        self.texture_ids.clear();
        if let Some(c) = &mut self.custom_floats {
            c.clear();
        }
        if let Some(c) = &mut self.custom_ints {
            c.clear();
        }
        if let Some(c) = &mut self.custom_shorts {
            c.clear();
        }
        if let Some(c) = &mut self.custom_bytes {
            c.clear();
        }
    }

    /// Shrinks every array to its content.
    pub fn compact(&mut self) {
        self.xyz.shrink_to_fit();
        self.indices.shrink_to_fit();
        if let Some(v) = &mut self.normals {
            v.shrink_to_fit();
        }
        if let Some(v) = &mut self.uv {
            v.shrink_to_fit();
        }
        if let Some(v) = &mut self.rgba {
            v.shrink_to_fit();
        }
        if let Some(v) = &mut self.flags {
            v.shrink_to_fit();
        }
        if let Some(c) = &mut self.custom_floats {
            c.compact();
        }
        if let Some(c) = &mut self.custom_ints {
            c.compact();
        }
        if let Some(c) = &mut self.custom_shorts {
            c.compact();
        }
        if let Some(c) = &mut self.custom_bytes {
            c.compact();
        }
        self.vertices_max = self.vertices_count();
        self.indices_max = self.indices_count();
    }

    /// Releases the buffer: back to `recycler` if it came from one, dropped otherwise.
    pub fn dispose(self, recycler: Option<&MeshDataRecycler>) {
        match recycler {
            Some(r) if self.recyclable => r.recycle(self),
            _ => drop(self),
        }
    }

    // ------------------------------------------------------------------
    // Bounds
    // ------------------------------------------------------------------

    pub fn bounds(&self) -> Option<AABB> {
        let mut points = self.xyz.chunks_exact(3).map(Vec3::from_slice);
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
        Some(AABB::new(min, max))
    }

    pub fn bounding_sphere(&self) -> Option<Sphere> {
        self.bounds().map(|b| b.bounding_sphere())
    }
}
