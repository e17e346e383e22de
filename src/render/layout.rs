//! Interleaved vertex layout shared by every pool of one manager.

use crate::core::mesh::{CustomChannel, MeshData};

/// Which channels a vertex carries and how custom channels are interleaved.
///
/// All meshes routed through one pool manager must share a layout, since they
/// end up interleaved in the same vertex buffers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct AttributeLayout {
    pub normals: bool,
    pub uv: bool,
    pub rgba: bool,
    pub flags: bool,
    pub custom_floats: Vec<u32>,
    pub custom_ints: Vec<u32>,
    pub custom_shorts: Vec<u32>,
    pub custom_bytes: Vec<u32>,
}

const POSITION_BYTES: u32 = 12;

/// Components one custom attribute occupies in the vertex buffer. There are
/// no 3-component 8/16-bit vertex formats, so those are widened to 4, and
/// attributes are capped at 4 components.
fn slot_components(size: u32, narrow: bool) -> u32 {
    match size {
        3 if narrow => 4,
        size => size.min(4),
    }
}

fn per_vertex_sizes<T>(channel: &Option<CustomChannel<T>>) -> Vec<u32> {
    match channel {
        Some(c) if !c.instanced => c.interleave_sizes.clone(),
        _ => Vec::new(),
    }
}

impl AttributeLayout {
    pub fn from_mesh(mesh: &MeshData) -> Self {
        Self {
            normals: mesh.normals.is_some(),
            uv: mesh.uv.is_some(),
            rgba: mesh.rgba.is_some(),
            flags: mesh.flags.is_some(),
            custom_floats: per_vertex_sizes(&mesh.custom_floats),
            custom_ints: per_vertex_sizes(&mesh.custom_ints),
            custom_shorts: per_vertex_sizes(&mesh.custom_shorts),
            custom_bytes: per_vertex_sizes(&mesh.custom_bytes),
        }
    }

    pub fn matches(&self, mesh: &MeshData) -> bool {
        *self == AttributeLayout::from_mesh(mesh)
    }

    fn custom_bytes_per_vertex(&self) -> u32 {
        let sum = |sizes: &[u32], elem: u32| {
            sizes
                .iter()
                .map(|&s| slot_components(s, elem < 4))
                .sum::<u32>()
                * elem
        };
        sum(&self.custom_floats, 4)
            + sum(&self.custom_ints, 4)
            + sum(&self.custom_shorts, 2)
            + sum(&self.custom_bytes, 1)
    }

    /// Bytes per vertex, padded to 4 so every upload offset stays aligned.
    pub fn vertex_stride(&self) -> u32 {
        let mut stride = POSITION_BYTES;
        if self.normals {
            stride += 4;
        }
        if self.uv {
            stride += 8;
        }
        if self.rgba {
            stride += 4;
        }
        if self.flags {
            stride += 4;
        }
        stride += self.custom_bytes_per_vertex();
        stride.div_ceil(4) * 4
    }

    /// Interleaves every vertex of `mesh` into `out` following this layout.
    /// Channels the mesh lacks get neutral values (zero, white for colors).
    pub fn write_vertices(&self, mesh: &MeshData, out: &mut Vec<u8>) {
        let stride = self.vertex_stride() as usize;
        let count = mesh.vertices_count();
        out.reserve(count * stride);

        for v in 0..count {
            let start = out.len();
            for c in &mesh.xyz[v * 3..v * 3 + 3] {
                out.extend_from_slice(&c.to_le_bytes());
            }
            if self.normals {
                let n = mesh
                    .normals
                    .as_ref()
                    .and_then(|n| n.get(v).copied())
                    .unwrap_or(0);
                out.extend_from_slice(&n.to_le_bytes());
            }
            if self.uv {
                match &mesh.uv {
                    Some(uv) => {
                        out.extend_from_slice(&uv[v * 2].to_le_bytes());
                        out.extend_from_slice(&uv[v * 2 + 1].to_le_bytes());
                    }
                    None => out.extend_from_slice(&[0; 8]),
                }
            }
            if self.rgba {
                match &mesh.rgba {
                    Some(rgba) => out.extend_from_slice(&rgba[v * 4..v * 4 + 4]),
                    None => out.extend_from_slice(&[255; 4]),
                }
            }
            if self.flags {
                let f = mesh.flags.as_ref().map(|f| f[v]).unwrap_or(0);
                out.extend_from_slice(&f.to_le_bytes());
            }
            write_custom(&self.custom_floats, &mesh.custom_floats, v, false, out, |x| {
                x.to_le_bytes().to_vec()
            });
            write_custom(&self.custom_ints, &mesh.custom_ints, v, false, out, |x| {
                x.to_le_bytes().to_vec()
            });
            write_custom(&self.custom_shorts, &mesh.custom_shorts, v, true, out, |x| {
                x.to_le_bytes().to_vec()
            });
            write_custom(&self.custom_bytes, &mesh.custom_bytes, v, true, out, |x| vec![x]);
            out.resize(start + stride, 0);
        }
    }

    /// Vertex attributes for a pipeline using this layout, locations from 0.
    /// Offsets agree with [`vertex_stride`](Self::vertex_stride) and
    /// [`write_vertices`](Self::write_vertices).
    pub fn vertex_attributes(&self) -> Vec<wgpu::VertexAttribute> {
        use wgpu::VertexFormat as F;

        let mut attrs = Vec::new();
        let mut offset = 0u64;
        let mut push = |format: F, attrs: &mut Vec<wgpu::VertexAttribute>| {
            attrs.push(wgpu::VertexAttribute {
                format,
                offset,
                shader_location: attrs.len() as u32,
            });
            offset += format.size();
        };

        push(F::Float32x3, &mut attrs);
        if self.normals {
            push(F::Sint32, &mut attrs);
        }
        if self.uv {
            push(F::Float32x2, &mut attrs);
        }
        if self.rgba {
            push(F::Unorm8x4, &mut attrs);
        }
        if self.flags {
            push(F::Sint32, &mut attrs);
        }
        for &size in &self.custom_floats {
            match size {
                0 => {}
                1 => push(F::Float32, &mut attrs),
                2 => push(F::Float32x2, &mut attrs),
                3 => push(F::Float32x3, &mut attrs),
                _ => push(F::Float32x4, &mut attrs),
            }
        }
        for &size in &self.custom_ints {
            match size {
                0 => {}
                1 => push(F::Sint32, &mut attrs),
                2 => push(F::Sint32x2, &mut attrs),
                3 => push(F::Sint32x3, &mut attrs),
                _ => push(F::Sint32x4, &mut attrs),
            }
        }
        for &size in &self.custom_shorts {
            match size {
                0 => {}
                1 => push(F::Sint16, &mut attrs),
                2 => push(F::Sint16x2, &mut attrs),
                _ => push(F::Sint16x4, &mut attrs),
            }
        }
        for &size in &self.custom_bytes {
            match size {
                0 => {}
                1 => push(F::Uint8, &mut attrs),
                2 => push(F::Uint8x2, &mut attrs),
                _ => push(F::Uint8x4, &mut attrs),
            }
        }
        attrs
    }
}

/// Writes one vertex worth of a custom channel, each attribute widened to
/// its slot with default values.
fn write_custom<T: Copy + Default>(
    sizes: &[u32],
    channel: &Option<CustomChannel<T>>,
    vertex: usize,
    narrow: bool,
    out: &mut Vec<u8>,
    to_bytes: impl Fn(T) -> Vec<u8>,
) {
    let per_vertex: usize = sizes.iter().sum::<u32>() as usize;
    if per_vertex == 0 {
        return;
    }
    let values = channel.as_ref().map(|c| c.as_slice()).unwrap_or(&[]);
    let mut next = vertex * per_vertex;
    for &size in sizes {
        let slot = slot_components(size, narrow) as usize;
        for i in 0..slot {
            let value = if i < size as usize {
                values.get(next + i).copied().unwrap_or_default()
            } else {
                T::default()
            };
            out.extend_from_slice(&to_bytes(value));
        }
        next += size as usize;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    #[test]
    fn stride_counts_present_channels_and_pads() {
        let mut mesh = MeshData::with_standard_channels(0, 0);
        let layout = AttributeLayout::from_mesh(&mesh);
        // 12 xyz + 8 uv + 4 rgba + 4 flags
        assert_eq!(layout.vertex_stride(), 28);

        mesh.custom_bytes = Some(CustomChannel::new(0).with_interleave(&[1]));
        let layout = AttributeLayout::from_mesh(&mesh);
        assert_eq!(layout.vertex_stride(), 32);
    }

    #[test]
    fn instanced_channels_do_not_widen_vertices() {
        let mut mesh = MeshData::new(0, 0);
        let mut ch = CustomChannel::<f32>::new(0).with_interleave(&[4, 4, 4, 4]);
        ch.instanced = true;
        mesh.custom_floats = Some(ch);
        assert_eq!(AttributeLayout::from_mesh(&mesh).vertex_stride(), 12);
    }

    #[test]
    fn write_vertices_interleaves_in_order() {
        let mut mesh = MeshData::new(2, 0).with_uv().with_flags();
        mesh.custom_floats = Some(CustomChannel::new(2).with_interleave(&[1]));
        mesh.add_vertex_with_flags(Vec3::new(1.0, 2.0, 3.0), Vec2::new(0.5, 0.25), [0; 4], 7);
        if let Some(c) = &mut mesh.custom_floats {
            c.add(9.0);
        }

        let layout = AttributeLayout::from_mesh(&mesh);
        let mut out = Vec::new();
        layout.write_vertices(&mesh, &mut out);
        assert_eq!(out.len(), layout.vertex_stride() as usize);

        let f = |i: usize| f32::from_le_bytes(out[i..i + 4].try_into().unwrap());
        assert_eq!(f(0), 1.0);
        assert_eq!(f(8), 3.0);
        assert_eq!(f(12), 0.5);
        assert_eq!(i32::from_le_bytes(out[20..24].try_into().unwrap()), 7);
        assert_eq!(f(24), 9.0);
    }

    #[test]
    fn attribute_offsets_follow_stride() {
        let mesh = MeshData::with_standard_channels(0, 0);
        let layout = AttributeLayout::from_mesh(&mesh);
        let attrs = layout.vertex_attributes();
        assert_eq!(attrs.len(), 4);
        assert_eq!(attrs[3].offset, 24);
        assert_eq!(attrs[3].shader_location, 3);
    }

    #[test]
    fn three_component_shorts_are_widened_consistently() {
        let mut mesh = MeshData::new(2, 0);
        mesh.custom_shorts = Some(CustomChannel::new(0).with_interleave(&[3]));
        mesh.custom_bytes = Some(CustomChannel::new(0).with_interleave(&[1]));
        mesh.add_vertex(Vec3::ZERO, Vec2::ZERO);
        mesh.add_vertex(Vec3::ONE, Vec2::ZERO);
        if let Some(c) = &mut mesh.custom_shorts {
            c.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        }
        if let Some(c) = &mut mesh.custom_bytes {
            c.extend_from_slice(&[7, 8]);
        }

        let layout = AttributeLayout::from_mesh(&mesh);
        // 12 xyz + 8 shorts (3 padded to 4) + 1 byte, padded to 4
        assert_eq!(layout.vertex_stride(), 24);

        let attrs = layout.vertex_attributes();
        assert_eq!(attrs[1].format, wgpu::VertexFormat::Sint16x4);
        assert_eq!(attrs[1].offset, 12);
        assert_eq!(attrs[2].offset, 20);
        let end = attrs[2].offset + attrs[2].format.size();
        assert!(end <= layout.vertex_stride() as u64);

        let mut out = Vec::new();
        layout.write_vertices(&mesh, &mut out);
        assert_eq!(out.len(), 48);
        let short = |i: usize| i16::from_le_bytes(out[i..i + 2].try_into().unwrap());
        assert_eq!((short(12), short(14), short(16), short(18)), (1, 2, 3, 0));
        assert_eq!(out[20], 7);
        assert_eq!((short(36), short(38), short(40), short(42)), (4, 5, 6, 0));
        assert_eq!(out[44], 8);
    }
}
