//! In-place affine transforms over a [`MeshData`].

use glam::{EulerRot, Mat3, Mat4, Vec3};
use serde::{Deserialize, Serialize};

use super::MeshData;
use super::flags::{self, NORMAL_MASK};
use crate::core::facing::Facing;

/// Placement of a static model: translation, euler rotation (degrees) and
/// scale, all applied around `origin`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelTransform {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    pub origin: Vec3,
}

impl Default for ModelTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            // block models rotate around the block center
            origin: Vec3::splat(0.5),
        }
    }
}

impl ModelTransform {
    pub fn matrix(&self) -> Mat4 {
        let rot = Mat4::from_euler(
            EulerRot::XYZ,
            self.rotation.x.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.z.to_radians(),
        );
        Mat4::from_translation(self.translation + self.origin)
            * rot
            * Mat4::from_scale(self.scale)
            * Mat4::from_translation(-self.origin)
    }

    pub fn is_identity(&self) -> bool {
        self.translation == Vec3::ZERO && self.rotation == Vec3::ZERO && self.scale == Vec3::ONE
    }
}

fn normal_matrix(matrix: &Mat4) -> Mat3 {
    let linear = Mat3::from_mat4(*matrix);
    if linear.determinant().abs() <= f32::EPSILON {
        linear
    } else {
        linear.inverse().transpose()
    }
}

impl MeshData {
    /// Applies `matrix` to positions, packed normals, flag normals and the
    /// per-face facing table.
    pub fn matrix_transform(&mut self, matrix: &Mat4) {
        if self.is_empty() || *matrix == Mat4::IDENTITY {
            return;
        }
        for p in self.xyz.chunks_exact_mut(3) {
            let v = matrix.transform_point3(Vec3::new(p[0], p[1], p[2]));
            p.copy_from_slice(&v.to_array());
        }

        let nmat = normal_matrix(matrix);
        if let Some(normals) = &mut self.normals {
            for n in normals.iter_mut() {
                let v = (nmat * flags::unpack_normal(*n)).normalize_or_zero();
                *n = flags::pack_normal(v);
            }
        }
        if let Some(vflags) = &mut self.flags {
            for f in vflags.iter_mut() {
                if *f & NORMAL_MASK == 0 {
                    continue;
                }
                let v = (nmat * flags::unpack_flag_normal(*f)).normalize_or_zero();
                *f = (*f & !NORMAL_MASK) | flags::pack_flag_normal(v);
            }
        }
        if let Some(faces) = &mut self.xyz_faces {
            let rot = Mat4::from_mat3(nmat);
            for face in faces.iter_mut() {
                if let Some(facing) = Facing::from_mesh_index(*face) {
                    *face = facing.transformed(&rot).mesh_index();
                }
            }
        }
    }

    /// Applies `matrix` around `origin` instead of around zero.
    pub fn matrix_transform_around(&mut self, matrix: &Mat4, origin: Vec3) {
        let m = Mat4::from_translation(origin) * *matrix * Mat4::from_translation(-origin);
        self.matrix_transform(&m);
    }

    /// Offsets every position. A zero offset leaves the buffer untouched.
    pub fn translate(&mut self, offset: Vec3) {
        if offset == Vec3::ZERO {
            return;
        }
        for p in self.xyz.chunks_exact_mut(3) {
            p[0] += offset.x;
            p[1] += offset.y;
            p[2] += offset.z;
        }
    }

    /// Rotates by euler angles in radians (X, then Y, then Z) around `origin`.
    pub fn rotate(&mut self, origin: Vec3, rad_x: f32, rad_y: f32, rad_z: f32) {
        let m = Mat4::from_euler(EulerRot::XYZ, rad_x, rad_y, rad_z);
        self.matrix_transform_around(&m, origin);
    }

    pub fn scale(&mut self, origin: Vec3, scale: Vec3) {
        self.matrix_transform_around(&Mat4::from_scale(scale), origin);
    }

    pub fn model_transform(&mut self, transform: &ModelTransform) {
        if transform.is_identity() {
            return;
        }
        self.matrix_transform(&transform.matrix());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh::flags::{VertexFlags, pack_flag_normal};
    use glam::Vec2;
    use std::f32::consts::FRAC_PI_2;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-4
    }

    fn one_quad() -> MeshData {
        let mut m = MeshData::with_standard_channels(4, 6).with_normals();
        m.add_quad(
            [
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            [255; 4],
            pack_flag_normal(Vec3::NEG_Z),
            1,
            Facing::North.mesh_index(),
        );
        for _ in 0..4 {
            m.add_normal(Vec3::NEG_Z);
        }
        m
    }

    #[test]
    fn zero_translate_is_a_no_op() {
        let mut m = one_quad();
        let before = m.clone();
        m.translate(Vec3::ZERO);
        assert_eq!(m, before);
    }

    #[test]
    fn rotation_moves_positions_normals_flags_and_facings() {
        let mut m = one_quad();
        m.rotate(Vec3::ZERO, 0.0, FRAC_PI_2, 0.0);

        assert!(close(m.position(1), Vec3::new(0.0, 0.0, -1.0)));
        let n = flags::unpack_normal(m.normals().unwrap()[0]);
        assert!(close(n, Vec3::NEG_X) || (n - Vec3::NEG_X).length() < 0.01);
        let f = VertexFlags(m.flags().unwrap()[0]).normal();
        assert!(close(f, Vec3::NEG_X));
        assert_eq!(m.xyz_faces().unwrap()[0], Facing::West.mesh_index());
    }

    #[test]
    fn scale_around_origin_keeps_origin_fixed() {
        let mut m = MeshData::new(2, 0);
        m.add_vertex(Vec3::splat(0.5), Vec2::ZERO);
        m.add_vertex(Vec3::splat(1.0), Vec2::ZERO);
        m.scale(Vec3::splat(0.5), Vec3::splat(2.0));
        assert!(close(m.position(0), Vec3::splat(0.5)));
        assert!(close(m.position(1), Vec3::splat(1.5)));
    }

    #[test]
    fn model_transform_rotates_around_block_center() {
        let mut m = one_quad();
        let t = ModelTransform {
            rotation: Vec3::new(0.0, 180.0, 0.0),
            ..Default::default()
        };
        m.model_transform(&t);
        assert!(close(m.position(0), Vec3::new(1.0, 0.0, 1.0)));
        assert_eq!(m.xyz_faces().unwrap()[0], Facing::South.mesh_index());
    }
}
