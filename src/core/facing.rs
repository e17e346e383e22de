use glam::{Mat4, Vec3};

/// One of the six axis-aligned face directions of a block.
///
/// Per-face tables in [`MeshData`](crate::core::mesh::MeshData) store
/// `facing.mesh_index()`, where `0` means "no facing".
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Facing {
    North,
    East,
    South,
    West,
    Up,
    Down,
}

impl Facing {
    pub const ALL: [Facing; 6] = [
        Facing::North,
        Facing::East,
        Facing::South,
        Facing::West,
        Facing::Up,
        Facing::Down,
    ];

    pub fn normal(self) -> Vec3 {
        match self {
            Facing::North => Vec3::new(0.0, 0.0, -1.0),
            Facing::East => Vec3::new(1.0, 0.0, 0.0),
            Facing::South => Vec3::new(0.0, 0.0, 1.0),
            Facing::West => Vec3::new(-1.0, 0.0, 0.0),
            Facing::Up => Vec3::new(0.0, 1.0, 0.0),
            Facing::Down => Vec3::new(0.0, -1.0, 0.0),
        }
    }

    /// Index stored in per-face tables (1..=6).
    pub fn mesh_index(self) -> u8 {
        match self {
            Facing::North => 1,
            Facing::East => 2,
            Facing::South => 3,
            Facing::West => 4,
            Facing::Up => 5,
            Facing::Down => 6,
        }
    }

    pub fn from_mesh_index(index: u8) -> Option<Facing> {
        match index {
            1 => Some(Facing::North),
            2 => Some(Facing::East),
            3 => Some(Facing::South),
            4 => Some(Facing::West),
            5 => Some(Facing::Up),
            6 => Some(Facing::Down),
            _ => None,
        }
    }

    /// Facing whose normal is closest to `normal`.
    pub fn from_normal(normal: Vec3) -> Facing {
        let mut best = Facing::Up;
        let mut best_dot = f32::NEG_INFINITY;
        for facing in Facing::ALL {
            let d = facing.normal().dot(normal);
            if d > best_dot {
                best_dot = d;
                best = facing;
            }
        }
        best
    }

    /// Rotates this facing by the linear part of `matrix` and snaps the result.
    pub fn transformed(self, matrix: &Mat4) -> Facing {
        Facing::from_normal(matrix.transform_vector3(self.normal()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_index_roundtrip() {
        for facing in Facing::ALL {
            assert_eq!(Facing::from_mesh_index(facing.mesh_index()), Some(facing));
        }
        assert_eq!(Facing::from_mesh_index(0), None);
    }

    #[test]
    fn quarter_turn_about_y_moves_north_to_west() {
        let rot = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2);
        assert_eq!(Facing::North.transformed(&rot), Facing::West);
        assert_eq!(Facing::Up.transformed(&rot), Facing::Up);
    }
}
