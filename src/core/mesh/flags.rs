//! Per-vertex packed bitfields.
//!
//! Layout of a flags word:
//! - bits 0-7: glow level
//! - bits 8-10: z-offset (depth bias step)
//! - bit 11: reflective
//! - bit 12: lod0
//! - bits 13-24: normal, three signed 4-bit components (x, y, z)
//! - bits 25-28: wind mode
//! - bits 29-31: wind data

use glam::Vec3;

pub const GLOW_LEVEL_MASK: i32 = 0xFF;
pub const Z_OFFSET_POS: u32 = 8;
pub const Z_OFFSET_MASK: i32 = 0x7 << Z_OFFSET_POS;
pub const REFLECTIVE_BIT: i32 = 1 << 11;
pub const LOD0_BIT: i32 = 1 << 12;
pub const NORMAL_POS: u32 = 13;
pub const NORMAL_MASK: i32 = 0xFFF << NORMAL_POS;
pub const WIND_MODE_POS: u32 = 25;
pub const WIND_MODE_MASK: i32 = 0xF << WIND_MODE_POS;
pub const WIND_DATA_POS: u32 = 29;
pub const WIND_DATA_MASK: i32 = 0x7 << WIND_DATA_POS;

/// Wind animation applied by the terrain shader.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WindMode {
    None = 0,
    WeakWind = 1,
    NormalWind = 2,
    Leaves = 3,
    Bend = 4,
    TallBend = 5,
    Water = 6,
    ExtraWeakWind = 7,
    Fruit = 8,
    WeakWindNoBend = 9,
    WeakWindInverseBend = 10,
    WaterPlant = 11,
}

impl WindMode {
    pub fn from_bits(bits: u8) -> WindMode {
        match bits {
            1 => WindMode::WeakWind,
            2 => WindMode::NormalWind,
            3 => WindMode::Leaves,
            4 => WindMode::Bend,
            5 => WindMode::TallBend,
            6 => WindMode::Water,
            7 => WindMode::ExtraWeakWind,
            8 => WindMode::Fruit,
            9 => WindMode::WeakWindNoBend,
            10 => WindMode::WeakWindInverseBend,
            11 => WindMode::WaterPlant,
            _ => WindMode::None,
        }
    }
}

/// Typed view over a packed flags word.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct VertexFlags(pub i32);

impl VertexFlags {
    pub fn glow_level(self) -> u8 {
        (self.0 & GLOW_LEVEL_MASK) as u8
    }

    pub fn with_glow_level(self, level: u8) -> Self {
        VertexFlags((self.0 & !GLOW_LEVEL_MASK) | level as i32)
    }

    pub fn z_offset(self) -> u8 {
        ((self.0 & Z_OFFSET_MASK) >> Z_OFFSET_POS) as u8
    }

    pub fn with_z_offset(self, offset: u8) -> Self {
        VertexFlags((self.0 & !Z_OFFSET_MASK) | (((offset & 0x7) as i32) << Z_OFFSET_POS))
    }

    pub fn reflective(self) -> bool {
        self.0 & REFLECTIVE_BIT != 0
    }

    pub fn with_reflective(self, on: bool) -> Self {
        if on {
            VertexFlags(self.0 | REFLECTIVE_BIT)
        } else {
            VertexFlags(self.0 & !REFLECTIVE_BIT)
        }
    }

    pub fn lod0(self) -> bool {
        self.0 & LOD0_BIT != 0
    }

    pub fn normal(self) -> Vec3 {
        unpack_flag_normal(self.0)
    }

    pub fn with_normal(self, normal: Vec3) -> Self {
        VertexFlags((self.0 & !NORMAL_MASK) | pack_flag_normal(normal))
    }

    pub fn wind_mode(self) -> WindMode {
        // shift as u32 so the sign bit never smears into the mode
        WindMode::from_bits((((self.0 as u32) & WIND_MODE_MASK as u32) >> WIND_MODE_POS) as u8)
    }

    pub fn with_wind_mode(self, mode: WindMode) -> Self {
        VertexFlags((self.0 & !WIND_MODE_MASK) | ((mode as i32) << WIND_MODE_POS))
    }

    pub fn wind_data(self) -> u8 {
        (((self.0 as u32) & WIND_DATA_MASK as u32) >> WIND_DATA_POS) as u8
    }

    pub fn with_wind_data(self, data: u8) -> Self {
        let bits = ((data & 0x7) as u32) << WIND_DATA_POS;
        VertexFlags((self.0 & !WIND_DATA_MASK) | bits as i32)
    }
}

fn pack_nibble(v: f32) -> i32 {
    ((v.clamp(-1.0, 1.0) * 7.0).round() as i32) & 0xF
}

fn unpack_nibble(bits: i32) -> f32 {
    // sign-extend the 4-bit value
    let v = ((bits & 0xF) << 28) >> 28;
    v as f32 / 7.0
}

/// Packs a unit normal into the flag normal bits (already shifted into place).
pub fn pack_flag_normal(normal: Vec3) -> i32 {
    let n = normal.normalize_or_zero();
    (pack_nibble(n.x) | (pack_nibble(n.y) << 4) | (pack_nibble(n.z) << 8)) << NORMAL_POS
}

pub fn unpack_flag_normal(flags: i32) -> Vec3 {
    let bits = (flags & NORMAL_MASK) >> NORMAL_POS;
    Vec3::new(
        unpack_nibble(bits),
        unpack_nibble(bits >> 4),
        unpack_nibble(bits >> 8),
    )
}

/// Packs a normal as signed 10-10-10-2 (`INT_2_10_10_10_REV` layout).
pub fn pack_normal(normal: Vec3) -> i32 {
    let n = normal.normalize_or_zero();
    let c = |v: f32| ((v.clamp(-1.0, 1.0) * 511.0).round() as i32) & 0x3FF;
    c(n.x) | (c(n.y) << 10) | (c(n.z) << 20)
}

pub fn unpack_normal(packed: i32) -> Vec3 {
    let c = |shift: u32| {
        let v = ((packed >> shift) << 22) >> 22;
        v as f32 / 511.0
    };
    Vec3::new(c(0), c(10), c(20))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3, eps: f32) -> bool {
        (a - b).abs().max_element() <= eps
    }

    #[test]
    fn packed_normal_survives_roundtrip_within_precision() {
        let n = Vec3::new(0.3, -0.8, 0.52).normalize();
        assert!(close(unpack_normal(pack_normal(n)), n, 0.003));
        assert!(close(unpack_normal(pack_normal(Vec3::NEG_Y)), Vec3::NEG_Y, 0.003));
    }

    #[test]
    fn flag_normal_does_not_touch_neighbouring_bits() {
        let flags = VertexFlags(0)
            .with_glow_level(200)
            .with_wind_mode(WindMode::Leaves)
            .with_wind_data(5)
            .with_normal(Vec3::NEG_X);
        assert_eq!(flags.glow_level(), 200);
        assert_eq!(flags.wind_mode(), WindMode::Leaves);
        assert_eq!(flags.wind_data(), 5);
        assert!(close(flags.normal(), Vec3::NEG_X, 1e-6));

        let flipped = flags.with_normal(Vec3::Z);
        assert_eq!(flipped.glow_level(), 200);
        assert_eq!(flipped.wind_mode(), WindMode::Leaves);
        assert!(close(flipped.normal(), Vec3::Z, 1e-6));
    }

    #[test]
    fn z_offset_and_reflective_bits() {
        let flags = VertexFlags(0).with_z_offset(6).with_reflective(true);
        assert_eq!(flags.z_offset(), 6);
        assert!(flags.reflective());
        assert!(!flags.with_reflective(false).reflective());
    }
}
