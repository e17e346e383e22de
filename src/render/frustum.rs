use glam::{Mat4, Vec3, Vec4};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AABB {
    pub min: Vec3,
    pub max: Vec3,
}

impl AABB {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        AABB { min, max }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn translated(&self, offset: Vec3) -> AABB {
        AABB::new(self.min + offset, self.max + offset)
    }

    pub fn bounding_sphere(&self) -> Sphere {
        Sphere::new(self.center(), (self.max - self.min).length() * 0.5)
    }

    pub fn is_visible(&self, frustum_planes: &[Vec4; 6]) -> bool {
        let margin = 2.0;
        let expanded_min = self.min - Vec3::splat(margin);
        let expanded_max = self.max + Vec3::splat(margin);

        for plane in frustum_planes {
            let p = Vec3::new(
                if plane.x > 0.0 {
                    expanded_max.x
                } else {
                    expanded_min.x
                },
                if plane.y > 0.0 {
                    expanded_max.y
                } else {
                    expanded_min.y
                },
                if plane.z > 0.0 {
                    expanded_max.z
                } else {
                    expanded_min.z
                },
            );
            if plane.truncate().dot(p) + plane.w < 0.0 {
                return false;
            }
        }
        true
    }
}

/// Bounding sphere used as a placement's culling volume.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Sphere { center, radius }
    }

    pub fn translated(&self, offset: Vec3) -> Sphere {
        Sphere::new(self.center + offset, self.radius)
    }

    /// Plane test against normalized planes.
    pub fn is_visible(&self, frustum_planes: &[Vec4; 6]) -> bool {
        frustum_planes
            .iter()
            .all(|plane| plane.truncate().dot(self.center) + plane.w >= -self.radius)
    }
}

/// How a culling pass treats its volumes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum CullMode {
    #[default]
    Normal,
    /// Everything passes, no test is made.
    ForceAllVisible,
    /// Shadow-map pass for the near cascades: shadow frustum plus a distance cap.
    ShadowNear,
    /// Shadow-map pass for the far cascades: shadow frustum only.
    ShadowFar,
}

/// Volume-vs-frustum test. Volumes are given in camera-relative space.
pub trait FrustumCuller {
    fn sphere_in_frustum(&self, sphere: &Sphere, mode: CullMode) -> bool;
}

/// Plane-based culler built from camera-relative view-projection matrices.
#[derive(Clone, Debug)]
pub struct Frustum {
    planes: [Vec4; 6],
    shadow_planes: Option<[Vec4; 6]>,
    shadow_near_range: f32,
}

impl Frustum {
    pub fn from_view_proj(view_proj: &Mat4) -> Self {
        Self {
            planes: extract_frustum_planes(view_proj),
            shadow_planes: None,
            shadow_near_range: f32::INFINITY,
        }
    }

    pub fn with_shadow(mut self, shadow_view_proj: &Mat4, near_range: f32) -> Self {
        self.shadow_planes = Some(extract_frustum_planes(shadow_view_proj));
        self.shadow_near_range = near_range;
        self
    }

    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }
}

impl FrustumCuller for Frustum {
    fn sphere_in_frustum(&self, sphere: &Sphere, mode: CullMode) -> bool {
        match mode {
            CullMode::ForceAllVisible => true,
            CullMode::Normal => sphere.is_visible(&self.planes),
            CullMode::ShadowNear => {
                sphere.center.length() - sphere.radius <= self.shadow_near_range
                    && sphere.is_visible(self.shadow_planes.as_ref().unwrap_or(&self.planes))
            }
            CullMode::ShadowFar => {
                sphere.is_visible(self.shadow_planes.as_ref().unwrap_or(&self.planes))
            }
        }
    }
}

pub fn extract_frustum_planes(view_proj: &Mat4) -> [Vec4; 6] {
    let r0 = view_proj.row(0);
    let r1 = view_proj.row(1);
    let r2 = view_proj.row(2);
    let r3 = view_proj.row(3);
    let mut planes = [
        // Left
        r3 + r0,
        // Right
        r3 - r0,
        // Bottom
        r3 + r1,
        // Top
        r3 - r1,
        // Near (WGPU depth is [0, 1])
        r2,
        // Far
        r3 - r2,
    ];

    // Normalize planes so that distances are in world units
    for plane in &mut planes {
        let length = plane.truncate().length();
        if length > 0.0 {
            *plane /= length;
        }
    }

    planes
}
