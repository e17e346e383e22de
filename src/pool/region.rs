use std::fmt;
use std::rc::Rc;

use glam::{DVec3, Mat4};

/// Moving detached coordinate space, such as a ship or a moving platform.
pub trait SubworldController {
    /// Offset of the subworld for this frame, interpolated by `delta_time`.
    fn render_offset(&self, delta_time: f32) -> DVec3;

    /// Model-view matrix the subworld's geometry is drawn with.
    fn render_transform(&self, model_view: &Mat4, viewer: DVec3, delta_time: f32) -> Mat4;
}

/// Coordinate space a batch belongs to, as supplied by content producers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Region {
    #[default]
    World,
    Subworld(u32),
}

/// Region of a pool, fixed at creation. Only subworld pools carry a
/// controller handle.
#[derive(Clone)]
pub enum PoolRegion {
    World,
    Subworld {
        id: u32,
        controller: Rc<dyn SubworldController>,
    },
}

impl PoolRegion {
    pub fn tag(&self) -> Region {
        match self {
            PoolRegion::World => Region::World,
            PoolRegion::Subworld { id, .. } => Region::Subworld(*id),
        }
    }
}

impl fmt::Debug for PoolRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolRegion::World => write!(f, "World"),
            PoolRegion::Subworld { id, .. } => write!(f, "Subworld({id})"),
        }
    }
}
