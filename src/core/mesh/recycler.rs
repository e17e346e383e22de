//! Size-bucketed free list of [`MeshData`] buffers.
//!
//! Tesselator threads pull buffers out of the recycler while the render thread
//! returns them after upload, so the free list sits behind a mutex.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use super::MeshData;

#[derive(Default)]
struct RecyclerState {
    /// vertex capacity -> buffers of exactly that capacity
    buckets: BTreeMap<usize, Vec<MeshData>>,
    retained: usize,
    reused: u64,
    created: u64,
    dropped: u64,
}

/// Counters exposed for diagnostics.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RecyclerStats {
    pub retained: usize,
    pub reused: u64,
    pub created: u64,
    pub dropped: u64,
}

pub struct MeshDataRecycler {
    state: Mutex<RecyclerState>,
    tolerance: f32,
    max_retained: usize,
}

impl MeshDataRecycler {
    /// `tolerance` bounds how oversized a reused buffer may be, as a fraction of
    /// the requested vertex count (0.2 accepts up to 20% spare capacity).
    pub fn new(tolerance: f32, max_retained: usize) -> Self {
        Self {
            state: Mutex::new(RecyclerState::default()),
            tolerance: tolerance.max(0.0),
            max_retained,
        }
    }

    fn max_fit(&self, min_vertices: usize) -> usize {
        min_vertices + (min_vertices as f32 * self.tolerance).ceil() as usize
    }

    /// Returns an empty buffer shaped like `template` with room for at least
    /// `min_vertices`/`min_indices`. Reuses a retained buffer only on a tight
    /// fit, otherwise allocates exactly what was asked for.
    pub fn get_or_create(
        &self,
        min_vertices: usize,
        min_indices: usize,
        template: &MeshData,
    ) -> MeshData {
        let upper = self.max_fit(min_vertices);
        {
            let mut state = self.state.lock();
            let mut hit = None;
            for (&cap, list) in state.buckets.range(min_vertices..=upper) {
                if let Some(pos) = list
                    .iter()
                    .position(|m| m.indices_max() >= min_indices && m.same_layout(template))
                {
                    hit = Some((cap, pos));
                    break;
                }
            }
            if let Some((cap, pos)) = hit {
                if let Some(list) = state.buckets.get_mut(&cap) {
                    let mut mesh = list.swap_remove(pos);
                    if list.is_empty() {
                        state.buckets.remove(&cap);
                    }
                    state.retained -= 1;
                    state.reused += 1;
                    mesh.clear();
                    mesh.recyclable = true;
                    return mesh;
                }
            }
            state.created += 1;
        }

        let mut fresh = template.empty_clone();
        fresh.reserve_exact(min_vertices, min_indices);
        fresh.recyclable = true;
        fresh
    }

    /// Takes a buffer back. Its arrays are cleared lazily, on reuse.
    pub fn recycle(&self, mesh: MeshData) {
        let mut state = self.state.lock();
        if state.retained >= self.max_retained || mesh.vertices_max() == 0 {
            state.dropped += 1;
            return;
        }
        state.retained += 1;
        state
            .buckets
            .entry(mesh.vertices_max())
            .or_default()
            .push(mesh);
    }

    pub fn stats(&self) -> RecyclerStats {
        let state = self.state.lock();
        RecyclerStats {
            retained: state.retained,
            reused: state.reused,
            created: state.created,
            dropped: state.dropped,
        }
    }

    /// Drops every retained buffer.
    pub fn purge(&self) {
        let mut state = self.state.lock();
        state.dropped += state.retained as u64;
        state.buckets.clear();
        state.retained = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    fn filled(vertices: usize) -> MeshData {
        let mut m = MeshData::new(vertices, vertices).with_uv();
        for i in 0..vertices {
            m.add_vertex(Vec3::splat(i as f32), Vec2::ZERO);
            m.add_index(i as u32);
        }
        m
    }

    #[test]
    fn reuses_only_tight_fits() {
        let recycler = MeshDataRecycler::new(0.2, 16);
        let template = MeshData::new(0, 0).with_uv();

        let mut big = recycler.get_or_create(200, 200, &template);
        big.add_vertex(Vec3::ZERO, Vec2::ZERO);
        recycler.recycle(big);

        // 200 is more than 20% over 100: fresh allocation
        let small = recycler.get_or_create(100, 100, &template);
        assert_eq!(small.vertices_max(), 100);
        assert_eq!(recycler.stats().retained, 1);

        // 200 is within 20% of 180: reused, and cleared
        let reused = recycler.get_or_create(180, 100, &template);
        assert_eq!(reused.vertices_max(), 200);
        assert!(reused.is_empty());
        assert_eq!(recycler.stats().reused, 1);
        assert_eq!(recycler.stats().retained, 0);
    }

    #[test]
    fn layout_mismatch_is_not_reused() {
        let recycler = MeshDataRecycler::new(0.2, 16);
        recycler.recycle(filled(64));
        let other_layout = MeshData::new(0, 0).with_rgba();
        let m = recycler.get_or_create(64, 64, &other_layout);
        assert!(m.rgba().is_some());
        assert_eq!(recycler.stats().reused, 0);
    }

    #[test]
    fn respects_retention_cap() {
        let recycler = MeshDataRecycler::new(0.2, 1);
        recycler.recycle(filled(8));
        recycler.recycle(filled(8));
        let stats = recycler.stats();
        assert_eq!(stats.retained, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn clone_using_recycler_is_a_deep_copy() {
        let recycler = MeshDataRecycler::new(0.2, 4);
        let src = filled(10);
        let copy = src.clone_using_recycler(&recycler);
        assert_eq!(copy.xyz(), src.xyz());
        assert_eq!(copy.indices(), src.indices());
        assert!(copy.recyclable);

        copy.dispose(Some(&recycler));
        assert_eq!(recycler.stats().retained, 1);
        let again = src.clone_using_recycler(&recycler);
        assert_eq!(again.indices(), src.indices());
        assert_eq!(recycler.stats().reused, 1);
    }
}
