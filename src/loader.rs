//! Hand-off of geometry built on worker threads to the render thread.
//!
//! Workers only ever fill [`MeshData`]; the render thread polls finished
//! buffers and places them into pools itself.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::mesh::MeshData;

const QUEUE_DEPTH: usize = 128;

pub struct MeshBuildResult<R> {
    pub request: R,
    pub mesh: MeshData,
}

pub struct MeshBuildQueue<R> {
    request_tx: Sender<R>,
    result_rx: Receiver<MeshBuildResult<R>>,
    workers: usize,
}

impl<R: Send + 'static> MeshBuildQueue<R> {
    /// Spawns `worker_count` threads running `build` for every request.
    pub fn new<F>(worker_count: usize, build: F) -> Self
    where
        F: Fn(&R) -> MeshData + Send + Sync + 'static,
    {
        let (request_tx, request_rx) = bounded::<R>(QUEUE_DEPTH);
        let (result_tx, result_rx) = bounded::<MeshBuildResult<R>>(QUEUE_DEPTH);
        let build = Arc::new(build);

        let mut workers = 0;
        for i in 0..worker_count {
            let rx = request_rx.clone();
            let tx = result_tx.clone();
            let build = Arc::clone(&build);

            let spawned = thread::Builder::new()
                .name(format!("mesh-worker-{}", i))
                .spawn(move || {
                    while let Ok(request) = rx.recv() {
                        let mesh = build(&request);
                        if tx.send(MeshBuildResult { request, mesh }).is_err() {
                            break;
                        }
                    }
                });
            match spawned {
                Ok(_) => workers += 1,
                Err(e) => tracing::error!("Failed to spawn mesh worker {}: {}", i, e),
            }
        }
        tracing::debug!(workers, "mesh build queue started");

        Self {
            request_tx,
            result_rx,
            workers,
        }
    }

    /// Queues a request. Returns false when the queue is full or no worker
    /// is running; the caller may retry next frame.
    pub fn request(&self, request: R) -> bool {
        if self.workers == 0 {
            return false;
        }
        match self.request_tx.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("mesh workers are gone, request dropped");
                false
            }
        }
    }

    /// Next finished buffer, if any. Never blocks.
    pub fn poll_result(&self) -> Option<MeshBuildResult<R>> {
        self.result_rx.try_recv().ok()
    }

    /// Blocks for the next finished buffer.
    pub fn wait_result(&self) -> Option<MeshBuildResult<R>> {
        self.result_rx.recv().ok()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    #[test]
    fn workers_build_requested_meshes() {
        let queue = MeshBuildQueue::new(2, |n: &usize| {
            let mut mesh = MeshData::new(*n, 0);
            for i in 0..*n {
                mesh.add_vertex(Vec3::splat(i as f32), Vec2::ZERO);
            }
            mesh
        });
        assert_eq!(queue.workers(), 2);
        for n in 1..=5 {
            assert!(queue.request(n));
        }

        let mut sizes = Vec::new();
        for _ in 0..5 {
            let result = queue.wait_result().unwrap();
            assert_eq!(result.mesh.vertices_count(), result.request);
            sizes.push(result.request);
        }
        sizes.sort();
        assert_eq!(sizes, vec![1, 2, 3, 4, 5]);
        assert!(queue.poll_result().is_none());
    }

    #[test]
    fn no_workers_rejects_requests() {
        let queue = MeshBuildQueue::new(0, |_: &u32| MeshData::new(0, 0));
        assert!(!queue.request(1));
    }
}
