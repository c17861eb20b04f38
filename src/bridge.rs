//! Software offload backend.
//!
//! [`SoftwareBridge`] is the fallback-tier implementation of
//! [`OffloadBridge`]: a small pool of worker threads running the same motion
//! kernels as the synchronous CPU path. It stands in wherever the accelerated
//! runtime is unavailable and doubles as the reference backend for the test
//! suite, since it honors the full bridge contract including latency
//! reporting and worker utilization.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, warn};

use crate::error::OffloadError;
use crate::fallback::kernel;
use crate::metrics::WorkerMetrics;
use crate::offload::{
    as_records_mut, BackendTier, OffloadBridge, OffloadReply, OffloadRequest, RECORD_FLOATS,
};

/// Upper bound on pool size; beyond this the merge cost dominates.
const MAX_WORKERS: usize = 8;

/// Velocity reconstruction timestep, matching a 60 Hz frame.
const VELOCITY_DT: f32 = 0.016;

#[derive(Debug, Default)]
struct PoolStats {
    active: AtomicUsize,
    queued: AtomicUsize,
    tasks: AtomicU64,
    particles: AtomicU64,
    busy_micros: AtomicU64,
}

/// Thread-pool backend running the closed-form kernels off the frame loop.
pub struct SoftwareBridge {
    jobs: Option<Sender<OffloadRequest>>,
    handles: Vec<JoinHandle<()>>,
    stats: Arc<PoolStats>,
    workers: usize,
    started: Instant,
}

impl SoftwareBridge {
    /// Spawn a pool sized from available parallelism, capped at 8.
    pub fn new() -> Self {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(MAX_WORKERS);
        Self::with_workers(workers)
    }

    /// Spawn a pool with an explicit worker count.
    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = channel::<OffloadRequest>();
        let rx = Arc::new(Mutex::new(rx));
        let stats = Arc::new(PoolStats::default());

        let handles = (0..workers)
            .map(|id| {
                let rx = Arc::clone(&rx);
                let stats = Arc::clone(&stats);
                thread::Builder::new()
                    .name(format!("stardrift-worker-{id}"))
                    .spawn(move || worker_loop(rx, stats))
                    .expect("failed to spawn offload worker")
            })
            .collect();

        debug!(workers, "software bridge started");
        Self {
            jobs: Some(tx),
            handles,
            stats,
            workers,
            started: Instant::now(),
        }
    }

    /// Number of worker threads in the pool.
    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Default for SoftwareBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl OffloadBridge for SoftwareBridge {
    fn tier(&self) -> BackendTier {
        BackendTier::Software
    }

    fn submit(&mut self, request: OffloadRequest) -> Result<(), OffloadError> {
        let jobs = self.jobs.as_ref().ok_or(OffloadError::NotReady)?;
        self.stats.queued.fetch_add(1, Ordering::Relaxed);
        jobs.send(request).map_err(|_| {
            self.stats.queued.fetch_sub(1, Ordering::Relaxed);
            OffloadError::ChannelClosed
        })
    }

    fn worker_metrics(&self) -> WorkerMetrics {
        let tasks = self.stats.tasks.load(Ordering::Relaxed);
        let busy_micros = self.stats.busy_micros.load(Ordering::Relaxed);
        let particles = self.stats.particles.load(Ordering::Relaxed);
        let uptime = self.started.elapsed().as_secs_f32().max(f32::EPSILON);
        WorkerMetrics {
            active_workers: self.stats.active.load(Ordering::Relaxed),
            total_workers: self.workers,
            queue_depth: self.stats.queued.load(Ordering::Relaxed),
            throughput: particles as f32 / uptime,
            avg_latency_ms: if tasks > 0 {
                busy_micros as f32 / 1_000.0 / tasks as f32
            } else {
                0.0
            },
        }
    }
}

impl Drop for SoftwareBridge {
    fn drop(&mut self) {
        // closing the channel lets every worker drain and exit
        self.jobs.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("offload worker panicked during shutdown");
            }
        }
    }
}

fn worker_loop(rx: Arc<Mutex<Receiver<OffloadRequest>>>, stats: Arc<PoolStats>) {
    loop {
        let request = {
            let guard = match rx.lock() {
                Ok(g) => g,
                Err(_) => return,
            };
            match guard.recv() {
                Ok(req) => req,
                Err(_) => return,
            }
        };

        stats.queued.fetch_sub(1, Ordering::Relaxed);
        stats.active.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let (reply_tx, reply, particles) = process_request(request, start);

        stats.active.fetch_sub(1, Ordering::Relaxed);
        stats.tasks.fetch_add(1, Ordering::Relaxed);
        stats
            .busy_micros
            .fetch_add(start.elapsed().as_micros() as u64, Ordering::Relaxed);
        stats.particles.fetch_add(particles as u64, Ordering::Relaxed);

        // a dropped receiver means the engine was torn down mid-flight
        let _ = reply_tx.send(reply);
    }
}

/// Run the motion kernel over every record of a request.
fn process_request(
    mut request: OffloadRequest,
    start: Instant,
) -> (Sender<OffloadReply>, OffloadReply, usize) {
    let particles = request.data.len() / RECORD_FLOATS;

    for (i, record) in as_records_mut(&mut request.data).iter_mut().enumerate() {
        let [x, y, z] = record.position;
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            continue;
        }
        // per-particle time skew keyed to the global index keeps motion
        // independent of how the caller partitioned chunks
        let t = request.elapsed + (request.global_offset + i as u64) as f32 * 0.001;
        let (nx, ny, nz) = kernel(request.mode, x, y, z, t);
        if nx.is_finite() && ny.is_finite() && nz.is_finite() {
            record.velocity = [
                (nx - x) / VELOCITY_DT,
                (ny - y) / VELOCITY_DT,
                (nz - z) / VELOCITY_DT,
            ];
            record.position = [nx, ny, nz];
        }
    }

    let reply = OffloadReply {
        result: Ok(std::mem::take(&mut request.data)),
        generation: request.generation,
        chunk: request.chunk,
        latency_ms: start.elapsed().as_secs_f32() * 1_000.0,
    };
    (request.reply, reply, particles)
}
