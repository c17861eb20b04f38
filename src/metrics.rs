//! Observability aggregation.
//!
//! The collector accumulates per-chunk throughput, offload outcomes and
//! frame timing continuously, but publishes a [`MetricsSnapshot`] at most
//! once per second. Snapshots are serde-serializable because they cross the
//! host boundary as JSON in the embedding application.

use serde::Serialize;
use tracing::trace;

/// Utilization of the offload backend's worker pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WorkerMetrics {
    /// Workers currently processing a task.
    pub active_workers: usize,
    /// Workers in the pool.
    pub total_workers: usize,
    /// Tasks waiting for a worker.
    pub queue_depth: usize,
    /// Particles processed per second, averaged over the pool's lifetime.
    pub throughput: f32,
    /// Mean per-task latency in milliseconds.
    pub avg_latency_ms: f32,
}

/// Published once per second at most.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Frames per second over the last sample window.
    pub fps: f32,
    /// Fraction of recent frames that took the accelerated path.
    pub gpu_utilization: f32,
    /// Duration of the most recent dispatch step in milliseconds.
    pub frame_time_ms: f32,
    /// Particles in the active buffer.
    pub particle_count: usize,
    /// Particles animated since the previous snapshot.
    pub particles_processed: u64,
    /// Cumulative offload failures since engine start. A handful is noise;
    /// a steadily climbing count means the backend is unhealthy.
    pub offload_failures: u64,
    /// Offload worker pool utilization.
    pub worker: WorkerMetrics,
}

/// Continuous accumulator with 1 Hz publication.
#[derive(Debug)]
pub struct MetricsCollector {
    snapshot: MetricsSnapshot,
    last_refresh: f32,
    window_frames: u64,
    window_offload_frames: u64,
    window_particles: u64,
    offload_failures: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            snapshot: MetricsSnapshot::default(),
            last_refresh: 0.0,
            window_frames: 0,
            window_offload_frames: 0,
            window_particles: 0,
            offload_failures: 0,
        }
    }

    /// Record one animated chunk and which path handled it.
    pub fn record_chunk(&mut self, particles: usize, offloaded: bool) {
        self.window_frames += 1;
        self.window_particles += particles as u64;
        if offloaded {
            self.window_offload_frames += 1;
        }
    }

    /// Record a failed offload attempt.
    pub fn record_offload_failure(&mut self) {
        self.offload_failures += 1;
    }

    /// Cumulative offload failures since start.
    #[inline]
    pub fn offload_failures(&self) -> u64 {
        self.offload_failures
    }

    /// Publish a new snapshot if at least one second has passed since the
    /// previous one. Returns whether a refresh happened.
    pub fn maybe_refresh(
        &mut self,
        elapsed: f32,
        fps: f32,
        frame_time_ms: f32,
        particle_count: usize,
        worker: WorkerMetrics,
    ) -> bool {
        if elapsed - self.last_refresh < 1.0 {
            return false;
        }
        let utilization = if self.window_frames > 0 {
            self.window_offload_frames as f32 / self.window_frames as f32
        } else {
            0.0
        };
        self.snapshot = MetricsSnapshot {
            fps,
            gpu_utilization: utilization,
            frame_time_ms,
            particle_count,
            particles_processed: self.window_particles,
            offload_failures: self.offload_failures,
            worker,
        };
        trace!(fps, utilization, particle_count, "metrics refreshed");

        self.last_refresh = elapsed;
        self.window_frames = 0;
        self.window_offload_frames = 0;
        self.window_particles = 0;
        true
    }

    /// The most recently published snapshot.
    #[inline]
    pub fn snapshot(&self) -> &MetricsSnapshot {
        &self.snapshot
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_is_rate_limited() {
        let mut collector = MetricsCollector::new();
        collector.record_chunk(1_000, false);
        assert!(!collector.maybe_refresh(0.5, 60.0, 4.0, 1_000, WorkerMetrics::default()));
        assert!(collector.maybe_refresh(1.0, 60.0, 4.0, 1_000, WorkerMetrics::default()));
        assert!(!collector.maybe_refresh(1.5, 60.0, 4.0, 1_000, WorkerMetrics::default()));
        assert!(collector.maybe_refresh(2.1, 60.0, 4.0, 1_000, WorkerMetrics::default()));
    }

    #[test]
    fn test_utilization_reflects_offload_share() {
        let mut collector = MetricsCollector::new();
        for i in 0..10 {
            collector.record_chunk(100, i < 3);
        }
        collector.maybe_refresh(1.0, 60.0, 4.0, 100, WorkerMetrics::default());
        let snap = collector.snapshot();
        assert!((snap.gpu_utilization - 0.3).abs() < 1e-6);
        assert_eq!(snap.particles_processed, 1_000);
    }

    #[test]
    fn test_window_resets_after_refresh() {
        let mut collector = MetricsCollector::new();
        collector.record_chunk(500, true);
        collector.maybe_refresh(1.0, 60.0, 4.0, 500, WorkerMetrics::default());
        collector.maybe_refresh(2.0, 60.0, 4.0, 500, WorkerMetrics::default());
        assert_eq!(collector.snapshot().particles_processed, 0);
        assert_eq!(collector.snapshot().gpu_utilization, 0.0);
    }

    #[test]
    fn test_failures_accumulate_across_windows() {
        let mut collector = MetricsCollector::new();
        collector.record_offload_failure();
        collector.maybe_refresh(1.0, 60.0, 4.0, 0, WorkerMetrics::default());
        collector.record_offload_failure();
        collector.maybe_refresh(2.0, 60.0, 4.0, 0, WorkerMetrics::default());
        assert_eq!(collector.snapshot().offload_failures, 2);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snap = MetricsSnapshot::default();
        let json = serde_json::to_value(&snap).unwrap();
        assert!(json.get("gpu_utilization").is_some());
        assert!(json["worker"].get("queue_depth").is_some());
    }
}
