//! Offload bridge contract and wire format.
//!
//! The accelerated backend is consumed through [`OffloadBridge`]: the
//! dispatcher submits one chunk at a time and the bridge delivers its reply
//! through an `mpsc` channel carried in the request. Completions are never
//! applied from the bridge's own thread; the engine drains the channel at the
//! start of the next tick on the frame-loop thread, which is what makes the
//! shared buffer single-threaded by construction.
//!
//! The wire format is fixed at 8 floats per particle: position, velocity,
//! elapsed time and intensity. Any reply with a different length is a
//! failure; the chunk is skipped for that frame and the CPU path picks it up
//! on the next rotation.

use std::sync::mpsc::Sender;

use bytemuck::{Pod, Zeroable};
use serde::Serialize;

use crate::buffer::{ParticleBuffer, POSITION_STRIDE};
use crate::chunk::ChunkDescriptor;
use crate::error::OffloadError;
use crate::metrics::WorkerMetrics;
use crate::pattern::AnimationMode;

/// Floats per particle on the wire.
pub const RECORD_FLOATS: usize = 8;

/// Minimum component change for a returned position to be committed.
/// Backend echoes below this threshold would only churn the dirty flag.
pub const COMMIT_EPSILON: f32 = 1e-4;

/// One particle as submitted to and returned from the backend.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct OffloadRecord {
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    /// Elapsed simulation time, identical across a request.
    pub elapsed: f32,
    pub intensity: f32,
}

/// Capability tier of the resolved compute backend. Resolved once at startup
/// and re-checked on a slow poll; the dispatcher only ever sees the derived
/// `is_ready` boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendTier {
    /// Dedicated accelerated runtime (GPU or equivalent).
    Accelerated,
    /// Software worker pool standing in for the accelerated runtime.
    Software,
    /// No offload target; everything runs on the frame-loop CPU path.
    None,
}

impl BackendTier {
    #[inline]
    pub fn is_ready(&self) -> bool {
        !matches!(self, BackendTier::None)
    }
}

/// A single chunk submission.
#[derive(Debug)]
pub struct OffloadRequest {
    /// Interleaved [`OffloadRecord`] data, `len = particles * 8`.
    pub data: Vec<f32>,
    /// Elapsed simulation time at submission.
    pub elapsed: f32,
    /// Active animation mode for the backend's motion kernel.
    pub mode: AnimationMode,
    /// Index of the first particle in the chunk, so the backend can compute
    /// motion independent of how the caller partitions chunks.
    pub global_offset: u64,
    /// Engine generation; replies from a torn-down buffer are discarded.
    pub generation: u64,
    /// The chunk this request covers.
    pub chunk: ChunkDescriptor,
    /// Completion channel back to the frame-loop thread.
    pub reply: Sender<OffloadReply>,
}

/// Completion of an [`OffloadRequest`].
#[derive(Debug)]
pub struct OffloadReply {
    /// Equal-length 8-float data on success.
    pub result: Result<Vec<f32>, OffloadError>,
    pub generation: u64,
    pub chunk: ChunkDescriptor,
    /// Wall-clock time the backend spent on this chunk.
    pub latency_ms: f32,
}

/// Asynchronous compute backend consumed by the dispatcher.
///
/// `submit` must return quickly: the work itself happens elsewhere and the
/// reply arrives over the request's channel. Implementations must send
/// exactly one reply per accepted request, including on failure, so the
/// single-flight guard is always released.
pub trait OffloadBridge: Send {
    /// Capability tier of this backend.
    fn tier(&self) -> BackendTier;

    /// Whether the backend can accept a submission right now.
    fn ready(&self) -> bool {
        self.tier().is_ready()
    }

    /// Device-reported maximum buffer size in bytes, when known.
    fn device_limit_bytes(&self) -> Option<usize> {
        None
    }

    /// Current worker utilization, for the metrics collector.
    fn worker_metrics(&self) -> WorkerMetrics {
        WorkerMetrics::default()
    }

    /// Submit one chunk. An `Err` means the request was not accepted and no
    /// reply will be sent.
    fn submit(&mut self, request: OffloadRequest) -> Result<(), OffloadError>;
}

/// View a wire buffer as typed records. The length must be a multiple of 8.
#[inline]
pub fn as_records(data: &[f32]) -> &[OffloadRecord] {
    bytemuck::cast_slice(data)
}

/// Mutable variant of [`as_records`], for backends animating in place.
#[inline]
pub fn as_records_mut(data: &mut [f32]) -> &mut [OffloadRecord] {
    bytemuck::cast_slice_mut(data)
}

/// Expand a chunk of the buffer into the 8-float wire format.
pub fn pack_chunk(buf: &ParticleBuffer, chunk: &ChunkDescriptor, elapsed: f32) -> Vec<f32> {
    let first = chunk.start / POSITION_STRIDE;
    let count = chunk.len_particles();
    let mut data = Vec::with_capacity(count * RECORD_FLOATS);
    for p in first..first + count {
        let base = p * POSITION_STRIDE;
        data.extend_from_slice(&buf.positions[base..base + 3]);
        data.extend_from_slice(&buf.velocities[base..base + 3]);
        data.push(elapsed);
        data.push(buf.intensities[p]);
    }
    data
}

/// Merge an offload reply back into the buffer.
///
/// Only the position triplet of each record is extracted. A particle is
/// committed when all three components are finite and at least one differs
/// from the current value beyond [`COMMIT_EPSILON`]; otherwise the previous
/// value is retained. Returns the number of committed particles.
pub fn commit_result(
    buf: &mut ParticleBuffer,
    chunk: &ChunkDescriptor,
    data: &[f32],
) -> Result<usize, OffloadError> {
    let expected = chunk.len_particles() * RECORD_FLOATS;
    if data.len() != expected {
        return Err(OffloadError::MalformedResult {
            expected,
            got: data.len(),
        });
    }

    let first = chunk.start / POSITION_STRIDE;
    let mut committed = 0;
    for (i, record) in as_records(data).iter().enumerate() {
        let [nx, ny, nz] = record.position;
        if !(nx.is_finite() && ny.is_finite() && nz.is_finite()) {
            continue;
        }
        let base = (first + i) * POSITION_STRIDE;
        let current = &buf.positions[base..base + 3];
        let changed = (nx - current[0]).abs() > COMMIT_EPSILON
            || (ny - current[1]).abs() > COMMIT_EPSILON
            || (nz - current[2]).abs() > COMMIT_EPSILON;
        if changed {
            buf.positions[base] = nx;
            buf.positions[base + 1] = ny;
            buf.positions[base + 2] = nz;
            committed += 1;
        }
    }
    if committed > 0 {
        buf.mark_dirty();
    }
    Ok(committed)
}
