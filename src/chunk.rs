//! Chunk partitioning and rotation.
//!
//! The position buffer is processed one chunk per frame. Chunk selection is a
//! pure function of elapsed time and the target frame rate, so every chunk is
//! revisited with a bounded period no matter how the actual frame rate
//! jitters. Chunks overlap by a fixed margin on both sides: boundary
//! particles are animated redundantly by both neighbours, which hides seams
//! when offload results and CPU fallback writes interleave.

/// Default chunk size in floats when no device hint is available
/// (50 000 particles).
pub const DEFAULT_CHUNK_FLOATS: usize = 150_000;

/// Overlap margin in floats added on each side of a chunk (666 particles).
pub const OVERLAP_FLOATS: usize = 1_998;

/// Particle count above which offload becomes worthwhile; smaller buffers run
/// entirely on the CPU path.
pub const OFFLOAD_MIN_PARTICLES: usize = 50_000;

/// One overlap-padded window of the position buffer, in float offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Inclusive start offset into the position array; multiple of 3.
    pub start: usize,
    /// Exclusive end offset; multiple of 3.
    pub end: usize,
    /// Rotation index of this chunk.
    pub index: usize,
    /// Total chunks in the current rotation.
    pub total: usize,
}

impl ChunkDescriptor {
    /// Length of this chunk in floats.
    #[inline]
    pub fn len_floats(&self) -> usize {
        self.end - self.start
    }

    /// Number of complete particles covered by this chunk.
    #[inline]
    pub fn len_particles(&self) -> usize {
        self.len_floats() / 3
    }

    /// Offset of the first covered particle, for chunk-independent motion.
    #[inline]
    pub fn first_particle(&self) -> u64 {
        (self.start / 3) as u64
    }
}

/// Chunk sizing policy: a device-reported buffer limit when present, a fixed
/// default otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkConfig {
    /// Optional maximum buffer size hint from the device, in bytes.
    pub device_limit_bytes: Option<usize>,
}

impl ChunkConfig {
    /// Chunk size in floats, always a positive multiple of 3.
    pub fn chunk_floats(&self) -> usize {
        let floats = match self.device_limit_bytes {
            Some(bytes) => (bytes / 4).min(DEFAULT_CHUNK_FLOATS * 8),
            None => DEFAULT_CHUNK_FLOATS,
        };
        round_down_to_triplet(floats).max(3)
    }
}

/// Number of chunks needed to cover `buffer_floats`.
pub fn total_chunks(buffer_floats: usize, chunk_floats: usize) -> usize {
    if buffer_floats == 0 {
        return 0;
    }
    buffer_floats.div_ceil(chunk_floats)
}

/// Rotation index for the current frame: `floor(elapsed * target_fps)` modulo
/// the chunk count.
pub fn select_index(elapsed: f32, target_fps: f32, total: usize) -> usize {
    if total == 0 {
        return 0;
    }
    let step = (elapsed as f64 * target_fps as f64).floor().max(0.0) as u64;
    (step % total as u64) as usize
}

/// Compute the overlap-padded span for chunk `index`, clamped to the buffer
/// and kept on multiples of 3.
pub fn chunk_span(
    buffer_floats: usize,
    chunk_floats: usize,
    index: usize,
    total: usize,
) -> ChunkDescriptor {
    let raw_start = index * chunk_floats;
    let raw_end = ((index + 1) * chunk_floats).min(buffer_floats);

    let start = round_down_to_triplet(raw_start.saturating_sub(OVERLAP_FLOATS));
    let end = round_down_to_triplet((raw_end + OVERLAP_FLOATS).min(buffer_floats));

    ChunkDescriptor {
        start,
        end,
        index,
        total,
    }
}

#[inline]
fn round_down_to_triplet(v: usize) -> usize {
    v - v % 3
}
