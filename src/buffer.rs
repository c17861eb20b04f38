//! Shared particle buffer and numeric sanitization.
//!
//! The engine keeps one [`ParticleBuffer`] alive per animation mode. Each
//! particle carries 10 logical scalars: position (3), velocity (3), phase,
//! intensity, type and id. They are stored as parallel arrays so the renderer
//! can consume each attribute as a contiguous stream; the interleaved 8-float
//! offload record is assembled on demand in [`crate::offload`].
//!
//! Every scalar must be finite at all times. Non-finite values are replaced
//! with a bounded random fallback before they are used or exposed, and the
//! number of corrections is surfaced to the caller: a non-zero count means a
//! numeric defect upstream, not business as usual.

use rand::rngs::SmallRng;
use rand::Rng;
use tracing::warn;

/// Floats per particle in the position view handed to the renderer.
pub const POSITION_STRIDE: usize = 3;

/// Logical scalars per particle across all parallel arrays.
pub const LOGICAL_STRIDE: usize = 10;

/// Half-width of the bounded fallback range used when replacing non-finite
/// values: substitutes land in `[-SANITIZE_BOUND, SANITIZE_BOUND]`.
pub const SANITIZE_BOUND: f32 = 5.0;

/// `type` value for particles produced by the pattern generator.
pub const TYPE_PATTERN: f32 = 0.0;

/// `type` value for injected named particles.
pub const TYPE_NAMED: f32 = 1.0;

/// Flat per-particle storage shared between the dispatcher, the CPU fallback
/// animator and the renderer.
///
/// Invariant: `positions.len() == count * 3`, likewise `velocities` and
/// `colors`; the scalar arrays hold exactly `count` entries.
#[derive(Debug, Clone)]
pub struct ParticleBuffer {
    count: usize,
    /// Particle positions, 3 floats per particle. The renderer reads this
    /// array every frame; it is the target of all animation writes.
    pub positions: Vec<f32>,
    /// Particle velocities, 3 floats per particle.
    pub velocities: Vec<f32>,
    /// Per-particle animation phase offset.
    pub phases: Vec<f32>,
    /// Per-particle intensity multiplier.
    pub intensities: Vec<f32>,
    /// Particle type tag (`TYPE_PATTERN` or `TYPE_NAMED`).
    pub types: Vec<f32>,
    /// Stable per-particle id, assigned at generation.
    pub ids: Vec<f32>,
    /// RGB color per particle, 3 floats, renderer-facing only.
    pub colors: Vec<f32>,
    /// Visual scale per particle, renderer-facing only.
    pub scales: Vec<f32>,
    dirty: bool,
}

impl ParticleBuffer {
    /// Allocate a zeroed buffer for `count` particles with unit scales.
    pub fn zeroed(count: usize) -> Self {
        Self {
            count,
            positions: vec![0.0; count * POSITION_STRIDE],
            velocities: vec![0.0; count * POSITION_STRIDE],
            phases: vec![0.0; count],
            intensities: vec![1.0; count],
            types: vec![TYPE_PATTERN; count],
            ids: (0..count).map(|i| i as f32).collect(),
            colors: vec![1.0; count * POSITION_STRIDE],
            scales: vec![1.0; count],
            dirty: false,
        }
    }

    /// Number of particles.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Length of the position array in floats (`count * 3`).
    #[inline]
    pub fn position_floats(&self) -> usize {
        self.count * POSITION_STRIDE
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Flag the position buffer as mutated this frame. The renderer is
    /// expected to re-upload whenever this is set.
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Read and clear the dirty flag. Called once per frame by the render
    /// integration after uploading.
    #[inline]
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Replace every non-finite position component with a bounded random
    /// value. Returns the number of corrections; logs when non-zero.
    pub fn sanitize_positions(&mut self, rng: &mut SmallRng) -> usize {
        let corrected = sanitize_span(&mut self.positions, rng);
        if corrected > 0 {
            warn!(corrected, "replaced non-finite position components");
            self.dirty = true;
        }
        corrected
    }

    /// Borrow the renderer-facing attribute streams.
    pub fn renderer_feed(&self) -> RendererFeed<'_> {
        RendererFeed {
            positions: &self.positions,
            colors: &self.colors,
            scales: &self.scales,
            velocities: &self.velocities,
            phases: &self.phases,
            intensities: &self.intensities,
            types: &self.types,
            ids: &self.ids,
            dirty: self.dirty,
        }
    }
}

/// Borrowed view of the attribute streams a renderer consumes each frame.
///
/// All arrays are indexed consistently: entry `i` (or `3i..3i+3` for the
/// vector attributes) describes the same particle.
#[derive(Debug)]
pub struct RendererFeed<'a> {
    pub positions: &'a [f32],
    pub colors: &'a [f32],
    pub scales: &'a [f32],
    pub velocities: &'a [f32],
    pub phases: &'a [f32],
    pub intensities: &'a [f32],
    pub types: &'a [f32],
    pub ids: &'a [f32],
    /// Whether any position changed since the last `take_dirty`.
    pub dirty: bool,
}

/// Replace a single non-finite value with a bounded random fallback.
#[inline]
pub fn sanitize_value(v: f32, rng: &mut SmallRng) -> (f32, bool) {
    if v.is_finite() {
        (v, false)
    } else {
        (rng.gen_range(-SANITIZE_BOUND..SANITIZE_BOUND), true)
    }
}

/// Sanitize a span of floats in place, returning the correction count.
pub fn sanitize_span(span: &mut [f32], rng: &mut SmallRng) -> usize {
    let mut corrected = 0;
    for v in span.iter_mut() {
        if !v.is_finite() {
            *v = rng.gen_range(-SANITIZE_BOUND..SANITIZE_BOUND);
            corrected += 1;
        }
    }
    corrected
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_zeroed_layout() {
        let buf = ParticleBuffer::zeroed(100);
        assert_eq!(buf.count(), 100);
        assert_eq!(buf.positions.len(), 300);
        assert_eq!(buf.velocities.len(), 300);
        assert_eq!(buf.colors.len(), 300);
        assert_eq!(buf.phases.len(), 100);
        assert_eq!(buf.scales.len(), 100);
        assert_eq!(buf.ids[42], 42.0);
    }

    #[test]
    fn test_sanitize_replaces_non_finite() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut buf = ParticleBuffer::zeroed(4);
        buf.positions[0] = f32::NAN;
        buf.positions[5] = f32::INFINITY;
        buf.positions[11] = f32::NEG_INFINITY;

        let corrected = buf.sanitize_positions(&mut rng);
        assert_eq!(corrected, 3);
        for &v in &buf.positions {
            assert!(v.is_finite());
            assert!(v.abs() <= SANITIZE_BOUND);
        }
        assert!(buf.is_dirty());
    }

    #[test]
    fn test_sanitize_clean_buffer_is_free() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut buf = ParticleBuffer::zeroed(16);
        assert_eq!(buf.sanitize_positions(&mut rng), 0);
        assert!(!buf.is_dirty());
    }

    #[test]
    fn test_dirty_flag_handoff() {
        let mut buf = ParticleBuffer::zeroed(1);
        buf.mark_dirty();
        assert!(buf.take_dirty());
        assert!(!buf.take_dirty());
    }
}
