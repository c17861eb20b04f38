//! Synchronous CPU fallback animator.
//!
//! Closed-form per-mode position updates, run in place over a 3-float
//! position view whenever the accelerated path is unavailable, over budget or
//! erroring. Input values are validated first: a non-finite entry is replaced
//! with a bounded random position before it is used as animation input.
//! Computed results are validated again before commit; an invalid result
//! leaves the prior value untouched rather than writing garbage.
//!
//! The zero-radius guard substitutes a time-derived angle where `atan2` would
//! be degenerate. This discontinuity-avoidance choice is carried over from
//! the original system verbatim; changing it would visibly alter motion near
//! the origin.

use rand::rngs::SmallRng;

use crate::buffer::sanitize_value;
use crate::pattern::AnimationMode;

/// Radius below which polar conversion switches to the time-derived angle.
const RADIUS_GUARD: f32 = 1e-3;

/// Angular rate multipliers per mode.
const GALAXY_RATE: f32 = 0.1;
const YIN_YANG_RATE: f32 = 0.2;
const SPIRAL_RATE: f32 = 0.15;

/// Outcome of one fallback step over a chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepStats {
    /// Non-finite inputs replaced before animating.
    pub sanitized: usize,
    /// Particles whose position was updated.
    pub updated: usize,
}

/// Animate `positions[start..end]` in place for the given mode.
///
/// `start..end` must lie inside the slice and be triplet-aligned; the
/// dispatcher guarantees both.
pub fn step(
    positions: &mut [f32],
    start: usize,
    end: usize,
    elapsed: f32,
    mode: AnimationMode,
    rng: &mut SmallRng,
) -> StepStats {
    debug_assert!(start % 3 == 0 && end % 3 == 0 && end <= positions.len());
    let mut stats = StepStats::default();

    for triplet in positions[start..end].chunks_exact_mut(3) {
        let (x, fixed_x) = sanitize_value(triplet[0], rng);
        let (y, fixed_y) = sanitize_value(triplet[1], rng);
        let (z, fixed_z) = sanitize_value(triplet[2], rng);
        stats.sanitized += usize::from(fixed_x) + usize::from(fixed_y) + usize::from(fixed_z);

        let (nx, ny, nz) = kernel(mode, x, y, z, elapsed);

        if nx.is_finite() && ny.is_finite() && nz.is_finite() {
            triplet[0] = nx;
            triplet[1] = ny;
            triplet[2] = nz;
            stats.updated += 1;
        } else if fixed_x || fixed_y || fixed_z {
            // keep the sanitized inputs even when the kernel result is bad
            triplet[0] = x;
            triplet[1] = y;
            triplet[2] = z;
        }
    }
    stats
}

/// Single-point kernel, shared with the software offload backend so both
/// paths produce identical motion for a given mode and time.
pub(crate) fn kernel(mode: AnimationMode, x: f32, y: f32, z: f32, elapsed: f32) -> (f32, f32, f32) {
    match mode {
        AnimationMode::Galaxy => galaxy(x, y, z, elapsed),
        AnimationMode::YinYang => yin_yang(x, y, z, elapsed),
        AnimationMode::Wave => wave(x, y, z, elapsed),
        AnimationMode::Spiral => spiral(x, y, z, elapsed),
    }
}

/// Polar angle in the XZ plane with the zero-radius guard applied.
#[inline]
fn guarded_angle(x: f32, z: f32, radius: f32, elapsed: f32, rate: f32) -> f32 {
    if radius < RADIUS_GUARD {
        elapsed * rate
    } else {
        z.atan2(x)
    }
}

/// Galaxy: polar rotation proportional to elapsed time and local radius,
/// with a small additive sine on Y.
fn galaxy(x: f32, y: f32, z: f32, elapsed: f32) -> (f32, f32, f32) {
    let radius = (x * x + z * z).sqrt();
    let angle = guarded_angle(x, z, radius, elapsed, GALAXY_RATE);
    let advance = GALAXY_RATE * elapsed * (1.0 + radius * 0.05);
    let next = angle + advance;
    (
        next.cos() * radius,
        y + (elapsed * 2.0 + radius).sin() * 0.01,
        next.sin() * radius,
    )
}

/// Yin-yang: symmetric polar rotation at a faster angular rate.
fn yin_yang(x: f32, y: f32, z: f32, elapsed: f32) -> (f32, f32, f32) {
    let radius = (x * x + z * z).sqrt();
    let angle = guarded_angle(x, z, radius, elapsed, YIN_YANG_RATE);
    let next = angle + YIN_YANG_RATE * elapsed;
    (next.cos() * radius, y, next.sin() * radius)
}

/// Wave: Y is the product of two sine terms of X, Z and elapsed time. Only Y
/// is touched.
fn wave(x: f32, _y: f32, z: f32, elapsed: f32) -> (f32, f32, f32) {
    let ny = (x * 2.0 + elapsed * 5.0).sin() * (z * 1.5 + elapsed * 3.0).cos() * 0.3;
    (x, ny, z)
}

/// Spiral: XZ rotation plus a vertical oscillation keyed to radius.
fn spiral(x: f32, y: f32, z: f32, elapsed: f32) -> (f32, f32, f32) {
    let radius = (x * x + z * z).sqrt();
    let angle = guarded_angle(x, z, radius, elapsed, SPIRAL_RATE);
    let next = angle + SPIRAL_RATE * elapsed;
    (
        next.cos() * radius,
        y + (elapsed * 0.5 + radius).sin() * 0.02,
        next.sin() * radius,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    fn sample_positions(n: usize) -> Vec<f32> {
        (0..n * 3)
            .map(|i| ((i as f32 * 0.37).sin() * 4.0) + 0.5)
            .collect()
    }

    #[test]
    fn test_all_modes_keep_positions_finite() {
        for mode in AnimationMode::ALL {
            let mut positions = sample_positions(200);
            let end = positions.len();
            let mut r = rng();
            for frame in 0..50 {
                step(&mut positions, 0, end, frame as f32 * 0.016, mode, &mut r);
            }
            assert!(
                positions.iter().all(|v| v.is_finite()),
                "{:?} produced non-finite output",
                mode
            );
        }
    }

    #[test]
    fn test_step_moves_particles() {
        let mut positions = sample_positions(100);
        let before = positions.clone();
        let end = positions.len();
        let stats = step(&mut positions, 0, end, 1.5, AnimationMode::Galaxy, &mut rng());
        assert_eq!(stats.updated, 100);
        assert_ne!(positions, before);
    }

    #[test]
    fn test_step_respects_span_bounds() {
        let mut positions = sample_positions(10);
        let before = positions.clone();
        step(&mut positions, 3, 9, 2.0, AnimationMode::YinYang, &mut rng());
        assert_eq!(&positions[0..3], &before[0..3]);
        assert_eq!(&positions[9..], &before[9..]);
        assert_ne!(&positions[3..9], &before[3..9]);
    }

    #[test]
    fn test_non_finite_input_is_sanitized() {
        let mut positions = vec![f32::NAN, 1.0, f32::INFINITY, 2.0, 0.5, 2.0];
        let stats = step(
            &mut positions,
            0,
            6,
            0.5,
            AnimationMode::Spiral,
            &mut rng(),
        );
        assert_eq!(stats.sanitized, 2);
        assert!(positions.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_wave_only_touches_y() {
        let mut positions = sample_positions(50);
        let before = positions.clone();
        let end = positions.len();
        step(&mut positions, 0, end, 3.0, AnimationMode::Wave, &mut rng());
        for (i, (&now, &was)) in positions.iter().zip(before.iter()).enumerate() {
            if i % 3 != 1 {
                assert_eq!(now, was, "component {} changed", i);
            }
        }
    }

    #[test]
    fn test_zero_radius_guard_stays_at_origin_radius() {
        // a particle exactly on the Y axis keeps radius zero, so rotation
        // must leave it on the axis instead of producing NaN from atan2
        let mut positions = vec![0.0, 2.0, 0.0];
        step(&mut positions, 0, 3, 7.0, AnimationMode::Galaxy, &mut rng());
        assert_eq!(positions[0], 0.0);
        assert_eq!(positions[2], 0.0);
        assert!(positions[1].is_finite());
    }
}
