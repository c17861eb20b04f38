//! Pattern synthesis for initial particle placement.
//!
//! Each [`AnimationMode`] has a closed-form placement formula. Generation is
//! pure apart from its internal RNG: the same seed and parameters produce the
//! same buffer, and no external state is read.
//!
//! Every computed coordinate passes through sanitization before it lands in
//! the buffer. The correction count is returned in the [`SanitizeReport`];
//! anything non-zero indicates a numeric defect in the formula or the
//! parameters and is treated as a failure by the test suite.

use std::f32::consts::TAU;

use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::buffer::{ParticleBuffer, POSITION_STRIDE};
use crate::error::EngineError;

/// The four animation modes. Selecting a mode fixes both the generation
/// formula here and the per-frame kernel in [`crate::fallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationMode {
    Galaxy,
    YinYang,
    Wave,
    Spiral,
}

impl AnimationMode {
    /// All modes, in dispatch order.
    pub const ALL: [AnimationMode; 4] = [
        AnimationMode::Galaxy,
        AnimationMode::YinYang,
        AnimationMode::Wave,
        AnimationMode::Spiral,
    ];
}

/// Geometry constants for one pattern. Immutable once a mode is active;
/// regenerating the pattern is the only way to change `count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternParams {
    /// Number of particles to generate.
    pub count: usize,
    /// Base visual size written into the scale attribute.
    pub size: f32,
    /// Outer radius of the pattern in world units. Must be positive and
    /// finite; generation rejects anything else.
    pub radius: f32,
    /// Number of galaxy branches.
    pub branches: u32,
    /// Angular twist per unit radius (galaxy).
    pub spin: f32,
    /// Magnitude of positional jitter relative to local radius.
    pub randomness: f32,
    /// Exponent shaping the jitter distribution toward the branch core.
    pub randomness_power: f32,
    /// Spiral tightness for the yin-yang secondary term and spiral arms.
    pub tightness: f32,
    /// Number of spiral arms.
    pub arms: u32,
    /// Full rotations from the center of a spiral arm to its tip.
    pub turns: f32,
    /// Vertical extent of the spiral pattern.
    pub height: f32,
    /// Wave intensity written into the intensity attribute.
    pub wave_amplitude: f32,
    /// Spatial frequency folded into the per-particle phase for wave mode.
    pub wave_frequency: f32,
    /// Color at the pattern core, `#rrggbb`.
    pub inner_color: String,
    /// Color at the pattern edge, `#rrggbb`.
    pub outer_color: String,
}

impl Default for PatternParams {
    fn default() -> Self {
        Self {
            count: 100_000,
            size: 1.0,
            radius: 15.0,
            branches: 6,
            spin: 2.0,
            randomness: 0.2,
            randomness_power: 2.0,
            tightness: 0.8,
            arms: 4,
            turns: 2.5,
            height: 6.0,
            wave_amplitude: 1.0,
            wave_frequency: 0.35,
            inner_color: "#e0e0e0".to_string(),
            outer_color: "#222222".to_string(),
        }
    }
}

/// Outcome of the sanitization pass that runs over every generated buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SanitizeReport {
    /// Non-finite components replaced with bounded random fallbacks.
    pub corrected: usize,
}

impl SanitizeReport {
    /// True when generation produced only finite values.
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.corrected == 0
    }
}

/// Generate an initial buffer for `mode`, seeding the RNG from entropy.
pub fn generate(
    mode: AnimationMode,
    params: &PatternParams,
) -> Result<(ParticleBuffer, SanitizeReport), EngineError> {
    generate_with_seed(mode, params, rand::random())
}

/// Deterministic variant of [`generate`] for tests and reproducible runs.
pub fn generate_with_seed(
    mode: AnimationMode,
    params: &PatternParams,
    seed: u64,
) -> Result<(ParticleBuffer, SanitizeReport), EngineError> {
    if params.count == 0 {
        return Err(EngineError::EmptyPattern);
    }
    if !(params.radius > 0.0) || !params.radius.is_finite() {
        return Err(EngineError::InvalidRadius(params.radius));
    }
    let inner = parse_hex_color(&params.inner_color)?;
    let outer = parse_hex_color(&params.outer_color)?;

    let mut rng = SmallRng::seed_from_u64(seed);
    let mut buf = ParticleBuffer::zeroed(params.count);

    for i in 0..params.count {
        let (pos, vel, color, phase, intensity) = match mode {
            AnimationMode::Galaxy => galaxy_particle(i, params, inner, outer, &mut rng),
            AnimationMode::YinYang => yin_yang_particle(params, inner, outer, &mut rng),
            AnimationMode::Wave => wave_particle(params, inner, outer, &mut rng),
            AnimationMode::Spiral => spiral_particle(i, params, inner, outer, &mut rng),
        };

        let base = i * POSITION_STRIDE;
        buf.positions[base..base + 3].copy_from_slice(&pos.to_array());
        buf.velocities[base..base + 3].copy_from_slice(&vel.to_array());
        buf.colors[base..base + 3].copy_from_slice(&color.to_array());
        buf.phases[i] = phase;
        buf.intensities[i] = intensity;
        buf.scales[i] = params.size;
    }

    let corrected = buf.sanitize_positions(&mut rng);
    let report = SanitizeReport { corrected };
    if report.is_clean() {
        debug!(mode = ?mode, count = params.count, "pattern generated");
    } else {
        warn!(mode = ?mode, corrected, "pattern generation produced non-finite coordinates");
    }
    buf.mark_dirty();
    Ok((buf, report))
}

/// Polar placement on rotating branches with power-law jitter toward the core.
fn galaxy_particle(
    index: usize,
    params: &PatternParams,
    inner: Vec3,
    outer: Vec3,
    rng: &mut SmallRng,
) -> (Vec3, Vec3, Vec3, f32, f32) {
    let branches = params.branches.max(1);
    let radius = rng.gen::<f32>() * params.radius;
    let branch = (index as u32 % branches) as f32;
    let angle = branch * (TAU / branches as f32) + radius * params.spin;

    let jitter = Vec3::new(
        power_jitter(rng, params) * radius,
        power_jitter(rng, params) * radius * 0.5,
        power_jitter(rng, params) * radius,
    );
    let pos = Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius) + jitter;
    let vel = tangent_velocity(pos, 0.05 * radius);
    let color = inner.lerp(outer, radius / params.radius.max(f32::EPSILON));
    let phase = rng.gen_range(0.0..TAU);
    let intensity = rng.gen_range(0.5..1.0);
    (pos, vel, color, phase, intensity)
}

/// Two interleaved spiral arms selected by the sign of `sin(2 * angle)`.
fn yin_yang_particle(
    params: &PatternParams,
    inner: Vec3,
    outer: Vec3,
    rng: &mut SmallRng,
) -> (Vec3, Vec3, Vec3, f32, f32) {
    let angle = rng.gen_range(0.0..TAU);
    // sqrt keeps the disk density uniform
    let radius = rng.gen::<f32>().sqrt() * params.radius;
    let dark_arm = (2.0 * angle).sin() > 0.0;

    let primary = Vec3::new(angle.cos(), 0.0, angle.sin()) * radius;
    let swirl = angle * 2.0 + radius * params.tightness;
    let secondary = Vec3::new(swirl.cos(), 0.0, swirl.sin()) * (radius * 0.25);
    let pos = primary + secondary + Vec3::new(0.0, rng.gen_range(-0.1..0.1), 0.0);

    let vel = tangent_velocity(pos, 0.08 * radius);
    let color = if dark_arm { outer } else { inner };
    let phase = angle;
    let intensity = rng.gen_range(0.6..1.0);
    (pos, vel, color, phase, intensity)
}

/// Uniform scatter on the horizontal plane; Y is animated per frame, never set
/// at generation time.
fn wave_particle(
    params: &PatternParams,
    inner: Vec3,
    outer: Vec3,
    rng: &mut SmallRng,
) -> (Vec3, Vec3, Vec3, f32, f32) {
    let half = params.radius;
    let pos = Vec3::new(
        rng.gen_range(-half..half),
        0.0,
        rng.gen_range(-half..half),
    );
    let t = (pos.length() / (half * std::f32::consts::SQRT_2)).min(1.0);
    let color = inner.lerp(outer, t);
    let phase = (pos.x + pos.z) * params.wave_frequency;
    let intensity = params.wave_amplitude;
    (pos, Vec3::ZERO, color, phase, intensity)
}

/// Logarithmic arms ascending in height, with positional jitter.
fn spiral_particle(
    index: usize,
    params: &PatternParams,
    inner: Vec3,
    outer: Vec3,
    rng: &mut SmallRng,
) -> (Vec3, Vec3, Vec3, f32, f32) {
    let arms = params.arms.max(1) as usize;
    let arm = (index % arms) as f32;
    let along = (index / arms) as f32 / ((params.count / arms).max(1)) as f32;

    let theta = along * params.turns * TAU;
    // log-spiral radius normalized so the arm tip lands on params.radius
    let growth = params.tightness.max(0.05);
    let span = (growth * params.turns * TAU).exp_m1();
    let radius = params.radius * (growth * theta).exp_m1() / span.max(f32::EPSILON);

    let angle = arm * (TAU / arms as f32) + theta;
    let jitter = Vec3::new(
        rng.gen_range(-1.0..1.0),
        rng.gen_range(-1.0..1.0),
        rng.gen_range(-1.0..1.0),
    ) * (params.randomness * params.radius * 0.05);

    let pos = Vec3::new(
        angle.cos() * radius,
        (along - 0.5) * params.height,
        angle.sin() * radius,
    ) + jitter;
    let vel = tangent_velocity(pos, 0.04 * radius);
    let color = inner.lerp(outer, along);
    let phase = theta;
    let intensity = rng.gen_range(0.5..1.0);
    (pos, vel, color, phase, intensity)
}

/// Power-law jitter: uniform sample raised to `randomness_power`, signed, and
/// scaled by `randomness`. Concentrates particles near the branch spine.
fn power_jitter(rng: &mut SmallRng, params: &PatternParams) -> f32 {
    let sign = if rng.gen::<bool>() { 1.0 } else { -1.0 };
    rng.gen::<f32>().powf(params.randomness_power) * sign * params.randomness
}

/// Velocity perpendicular to the position vector in the XZ plane, for orbital
/// motion. Degenerate positions near the axis get a fixed direction.
fn tangent_velocity(position: Vec3, speed: f32) -> Vec3 {
    let tangent = Vec3::new(-position.z, 0.0, position.x);
    if tangent.length_squared() > 1e-4 {
        tangent.normalize() * speed
    } else {
        Vec3::new(speed, 0.0, 0.0)
    }
}

/// Parse a `#rrggbb` color string into linear RGB in `[0, 1]`.
pub fn parse_hex_color(s: &str) -> Result<Vec3, EngineError> {
    let hex = s
        .strip_prefix('#')
        .ok_or_else(|| EngineError::InvalidColor(s.to_string()))?;
    // length is in bytes; non-ASCII input would split a char mid-boundary
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(EngineError::InvalidColor(s.to_string()));
    }
    let parse = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .map(|v| v as f32 / 255.0)
            .map_err(|_| EngineError::InvalidColor(s.to_string()))
    };
    Ok(Vec3::new(parse(0..2)?, parse(2..4)?, parse(4..6)?))
}
