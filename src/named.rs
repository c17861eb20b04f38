//! Named particle overlay.
//!
//! A small ordered set of distinguished particles is written into the first
//! slots of every freshly generated buffer. Only the visual attributes change:
//! position and velocity stay whatever the pattern generator produced, so a
//! named particle keeps its place in the motion field and is recognizable by
//! color and scale alone.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer::{ParticleBuffer, POSITION_STRIDE, TYPE_NAMED};

/// One distinguished particle. Entries are applied in order: index `i` in the
/// list claims slot `i` of the buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedParticle {
    /// Display name, carried for the UI layer.
    pub name: String,
    /// Ordering weight within the list; informational only here.
    pub priority: u32,
    /// Pinned RGB color.
    pub color: [f32; 3],
    /// Pinned visual scale.
    pub scale: f32,
}

impl NamedParticle {
    pub fn new(name: impl Into<String>, priority: u32, color: Vec3, scale: f32) -> Self {
        Self {
            name: name.into(),
            priority,
            color: color.to_array(),
            scale,
        }
    }
}

/// Overlay `named` onto the first `min(named.len(), count)` slots of `buf`,
/// in place. Idempotent: a second application with the same list is a no-op.
pub fn inject(buf: &mut ParticleBuffer, named: &[NamedParticle]) {
    let slots = named.len().min(buf.count());
    for (i, particle) in named[..slots].iter().enumerate() {
        let base = i * POSITION_STRIDE;
        buf.colors[base..base + 3].copy_from_slice(&particle.color);
        buf.scales[i] = particle.scale;
        buf.types[i] = TYPE_NAMED;
    }
    if slots > 0 {
        debug!(slots, "named particles injected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::TYPE_PATTERN;

    fn roster() -> Vec<NamedParticle> {
        vec![
            NamedParticle::new("aria", 0, Vec3::new(1.0, 0.2, 0.2), 3.0),
            NamedParticle::new("bolt", 1, Vec3::new(0.2, 1.0, 0.2), 2.5),
            NamedParticle::new("coda", 2, Vec3::new(0.2, 0.2, 1.0), 2.0),
        ]
    }

    #[test]
    fn test_inject_tags_and_colors_first_slots() {
        let mut buf = ParticleBuffer::zeroed(10);
        inject(&mut buf, &roster());

        assert_eq!(buf.types[0], TYPE_NAMED);
        assert_eq!(buf.types[2], TYPE_NAMED);
        assert_eq!(buf.types[3], TYPE_PATTERN);
        assert_eq!(&buf.colors[0..3], &[1.0, 0.2, 0.2]);
        assert_eq!(buf.scales[1], 2.5);
    }

    #[test]
    fn test_inject_preserves_position_and_velocity() {
        let mut buf = ParticleBuffer::zeroed(4);
        buf.positions[0] = 7.5;
        buf.velocities[1] = -2.0;
        inject(&mut buf, &roster());
        assert_eq!(buf.positions[0], 7.5);
        assert_eq!(buf.velocities[1], -2.0);
    }

    #[test]
    fn test_inject_is_idempotent() {
        let mut once = ParticleBuffer::zeroed(8);
        inject(&mut once, &roster());
        let mut twice = once.clone();
        inject(&mut twice, &roster());

        assert_eq!(once.colors, twice.colors);
        assert_eq!(once.scales, twice.scales);
        assert_eq!(once.types, twice.types);
    }

    #[test]
    fn test_inject_clamps_to_particle_count() {
        let mut buf = ParticleBuffer::zeroed(2);
        inject(&mut buf, &roster());
        assert_eq!(buf.types, vec![TYPE_NAMED, TYPE_NAMED]);
    }
}
