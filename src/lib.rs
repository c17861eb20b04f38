//! # Stardrift - Hybrid Particle Animation Engine
//!
//! Real-time particle animation for large buffers (up to ~1M particles),
//! splitting work between an asynchronous offload backend and a synchronous
//! CPU fallback that never misses a frame.
//!
//! Each frame animates one rotating chunk of the position buffer. When a
//! backend is attached, healthy, and the previous frame fit inside an
//! adaptive time budget, the chunk is packed and submitted asynchronously;
//! otherwise the CPU path steps it in place. Either way every frame completes
//! on the caller's thread, so a renderer can read positions immediately after
//! [`Engine::tick`].
//!
//! ## Quick Start
//!
//! ```
//! use stardrift::prelude::*;
//!
//! let params = PatternParams {
//!     count: 120_000,
//!     ..Default::default()
//! };
//! let config = EngineConfig::new(AnimationMode::Galaxy, params)
//!     .with_target_fps(60.0);
//!
//! let mut engine = Engine::new(config).unwrap();
//! engine.attach_bridge(Box::new(SoftwareBridge::new()));
//!
//! let report = engine.tick();
//! assert_eq!(engine.positions().len(), 120_000 * 3);
//! assert!(report.elapsed >= 0.0);
//! ```
//!
//! ## Core Concepts
//!
//! ### Patterns
//!
//! [`pattern::generate`] builds a complete [`ParticleBuffer`] from an
//! [`AnimationMode`] and [`PatternParams`] using closed-form math, no
//! iterative settling. Every emitted value is finite; non-finite
//! intermediates are replaced and counted in the returned [`SanitizeReport`].
//!
//! ### Chunked animation
//!
//! The position buffer is partitioned into fixed-size chunks (150,000 floats
//! by default, or derived from the backend's device limit). The active chunk
//! index derives from elapsed time and the target frame rate, so over any
//! window of `total_chunks` frames every particle is touched. Consecutive
//! chunks share a small overlap region to hide seams.
//!
//! ### Offload
//!
//! [`OffloadBridge`] is the backend seam. Submissions are single-flight:
//! at most one call is outstanding, and its completion is drained at the
//! start of a later tick and merged back with per-particle finiteness and
//! epsilon checks. [`SoftwareBridge`] is the built-in thread-pool backend;
//! an accelerated implementation plugs in through the same trait.
//!
//! ### Adaptive budget
//!
//! [`budget::FrameBudget`] keeps a rolling window of one-second FPS samples
//! and nudges the per-frame offload budget down 10% or up 5% against a 90%
//! target threshold, clamped to 2-15 ms. A frame that ran over budget routes
//! the next one to the CPU path.

pub mod bridge;
pub mod budget;
pub mod buffer;
pub mod chunk;
mod engine;
pub mod error;
pub mod fallback;
pub mod metrics;
pub mod named;
pub mod offload;
pub mod pattern;
pub mod time;

pub use bridge::SoftwareBridge;
pub use buffer::{ParticleBuffer, RendererFeed};
pub use engine::{Engine, EngineConfig, FrameReport};
pub use error::{EngineError, OffloadError};
pub use glam::{Vec2, Vec3, Vec4};
pub use metrics::{MetricsSnapshot, WorkerMetrics};
pub use named::NamedParticle;
pub use offload::{BackendTier, OffloadBridge, OffloadReply, OffloadRequest};
pub use pattern::{AnimationMode, PatternParams, SanitizeReport};

/// Convenient glob import for typical usage.
pub mod prelude {
    pub use crate::bridge::SoftwareBridge;
    pub use crate::budget::FramePerformanceState;
    pub use crate::buffer::ParticleBuffer;
    pub use crate::engine::{Engine, EngineConfig, FrameReport};
    pub use crate::error::{EngineError, OffloadError};
    pub use crate::metrics::MetricsSnapshot;
    pub use crate::named::NamedParticle;
    pub use crate::offload::{BackendTier, OffloadBridge};
    pub use crate::pattern::{AnimationMode, PatternParams};
    pub use glam::{Vec2, Vec3, Vec4};
}
