//! Frame-loop orchestration.
//!
//! [`Engine::tick`] runs one animation frame: drain any offload completion
//! that arrived since the last tick, advance the clock, feed the budget
//! controller, pick the active chunk and route it to either the offload
//! bridge or the synchronous CPU fallback. All buffer mutation happens here,
//! on the caller's thread; the bridge only ever talks back through the
//! completion channel.
//!
//! A generation counter makes teardown safe: changing mode or regenerating
//! the pattern bumps it, and any in-flight reply carrying an older generation
//! is discarded when drained, releasing the single-flight guard without
//! touching the new buffer.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::budget::{FrameBudget, FramePerformanceState};
use crate::buffer::{ParticleBuffer, RendererFeed};
use crate::chunk::{self, ChunkConfig, ChunkDescriptor, OFFLOAD_MIN_PARTICLES};
use crate::error::EngineError;
use crate::fallback;
use crate::metrics::{MetricsCollector, MetricsSnapshot, WorkerMetrics};
use crate::named::{self, NamedParticle};
use crate::offload::{
    commit_result, pack_chunk, BackendTier, OffloadBridge, OffloadReply, OffloadRequest,
};
use crate::pattern::{self, AnimationMode, PatternParams, SanitizeReport};
use crate::time::FrameClock;

/// Engine construction parameters.
///
/// ```
/// use stardrift::prelude::*;
///
/// let config = EngineConfig::new(AnimationMode::Galaxy, PatternParams::default())
///     .with_target_fps(60.0)
///     .with_seed(7);
/// let mut engine = Engine::new(config).unwrap();
/// engine.tick();
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mode: AnimationMode,
    pub params: PatternParams,
    /// Session target frame rate; fixed policy value, never adapted.
    pub target_fps: f32,
    /// Distinguished particles overlaid on every fresh buffer.
    pub named: Vec<NamedParticle>,
    /// RNG seed for reproducible generation; entropy when absent.
    pub seed: Option<u64>,
}

impl EngineConfig {
    pub fn new(mode: AnimationMode, params: PatternParams) -> Self {
        Self {
            mode,
            params,
            target_fps: 60.0,
            named: Vec::new(),
            seed: None,
        }
    }

    pub fn with_target_fps(mut self, fps: f32) -> Self {
        self.target_fps = fps;
        self
    }

    pub fn with_named(mut self, named: Vec<NamedParticle>) -> Self {
        self.named = named;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// What one tick did, for callers that want to assert on or display it.
#[derive(Debug, Clone, Copy)]
pub struct FrameReport {
    /// Chunk animated this frame.
    pub chunk: ChunkDescriptor,
    /// True when the chunk went to the bridge instead of the CPU path.
    pub offloaded: bool,
    /// Particles committed from a drained offload reply at frame start.
    pub merged: usize,
    /// Non-finite inputs sanitized by the CPU path this frame.
    pub sanitized: usize,
    /// Wall-clock duration of this tick in milliseconds.
    pub frame_ms: f32,
    /// Elapsed simulation time after this tick.
    pub elapsed: f32,
}

/// The particle animation engine.
pub struct Engine {
    mode: AnimationMode,
    params: PatternParams,
    buffer: ParticleBuffer,
    named: Vec<NamedParticle>,
    clock: FrameClock,
    budget: FrameBudget,
    metrics: MetricsCollector,
    chunk_cfg: ChunkConfig,
    bridge: Option<Box<dyn OffloadBridge>>,
    reply_tx: Sender<OffloadReply>,
    reply_rx: Receiver<OffloadReply>,
    in_flight: bool,
    generation: u64,
    rng: SmallRng,
}

impl Engine {
    /// Generate the initial buffer and build an engine around it.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        if !(config.target_fps > 0.0) {
            return Err(EngineError::InvalidTargetFps(config.target_fps));
        }
        let seed = config.seed.unwrap_or_else(rand::random);
        let (mut buffer, report) = pattern::generate_with_seed(config.mode, &config.params, seed)?;
        named::inject(&mut buffer, &config.named);
        if !report.is_clean() {
            warn!(corrected = report.corrected, "initial pattern needed sanitization");
        }
        info!(
            mode = ?config.mode,
            count = buffer.count(),
            target_fps = config.target_fps,
            "engine initialized"
        );

        let (reply_tx, reply_rx) = channel();
        Ok(Self {
            mode: config.mode,
            params: config.params,
            buffer,
            named: config.named,
            clock: FrameClock::new(),
            budget: FrameBudget::new(config.target_fps),
            metrics: MetricsCollector::new(),
            chunk_cfg: ChunkConfig::default(),
            bridge: None,
            reply_tx,
            reply_rx,
            in_flight: false,
            generation: 0,
            rng: SmallRng::seed_from_u64(seed ^ 0x5f5f_5f5f),
        })
    }

    /// Install an offload backend. Its device limit, when reported, replaces
    /// the default chunk size.
    pub fn attach_bridge(&mut self, bridge: Box<dyn OffloadBridge>) {
        self.chunk_cfg.device_limit_bytes = bridge.device_limit_bytes();
        info!(tier = ?bridge.tier(), "offload bridge attached");
        self.bridge = Some(bridge);
    }

    /// Remove the offload backend; subsequent frames run the CPU path only.
    pub fn detach_bridge(&mut self) -> Option<Box<dyn OffloadBridge>> {
        self.chunk_cfg.device_limit_bytes = None;
        self.bridge.take()
    }

    /// Switch animation mode, discarding the current buffer and generating a
    /// fresh one. The performance state persists: it reflects device
    /// capability, not content.
    ///
    /// The new buffer's seed is drawn from the engine's own RNG, so a
    /// session constructed with an explicit seed stays reproducible across
    /// mode changes.
    pub fn set_mode(
        &mut self,
        mode: AnimationMode,
        params: PatternParams,
    ) -> Result<SanitizeReport, EngineError> {
        let seed = self.rng.gen();
        let (mut buffer, report) = pattern::generate_with_seed(mode, &params, seed)?;
        named::inject(&mut buffer, &self.named);

        // any in-flight reply now belongs to a dead buffer
        self.generation += 1;
        self.mode = mode;
        self.params = params;
        self.buffer = buffer;
        debug!(mode = ?mode, generation = self.generation, "mode changed");
        Ok(report)
    }

    /// Run one animation frame.
    pub fn tick(&mut self) -> FrameReport {
        let frame_start = Instant::now();

        let merged = self.drain_replies();

        let tick = self.clock.update();
        if let Some(fps) = tick.fps_sample {
            self.budget.push_fps_sample(fps);
        }

        let chunk_floats = self.chunk_cfg.chunk_floats();
        let total = chunk::total_chunks(self.buffer.position_floats(), chunk_floats);
        let index = chunk::select_index(tick.elapsed, self.budget.target_fps(), total);
        let active = chunk::chunk_span(self.buffer.position_floats(), chunk_floats, index, total);

        let mut offloaded = false;
        let mut sanitized = 0;
        if self.offload_eligible() {
            offloaded = self.dispatch_offload(&active, tick.elapsed);
        }
        if !offloaded {
            let stats = fallback::step(
                &mut self.buffer.positions,
                active.start,
                active.end,
                tick.elapsed,
                self.mode,
                &mut self.rng,
            );
            sanitized = stats.sanitized;
            if stats.updated > 0 {
                self.buffer.mark_dirty();
            }
        }

        let frame_ms = frame_start.elapsed().as_secs_f32() * 1_000.0;
        self.budget.record_frame_ms(frame_ms);
        self.metrics.record_chunk(active.len_particles(), offloaded);
        let worker = self.worker_metrics();
        self.metrics.maybe_refresh(
            tick.elapsed,
            self.clock.fps(),
            frame_ms,
            self.buffer.count(),
            worker,
        );

        FrameReport {
            chunk: active,
            offloaded,
            merged,
            sanitized,
            frame_ms,
            elapsed: tick.elapsed,
        }
    }

    /// Apply completions that arrived since the previous tick. Runs before
    /// this frame's chunk is animated, so an async result is never clobbered
    /// in the same frame it lands.
    fn drain_replies(&mut self) -> usize {
        let mut merged = 0;
        while let Ok(reply) = self.reply_rx.try_recv() {
            self.in_flight = false;
            if reply.generation != self.generation {
                debug!(
                    reply_generation = reply.generation,
                    "discarding offload reply for torn-down buffer"
                );
                continue;
            }
            match reply.result {
                Ok(data) => match commit_result(&mut self.buffer, &reply.chunk, &data) {
                    Ok(committed) => merged += committed,
                    Err(err) => {
                        warn!(%err, chunk = reply.chunk.index, "offload result rejected");
                        self.metrics.record_offload_failure();
                    }
                },
                Err(err) => {
                    warn!(%err, chunk = reply.chunk.index, "offload call failed");
                    self.metrics.record_offload_failure();
                }
            }
        }
        merged
    }

    /// The offload decision: big enough buffer, ready backend, no call in
    /// flight, and the previous frame fit inside the adaptive budget.
    fn offload_eligible(&self) -> bool {
        self.buffer.count() > OFFLOAD_MIN_PARTICLES
            && self.bridge.as_ref().is_some_and(|b| b.ready())
            && !self.in_flight
            && self.budget.within_budget()
    }

    /// Submit the chunk under the single-flight guard. Returns whether the
    /// submission was accepted; a refusal is logged and routes the caller to
    /// the CPU path.
    fn dispatch_offload(&mut self, active: &ChunkDescriptor, elapsed: f32) -> bool {
        let Some(bridge) = self.bridge.as_mut() else {
            return false;
        };
        let request = OffloadRequest {
            data: pack_chunk(&self.buffer, active, elapsed),
            elapsed,
            mode: self.mode,
            global_offset: active.first_particle(),
            generation: self.generation,
            chunk: *active,
            reply: self.reply_tx.clone(),
        };
        match bridge.submit(request) {
            Ok(()) => {
                self.in_flight = true;
                true
            }
            Err(err) => {
                warn!(%err, chunk = active.index, "offload submission refused");
                self.metrics.record_offload_failure();
                false
            }
        }
    }

    fn worker_metrics(&self) -> WorkerMetrics {
        self.bridge
            .as_ref()
            .map(|b| b.worker_metrics())
            .unwrap_or_default()
    }

    // ========== accessors ==========

    /// Position buffer the renderer reads every frame, 3 floats per particle.
    #[inline]
    pub fn positions(&self) -> &[f32] {
        &self.buffer.positions
    }

    /// Full renderer-facing attribute streams.
    #[inline]
    pub fn renderer_feed(&self) -> RendererFeed<'_> {
        self.buffer.renderer_feed()
    }

    /// Read and clear the per-frame dirty flag.
    #[inline]
    pub fn take_dirty(&mut self) -> bool {
        self.buffer.take_dirty()
    }

    #[inline]
    pub fn particle_count(&self) -> usize {
        self.buffer.count()
    }

    #[inline]
    pub fn mode(&self) -> AnimationMode {
        self.mode
    }

    #[inline]
    pub fn params(&self) -> &PatternParams {
        &self.params
    }

    /// Current adaptive performance state.
    #[inline]
    pub fn performance(&self) -> FramePerformanceState {
        self.budget.state()
    }

    /// Most recent metrics snapshot (refreshed at most once per second).
    #[inline]
    pub fn metrics(&self) -> &MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Resolved backend tier, re-evaluated on demand.
    pub fn backend_tier(&self) -> BackendTier {
        self.bridge
            .as_ref()
            .map(|b| b.tier())
            .unwrap_or(BackendTier::None)
    }

    /// True while an offload call is outstanding.
    #[inline]
    pub fn offload_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Install a fixed per-frame delta for deterministic stepping.
    pub fn set_fixed_delta(&mut self, delta: Option<f32>) {
        self.clock.set_fixed_delta(delta);
    }

    /// Direct access to the particle buffer, for render integrations that
    /// upload attributes besides positions.
    #[inline]
    pub fn buffer(&self) -> &ParticleBuffer {
        &self.buffer
    }
}
