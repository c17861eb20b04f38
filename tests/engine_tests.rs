//! End-to-end engine behavior: generation, chunk rotation, offload dispatch,
//! reply merging, and failure routing through the CPU fallback.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

use stardrift::buffer::{TYPE_NAMED, TYPE_PATTERN};
use stardrift::pattern::{self, SanitizeReport};
use stardrift::prelude::*;
use stardrift::{named, OffloadReply, OffloadRequest};

const FRAME: f32 = 1.0 / 60.0;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn engine_with(mode: AnimationMode, count: usize, seed: u64) -> Engine {
    init_tracing();
    let params = PatternParams {
        count,
        ..Default::default()
    };
    let mut engine = Engine::new(
        EngineConfig::new(mode, params)
            .with_target_fps(60.0)
            .with_seed(seed),
    )
    .unwrap();
    engine.set_fixed_delta(Some(FRAME));
    engine
}

/// Backend double that accepts every submission and parks it for the test to
/// answer (or not answer) explicitly.
#[derive(Clone)]
struct ManualBridge {
    parked: Arc<Mutex<VecDeque<OffloadRequest>>>,
}

impl ManualBridge {
    fn new() -> Self {
        Self {
            parked: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn take(&self) -> Option<OffloadRequest> {
        self.parked.lock().unwrap().pop_front()
    }

    fn parked_count(&self) -> usize {
        self.parked.lock().unwrap().len()
    }
}

impl OffloadBridge for ManualBridge {
    fn tier(&self) -> BackendTier {
        BackendTier::Accelerated
    }

    fn submit(&mut self, request: OffloadRequest) -> Result<(), OffloadError> {
        self.parked.lock().unwrap().push_back(request);
        Ok(())
    }
}

/// Backend double that refuses every submission.
struct RejectingBridge;

impl OffloadBridge for RejectingBridge {
    fn tier(&self) -> BackendTier {
        BackendTier::Accelerated
    }

    fn submit(&mut self, _request: OffloadRequest) -> Result<(), OffloadError> {
        Err(OffloadError::Busy)
    }
}

// ========== pattern generation ==========

#[test]
fn test_every_mode_generates_finite_particles() {
    let params = PatternParams {
        count: 5_000,
        ..Default::default()
    };
    for mode in AnimationMode::ALL {
        let (buf, report) = pattern::generate_with_seed(mode, &params, 99).unwrap();
        assert_eq!(buf.count(), 5_000, "{mode:?}");
        assert_eq!(buf.positions.len(), 15_000, "{mode:?}");
        assert!(buf.positions.iter().all(|v| v.is_finite()), "{mode:?}");
        assert!(buf.velocities.iter().all(|v| v.is_finite()), "{mode:?}");
        assert_eq!(report.corrected, 0, "{mode:?}");
    }
}

#[test]
fn test_galaxy_layout_meets_renderer_contract() {
    let params = PatternParams {
        count: 120_000,
        ..Default::default()
    };
    let (buf, report) = pattern::generate_with_seed(AnimationMode::Galaxy, &params, 3).unwrap();
    assert_eq!(buf.positions.len(), 360_000);
    assert_eq!(buf.colors.len(), 360_000);
    assert_eq!(buf.phases.len(), 120_000);
    assert!(report.is_clean());
    assert!(buf.types.iter().all(|&t| t == TYPE_PATTERN));
    assert!(buf
        .colors
        .iter()
        .all(|&c| c.is_finite() && (0.0..=1.0).contains(&c)));
}

#[test]
fn test_named_injection_is_idempotent() {
    let params = PatternParams {
        count: 2_000,
        ..Default::default()
    };
    let (mut buf, _) = pattern::generate_with_seed(AnimationMode::Spiral, &params, 11).unwrap();
    let roster = vec![
        NamedParticle::new("alpha", 0, Vec3::new(1.0, 0.2, 0.2), 3.0),
        NamedParticle::new("beta", 1, Vec3::new(0.2, 1.0, 0.2), 2.5),
    ];
    named::inject(&mut buf, &roster);
    let positions = buf.positions.clone();
    let colors = buf.colors.clone();

    named::inject(&mut buf, &roster);
    assert_eq!(buf.positions, positions);
    assert_eq!(buf.colors, colors);
    assert_eq!(buf.types[0], TYPE_NAMED);
    assert_eq!(buf.types[1], TYPE_NAMED);
    assert_eq!(buf.types[2], TYPE_PATTERN);
}

// ========== chunk rotation ==========

#[test]
fn test_chunk_rotation_covers_every_index() {
    // 120k particles = 360k floats = 3 chunks of 150k
    let mut engine = engine_with(AnimationMode::Wave, 120_000, 42);
    let mut seen = BTreeSet::new();
    let mut totals = BTreeSet::new();
    for _ in 0..6 {
        let report = engine.tick();
        seen.insert(report.chunk.index);
        totals.insert(report.chunk.total);
    }
    assert_eq!(totals, BTreeSet::from([3]));
    assert_eq!(seen, BTreeSet::from([0, 1, 2]));
}

#[test]
fn test_tick_animates_without_any_bridge() {
    let mut engine = engine_with(AnimationMode::Wave, 8_000, 7);
    let before = engine.positions().to_vec();
    let report = engine.tick();
    assert!(!report.offloaded);
    assert_eq!(report.sanitized, 0);
    let changed = engine
        .positions()
        .iter()
        .zip(&before)
        .filter(|(a, b)| a != b)
        .count();
    assert!(changed > 0);
    assert!(engine.positions().iter().all(|v| v.is_finite()));
}

// ========== offload dispatch ==========

#[test]
fn test_small_buffers_stay_on_cpu_path() {
    let mut engine = engine_with(AnimationMode::Galaxy, 50_000, 1);
    let bridge = ManualBridge::new();
    engine.attach_bridge(Box::new(bridge.clone()));
    // threshold is strictly greater than 50k
    for _ in 0..5 {
        assert!(!engine.tick().offloaded);
    }
    assert_eq!(bridge.parked_count(), 0);
}

#[test]
fn test_offload_is_single_flight() {
    let mut engine = engine_with(AnimationMode::Galaxy, 120_000, 1);
    let bridge = ManualBridge::new();
    engine.attach_bridge(Box::new(bridge.clone()));

    let first = engine.tick();
    assert!(first.offloaded);
    assert!(engine.offload_in_flight());

    // guard held until the reply is drained, every later frame falls back
    for _ in 0..4 {
        assert!(!engine.tick().offloaded);
    }
    assert_eq!(bridge.parked_count(), 1);
}

#[test]
fn test_offload_reply_merges_next_frame() {
    let mut engine = engine_with(AnimationMode::Galaxy, 120_000, 5);
    let bridge = ManualBridge::new();
    engine.attach_bridge(Box::new(bridge.clone()));

    assert!(engine.tick().offloaded);
    let request = bridge.take().unwrap();
    let particles = request.chunk.len_particles();

    // shift every particle well past the commit epsilon
    let mut data = request.data.clone();
    for record in data.chunks_exact_mut(8) {
        record[0] += 1.0;
    }
    request
        .reply
        .send(OffloadReply {
            result: Ok(data),
            generation: request.generation,
            chunk: request.chunk,
            latency_ms: 2.0,
        })
        .unwrap();

    // detach so the drain tick cannot immediately resubmit
    engine.detach_bridge();
    let report = engine.tick();
    assert_eq!(report.merged, particles);
    assert!(!engine.offload_in_flight());
}

#[test]
fn test_short_reply_is_rejected_without_touching_buffer() {
    let mut engine = engine_with(AnimationMode::Galaxy, 120_000, 6);
    let bridge = ManualBridge::new();
    engine.attach_bridge(Box::new(bridge.clone()));

    assert!(engine.tick().offloaded);
    let snapshot = engine.positions().to_vec();
    let request = bridge.take().unwrap();
    request
        .reply
        .send(OffloadReply {
            result: Ok(vec![0.0; 16]),
            generation: request.generation,
            chunk: request.chunk,
            latency_ms: 1.0,
        })
        .unwrap();

    engine.detach_bridge();
    let report = engine.tick();
    assert_eq!(report.merged, 0);
    assert!(!engine.offload_in_flight());
    // the rejected reply changed nothing; only this frame's CPU step did
    let chunk_start = report.chunk.start;
    assert_eq!(engine.positions()[..chunk_start], snapshot[..chunk_start]);
}

#[test]
fn test_non_finite_positions_in_reply_are_discarded() {
    let mut engine = engine_with(AnimationMode::Galaxy, 120_000, 13);
    let bridge = ManualBridge::new();
    engine.attach_bridge(Box::new(bridge.clone()));

    assert!(engine.tick().offloaded);
    let request = bridge.take().unwrap();
    let particles = request.chunk.len_particles();

    let mut data = request.data.clone();
    for (i, record) in data.chunks_exact_mut(8).enumerate() {
        if i % 2 == 0 {
            record[0] = f32::NAN;
        } else {
            record[2] += 1.0;
        }
    }
    request
        .reply
        .send(OffloadReply {
            result: Ok(data),
            generation: request.generation,
            chunk: request.chunk,
            latency_ms: 1.0,
        })
        .unwrap();

    engine.detach_bridge();
    let report = engine.tick();
    assert_eq!(report.merged, particles / 2);
    assert!(engine.positions().iter().all(|v| v.is_finite()));
}

#[test]
fn test_stale_reply_after_mode_change_is_discarded() {
    let mut engine = engine_with(AnimationMode::Galaxy, 120_000, 8);
    let bridge = ManualBridge::new();
    engine.attach_bridge(Box::new(bridge.clone()));

    assert!(engine.tick().offloaded);
    let request = bridge.take().unwrap();

    let report: SanitizeReport = engine
        .set_mode(
            AnimationMode::Spiral,
            PatternParams {
                count: 120_000,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(report.is_clean());

    let mut data = request.data.clone();
    for record in data.chunks_exact_mut(8) {
        record[1] += 100.0;
    }
    request
        .reply
        .send(OffloadReply {
            result: Ok(data),
            generation: request.generation,
            chunk: request.chunk,
            latency_ms: 1.0,
        })
        .unwrap();

    engine.detach_bridge();
    let report = engine.tick();
    assert_eq!(report.merged, 0);
    assert!(!engine.offload_in_flight());
    assert!(engine.positions().iter().all(|v| v.abs() < 100.0));
}

#[test]
fn test_rejecting_bridge_falls_back_every_frame() {
    let mut engine = engine_with(AnimationMode::YinYang, 120_000, 9);
    engine.attach_bridge(Box::new(RejectingBridge));

    let before = engine.positions().to_vec();
    for _ in 0..3 {
        let report = engine.tick();
        assert!(!report.offloaded);
    }
    assert_ne!(engine.positions(), &before[..]);
    assert!(engine.positions().iter().all(|v| v.is_finite()));
}

// ========== software backend ==========

#[test]
fn test_software_bridge_round_trip() {
    let mut engine = engine_with(AnimationMode::Galaxy, 120_000, 17);
    engine.attach_bridge(Box::new(SoftwareBridge::with_workers(2)));
    assert_eq!(engine.backend_tier(), BackendTier::Software);

    let first = engine.tick();
    assert!(first.offloaded);

    // the pool answers quickly; drain within a bounded number of frames
    let mut merged = 0;
    for _ in 0..200 {
        std::thread::sleep(std::time::Duration::from_millis(1));
        merged += engine.tick().merged;
        if merged > 0 {
            break;
        }
    }
    assert!(merged > 0);
    assert!(engine.positions().iter().all(|v| v.is_finite()));
}
