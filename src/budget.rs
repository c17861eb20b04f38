//! Adaptive frame budget control.
//!
//! The accelerated path is only taken while the last frame fit inside
//! `gpu_budget_ms`. The budget itself adapts once per second from a rolling
//! window of FPS samples: shrink multiplicatively when the device falls
//! behind the target rate, grow slowly when it keeps up. A plain hysteretic
//! loop is enough at a ~1 Hz update rate; there is no integral or derivative
//! term to tune.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::debug;

/// Hard floor for the adaptive budget, in milliseconds.
pub const MIN_GPU_BUDGET_MS: f32 = 2.0;

/// Hard ceiling for the adaptive budget, in milliseconds.
pub const MAX_GPU_BUDGET_MS: f32 = 15.0;

/// Number of one-second FPS samples kept in the rolling window.
const WINDOW_SAMPLES: usize = 10;

/// Fraction of the target rate below which the budget shrinks.
const TARGET_RATIO: f32 = 0.9;

/// Per-frame performance state read by the chunk dispatcher.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FramePerformanceState {
    /// Wall-clock duration of the previous frame's dispatch step.
    pub last_frame_ms: f32,
    /// Current time allowance for the accelerated path.
    pub gpu_budget_ms: f32,
    /// Session-wide target frame rate.
    pub target_fps: f32,
}

/// Rolling-window budget controller. One instance persists across mode
/// changes: it reflects device capability, not content.
#[derive(Debug)]
pub struct FrameBudget {
    state: FramePerformanceState,
    samples: VecDeque<f32>,
}

impl FrameBudget {
    /// Create a controller with the default 8 ms starting budget.
    pub fn new(target_fps: f32) -> Self {
        Self {
            state: FramePerformanceState {
                last_frame_ms: 0.0,
                gpu_budget_ms: 8.0,
                target_fps,
            },
            samples: VecDeque::with_capacity(WINDOW_SAMPLES),
        }
    }

    /// Current performance state.
    #[inline]
    pub fn state(&self) -> FramePerformanceState {
        self.state
    }

    /// Current adaptive budget in milliseconds.
    #[inline]
    pub fn gpu_budget_ms(&self) -> f32 {
        self.state.gpu_budget_ms
    }

    /// Session target rate.
    #[inline]
    pub fn target_fps(&self) -> f32 {
        self.state.target_fps
    }

    /// Record the measured duration of the frame that just finished.
    #[inline]
    pub fn record_frame_ms(&mut self, ms: f32) {
        self.state.last_frame_ms = ms;
    }

    /// True when the previous frame fit inside the current budget.
    #[inline]
    pub fn within_budget(&self) -> bool {
        self.state.last_frame_ms < self.state.gpu_budget_ms
    }

    /// Feed one one-second FPS sample and run a single adaptation step.
    ///
    /// Average FPS is taken over the last ten samples (oldest dropped on
    /// overflow). Below 90% of the target the budget shrinks by 10%; at or
    /// above it grows by 5%. Always clamped to `[2.0, 15.0]`.
    pub fn push_fps_sample(&mut self, fps: f32) {
        if self.samples.len() == WINDOW_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(fps);

        let avg: f32 = self.samples.iter().sum::<f32>() / self.samples.len() as f32;
        let threshold = self.state.target_fps * TARGET_RATIO;
        let before = self.state.gpu_budget_ms;

        if avg < threshold && self.state.gpu_budget_ms > MIN_GPU_BUDGET_MS {
            self.state.gpu_budget_ms *= 0.9;
        } else if avg >= threshold && self.state.gpu_budget_ms < MAX_GPU_BUDGET_MS {
            self.state.gpu_budget_ms *= 1.05;
        }
        self.state.gpu_budget_ms = self
            .state
            .gpu_budget_ms
            .clamp(MIN_GPU_BUDGET_MS, MAX_GPU_BUDGET_MS);

        if (self.state.gpu_budget_ms - before).abs() > f32::EPSILON {
            debug!(
                avg_fps = avg,
                budget_ms = self.state.gpu_budget_ms,
                "gpu budget adapted"
            );
        }
    }
}
