//! Frame timing for the animation loop.
//!
//! [`FrameClock`] is the single source of truth for elapsed time, per-frame
//! delta and the one-second FPS samples that feed the frame budget
//! controller. A fixed delta can be installed to make the whole engine
//! deterministic in tests: elapsed time then advances by exactly that amount
//! per tick instead of reading the wall clock.

use std::time::Instant;

/// Result of one clock update.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    /// Total elapsed time in seconds since the clock started.
    pub elapsed: f32,
    /// Time advanced by this frame in seconds.
    pub delta: f32,
    /// Average FPS over the just-completed one-second window, when this tick
    /// crossed a second boundary.
    pub fps_sample: Option<f32>,
}

/// Per-frame time tracking with one-second FPS sampling.
///
/// Elapsed time accumulates in `f64`: at `f32` precision the sum of many
/// small deltas drifts enough to miss second boundaries, and on long
/// sessions the epsilon eventually exceeds the frame delta entirely.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_frame: Instant,
    elapsed_secs: f64,
    delta_secs: f32,
    frame_count: u64,
    /// Fixed delta time for deterministic updates (optional).
    fixed_delta: Option<f32>,
    window_start_secs: f64,
    window_frames: u64,
    fps: f32,
}

impl FrameClock {
    /// Create a clock starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            elapsed_secs: 0.0,
            delta_secs: 0.0,
            frame_count: 0,
            fixed_delta: None,
            window_start_secs: 0.0,
            window_frames: 0,
            fps: 0.0,
        }
    }

    /// Advance the clock by one frame. Call exactly once per tick.
    pub fn update(&mut self) -> Tick {
        let now = Instant::now();
        match self.fixed_delta {
            Some(fd) => {
                self.delta_secs = fd;
                self.elapsed_secs += fd as f64;
            }
            None => {
                self.delta_secs = now.duration_since(self.last_frame).as_secs_f32();
                self.elapsed_secs = now.duration_since(self.start).as_secs_f64();
            }
        }
        self.last_frame = now;
        self.frame_count += 1;
        self.window_frames += 1;

        let mut fps_sample = None;
        let window_span = self.elapsed_secs - self.window_start_secs;
        if window_span >= 1.0 {
            self.fps = (self.window_frames as f64 / window_span) as f32;
            fps_sample = Some(self.fps);
            self.window_start_secs = self.elapsed_secs;
            self.window_frames = 0;
        }

        Tick {
            elapsed: self.elapsed_secs as f32,
            delta: self.delta_secs,
            fps_sample,
        }
    }

    /// Total elapsed time in seconds.
    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed_secs as f32
    }

    /// Time since the previous frame in seconds.
    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    /// Total frames since start.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    /// FPS over the most recently completed one-second window.
    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Install a fixed delta for deterministic stepping, or `None` to return
    /// to wall-clock timing.
    pub fn set_fixed_delta(&mut self, delta: Option<f32>) {
        self.fixed_delta = delta;
    }

    /// Reset to the initial state, keeping the fixed-delta setting.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_frame = now;
        self.elapsed_secs = 0.0;
        self.delta_secs = 0.0;
        self.frame_count = 0;
        self.window_start_secs = 0.0;
        self.window_frames = 0;
        self.fps = 0.0;
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
