//! Error types for stardrift.
//!
//! This module provides error types for offload dispatch and engine
//! construction. Nothing here is fatal to the animation itself: every offload
//! failure degrades to the synchronous CPU path for the affected chunk.

use std::fmt;

/// Errors that can occur when submitting work to an offload bridge.
#[derive(Debug)]
pub enum OffloadError {
    /// The backend is not (yet) initialized or has been torn down.
    NotReady,
    /// A previous submission is still in flight (single-flight guard held).
    Busy,
    /// The bridge returned a result whose length does not match the request.
    MalformedResult {
        /// Number of floats the caller submitted and expects back.
        expected: usize,
        /// Number of floats actually returned.
        got: usize,
    },
    /// The backend reported an internal failure.
    Backend(String),
    /// The completion channel was closed before a reply arrived.
    ChannelClosed,
}

impl fmt::Display for OffloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffloadError::NotReady => write!(f, "Offload backend is not ready"),
            OffloadError::Busy => write!(f, "An offload call is already in flight"),
            OffloadError::MalformedResult { expected, got } => write!(
                f,
                "Offload result length mismatch: expected {} floats, got {}",
                expected, got
            ),
            OffloadError::Backend(msg) => write!(f, "Offload backend failure: {}", msg),
            OffloadError::ChannelClosed => {
                write!(f, "Offload completion channel closed before reply")
            }
        }
    }
}

impl std::error::Error for OffloadError {}

/// Errors that can occur when constructing or reconfiguring an engine.
#[derive(Debug)]
pub enum EngineError {
    /// The pattern parameters asked for zero particles.
    EmptyPattern,
    /// A color string could not be parsed as `#rrggbb`.
    InvalidColor(String),
    /// The pattern radius is not a positive finite number.
    InvalidRadius(f32),
    /// The requested target FPS is not a positive number.
    InvalidTargetFps(f32),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::EmptyPattern => {
                write!(f, "Pattern parameters must request at least one particle")
            }
            EngineError::InvalidColor(s) => {
                write!(f, "Invalid color {:?}: expected #rrggbb", s)
            }
            EngineError::InvalidRadius(r) => {
                write!(f, "Pattern radius must be positive and finite, got {}", r)
            }
            EngineError::InvalidTargetFps(fps) => {
                write!(f, "Target FPS must be positive, got {}", fps)
            }
        }
    }
}

impl std::error::Error for EngineError {}
