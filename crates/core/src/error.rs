//! Failure taxonomy of the hunt loop.
//!
//! Collaborator and action errors never leave a tick: they are logged and
//! folded into the tick's [`TickOutcome`](crate::control::TickOutcome).
//! Configuration errors are only raised at startup.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Point;

/// A capture, detection or probe collaborator failed or timed out.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollaboratorError {
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("detector failed: {0}")]
    Detect(String),
    #[error("probe failed: {0}")]
    Probe(String),
}

/// A synthetic input could not be delivered.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("click at {at} failed: {reason}")]
    Click { at: Point, reason: String },
    #[error("key '{key}' failed: {reason}")]
    Key { key: String, reason: String },
    #[error("drag {from} -> {to} failed: {reason}")]
    Drag { from: Point, to: Point, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("target fps must be positive, got {0}")]
    NonPositiveCadence(f64),
    #[error("zone radius must not be negative, got {0}")]
    NegativeRadius(f64),
    #[error("custom zone radius must be within 50..=800, got {0}")]
    CustomRadiusOutOfRange(u32),
    #[error("capture region is empty: margins leave {width}x{height}")]
    EmptyCaptureRegion { width: i32, height: i32 },
    #[error("minimum movement distance {min} cannot be reached inside the capture region (nearest corner is {corner:.0}px away)")]
    UnreachableMovementFloor { min: f64, corner: f64 },
    #[error("{field} must be a non-negative number of seconds that fits a duration, got {secs}")]
    InvalidDuration { field: &'static str, secs: f64 },
    #[error("{0} must be positive")]
    NonPositive(&'static str),
    #[error("key sequence is empty")]
    EmptyKeySequence,
    #[error("unknown zone preset '{0}'")]
    UnknownPreset(String),
    #[error("unknown death response '{0}'")]
    UnknownDeathResponse(String),
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
