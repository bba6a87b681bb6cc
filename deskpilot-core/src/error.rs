//! Domain-specific error types for the deskpilot loop.
//!
//! Every fallible primitive returns its own typed error so the controller
//! can apply the right disposition: capture and overlay failures are
//! fatal, decision failures are budgeted, injection failures are reported.

use std::time::Duration;
use thiserror::Error;

// ── CaptureError ─────────────────────────────────────────────────

/// A graphics-device handle could not be acquired or used during capture.
#[derive(Debug, Error)]
#[error("capture failed in {op} (os error {code})")]
pub struct CaptureError {
    /// The OS call that failed.
    pub op: &'static str,
    /// Raw OS error code (`GetLastError` on Windows, 0 when unavailable).
    pub code: u32,
}

impl CaptureError {
    pub fn new(op: &'static str, code: u32) -> Self {
        Self { op, code }
    }

    /// Capture is not available on this platform.
    pub fn unsupported() -> Self {
        Self::new("screen capture is only available on Windows", 0)
    }
}

// ── InjectionError ───────────────────────────────────────────────

/// Input synthesis was rejected by the OS.
///
/// `delivered` events of the batch may already have reached the input
/// stream; they are not rolled back.
#[derive(Debug, Error)]
#[error("input injection failed (os error {code}): {delivered}/{requested} events delivered")]
pub struct InjectionError {
    pub code: u32,
    pub delivered: usize,
    pub requested: usize,
}

/// `ERROR_ACCESS_DENIED`: input blocked by a higher-integrity foreground window.
const ACCESS_DENIED: u32 = 5;

/// `ERROR_NOT_SUPPORTED`
const NOT_SUPPORTED: u32 = 50;

impl InjectionError {
    /// Input synthesis is not available on this platform.
    pub fn unsupported(requested: usize) -> Self {
        Self {
            code: NOT_SUPPORTED,
            delivered: 0,
            requested,
        }
    }

    /// Whether retrying in a later iteration is pointless.
    pub fn is_fatal(&self) -> bool {
        self.code == ACCESS_DENIED && self.delivered == 0
    }
}

// ── CodecError ───────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// PNG cannot represent a zero-sized image.
    #[error("image has zero width or height ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    /// The buffer is shorter than `stride * height`.
    #[error("pixel buffer too short: expected {expected} bytes, got {actual}")]
    ShortBuffer { expected: usize, actual: usize },
}

// ── OverlayError ─────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum OverlayError {
    /// Window, DC, font or bitmap creation failed.
    #[error("overlay creation failed in {op} (os error {code})")]
    Create { op: &'static str, code: u32 },

    /// Presenting the composed bitmap failed.
    #[error("overlay update failed (os error {0})")]
    Update(u32),

    /// Re-asserting top-most z-order failed. Logged, never fatal.
    #[error("z-order assertion failed (os error {0})")]
    ZOrder(u32),

    /// Presented canvas does not match the surface size.
    #[error("canvas {canvas:?} does not match surface {surface:?}")]
    SizeMismatch {
        canvas: (u32, u32),
        surface: (u32, u32),
    },

    #[error("overlay is only available on Windows")]
    Unsupported,
}

// ── DecisionError ────────────────────────────────────────────────

/// The decision collaborator failed to yield one valid action.
#[derive(Debug, Error)]
pub enum DecisionError {
    /// Transport-level failure (connection refused, DNS, reset).
    #[error("decision service unreachable: {0}")]
    Unreachable(String),

    /// The call exceeded its deadline.
    #[error("decision timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered with a non-success status.
    #[error("decision service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response did not contain exactly one well-formed action.
    #[error("malformed decision: {0}")]
    Malformed(String),

    /// An action arrived without a usable `reason`.
    #[error("decision for `{0}` carries no reason")]
    MissingReason(&'static str),
}

// ── ControllerError ──────────────────────────────────────────────

/// Fatal outcomes of the perception-action loop.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error(transparent)]
    Injection(#[from] InjectionError),

    /// Too many consecutive decision failures.
    #[error("{failures} consecutive decision failures, last: {last}")]
    FailureBudgetExhausted { failures: u32, last: DecisionError },
}
