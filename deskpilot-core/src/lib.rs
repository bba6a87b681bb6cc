//! # deskpilot-core
//!
//! Core library for the deskpilot desktop automation loop.
//!
//! This crate contains:
//! - **Screen**: `GdiCapturer` capture, `Rescaler` nearest-neighbor
//!   downsampling, `SettleDetector` stability heuristic
//! - **Codec**: from-scratch PNG writer with its own deflate/zlib encoder
//! - **HUD**: `HudCompositor` status overlay over a layered window
//! - **Input**: `InputInjector` pointer, keyboard and wheel synthesis
//! - **Action**: `ProposedAction` → `Action` validation
//! - **Controller**: `ActionController`, the perception-action loop
//! - **Error**: typed, `thiserror`-based error hierarchy

pub mod action;
pub mod clock;
pub mod codec;
pub mod controller;
pub mod error;
pub mod hud;
pub mod input;
pub mod screen;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use action::{Action, ProposedAction, ProposedArgs, validate};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use codec::{PngEncoder, encode_png};
pub use controller::{
    ActionController, Completion, ControllerConfig, ControllerParts, DecisionService,
    FrameArchive, HudState, StepOutcome,
};
pub use error::{
    CaptureError, CodecError, ControllerError, DecisionError, InjectionError, OverlayError,
};
pub use hud::{
    Canvas, GdiGlyphs, GlyphMask, GlyphSource, HudCompositor, HudStyle, LayeredWindow,
    OverlaySurface, Rgb, TextMeasure,
};
pub use input::{InputBackend, InputEvent, InputInjector, KeyCode, SendInputBackend};
pub use screen::{
    FrameBuffer, FrameSource, GdiCapturer, PixelFormat, Rescaler, SampleSource, SettleDetector,
    SettleParams, SettleResult,
};
