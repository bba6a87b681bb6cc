//! The perception-action loop.
//!
//! Each iteration:
//!
//! 1. [`FrameSource`] captures the display with the cursor.
//! 2. [`Rescaler`] shrinks it to the perception size.
//! 3. [`PngEncoder`] encodes it; an optional [`FrameArchive`] keeps a copy.
//! 4. [`DecisionService`] proposes one action, which [`validate`] checks.
//! 5. [`InputInjector`] executes it, followed by a fixed delay and,
//!    for input actions, a [`SettleDetector`] wait.
//! 6. [`HudCompositor`] shows the action's reason.
//!
//! Nothing but the HUD text and the consecutive-failure counter survives
//! from one iteration to the next.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::action::{Action, ProposedAction, validate};
use crate::clock::Clock;
use crate::codec::PngEncoder;
use crate::error::{ControllerError, DecisionError};
use crate::hud::{GlyphSource, HudCompositor, HudStyle, OverlaySurface};
use crate::input::{InputBackend, InputInjector};
use crate::screen::{Downsampled, FrameSource, Rescaler, SettleDetector, SettleParams};

// ── Collaborator seams ───────────────────────────────────────────

/// Produces exactly one proposed action for an encoded screenshot.
pub trait DecisionService {
    /// Must give up and return [`DecisionError::Timeout`] after `timeout`.
    fn decide(&mut self, png: &[u8], timeout: Duration) -> Result<ProposedAction, DecisionError>;
}

/// Keeps the screenshots the decision service was shown.
pub trait FrameArchive {
    fn store(&mut self, step: u64, png: &[u8]) -> std::io::Result<()>;
}

// ── ControllerConfig ─────────────────────────────────────────────

/// Configuration for [`ActionController`].
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Resolution of the image sent to the decision service.
    pub perception_width: u32,
    pub perception_height: u32,
    pub decision_timeout: Duration,
    /// Wait after any action other than observe.
    pub delay_after_action: Duration,
    pub delay_after_observe: Duration,
    pub settle_enabled: bool,
    pub settle: SettleParams,
    /// Consecutive decision failures that end the loop.
    pub failure_budget: u32,
    pub decision_retry_delay: Duration,
    pub initial_hud_text: String,
    pub hud: HudStyle,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            perception_width: 1536,
            perception_height: 864,
            decision_timeout: Duration::from_secs(120),
            delay_after_action: Duration::from_millis(850),
            delay_after_observe: Duration::from_millis(1500),
            settle_enabled: true,
            settle: SettleParams::default(),
            failure_budget: 3,
            decision_retry_delay: Duration::from_secs(2),
            initial_hud_text: String::new(),
            hud: HudStyle::default(),
        }
    }
}

/// OS-facing collaborators handed to [`ActionController::new`].
pub struct ControllerParts {
    pub frames: Box<dyn FrameSource>,
    pub input: Box<dyn InputBackend>,
    pub glyphs: Box<dyn GlyphSource>,
    pub surface: Box<dyn OverlaySurface>,
    pub decision: Box<dyn DecisionService>,
    pub archive: Option<Box<dyn FrameArchive>>,
    pub clock: Rc<dyn Clock>,
}

// ── State / outcomes ─────────────────────────────────────────────

/// The single line of memory carried between iterations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HudState {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// The decision service declared the task done.
    Finished(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Done(String),
    Interrupted,
}

type Hud = HudCompositor<Box<dyn GlyphSource>, Box<dyn OverlaySurface>, Rc<dyn Clock>>;

// ── ActionController ─────────────────────────────────────────────

/// Stateless perception-action loop.
///
/// # Lifetime
///
/// The overlay is created before construction and destroyed when the
/// controller is dropped. Everything runs on the calling thread.
pub struct ActionController {
    frames: Box<dyn FrameSource>,
    perception: Rescaler,
    sampling: Rescaler,
    encoder: PngEncoder,
    injector: InputInjector<Box<dyn InputBackend>>,
    hud: Hud,
    decision: Box<dyn DecisionService>,
    archive: Option<Box<dyn FrameArchive>>,
    settle: SettleDetector<Rc<dyn Clock>>,
    clock: Rc<dyn Clock>,
    config: ControllerConfig,
    state: HudState,
    failures: u32,
    iteration: u64,
}

impl ActionController {
    /// Assemble the loop and show the initial HUD text.
    pub fn new(parts: ControllerParts, config: ControllerConfig) -> Result<Self, ControllerError> {
        let hud = HudCompositor::new(
            parts.glyphs,
            parts.surface,
            Rc::clone(&parts.clock),
            config.hud.clone(),
        );
        let state = HudState {
            text: config.initial_hud_text.clone(),
        };

        let mut controller = Self {
            frames: parts.frames,
            perception: Rescaler::new(),
            sampling: Rescaler::new(),
            encoder: PngEncoder::new(),
            injector: InputInjector::new(parts.input),
            hud,
            decision: parts.decision,
            archive: parts.archive,
            settle: SettleDetector::new(Rc::clone(&parts.clock)),
            clock: parts.clock,
            config,
            state,
            failures: 0,
            iteration: 0,
        };
        controller.hud.render(&controller.state.text)?;
        Ok(controller)
    }

    pub fn hud_text(&self) -> &str {
        &self.state.text
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Iterations started so far.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Loop until the task is done, a fatal error occurs or `stop` is set.
    ///
    /// `stop` is checked between iterations only.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<Completion, ControllerError> {
        loop {
            if stop.load(Ordering::SeqCst) {
                tracing::info!(iteration = self.iteration, "interrupted");
                return Ok(Completion::Interrupted);
            }
            if let StepOutcome::Finished(reason) = self.step()? {
                return Ok(Completion::Done(reason));
            }
        }
    }

    /// Run one capture → decide → act → display iteration.
    pub fn step(&mut self) -> Result<StepOutcome, ControllerError> {
        self.iteration += 1;
        let step = self.iteration;

        let png = self.perceive()?;
        if let Some(archive) = self.archive.as_mut() {
            if let Err(e) = archive.store(step, &png) {
                tracing::warn!(step, "screenshot not archived: {e}");
            }
        }

        let action = match self.decide(&png) {
            Ok(action) => {
                self.failures = 0;
                action
            }
            Err(e) => {
                self.failures += 1;
                tracing::warn!(
                    step,
                    failures = self.failures,
                    budget = self.config.failure_budget,
                    "decision failed: {e}"
                );
                if self.failures >= self.config.failure_budget {
                    tracing::error!(failures = self.failures, "decision failure budget exhausted");
                    return Err(ControllerError::FailureBudgetExhausted {
                        failures: self.failures,
                        last: e,
                    });
                }
                self.clock.sleep(self.config.decision_retry_delay);
                return Ok(StepOutcome::Continue);
            }
        };

        tracing::info!(step, action = action.name(), reason = action.reason(), "decided");

        if let Action::Done { reason } = &action {
            return Ok(StepOutcome::Finished(reason.clone()));
        }

        if !self.execute(&action)? {
            return Ok(StepOutcome::Continue);
        }

        if self.config.settle_enabled && action.changes_input() {
            let mut sampler = Downsampled::new(self.frames.as_mut(), &mut self.sampling);
            let result = self.settle.is_settled(&mut sampler, &self.config.settle)?;
            tracing::debug!(stable = result.stable, elapsed = ?result.elapsed, "settle");
        }

        self.state.text = action.reason().to_owned();
        self.hud.render(&self.state.text)?;
        Ok(StepOutcome::Continue)
    }

    /// Capture, downsample and encode the frame the decision is made on.
    fn perceive(&mut self) -> Result<Vec<u8>, ControllerError> {
        let full = self.frames.capture(true)?;
        let small = self.perception.downsample(
            &full,
            self.config.perception_width,
            self.config.perception_height,
        )?;
        let png = self.encoder.encode(&small)?;
        tracing::debug!(
            src = ?(full.width(), full.height()),
            bytes = png.len(),
            "frame encoded"
        );
        Ok(png)
    }

    fn decide(&mut self, png: &[u8]) -> Result<Action, DecisionError> {
        let proposed = self.decision.decide(png, self.config.decision_timeout)?;
        validate(&proposed)
    }

    /// Dispatch `action` and wait out its post-action delay.
    ///
    /// Returns `false` when a recoverable injection failure skipped the
    /// rest of the iteration.
    fn execute(&mut self, action: &Action) -> Result<bool, ControllerError> {
        let result = match action {
            Action::Observe { .. } | Action::Done { .. } => Ok(()),
            Action::Click { x, y, .. } => self.injector.move_and_click(*x, *y),
            Action::Type { text, .. } => self.injector.type_text(text),
            Action::Scroll { dy, .. } => self.injector.scroll(*dy),
        };

        let delay = match action {
            Action::Observe { .. } => self.config.delay_after_observe,
            _ => self.config.delay_after_action,
        };

        match result {
            Ok(()) => {
                self.clock.sleep(delay);
                Ok(true)
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(action = action.name(), "input blocked: {e}");
                Err(e.into())
            }
            Err(e) => {
                tracing::warn!(action = action.name(), "input injection failed: {e}");
                self.clock.sleep(delay);
                Ok(false)
            }
        }
    }
}
