//! Wiring of the Windows collaborators into an [`ActionController`].
//!
//! Everything here runs on one blocking thread: the overlay window has
//! thread affinity and the decision client is synchronous.

use std::io::{BufRead, Write};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use deskpilot_core::{
    ActionController, CaptureError, Completion, ControllerError, ControllerParts, DecisionError,
    FrameArchive, GdiCapturer, GdiGlyphs, InjectionError, LayeredWindow, OverlayError,
    SendInputBackend, StepOutcome, SystemClock,
};
use thiserror::Error;

use crate::archive::DumpArchive;
use crate::config::AgentConfig;
use crate::decision::ChatCompletionsClient;

/// How iterations are paced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Iterate until done, a fatal error or Ctrl-C.
    Autonomous,
    /// Wait for Enter on stdin before each iteration.
    Step,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("screen capture unavailable: {0}")]
    Capture(#[from] CaptureError),

    #[error("input injection unavailable: {0}")]
    Input(#[from] InjectionError),

    #[error("overlay unavailable: {0}")]
    Overlay(#[from] OverlayError),

    #[error("decision client: {0}")]
    Decision(#[from] DecisionError),

    #[error("screenshot archive: {0}")]
    Archive(#[source] std::io::Error),

    #[error(transparent)]
    Controller(#[from] ControllerError),
}

/// Build the controller from OS-backed parts.
pub fn build_controller(config: &AgentConfig) -> Result<ActionController, SessionError> {
    deskpilot_core::screen::enable_dpi_awareness();
    let (w, h) = deskpilot_core::screen::screen_size();
    tracing::info!(width = w, height = h, "primary display");

    let controller_config = config.to_controller_config();

    let frames = GdiCapturer::new()?;
    let input = SendInputBackend::new()?;
    let glyphs = GdiGlyphs::new(&controller_config.hud)?;
    let surface = LayeredWindow::for_primary_display()?;
    let decision = ChatCompletionsClient::new(config.decision.clone())?;

    let archive: Option<Box<dyn FrameArchive>> = if config.dump.enabled {
        let archive = DumpArchive::create(&config.dump.folder).map_err(SessionError::Archive)?;
        Some(Box::new(archive))
    } else {
        None
    };

    let parts = ControllerParts {
        frames: Box::new(frames),
        input: Box::new(input),
        glyphs: Box::new(glyphs),
        surface: Box::new(surface),
        decision: Box::new(decision),
        archive,
        clock: Rc::new(SystemClock),
    };
    Ok(ActionController::new(parts, controller_config)?)
}

/// Build a controller and drive it in `mode` until it completes.
///
/// The overlay is torn down when the controller drops, on every exit path.
pub fn run(config: &AgentConfig, mode: Mode, stop: &AtomicBool) -> Result<Completion, SessionError> {
    let mut controller = build_controller(config)?;
    let completion = match mode {
        Mode::Autonomous => controller.run(stop)?,
        Mode::Step => {
            let stdin = std::io::stdin();
            run_stepwise(stop, stdin.lock(), std::io::stderr(), || controller.step())?
        }
    };
    tracing::info!(iterations = controller.iteration(), "session finished");
    Ok(completion)
}

/// Single-step driver: one `step` per line read from `input`.
///
/// End of input counts as an interrupt. The stop flag is checked after
/// each Enter, so Ctrl-C takes effect on the next keypress.
pub fn run_stepwise<R, W, F>(
    stop: &AtomicBool,
    mut input: R,
    mut prompt: W,
    mut step: F,
) -> Result<Completion, ControllerError>
where
    R: BufRead,
    W: Write,
    F: FnMut() -> Result<StepOutcome, ControllerError>,
{
    let mut line = String::new();
    loop {
        let _ = write!(prompt, "press Enter for the next step ");
        let _ = prompt.flush();

        line.clear();
        let eof = matches!(input.read_line(&mut line), Ok(0) | Err(_));
        if eof || stop.load(Ordering::SeqCst) {
            return Ok(Completion::Interrupted);
        }

        if let StepOutcome::Finished(reason) = step()? {
            return Ok(Completion::Done(reason));
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn one_step_per_line() {
        let stop = AtomicBool::new(false);
        let mut steps = 0;
        let completion = run_stepwise(&stop, Cursor::new("\n\n\n\n"), std::io::sink(), || {
            steps += 1;
            Ok(if steps == 3 {
                StepOutcome::Finished("all set".into())
            } else {
                StepOutcome::Continue
            })
        })
        .unwrap();
        assert_eq!(completion, Completion::Done("all set".into()));
        assert_eq!(steps, 3);
    }

    #[test]
    fn end_of_input_interrupts() {
        let stop = AtomicBool::new(false);
        let mut steps = 0;
        let mut prompt: Vec<u8> = Vec::new();
        let completion = run_stepwise(&stop, Cursor::new("\n"), &mut prompt, || {
            steps += 1;
            Ok(StepOutcome::Continue)
        })
        .unwrap();
        assert_eq!(completion, Completion::Interrupted);
        assert_eq!(steps, 1);
        assert!(String::from_utf8(prompt).unwrap().contains("Enter"));
    }

    #[test]
    fn stop_flag_wins_over_enter() {
        let stop = AtomicBool::new(true);
        let completion = run_stepwise(&stop, Cursor::new("\n"), std::io::sink(), || {
            panic!("no step after stop")
        })
        .unwrap();
        assert_eq!(completion, Completion::Interrupted);
    }

    #[test]
    fn fatal_step_error_propagates() {
        let stop = AtomicBool::new(false);
        let result = run_stepwise(&stop, Cursor::new("\n"), std::io::sink(), || {
            Err(ControllerError::Capture(CaptureError::new("BitBlt", 6)))
        });
        assert!(matches!(result, Err(ControllerError::Capture(_))));
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn building_off_windows_fails_on_capture() {
        let mut config = AgentConfig::default();
        config.dump.enabled = false;
        let err = build_controller(&config).err().unwrap();
        assert!(matches!(err, SessionError::Capture(_)), "{err}");
    }
}
