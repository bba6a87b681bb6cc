//! Integration tests: the full perception-action loop driven by
//! scripted fakes on a virtual clock.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use deskpilot_core::{
    ActionController, Canvas, CaptureError, Completion, ControllerConfig, ControllerError,
    ControllerParts, DecisionError, DecisionService, FrameArchive, FrameBuffer, FrameSource,
    GlyphMask, GlyphSource, InjectionError, InputBackend, InputEvent, ManualClock, OverlayError,
    OverlaySurface, PixelFormat, ProposedAction, ProposedArgs, StepOutcome, TextMeasure,
};

// ── Fakes ────────────────────────────────────────────────────────

#[derive(Default)]
struct Record {
    captures: Vec<bool>,
    batches: Vec<Vec<InputEvent>>,
    presented: Vec<Canvas>,
    decisions: Vec<Vec<u8>>,
    archived: Vec<u64>,
}

type Shared = Rc<RefCell<Record>>;

struct Screen {
    record: Shared,
    fail: bool,
}

impl FrameSource for Screen {
    fn capture(&mut self, include_cursor: bool) -> Result<FrameBuffer, CaptureError> {
        if self.fail {
            return Err(CaptureError::new("BitBlt", 6));
        }
        self.record.borrow_mut().captures.push(include_cursor);
        let data = [40u8, 80, 120, 255].repeat(64 * 36);
        Ok(FrameBuffer::packed(64, 36, PixelFormat::Bgra8, data).unwrap())
    }
}

struct Input {
    record: Shared,
    fail_code: Option<u32>,
}

impl InputBackend for Input {
    fn screen_size(&self) -> (u32, u32) {
        (1920, 1080)
    }

    fn send(&mut self, events: &[InputEvent]) -> Result<(), InjectionError> {
        if let Some(code) = self.fail_code {
            return Err(InjectionError {
                code,
                delivered: 0,
                requested: events.len(),
            });
        }
        self.record.borrow_mut().batches.push(events.to_vec());
        Ok(())
    }
}

struct Glyphs;

impl TextMeasure for Glyphs {
    fn text_width(&self, text: &str) -> u32 {
        text.chars().count() as u32 * 6
    }
}

impl GlyphSource for Glyphs {
    fn rasterize(&mut self, text: &str) -> Result<GlyphMask, OverlayError> {
        let width = self.text_width(text);
        Ok(GlyphMask {
            width,
            height: 12,
            coverage: vec![200; (width * 12) as usize],
        })
    }
}

struct Surface {
    record: Shared,
}

impl OverlaySurface for Surface {
    fn size(&self) -> (u32, u32) {
        (320, 120)
    }

    fn present(&mut self, canvas: &Canvas) -> Result<(), OverlayError> {
        self.record.borrow_mut().presented.push(canvas.clone());
        Ok(())
    }

    fn raise(&mut self) -> Result<(), OverlayError> {
        Ok(())
    }
}

struct Script {
    record: Shared,
    replies: VecDeque<Result<ProposedAction, DecisionError>>,
}

impl DecisionService for Script {
    fn decide(
        &mut self,
        png: &[u8],
        _timeout: Duration,
    ) -> Result<ProposedAction, DecisionError> {
        self.record.borrow_mut().decisions.push(png.to_vec());
        self.replies
            .pop_front()
            .unwrap_or_else(|| Err(DecisionError::Unreachable("script exhausted".into())))
    }
}

struct Archive {
    record: Shared,
    fail: bool,
}

impl FrameArchive for Archive {
    fn store(&mut self, step: u64, _png: &[u8]) -> std::io::Result<()> {
        if self.fail {
            return Err(std::io::Error::other("disk full"));
        }
        self.record.borrow_mut().archived.push(step);
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn act(name: &str, reason: &str) -> Result<ProposedAction, DecisionError> {
    Ok(ProposedAction::new(
        name,
        ProposedArgs {
            reason: Some(reason.into()),
            ..Default::default()
        },
    ))
}

fn click(x: f64, y: f64, reason: &str) -> Result<ProposedAction, DecisionError> {
    Ok(ProposedAction::new(
        "click",
        ProposedArgs {
            x: Some(x),
            y: Some(y),
            reason: Some(reason.into()),
            ..Default::default()
        },
    ))
}

fn typed(text: &str, reason: &str) -> Result<ProposedAction, DecisionError> {
    Ok(ProposedAction::new(
        "type",
        ProposedArgs {
            text: Some(text.into()),
            reason: Some(reason.into()),
            ..Default::default()
        },
    ))
}

fn refused() -> Result<ProposedAction, DecisionError> {
    Err(DecisionError::Unreachable("connection refused".into()))
}

struct Harness {
    record: Shared,
    clock: Rc<ManualClock>,
    controller: ActionController,
}

#[derive(Default)]
struct Options {
    capture_fails: bool,
    input_fail_code: Option<u32>,
    archive_fails: bool,
    initial_text: &'static str,
}

fn harness(
    replies: Vec<Result<ProposedAction, DecisionError>>,
    options: Options,
) -> Result<Harness, ControllerError> {
    let record: Shared = Rc::default();
    let clock = Rc::new(ManualClock::new());

    let parts = ControllerParts {
        frames: Box::new(Screen {
            record: record.clone(),
            fail: options.capture_fails,
        }),
        input: Box::new(Input {
            record: record.clone(),
            fail_code: options.input_fail_code,
        }),
        glyphs: Box::new(Glyphs),
        surface: Box::new(Surface {
            record: record.clone(),
        }),
        decision: Box::new(Script {
            record: record.clone(),
            replies: replies.into(),
        }),
        archive: Some(Box::new(Archive {
            record: record.clone(),
            fail: options.archive_fails,
        })),
        clock: clock.clone(),
    };
    let config = ControllerConfig {
        perception_width: 32,
        perception_height: 18,
        initial_hud_text: options.initial_text.into(),
        ..Default::default()
    };

    let controller = ActionController::new(parts, config)?;
    Ok(Harness {
        record,
        clock,
        controller,
    })
}

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

// ── End to end ───────────────────────────────────────────────────

#[test]
fn click_observe_done_sequence() {
    let mut h = harness(
        vec![
            click(500.0, 300.0, "open menu"),
            act("observe", "wait"),
            act("done", "finished"),
        ],
        Options::default(),
    )
    .unwrap();

    assert_eq!(h.controller.hud_text(), "");
    assert_eq!(h.controller.step().unwrap(), StepOutcome::Continue);
    assert_eq!(h.controller.hud_text(), "open menu");
    assert_eq!(h.controller.step().unwrap(), StepOutcome::Continue);
    assert_eq!(h.controller.hud_text(), "wait");
    assert_eq!(
        h.controller.step().unwrap(),
        StepOutcome::Finished("finished".into())
    );
    assert_eq!(h.controller.hud_text(), "wait");

    let record = h.record.borrow();
    assert_eq!(
        record.batches,
        vec![vec![
            InputEvent::MoveAbsolute { x: 32767, y: 19660 },
            InputEvent::PrimaryDown,
            InputEvent::PrimaryUp,
        ]]
    );
    // Perception captures include the cursor, settle samples do not.
    assert_eq!(record.captures, vec![true, false, false, false, true, true]);
    assert_eq!(record.archived, vec![1, 2, 3]);
    // Initial render plus one per non-final step.
    assert_eq!(record.presented.len(), 3);
    assert!(record.presented[0].is_transparent());
    assert!(!record.presented[1].is_transparent());

    assert_eq!(
        h.clock.sleeps(),
        vec![
            ms(50),   // initial HUD z-order pulses
            ms(50),
            ms(850),  // after click
            ms(100),  // settle polling
            ms(100),
            ms(50),   // HUD pulses
            ms(50),
            ms(1500), // after observe, no settle
            ms(50),
            ms(50),
        ]
    );
}

#[test]
fn decision_sees_png_at_perception_size() {
    let mut h = harness(vec![act("done", "ok")], Options::default()).unwrap();
    h.controller.step().unwrap();

    let record = h.record.borrow();
    let img = image::load_from_memory_with_format(&record.decisions[0], image::ImageFormat::Png)
        .unwrap()
        .to_rgb8();
    assert_eq!(img.dimensions(), (32, 18));
    // BGRA (40, 80, 120) arrives as RGB (120, 80, 40).
    assert_eq!(img.get_pixel(5, 5).0, [120, 80, 40]);
}

#[test]
fn run_reports_done() {
    let mut h = harness(
        vec![act("observe", "look"), act("done", "all good")],
        Options::default(),
    )
    .unwrap();
    let stop = AtomicBool::new(false);
    assert_eq!(
        h.controller.run(&stop).unwrap(),
        Completion::Done("all good".into())
    );
    assert_eq!(h.controller.iteration(), 2);
}

#[test]
fn stop_flag_interrupts_before_next_iteration() {
    let mut h = harness(vec![act("observe", "look")], Options::default()).unwrap();
    let stop = AtomicBool::new(true);
    assert_eq!(h.controller.run(&stop).unwrap(), Completion::Interrupted);
    assert!(h.record.borrow().captures.is_empty());
}

// ── Decision failures ────────────────────────────────────────────

#[test]
fn three_consecutive_failures_are_fatal() {
    let mut h = harness(
        vec![refused(), refused(), refused()],
        Options {
            initial_text: "starting",
            ..Default::default()
        },
    )
    .unwrap();
    let stop = AtomicBool::new(false);

    let err = h.controller.run(&stop).unwrap_err();
    assert!(matches!(
        err,
        ControllerError::FailureBudgetExhausted {
            failures: 3,
            last: DecisionError::Unreachable(_)
        }
    ));
    // HUD never changed.
    assert_eq!(h.controller.hud_text(), "starting");
    assert_eq!(h.record.borrow().presented.len(), 1);
    // Two retry waits; the third failure ends the loop at once.
    let retries = h.clock.sleeps().iter().filter(|d| **d == ms(2000)).count();
    assert_eq!(retries, 2);
}

#[test]
fn success_resets_failure_counter() {
    let mut h = harness(
        vec![
            refused(),
            refused(),
            act("observe", "look"),
            refused(),
            refused(),
            act("done", "ok"),
        ],
        Options::default(),
    )
    .unwrap();

    h.controller.step().unwrap();
    h.controller.step().unwrap();
    assert_eq!(h.controller.consecutive_failures(), 2);
    h.controller.step().unwrap();
    assert_eq!(h.controller.consecutive_failures(), 0);

    let stop = AtomicBool::new(false);
    assert_eq!(
        h.controller.run(&stop).unwrap(),
        Completion::Done("ok".into())
    );
    // Failed iterations are archived too.
    assert_eq!(h.record.borrow().archived, vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn missing_reason_counts_as_failure() {
    let blank = || act("click", "  ");
    let mut h = harness(vec![blank(), blank(), blank()], Options::default()).unwrap();
    let stop = AtomicBool::new(false);
    let err = h.controller.run(&stop).unwrap_err();
    assert!(matches!(
        err,
        ControllerError::FailureBudgetExhausted {
            last: DecisionError::MissingReason("click"),
            ..
        }
    ));
    assert!(h.record.borrow().batches.is_empty());
}

#[test]
fn out_of_range_click_is_clamped_not_rejected() {
    let mut h = harness(
        vec![click(-50.0, 1500.0, "corner")],
        Options::default(),
    )
    .unwrap();
    h.controller.step().unwrap();
    assert_eq!(h.controller.consecutive_failures(), 0);
    assert_eq!(
        h.record.borrow().batches[0][0],
        InputEvent::MoveAbsolute { x: 0, y: 65535 }
    );
}

// ── Other failures ───────────────────────────────────────────────

#[test]
fn capture_failure_is_fatal() {
    let mut h = harness(
        vec![act("observe", "look")],
        Options {
            capture_fails: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert!(matches!(
        h.controller.step(),
        Err(ControllerError::Capture(CaptureError { op: "BitBlt", .. }))
    ));
}

#[test]
fn blocked_input_is_fatal() {
    let mut h = harness(
        vec![click(10.0, 10.0, "press")],
        Options {
            input_fail_code: Some(5),
            ..Default::default()
        },
    )
    .unwrap();
    assert!(matches!(
        h.controller.step(),
        Err(ControllerError::Injection(InjectionError { code: 5, .. }))
    ));
}

#[test]
fn other_injection_failures_keep_looping() {
    let mut h = harness(
        vec![typed("hello", "enter text"), act("done", "ok")],
        Options {
            input_fail_code: Some(87),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(h.controller.step().unwrap(), StepOutcome::Continue);
    // The failed action's reason is not shown.
    assert_eq!(h.controller.hud_text(), "");
    assert_eq!(
        h.controller.step().unwrap(),
        StepOutcome::Finished("ok".into())
    );
}

#[test]
fn archive_errors_are_not_fatal() {
    let mut h = harness(
        vec![act("done", "ok")],
        Options {
            archive_fails: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(
        h.controller.step().unwrap(),
        StepOutcome::Finished("ok".into())
    );
}
