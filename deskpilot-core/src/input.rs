//! Pointer, keyboard and wheel event synthesis.
//!
//! [`InputInjector`] turns high-level actions into batches of
//! platform-neutral [`InputEvent`]s; an [`InputBackend`] delivers them.
//! The Windows backend uses `SendInput`.
//!
//! # Platform
//!
//! [`SendInputBackend`] is Windows-only. On other platforms the type is
//! defined but construction fails at runtime.

use crate::error::InjectionError;

/// Size of the normalized coordinate grid on each axis.
pub const NORMALIZED_MAX: f64 = 1000.0;

/// Upper bound of the absolute pointer coordinate space.
pub const ABSOLUTE_MAX: i64 = 65_535;

/// One wheel notch.
pub const WHEEL_DELTA: i32 = 120;

/// `VK_RETURN`
const VK_ENTER: u16 = 0x0D;
/// `VK_TAB`
const VK_TAB: u16 = 0x09;

// ── Events ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    /// Virtual-key code of a layout-independent key (Enter, Tab).
    Virtual(u16),
    /// One UTF-16 code unit injected directly.
    Unicode(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Move to absolute coordinates in `0..=65535`.
    MoveAbsolute { x: i32, y: i32 },
    PrimaryDown,
    PrimaryUp,
    Key { code: KeyCode, down: bool },
    /// Positive is away from the user (scroll up).
    Wheel { delta: i32 },
}

/// Delivers event batches to the OS input stream.
pub trait InputBackend {
    /// Primary display size in physical pixels.
    fn screen_size(&self) -> (u32, u32);

    /// Deliver `events` in order as one batch.
    fn send(&mut self, events: &[InputEvent]) -> Result<(), InjectionError>;
}

impl<B: InputBackend + ?Sized> InputBackend for Box<B> {
    fn screen_size(&self) -> (u32, u32) {
        (**self).screen_size()
    }

    fn send(&mut self, events: &[InputEvent]) -> Result<(), InjectionError> {
        (**self).send(events)
    }
}

// ── Coordinate mapping ───────────────────────────────────────────

/// Clamp a normalized coordinate into `[0, 1000]`; NaN maps to 0.
pub fn clamp_normalized(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, NORMALIZED_MAX)
    }
}

/// Normalized coordinate to a desktop pixel along an axis of `extent` pixels.
pub fn normalized_to_pixel(v: f64, extent: u32) -> i64 {
    (clamp_normalized(v) * extent as f64 / NORMALIZED_MAX).floor() as i64
}

/// Desktop pixel to the absolute pointer space.
pub fn pixel_to_absolute(px: i64, extent: u32) -> i32 {
    if extent == 0 {
        return 0;
    }
    (px * ABSOLUTE_MAX / extent as i64) as i32
}

/// Round `dy` toward zero to whole notches, keeping at least one.
///
/// Returns `None` for zero.
pub fn quantize_wheel(dy: i32) -> Option<i32> {
    if dy == 0 {
        return None;
    }
    let notches = (dy.unsigned_abs() / WHEEL_DELTA as u32).max(1) as i32;
    Some(notches * WHEEL_DELTA * dy.signum())
}

// ── InputInjector ────────────────────────────────────────────────

/// Stateless input synthesizer over an [`InputBackend`].
///
/// A failed batch may have been partially delivered; the error reports
/// how many events went through and nothing is rolled back.
pub struct InputInjector<B: InputBackend> {
    backend: B,
}

impl<B: InputBackend> InputInjector<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Move to the normalized point and click the primary button.
    pub fn move_and_click(&mut self, x: f64, y: f64) -> Result<(), InjectionError> {
        let (sw, sh) = self.backend.screen_size();
        let ax = pixel_to_absolute(normalized_to_pixel(x, sw), sw);
        let ay = pixel_to_absolute(normalized_to_pixel(y, sh), sh);
        tracing::debug!(x, y, ax, ay, "click");

        self.backend.send(&[
            InputEvent::MoveAbsolute { x: ax, y: ay },
            InputEvent::PrimaryDown,
            InputEvent::PrimaryUp,
        ])
    }

    /// Type `text` as key down/up pairs, one batch for the whole string.
    ///
    /// Printable characters go through the Unicode path so the result does
    /// not depend on CapsLock or the active layout. Line breaks and tabs
    /// press Enter and Tab; `\r\n` is a single Enter.
    pub fn type_text(&mut self, text: &str) -> Result<(), InjectionError> {
        if text.is_empty() {
            return Ok(());
        }

        let mut events = Vec::with_capacity(text.len() * 2);
        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '\r' && chars.peek() == Some(&'\n') {
                continue;
            }
            match control_key(ch) {
                Some(vk) => push_key(&mut events, KeyCode::Virtual(vk)),
                None => {
                    let mut units = [0u16; 2];
                    for &unit in ch.encode_utf16(&mut units).iter() {
                        push_key(&mut events, KeyCode::Unicode(unit));
                    }
                }
            }
        }
        tracing::debug!(chars = text.chars().count(), events = events.len(), "type");
        self.backend.send(&events)
    }

    /// Scroll by `dy` wheel units; zero is a no-op.
    pub fn scroll(&mut self, dy: i32) -> Result<(), InjectionError> {
        let Some(delta) = quantize_wheel(dy) else {
            return Ok(());
        };
        tracing::debug!(dy, delta, "scroll");
        self.backend.send(&[InputEvent::Wheel { delta }])
    }
}

fn control_key(ch: char) -> Option<u16> {
    match ch {
        '\n' | '\r' => Some(VK_ENTER),
        '\t' => Some(VK_TAB),
        _ => None,
    }
}

fn push_key(events: &mut Vec<InputEvent>, code: KeyCode) {
    events.push(InputEvent::Key { code, down: true });
    events.push(InputEvent::Key { code, down: false });
}

// ── Windows backend ──────────────────────────────────────────────

/// `SendInput`-based backend for the interactive desktop session.
///
/// Injection into windows of a higher integrity level is blocked by the
/// OS and surfaces as an access-denied [`InjectionError`].
#[derive(Debug)]
pub struct SendInputBackend {
    _private: (),
}

#[cfg(target_os = "windows")]
mod platform {
    use super::*;
    use windows::Win32::Foundation::GetLastError;
    use windows::Win32::UI::Input::KeyboardAndMouse::*;

    impl SendInputBackend {
        pub fn new() -> Result<Self, InjectionError> {
            Ok(Self { _private: () })
        }
    }

    fn mouse(dx: i32, dy: i32, data: u32, flags: MOUSE_EVENT_FLAGS) -> INPUT {
        INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx,
                    dy,
                    mouseData: data,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        }
    }

    fn key(vk: u16, scan: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
        INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(vk),
                    wScan: scan,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        }
    }

    fn to_input(event: &InputEvent) -> INPUT {
        match *event {
            InputEvent::MoveAbsolute { x, y } => {
                mouse(x, y, 0, MOUSEEVENTF_MOVE | MOUSEEVENTF_ABSOLUTE)
            }
            InputEvent::PrimaryDown => mouse(0, 0, 0, MOUSEEVENTF_LEFTDOWN),
            InputEvent::PrimaryUp => mouse(0, 0, 0, MOUSEEVENTF_LEFTUP),
            // mouseData carries the signed delta reinterpreted as u32.
            InputEvent::Wheel { delta } => mouse(0, 0, delta as u32, MOUSEEVENTF_WHEEL),
            InputEvent::Key { code, down } => {
                let up = if down {
                    KEYBD_EVENT_FLAGS(0)
                } else {
                    KEYEVENTF_KEYUP
                };
                match code {
                    KeyCode::Virtual(vk) => key(vk, 0, up),
                    KeyCode::Unicode(unit) => key(0, unit, KEYEVENTF_UNICODE | up),
                }
            }
        }
    }

    impl InputBackend for SendInputBackend {
        fn screen_size(&self) -> (u32, u32) {
            crate::screen::screen_size()
        }

        fn send(&mut self, events: &[InputEvent]) -> Result<(), InjectionError> {
            if events.is_empty() {
                return Ok(());
            }
            let inputs: Vec<INPUT> = events.iter().map(to_input).collect();
            let sent = unsafe { SendInput(&inputs, std::mem::size_of::<INPUT>() as i32) } as usize;
            if sent != inputs.len() {
                return Err(InjectionError {
                    code: unsafe { GetLastError().0 },
                    delivered: sent,
                    requested: inputs.len(),
                });
            }
            Ok(())
        }
    }
}

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
impl SendInputBackend {
    /// Input injection is only available on Windows.
    pub fn new() -> Result<Self, InjectionError> {
        Err(InjectionError::unsupported(0))
    }
}

#[cfg(not(target_os = "windows"))]
impl InputBackend for SendInputBackend {
    fn screen_size(&self) -> (u32, u32) {
        (0, 0)
    }

    fn send(&mut self, events: &[InputEvent]) -> Result<(), InjectionError> {
        Err(InjectionError::unsupported(events.len()))
    }
}

// ── Tests ────────────────────────────────────────────────────────
