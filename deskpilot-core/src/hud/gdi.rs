//! GDI font rasterizer and per-pixel-alpha layered window.
//!
//! # Platform
//!
//! Windows-only. On other platforms both types are defined but
//! construction fails with [`OverlayError::Unsupported`].

use crate::error::OverlayError;
use crate::hud::canvas::{Canvas, GlyphMask};
use crate::hud::layout::TextMeasure;
use crate::hud::{GlyphSource, HudStyle, OverlaySurface};

#[cfg(target_os = "windows")]
pub use platform::{GdiGlyphs, LayeredWindow};

#[cfg(target_os = "windows")]
mod platform {
    use super::*;
    use windows::Win32::Foundation::*;
    use windows::Win32::Graphics::Gdi::*;
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::WindowsAndMessaging::*;
    use windows::core::PCWSTR;

    const CLASS_NAME: &str = "DeskpilotHudWindow";
    const ERROR_CLASS_ALREADY_EXISTS: u32 = 1410;

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    fn last_error() -> u32 {
        unsafe { GetLastError().0 }
    }

    fn os_code(e: &windows::core::Error) -> u32 {
        (e.code().0 as u32) & 0xFFFF
    }

    /// Top-down 32-bit DIB selected into its own memory DC.
    struct Dib {
        dc: HDC,
        bitmap: HBITMAP,
        previous: HGDIOBJ,
        bits: *mut u8,
        width: u32,
        height: u32,
    }

    impl Dib {
        fn new(width: u32, height: u32) -> Result<Self, OverlayError> {
            let dc = unsafe { CreateCompatibleDC(HDC::default()) };
            if dc.is_invalid() {
                return Err(OverlayError::Create {
                    op: "CreateCompatibleDC",
                    code: last_error(),
                });
            }

            let bmi = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width.max(1) as i32,
                    biHeight: -(height.max(1) as i32),
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let mut bits: *mut core::ffi::c_void = std::ptr::null_mut();
            let bitmap = match unsafe {
                CreateDIBSection(dc, &bmi, DIB_RGB_COLORS, &mut bits, HANDLE::default(), 0)
            } {
                Ok(b) if !bits.is_null() => b,
                Ok(b) => {
                    unsafe {
                        let _ = DeleteObject(b);
                        let _ = DeleteDC(dc);
                    }
                    return Err(OverlayError::Create {
                        op: "CreateDIBSection",
                        code: last_error(),
                    });
                }
                Err(e) => {
                    unsafe {
                        let _ = DeleteDC(dc);
                    }
                    return Err(OverlayError::Create {
                        op: "CreateDIBSection",
                        code: os_code(&e),
                    });
                }
            };
            let previous = unsafe { SelectObject(dc, bitmap) };

            Ok(Self {
                dc,
                bitmap,
                previous,
                bits: bits as *mut u8,
                width,
                height,
            })
        }

        fn len(&self) -> usize {
            self.width.max(1) as usize * self.height.max(1) as usize * 4
        }

        fn pixels(&self) -> &[u8] {
            unsafe { std::slice::from_raw_parts(self.bits, self.len()) }
        }

        fn pixels_mut(&mut self) -> &mut [u8] {
            unsafe { std::slice::from_raw_parts_mut(self.bits, self.len()) }
        }
    }

    impl Drop for Dib {
        fn drop(&mut self) {
            unsafe {
                SelectObject(self.dc, self.previous);
                let _ = DeleteObject(self.bitmap);
                let _ = DeleteDC(self.dc);
            }
        }
    }

    // ── GdiGlyphs ────────────────────────────────────────────────

    /// Renders text with an antialiased GDI font.
    ///
    /// Coverage is read back from white-on-black rendering into a scratch
    /// DIB, which is regrown when a wider line comes along.
    pub struct GdiGlyphs {
        font: HFONT,
        measure_dc: HDC,
        previous_font: HGDIOBJ,
        line_height: u32,
    }

    impl GdiGlyphs {
        pub fn new(style: &HudStyle) -> Result<Self, OverlayError> {
            let mut face = [0u16; 32];
            for (dst, src) in face.iter_mut().zip(style.font_name.encode_utf16().take(31)) {
                *dst = src;
            }
            let logfont = LOGFONTW {
                // Negative height selects by character height in pixels.
                lfHeight: -(style.font_px as i32),
                lfWeight: style.font_weight as i32,
                lfCharSet: DEFAULT_CHARSET,
                lfQuality: ANTIALIASED_QUALITY,
                lfFaceName: face,
                ..Default::default()
            };
            let font = unsafe { CreateFontIndirectW(&logfont) };
            if font.is_invalid() {
                return Err(OverlayError::Create {
                    op: "CreateFontIndirectW",
                    code: last_error(),
                });
            }

            let measure_dc = unsafe { CreateCompatibleDC(HDC::default()) };
            if measure_dc.is_invalid() {
                unsafe {
                    let _ = DeleteObject(font);
                }
                return Err(OverlayError::Create {
                    op: "CreateCompatibleDC",
                    code: last_error(),
                });
            }
            let previous_font = unsafe { SelectObject(measure_dc, font) };

            Ok(Self {
                font,
                measure_dc,
                previous_font,
                line_height: style.line_height(),
            })
        }

        fn extent(&self, text: &[u16]) -> (u32, u32) {
            if text.is_empty() {
                return (0, 0);
            }
            let mut size = SIZE::default();
            if unsafe { GetTextExtentPoint32W(self.measure_dc, text, &mut size) }.as_bool() {
                (size.cx.max(0) as u32, size.cy.max(0) as u32)
            } else {
                (0, 0)
            }
        }
    }

    impl TextMeasure for GdiGlyphs {
        fn text_width(&self, text: &str) -> u32 {
            let units: Vec<u16> = text.encode_utf16().collect();
            self.extent(&units).0
        }
    }

    impl GlyphSource for GdiGlyphs {
        fn rasterize(&mut self, text: &str) -> Result<GlyphMask, OverlayError> {
            let units: Vec<u16> = text.encode_utf16().collect();
            let (width, height) = self.extent(&units);
            if width == 0 {
                return Ok(GlyphMask::empty());
            }
            let height = height.max(self.line_height);

            let dib = Dib::new(width, height)?;
            unsafe {
                let previous = SelectObject(dib.dc, self.font);
                SetBkMode(dib.dc, TRANSPARENT);
                SetTextColor(dib.dc, COLORREF(0x00FF_FFFF));
                let _ = TextOutW(dib.dc, 0, 0, &units);
                let _ = GdiFlush();
                SelectObject(dib.dc, previous);
            }

            // Antialiased white text: any channel carries the coverage.
            let coverage = dib
                .pixels()
                .chunks_exact(4)
                .take(width as usize * height as usize)
                .map(|px| px[0].max(px[1]).max(px[2]))
                .collect();

            Ok(GlyphMask {
                width,
                height,
                coverage,
            })
        }
    }

    impl Drop for GdiGlyphs {
        fn drop(&mut self) {
            unsafe {
                SelectObject(self.measure_dc, self.previous_font);
                let _ = DeleteDC(self.measure_dc);
                let _ = DeleteObject(self.font);
            }
        }
    }

    // ── LayeredWindow ────────────────────────────────────────────

    unsafe extern "system" fn wndproc(hwnd: HWND, msg: u32, wp: WPARAM, lp: LPARAM) -> LRESULT {
        unsafe { DefWindowProcW(hwnd, msg, wp, lp) }
    }

    /// Click-through, top-most, non-activating popup covering the
    /// primary display, updated with `UpdateLayeredWindow`.
    ///
    /// The window has thread affinity: create, update and drop it on the
    /// same thread. Destroyed on drop.
    pub struct LayeredWindow {
        hwnd: HWND,
        dib: Option<Dib>,
        width: u32,
        height: u32,
        // Dropped after the window is destroyed.
        _class: WindowClass,
    }

    /// Registered window class, unregistered on drop.
    ///
    /// Unregistering fails harmlessly while another window of the class
    /// is still alive.
    struct WindowClass {
        instance: HINSTANCE,
        name: Vec<u16>,
    }

    impl WindowClass {
        fn register() -> Result<Self, OverlayError> {
            let module = unsafe { GetModuleHandleW(PCWSTR::null()) }.map_err(|e| {
                OverlayError::Create {
                    op: "GetModuleHandleW",
                    code: os_code(&e),
                }
            })?;
            let instance = HINSTANCE(module.0);
            let name = wide(CLASS_NAME);

            let wc = WNDCLASSW {
                lpfnWndProc: Some(wndproc),
                hInstance: instance,
                lpszClassName: PCWSTR(name.as_ptr()),
                ..Default::default()
            };
            if unsafe { RegisterClassW(&wc) } == 0 {
                let code = last_error();
                if code != ERROR_CLASS_ALREADY_EXISTS {
                    return Err(OverlayError::Create {
                        op: "RegisterClassW",
                        code,
                    });
                }
            }
            Ok(Self { instance, name })
        }

        fn name(&self) -> PCWSTR {
            PCWSTR(self.name.as_ptr())
        }
    }

    impl Drop for WindowClass {
        fn drop(&mut self) {
            unsafe {
                let _ = UnregisterClassW(self.name(), self.instance);
            }
        }
    }

    impl LayeredWindow {
        /// Create the overlay sized to the primary display.
        pub fn for_primary_display() -> Result<Self, OverlayError> {
            let (w, h) = crate::screen::screen_size();
            Self::new(w, h)
        }

        pub fn new(width: u32, height: u32) -> Result<Self, OverlayError> {
            // Unregistered again by its guard if window creation fails.
            let class = WindowClass::register()?;

            let title = wide("deskpilot");
            let ex_style = WS_EX_LAYERED
                | WS_EX_TOPMOST
                | WS_EX_TRANSPARENT
                | WS_EX_NOACTIVATE
                | WS_EX_TOOLWINDOW;
            let hwnd = unsafe {
                CreateWindowExW(
                    ex_style,
                    class.name(),
                    PCWSTR(title.as_ptr()),
                    WS_POPUP,
                    0,
                    0,
                    width as i32,
                    height as i32,
                    None,
                    None,
                    class.instance,
                    None,
                )
            }
            .map_err(|e| OverlayError::Create {
                op: "CreateWindowExW",
                code: os_code(&e),
            })?;

            // From here on Drop cleans up whatever exists.
            let mut window = Self {
                hwnd,
                dib: None,
                width,
                height,
                _class: class,
            };
            window.dib = Some(Dib::new(width, height)?);
            unsafe {
                let _ = ShowWindow(hwnd, SW_SHOWNOACTIVATE);
            }
            Ok(window)
        }
    }

    impl OverlaySurface for LayeredWindow {
        fn size(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn present(&mut self, canvas: &Canvas) -> Result<(), OverlayError> {
            if (canvas.width(), canvas.height()) != (self.width, self.height) {
                return Err(OverlayError::SizeMismatch {
                    canvas: (canvas.width(), canvas.height()),
                    surface: (self.width, self.height),
                });
            }
            let Some(dib) = self.dib.as_mut() else {
                return Err(OverlayError::Update(0));
            };
            let n = canvas.data().len().min(dib.len());
            dib.pixels_mut()[..n].copy_from_slice(&canvas.data()[..n]);

            let origin = POINT { x: 0, y: 0 };
            let size = SIZE {
                cx: self.width as i32,
                cy: self.height as i32,
            };
            let blend = BLENDFUNCTION {
                BlendOp: AC_SRC_OVER as u8,
                BlendFlags: 0,
                SourceConstantAlpha: 255,
                AlphaFormat: AC_SRC_ALPHA as u8,
            };
            unsafe {
                let _ = GdiFlush();
                UpdateLayeredWindow(
                    self.hwnd,
                    HDC::default(),
                    Some(&origin),
                    Some(&size),
                    dib.dc,
                    Some(&origin),
                    COLORREF(0),
                    Some(&blend),
                    ULW_ALPHA,
                )
            }
            .map_err(|e| OverlayError::Update(os_code(&e)))
        }

        fn raise(&mut self) -> Result<(), OverlayError> {
            unsafe {
                SetWindowPos(
                    self.hwnd,
                    HWND_TOPMOST,
                    0,
                    0,
                    0,
                    0,
                    SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE | SWP_SHOWWINDOW,
                )
            }
            .map_err(|e| OverlayError::ZOrder(os_code(&e)))
        }
    }

    impl Drop for LayeredWindow {
        fn drop(&mut self) {
            self.dib = None;
            unsafe {
                let _ = DestroyWindow(self.hwnd);
            }
        }
    }

}

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
pub struct GdiGlyphs {
    _private: (),
}

#[cfg(not(target_os = "windows"))]
impl GdiGlyphs {
    /// GDI text rendering is only available on Windows.
    pub fn new(_style: &HudStyle) -> Result<Self, OverlayError> {
        Err(OverlayError::Unsupported)
    }
}

#[cfg(not(target_os = "windows"))]
impl TextMeasure for GdiGlyphs {
    fn text_width(&self, _text: &str) -> u32 {
        0
    }
}

#[cfg(not(target_os = "windows"))]
impl GlyphSource for GdiGlyphs {
    fn rasterize(&mut self, _text: &str) -> Result<GlyphMask, OverlayError> {
        Err(OverlayError::Unsupported)
    }
}

#[cfg(not(target_os = "windows"))]
pub struct LayeredWindow {
    _private: (),
}

#[cfg(not(target_os = "windows"))]
impl LayeredWindow {
    /// Layered windows are only available on Windows.
    pub fn for_primary_display() -> Result<Self, OverlayError> {
        Err(OverlayError::Unsupported)
    }

    pub fn new(_width: u32, _height: u32) -> Result<Self, OverlayError> {
        Err(OverlayError::Unsupported)
    }
}

#[cfg(not(target_os = "windows"))]
impl OverlaySurface for LayeredWindow {
    fn size(&self) -> (u32, u32) {
        (0, 0)
    }

    fn present(&mut self, _canvas: &Canvas) -> Result<(), OverlayError> {
        Err(OverlayError::Unsupported)
    }

    fn raise(&mut self) -> Result<(), OverlayError> {
        Err(OverlayError::Unsupported)
    }
}
