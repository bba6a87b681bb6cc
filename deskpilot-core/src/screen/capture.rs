//! GDI screen capture of the primary display, cursor included on request.
//!
//! Every device context and bitmap is acquired and released inside a
//! single [`FrameSource::capture`] call. Release happens in guard `Drop`
//! impls so early returns cannot leak handles.
//!
//! # Platform
//!
//! This module is **Windows-only**. On other platforms the types are
//! still defined but construction fails at runtime.

use crate::error::CaptureError;
use crate::screen::types::FrameBuffer;

/// Produces full-resolution snapshots of the primary display.
pub trait FrameSource {
    /// Capture the whole primary display as `Bgra8`.
    fn capture(&mut self, include_cursor: bool) -> Result<FrameBuffer, CaptureError>;
}

/// GDI `BitBlt`-based capturer.
///
/// Holds no OS handles between calls; the display size is re-read on
/// every capture so resolution changes are picked up.
#[derive(Debug)]
pub struct GdiCapturer {
    _private: (),
}

// ── Windows implementation ───────────────────────────────────────

#[cfg(target_os = "windows")]
mod platform {
    use super::*;
    use crate::screen::types::PixelFormat;
    use windows::Win32::Foundation::{GetLastError, HANDLE, HWND};
    use windows::Win32::Graphics::Gdi::*;
    use windows::Win32::UI::HiDpi::{
        DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2, SetProcessDpiAwarenessContext,
    };
    use windows::Win32::UI::WindowsAndMessaging::*;

    fn last_error() -> u32 {
        unsafe { GetLastError().0 }
    }

    fn os_code(e: &windows::core::Error) -> u32 {
        // HRESULT_FROM_WIN32 keeps the Win32 code in the low word.
        (e.code().0 as u32) & 0xFFFF
    }

    // ── Scoped handles ───────────────────────────────────────────

    struct ScreenDc(HDC);

    impl ScreenDc {
        fn acquire() -> Result<Self, CaptureError> {
            let hdc = unsafe { GetDC(HWND::default()) };
            if hdc.is_invalid() {
                return Err(CaptureError::new("GetDC", last_error()));
            }
            Ok(Self(hdc))
        }
    }

    impl Drop for ScreenDc {
        fn drop(&mut self) {
            unsafe { ReleaseDC(HWND::default(), self.0) };
        }
    }

    struct MemoryDc(HDC);

    impl MemoryDc {
        fn compatible_with(screen: &ScreenDc) -> Result<Self, CaptureError> {
            let hdc = unsafe { CreateCompatibleDC(screen.0) };
            if hdc.is_invalid() {
                return Err(CaptureError::new("CreateCompatibleDC", last_error()));
            }
            Ok(Self(hdc))
        }
    }

    impl Drop for MemoryDc {
        fn drop(&mut self) {
            let _ = unsafe { DeleteDC(self.0) };
        }
    }

    /// Top-down 32-bit DIB section with CPU-visible bits.
    struct DibSection {
        bitmap: HBITMAP,
        bits: *const u8,
    }

    impl DibSection {
        fn create(dc: &MemoryDc, width: i32, height: i32) -> Result<Self, CaptureError> {
            let bmi = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width,
                    // Negative height = top-down DIB (origin at top-left).
                    biHeight: -height,
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let mut bits: *mut core::ffi::c_void = std::ptr::null_mut();
            let bitmap = unsafe {
                CreateDIBSection(dc.0, &bmi, DIB_RGB_COLORS, &mut bits, HANDLE::default(), 0)
            }
            .map_err(|e| CaptureError::new("CreateDIBSection", os_code(&e)))?;
            if bits.is_null() {
                let _ = unsafe { DeleteObject(bitmap) };
                return Err(CaptureError::new("CreateDIBSection", last_error()));
            }
            Ok(Self {
                bitmap,
                bits: bits as *const u8,
            })
        }
    }

    impl Drop for DibSection {
        fn drop(&mut self) {
            let _ = unsafe { DeleteObject(self.bitmap) };
        }
    }

    /// Restores the DC's previous bitmap so the DIB can be deleted.
    struct Selection {
        dc: HDC,
        previous: HGDIOBJ,
    }

    impl Selection {
        fn select(dc: &MemoryDc, dib: &DibSection) -> Self {
            let previous = unsafe { SelectObject(dc.0, dib.bitmap) };
            Self {
                dc: dc.0,
                previous,
            }
        }
    }

    impl Drop for Selection {
        fn drop(&mut self) {
            unsafe { SelectObject(self.dc, self.previous) };
        }
    }

    // ── Capturer ─────────────────────────────────────────────────

    impl GdiCapturer {
        pub fn new() -> Result<Self, CaptureError> {
            let (w, h) = screen_size();
            if w == 0 || h == 0 {
                return Err(CaptureError::new("GetSystemMetrics", last_error()));
            }
            Ok(Self { _private: () })
        }

        unsafe fn capture_inner(&self, include_cursor: bool) -> Result<FrameBuffer, CaptureError> {
            let (width, height) = screen_size();
            if width == 0 || height == 0 {
                return Err(CaptureError::new("GetSystemMetrics", last_error()));
            }
            let (w, h) = (width as i32, height as i32);

            // Drop order (reverse of declaration) releases selection,
            // bitmap, memory DC, then the screen DC.
            let screen = ScreenDc::acquire()?;
            let mem = MemoryDc::compatible_with(&screen)?;
            let dib = DibSection::create(&mem, w, h)?;
            let _selection = Selection::select(&mem, &dib);

            // CAPTUREBLT includes layered windows such as the HUD.
            unsafe {
                BitBlt(mem.0, 0, 0, w, h, screen.0, 0, 0, ROP_CODE(SRCCOPY.0 | CAPTUREBLT.0))
            }
            .map_err(|e| CaptureError::new("BitBlt", os_code(&e)))?;

            if include_cursor {
                unsafe { draw_cursor(&mem) };
            }

            let _ = unsafe { GdiFlush() };

            let stride = width * 4;
            let len = stride as usize * height as usize;
            let data = unsafe { std::slice::from_raw_parts(dib.bits, len) }.to_vec();

            FrameBuffer::new(width, height, stride, PixelFormat::Bgra8, data)
                .map_err(|_| CaptureError::new("CreateDIBSection", 0))
        }
    }

    impl FrameSource for GdiCapturer {
        fn capture(&mut self, include_cursor: bool) -> Result<FrameBuffer, CaptureError> {
            unsafe { self.capture_inner(include_cursor) }
        }
    }

    /// Composite the visible cursor at its position minus hotspot.
    ///
    /// Best-effort: a hidden cursor or failed query leaves the frame as is.
    unsafe fn draw_cursor(mem: &MemoryDc) {
        let mut info = CURSORINFO {
            cbSize: std::mem::size_of::<CURSORINFO>() as u32,
            ..Default::default()
        };
        if unsafe { GetCursorInfo(&mut info) }.is_err() || (info.flags.0 & CURSOR_SHOWING.0) == 0 {
            return;
        }

        let icon = HICON(info.hCursor.0);
        let mut icon_info = ICONINFO::default();
        if unsafe { GetIconInfo(icon, &mut icon_info) }.is_err() {
            return;
        }

        let x = info.ptScreenPos.x - icon_info.xHotspot as i32;
        let y = info.ptScreenPos.y - icon_info.yHotspot as i32;
        if let Err(e) =
            unsafe { DrawIconEx(mem.0, x, y, icon, 0, 0, 0, HBRUSH::default(), DI_NORMAL) }
        {
            tracing::debug!("DrawIconEx failed: {e}");
        }

        // GetIconInfo hands us ownership of both bitmaps.
        if !icon_info.hbmMask.is_invalid() {
            let _ = unsafe { DeleteObject(icon_info.hbmMask) };
        }
        if !icon_info.hbmColor.is_invalid() {
            let _ = unsafe { DeleteObject(icon_info.hbmColor) };
        }
    }

    /// Primary display size in physical pixels.
    pub fn screen_size() -> (u32, u32) {
        let (w, h) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
        (w.max(0) as u32, h.max(0) as u32)
    }

    /// Opt into per-monitor DPI awareness so metrics, capture and input
    /// all speak physical pixels.
    pub fn enable_dpi_awareness() {
        let per_monitor =
            unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) };
        if per_monitor.is_err() {
            let _ = unsafe { SetProcessDPIAware() };
        }
    }
}

#[cfg(target_os = "windows")]
pub use platform::{enable_dpi_awareness, screen_size};

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
impl GdiCapturer {
    /// GDI capture is only available on Windows.
    pub fn new() -> Result<Self, CaptureError> {
        Err(CaptureError::unsupported())
    }
}

#[cfg(not(target_os = "windows"))]
impl FrameSource for GdiCapturer {
    fn capture(&mut self, _include_cursor: bool) -> Result<FrameBuffer, CaptureError> {
        Err(CaptureError::unsupported())
    }
}

#[cfg(not(target_os = "windows"))]
pub fn screen_size() -> (u32, u32) {
    (0, 0)
}

#[cfg(not(target_os = "windows"))]
pub fn enable_dpi_awareness() {}
