//! Always-on-top status overlay.
//!
//! [`HudCompositor`] lays out the status text, rasterizes it through a
//! [`GlyphSource`], composites an outlined version onto a premultiplied
//! [`Canvas`] and hands the finished bitmap to an [`OverlaySurface`] in
//! one update.
//!
//! | Module    | Purpose                                          |
//! |-----------|--------------------------------------------------|
//! | `layout`  | Paragraph numbering and word wrapping            |
//! | `canvas`  | BGRA bitmap and source-over blending             |
//! | `gdi`     | Windows font rasterizer and layered window       |

pub mod canvas;
pub mod gdi;
pub mod layout;

use std::time::Duration;

use crate::clock::Clock;
use crate::error::OverlayError;

pub use canvas::{Canvas, GlyphMask, Rgb};
pub use gdi::{GdiGlyphs, LayeredWindow};
pub use layout::{TextMeasure, layout, wrap_width};

/// Rasterizes single lines of text in the HUD font.
pub trait GlyphSource: TextMeasure {
    /// Coverage mask for `text`, with the top of the cell at row 0.
    fn rasterize(&mut self, text: &str) -> Result<GlyphMask, OverlayError>;
}

/// The OS-level surface the canvas is shown on.
pub trait OverlaySurface {
    fn size(&self) -> (u32, u32);

    /// Replace the visible contents with `canvas` atomically.
    fn present(&mut self, canvas: &Canvas) -> Result<(), OverlayError>;

    /// Put the surface back on top of the z-order.
    fn raise(&mut self) -> Result<(), OverlayError>;
}

impl<T: TextMeasure + ?Sized> TextMeasure for Box<T> {
    fn text_width(&self, text: &str) -> u32 {
        (**self).text_width(text)
    }
}

impl<T: GlyphSource + ?Sized> GlyphSource for Box<T> {
    fn rasterize(&mut self, text: &str) -> Result<GlyphMask, OverlayError> {
        (**self).rasterize(text)
    }
}

impl<T: OverlaySurface + ?Sized> OverlaySurface for Box<T> {
    fn size(&self) -> (u32, u32) {
        (**self).size()
    }

    fn present(&mut self, canvas: &Canvas) -> Result<(), OverlayError> {
        (**self).present(canvas)
    }

    fn raise(&mut self) -> Result<(), OverlayError> {
        (**self).raise()
    }
}

/// Visual parameters of the HUD.
#[derive(Debug, Clone, PartialEq)]
pub struct HudStyle {
    pub font_name: String,
    pub font_px: u32,
    pub font_weight: u32,
    pub line_spacing: u32,
    pub margin: u32,
    pub max_width: u32,
    pub max_lines: usize,
    pub outline_px: u32,
    pub text_color: Rgb,
    pub outline_color: Rgb,
    pub reassert_pulses: u32,
    pub reassert_pause: Duration,
}

impl Default for HudStyle {
    fn default() -> Self {
        Self {
            font_name: "Segoe UI".into(),
            font_px: 18,
            font_weight: 400,
            line_spacing: 2,
            margin: 10,
            max_width: 700,
            max_lines: 8,
            outline_px: 1,
            text_color: Rgb::WHITE,
            outline_color: Rgb::BLACK,
            reassert_pulses: 2,
            reassert_pause: Duration::from_millis(50),
        }
    }
}

impl HudStyle {
    pub fn line_height(&self) -> u32 {
        self.font_px + self.line_spacing
    }

    /// Offsets of the outline pass: the eight compass directions.
    fn outline_offsets(&self) -> Vec<(i32, i32)> {
        let o = self.outline_px as i32;
        if o == 0 {
            return Vec::new();
        }
        vec![
            (-o, -o),
            (0, -o),
            (o, -o),
            (-o, 0),
            (o, 0),
            (-o, o),
            (0, o),
            (o, o),
        ]
    }
}

// ── HudCompositor ────────────────────────────────────────────────

/// Owns the overlay surface for the lifetime of the loop.
///
/// The last rendered text and its canvas are cached; rendering the same
/// text again re-presents the cached bitmap unchanged.
pub struct HudCompositor<G: GlyphSource, S: OverlaySurface, C: Clock> {
    glyphs: G,
    surface: S,
    clock: C,
    style: HudStyle,
    cached: Option<(String, Canvas)>,
}

impl<G: GlyphSource, S: OverlaySurface, C: Clock> HudCompositor<G, S, C> {
    pub fn new(glyphs: G, surface: S, clock: C, style: HudStyle) -> Self {
        Self {
            glyphs,
            surface,
            clock,
            style,
            cached: None,
        }
    }

    pub fn style(&self) -> &HudStyle {
        &self.style
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Canvas of the most recent render.
    pub fn last_canvas(&self) -> Option<&Canvas> {
        self.cached.as_ref().map(|(_, c)| c)
    }

    /// Show `text`, then re-assert top-most ordering.
    pub fn render(&mut self, text: &str) -> Result<(), OverlayError> {
        let hit = matches!(&self.cached, Some((cached, _)) if cached == text);
        if !hit {
            let canvas = self.compose(text)?;
            self.cached = Some((text.to_owned(), canvas));
        }

        if let Some((_, canvas)) = &self.cached {
            self.surface.present(canvas)?;
        }
        self.reassert_topmost();
        Ok(())
    }

    fn compose(&mut self, text: &str) -> Result<Canvas, OverlayError> {
        let (w, h) = self.surface.size();
        let mut canvas = Canvas::new(w, h);

        let width = wrap_width(w, self.style.max_width, self.style.margin);
        let lines = layout(text, self.style.max_lines, width, &self.glyphs);
        let offsets = self.style.outline_offsets();

        let x = self.style.margin as i32;
        let mut y = self.style.margin as i32;
        for line in &lines {
            let mask = self.glyphs.rasterize(line)?;
            for &(dx, dy) in &offsets {
                canvas.blend_mask(&mask, x + dx, y + dy, self.style.outline_color);
            }
            canvas.blend_mask(&mask, x, y, self.style.text_color);
            y += self.style.line_height() as i32;
        }

        tracing::debug!(lines = lines.len(), "hud composed");
        Ok(canvas)
    }

    /// Failures are logged and end the pulse sequence early.
    fn reassert_topmost(&mut self) {
        for _ in 0..self.style.reassert_pulses {
            if let Err(e) = self.surface.raise() {
                tracing::warn!("overlay z-order: {e}");
                break;
            }
            self.clock.sleep(self.style.reassert_pause);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
