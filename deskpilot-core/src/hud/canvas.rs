//! Premultiplied BGRA compositing target.

/// Opaque 8-bit color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);
}

/// 8-bit coverage mask for one rendered line of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphMask {
    pub width: u32,
    pub height: u32,
    /// Row-major, one byte per pixel.
    pub coverage: Vec<u8>,
}

impl GlyphMask {
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            coverage: Vec::new(),
        }
    }
}

/// Per-pixel-alpha bitmap in premultiplied BGRA, top-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Canvas {
    /// Fully transparent canvas.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// `[b, g, r, a]` at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let at = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[at],
            self.data[at + 1],
            self.data[at + 2],
            self.data[at + 3],
        ]
    }

    pub fn is_transparent(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    /// Source-over blend of `mask` tinted with `color`, top-left at `(x, y)`.
    ///
    /// Parts falling outside the canvas are clipped.
    pub fn blend_mask(&mut self, mask: &GlyphMask, x: i32, y: i32, color: Rgb) {
        let Rgb(r, g, b) = color;
        for my in 0..mask.height as i32 {
            let cy = y + my;
            if cy < 0 || cy >= self.height as i32 {
                continue;
            }
            for mx in 0..mask.width as i32 {
                let cx = x + mx;
                if cx < 0 || cx >= self.width as i32 {
                    continue;
                }
                let a = mask.coverage[(my as u32 * mask.width + mx as u32) as usize] as u32;
                if a == 0 {
                    continue;
                }
                let at = (cy as usize * self.width as usize + cx as usize) * 4;
                let px = &mut self.data[at..at + 4];
                let inv = 255 - a;
                px[0] = over(b as u32 * a / 255, px[0], inv);
                px[1] = over(g as u32 * a / 255, px[1], inv);
                px[2] = over(r as u32 * a / 255, px[2], inv);
                px[3] = over(a, px[3], inv);
            }
        }
    }
}

fn over(src: u32, dst: u8, inv_alpha: u32) -> u8 {
    (src + dst as u32 * inv_alpha / 255).min(255) as u8
}
