//! PNG container writer (RGB, 8 bits per channel, no interlace).
//!
//! ```text
//! signature | IHDR | IDAT … IDAT | IEND
//! chunk     = length:u32be | type:[u8;4] | data | crc32(type ‖ data):u32be
//! ```

use crate::codec::deflate::zlib_compress;
use crate::error::CodecError;
use crate::screen::types::FrameBuffer;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Upper bound on one IDAT payload; longer zlib streams are split.
pub const IDAT_CHUNK_MAX: usize = 256 * 1024;

const COLOR_TYPE_RGB: u8 = 2;
const BIT_DEPTH: u8 = 8;
const FILTER_NONE: u8 = 0;

/// Encode `frame` as an RGB PNG. Alpha, if any, is dropped.
pub fn encode_png(frame: &FrameBuffer) -> Result<Vec<u8>, CodecError> {
    let (width, height) = (frame.width(), frame.height());
    if width == 0 || height == 0 {
        return Err(CodecError::EmptyImage { width, height });
    }

    let raw = scanlines(frame);
    let compressed = zlib_compress(&raw);

    let mut out = Vec::with_capacity(compressed.len() + 64);
    out.extend_from_slice(&PNG_SIGNATURE);

    let mut ihdr = [0u8; 13];
    ihdr[0..4].copy_from_slice(&width.to_be_bytes());
    ihdr[4..8].copy_from_slice(&height.to_be_bytes());
    ihdr[8] = BIT_DEPTH;
    ihdr[9] = COLOR_TYPE_RGB;
    // compression, filter method, interlace: all 0.
    write_chunk(&mut out, b"IHDR", &ihdr);

    for part in compressed.chunks(IDAT_CHUNK_MAX) {
        write_chunk(&mut out, b"IDAT", part);
    }
    write_chunk(&mut out, b"IEND", &[]);

    Ok(out)
}

/// Filter-prefixed RGB rows, reordered from the frame's channel layout.
fn scanlines(frame: &FrameBuffer) -> Vec<u8> {
    let width = frame.width() as usize;
    let bpp = frame.format().bytes_per_pixel();
    let [r, g, b] = frame.format().rgb_offsets();

    let mut raw = Vec::with_capacity((width * 3 + 1) * frame.height() as usize);
    for y in 0..frame.height() {
        raw.push(FILTER_NONE);
        for px in frame.row(y).chunks_exact(bpp) {
            raw.extend_from_slice(&[px[r], px[g], px[b]]);
        }
    }
    raw
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);

    let mut crc = crc32fast::Hasher::new();
    crc.update(kind);
    crc.update(data);
    out.extend_from_slice(&crc.finalize().to_be_bytes());
}

// ── PngEncoder ───────────────────────────────────────────────────

/// Stateless PNG encoder that keeps simple counters for logging.
#[derive(Debug, Default)]
pub struct PngEncoder {
    frames_encoded: u64,
    last_size: usize,
}

impl PngEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, frame: &FrameBuffer) -> Result<Vec<u8>, CodecError> {
        let png = encode_png(frame)?;
        self.frames_encoded += 1;
        self.last_size = png.len();
        Ok(png)
    }

    /// Number of frames encoded so far.
    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    /// Byte size of the most recent PNG.
    pub fn last_size(&self) -> usize {
        self.last_size
    }
}

// ── Tests ────────────────────────────────────────────────────────
