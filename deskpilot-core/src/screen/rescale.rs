//! Nearest-neighbor downsampling with a memoized index map.

use crate::error::CodecError;
use crate::screen::types::FrameBuffer;

/// `(src_w, src_h, dst_w, dst_h)`
type MapKey = (u32, u32, u32, u32);

/// Destination-to-source lookup tables for one size tuple.
#[derive(Debug)]
struct IndexMap {
    key: MapKey,
    /// Source column, per destination column.
    columns: Vec<usize>,
    /// Source row, per destination row.
    rows: Vec<u32>,
}

impl IndexMap {
    fn build(key: MapKey) -> Self {
        let (sw, sh, dw, dh) = key;
        let columns = (0..dw as u64)
            .map(|x| ((x * sw as u64) / dw as u64) as usize)
            .collect();
        let rows = (0..dh as u64)
            .map(|y| ((y * sh as u64) / dh as u64) as u32)
            .collect();
        Self { key, columns, rows }
    }
}

/// Nearest-neighbor downsampler.
///
/// The index map is plain data owned by this instance and keyed by the
/// full size tuple; any change of source or target size rebuilds it.
#[derive(Debug, Default)]
pub struct Rescaler {
    map: Option<IndexMap>,
    rebuilds: u64,
}

impl Rescaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resample `src` to `target_w × target_h`, keeping its pixel format.
    ///
    /// Output is tightly packed. Identical inputs always produce identical
    /// outputs.
    pub fn downsample(
        &mut self,
        src: &FrameBuffer,
        target_w: u32,
        target_h: u32,
    ) -> Result<FrameBuffer, CodecError> {
        if target_w == 0 || target_h == 0 || src.width() == 0 || src.height() == 0 {
            return Err(CodecError::EmptyImage {
                width: target_w,
                height: target_h,
            });
        }

        let format = src.format();
        let bpp = format.bytes_per_pixel();

        if (src.width(), src.height()) == (target_w, target_h) {
            let mut data = Vec::with_capacity(target_w as usize * bpp * target_h as usize);
            for y in 0..src.height() {
                data.extend_from_slice(src.row(y));
            }
            return FrameBuffer::packed(target_w, target_h, format, data);
        }

        let key = (src.width(), src.height(), target_w, target_h);
        let map = self.index_map(key);

        let mut data = Vec::with_capacity(target_w as usize * bpp * target_h as usize);
        for &sy in &map.rows {
            let row = src.row(sy);
            for &sx in &map.columns {
                let at = sx * bpp;
                data.extend_from_slice(&row[at..at + bpp]);
            }
        }

        FrameBuffer::packed(target_w, target_h, format, data)
    }

    /// Number of times the index map has been (re)computed.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    fn index_map(&mut self, key: MapKey) -> &IndexMap {
        if self.map.as_ref().is_none_or(|m| m.key != key) {
            self.map = Some(IndexMap::build(key));
            self.rebuilds += 1;
        }
        self.map.get_or_insert_with(|| IndexMap::build(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::types::PixelFormat;

    /// Bgra8 frame where each pixel encodes its own coordinates.
    fn coord_frame(w: u32, h: u32) -> FrameBuffer {
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[x as u8, y as u8, 0, 255]);
            }
        }
        FrameBuffer::packed(w, h, PixelFormat::Bgra8, data).unwrap()
    }

    #[test]
    fn halves_by_picking_even_pixels() {
        let src = coord_frame(8, 6);
        let mut r = Rescaler::new();
        let out = r.downsample(&src, 4, 3).unwrap();
        assert_eq!((out.width(), out.height()), (4, 3));
        assert_eq!(out.pixel(0, 0), &[0, 0, 0, 255]);
        assert_eq!(out.pixel(3, 2), &[6, 4, 0, 255]);
    }

    #[test]
    fn same_size_copies_and_strips_padding() {
        let data = vec![9, 9, 9, 0xEE, 8, 8, 8, 0xEE];
        let src = FrameBuffer::new(1, 2, 4, PixelFormat::Rgb8, data).unwrap();
        let mut r = Rescaler::new();
        let out = r.downsample(&src, 1, 2).unwrap();
        assert_eq!(out.data(), &[9, 9, 9, 8, 8, 8]);
        assert_eq!(r.rebuilds(), 0);
    }

    #[test]
    fn map_is_reused_for_same_sizes() {
        let src = coord_frame(10, 10);
        let mut r = Rescaler::new();
        let a = r.downsample(&src, 3, 3).unwrap();
        let b = r.downsample(&src, 3, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(r.rebuilds(), 1);
    }

    #[test]
    fn source_resolution_change_rebuilds_map() {
        let mut r = Rescaler::new();
        r.downsample(&coord_frame(10, 10), 3, 3).unwrap();
        let out = r.downsample(&coord_frame(20, 12), 3, 3).unwrap();
        assert_eq!(r.rebuilds(), 2);
        // 2 * 20 / 3 = 13, 2 * 12 / 3 = 8
        assert_eq!(out.pixel(2, 2), &[13, 8, 0, 255]);
    }

    #[test]
    fn zero_target_is_rejected() {
        let mut r = Rescaler::new();
        assert!(r.downsample(&coord_frame(4, 4), 0, 2).is_err());
    }

    #[test]
    fn upsampling_repeats_pixels() {
        let src = coord_frame(2, 1);
        let mut r = Rescaler::new();
        let out = r.downsample(&src, 4, 1).unwrap();
        assert_eq!(out.pixel(0, 0), out.pixel(1, 0));
        assert_eq!(out.pixel(2, 0), &[1, 0, 0, 255]);
    }
}
