//! Screen-stability heuristic.
//!
//! Polls small cursor-free samples and declares the screen settled after a
//! run of consecutive low-change comparisons. Known failure modes: a slow
//! animation whose per-sample change stays under the threshold is reported
//! stable, and a one-off flicker resets the streak and may report unstable.

use std::time::Duration;

use crate::clock::Clock;
use crate::error::CaptureError;
use crate::screen::capture::FrameSource;
use crate::screen::rescale::Rescaler;
use crate::screen::types::FrameBuffer;

/// Only every Nth pixel of each row takes part in a comparison.
pub const PIXEL_STRIDE: usize = 4;

/// Floor for the poll interval; a zero interval would never advance time.
const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

/// Produces low-resolution, cursor-free samples of the screen.
pub trait SampleSource {
    fn sample(&mut self, width: u32, height: u32) -> Result<FrameBuffer, CaptureError>;
}

/// Adapts a [`FrameSource`] into a [`SampleSource`] through its own
/// [`Rescaler`], so the sample map never evicts the perception map.
pub struct Downsampled<'a, F: FrameSource + ?Sized> {
    source: &'a mut F,
    rescaler: &'a mut Rescaler,
}

impl<'a, F: FrameSource + ?Sized> Downsampled<'a, F> {
    pub fn new(source: &'a mut F, rescaler: &'a mut Rescaler) -> Self {
        Self { source, rescaler }
    }
}

impl<F: FrameSource + ?Sized> SampleSource for Downsampled<'_, F> {
    fn sample(&mut self, width: u32, height: u32) -> Result<FrameBuffer, CaptureError> {
        let full = self.source.capture(false)?;
        // Only reachable with an empty capture or a zero sample size.
        self.rescaler
            .downsample(&full, width, height)
            .map_err(|_| CaptureError::new("downsample", 0))
    }
}

// ── Parameters / result ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SettleParams {
    pub max_wait: Duration,
    pub sample_width: u32,
    pub sample_height: u32,
    pub check_interval: Duration,
    pub required_stable_frames: u32,
    /// Highest changed ratio still counted as "stable".
    pub change_ratio_threshold: f64,
}

impl Default for SettleParams {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_millis(2500),
            sample_width: 256,
            sample_height: 144,
            check_interval: Duration::from_millis(100),
            required_stable_frames: 2,
            change_ratio_threshold: 0.006,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleResult {
    pub stable: bool,
    pub elapsed: Duration,
}

// ── Detector ─────────────────────────────────────────────────────

/// Sleep-and-poll stability detector.
#[derive(Debug)]
pub struct SettleDetector<C: Clock> {
    clock: C,
}

impl<C: Clock> SettleDetector<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    /// Poll `source` until the screen looks stable or `max_wait` runs out.
    ///
    /// Each cycle captures, compares against the previous sample, then
    /// sleeps for the check interval clipped to the remaining budget.
    pub fn is_settled<S: SampleSource + ?Sized>(
        &self,
        source: &mut S,
        params: &SettleParams,
    ) -> Result<SettleResult, CaptureError> {
        let start = self.clock.now();
        let deadline = start + params.max_wait;
        let required = params.required_stable_frames.max(1);
        let interval = params.check_interval.max(MIN_CHECK_INTERVAL);

        let mut previous: Option<FrameBuffer> = None;
        let mut streak = 0u32;

        while self.clock.now() < deadline {
            let current = source.sample(params.sample_width, params.sample_height)?;

            if let Some(prev) = &previous {
                let ratio = change_ratio(prev, &current);
                if ratio <= params.change_ratio_threshold {
                    streak += 1;
                    if streak >= required {
                        let elapsed = self.clock.now() - start;
                        tracing::debug!(?elapsed, ratio, "screen settled");
                        return Ok(SettleResult {
                            stable: true,
                            elapsed,
                        });
                    }
                } else {
                    streak = 0;
                }
            }
            previous = Some(current);

            let remaining = deadline.saturating_duration_since(self.clock.now());
            self.clock.sleep(interval.min(remaining));
        }

        let elapsed = self.clock.now() - start;
        tracing::debug!(?elapsed, "settle budget exhausted");
        Ok(SettleResult {
            stable: false,
            elapsed,
        })
    }
}

/// Fraction of strided samples whose first three channels differ.
///
/// Mismatched geometry or an empty frame counts as fully changed.
pub fn change_ratio(a: &FrameBuffer, b: &FrameBuffer) -> f64 {
    if a.width() != b.width()
        || a.height() != b.height()
        || a.format() != b.format()
        || a.width() == 0
        || a.height() == 0
    {
        return 1.0;
    }

    let bpp = a.format().bytes_per_pixel();
    let (mut changed, mut total) = (0usize, 0usize);
    for y in 0..a.height() {
        let (ra, rb) = (a.row(y), b.row(y));
        for x in (0..a.width() as usize).step_by(PIXEL_STRIDE) {
            let at = x * bpp;
            total += 1;
            if ra[at..at + 3] != rb[at..at + 3] {
                changed += 1;
            }
        }
    }
    changed as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::screen::types::PixelFormat;

    const W: u32 = 16;
    const H: u32 = 4;

    /// 16x4 Rgb8 frame filled with `fill`; 16 strided samples total.
    fn frame(fill: u8) -> FrameBuffer {
        FrameBuffer::packed(W, H, PixelFormat::Rgb8, vec![fill; (W * H * 3) as usize]).unwrap()
    }

    /// `frame(fill)` with sampled pixel number `n` (row-major over the
    /// strided grid) changed.
    fn frame_with_spot(fill: u8, n: u32) -> FrameBuffer {
        let mut data = vec![fill; (W * H * 3) as usize];
        let per_row = W / PIXEL_STRIDE as u32;
        let (x, y) = ((n % per_row) * PIXEL_STRIDE as u32, n / per_row);
        let at = ((y * W + x) * 3) as usize;
        data[at] = fill.wrapping_add(1);
        FrameBuffer::packed(W, H, PixelFormat::Rgb8, data).unwrap()
    }

    /// Replays a fixed list, repeating the last frame forever.
    struct Scripted {
        frames: Vec<FrameBuffer>,
        calls: usize,
    }

    impl Scripted {
        fn new(frames: Vec<FrameBuffer>) -> Self {
            Self { frames, calls: 0 }
        }
    }

    impl SampleSource for Scripted {
        fn sample(&mut self, _w: u32, _h: u32) -> Result<FrameBuffer, CaptureError> {
            let i = self.calls.min(self.frames.len() - 1);
            self.calls += 1;
            Ok(self.frames[i].clone())
        }
    }

    /// Every sample differs completely from the one before.
    struct Flicker(u8);

    impl SampleSource for Flicker {
        fn sample(&mut self, _w: u32, _h: u32) -> Result<FrameBuffer, CaptureError> {
            self.0 = self.0.wrapping_add(17);
            Ok(frame(self.0))
        }
    }

    fn params(max_ms: u64, required: u32, threshold: f64) -> SettleParams {
        SettleParams {
            max_wait: Duration::from_millis(max_ms),
            sample_width: W,
            sample_height: H,
            check_interval: Duration::from_millis(100),
            required_stable_frames: required,
            change_ratio_threshold: threshold,
        }
    }

    #[test]
    fn change_ratio_counts_strided_samples() {
        assert_eq!(change_ratio(&frame(1), &frame(1)), 0.0);
        assert_eq!(change_ratio(&frame(1), &frame(2)), 1.0);
        assert_eq!(change_ratio(&frame(1), &frame_with_spot(1, 3)), 1.0 / 16.0);
    }

    #[test]
    fn change_ratio_ignores_unsampled_pixels_and_alpha() {
        let mut data = vec![0u8; (W * H * 4) as usize];
        let base = FrameBuffer::packed(W, H, PixelFormat::Bgra8, data.clone()).unwrap();
        data[4] = 9; // pixel x=1 is skipped by the stride
        data[3] = 9; // alpha of a sampled pixel
        let other = FrameBuffer::packed(W, H, PixelFormat::Bgra8, data).unwrap();
        assert_eq!(change_ratio(&base, &other), 0.0);
    }

    #[test]
    fn mismatched_or_empty_frames_count_as_changed() {
        let small = FrameBuffer::packed(4, 4, PixelFormat::Rgb8, vec![0; 48]).unwrap();
        assert_eq!(change_ratio(&frame(0), &small), 1.0);
        let empty = FrameBuffer::packed(0, 0, PixelFormat::Rgb8, Vec::new()).unwrap();
        assert_eq!(change_ratio(&empty, &empty), 1.0);
    }

    #[test]
    fn stable_from_sample_n_settles_after_n_plus_one_intervals() {
        for n in 1..=5u32 {
            // Samples 1..n-1 flicker, sample n onward is constant.
            let mut frames: Vec<FrameBuffer> = (1..n).map(|i| frame(i as u8 * 40)).collect();
            frames.push(frame(255));
            let clock = ManualClock::new();
            let detector = SettleDetector::new(&clock);

            let result = detector
                .is_settled(&mut Scripted::new(frames), &params(2500, 2, 0.006))
                .unwrap();
            assert!(result.stable, "n = {n}");
            assert_eq!(result.elapsed, Duration::from_millis(100 * (n as u64 + 1)));
        }
    }

    #[test]
    fn never_stable_runs_exactly_to_deadline() {
        let clock = ManualClock::new();
        let detector = SettleDetector::new(&clock);
        let result = detector
            .is_settled(&mut Flicker(0), &params(250, 2, 0.006))
            .unwrap();
        assert_eq!(
            result,
            SettleResult {
                stable: false,
                elapsed: Duration::from_millis(250)
            }
        );
        // The last sleep is clipped to the remaining 50 ms.
        assert_eq!(clock.sleeps().last(), Some(&Duration::from_millis(50)));
    }

    #[test]
    fn zero_check_interval_still_reaches_deadline() {
        let mut p = params(5, 2, 0.006);
        p.check_interval = Duration::ZERO;
        let clock = ManualClock::new();
        let result = SettleDetector::new(&clock)
            .is_settled(&mut Flicker(0), &p)
            .unwrap();
        assert!(!result.stable);
        assert_eq!(result.elapsed, Duration::from_millis(5));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(1); 5]);
    }

    #[test]
    fn zero_check_interval_can_settle() {
        let mut p = params(2500, 2, 0.006);
        p.check_interval = Duration::ZERO;
        let clock = ManualClock::new();
        let result = SettleDetector::new(&clock)
            .is_settled(&mut Scripted::new(vec![frame(7)]), &p)
            .unwrap();
        assert!(result.stable);
        assert_eq!(result.elapsed, Duration::from_millis(2));
    }

    #[test]
    fn zero_budget_takes_no_samples() {
        let clock = ManualClock::new();
        let mut source = Scripted::new(vec![frame(0)]);
        let result = SettleDetector::new(&clock)
            .is_settled(&mut source, &params(0, 2, 0.006))
            .unwrap();
        assert!(!result.stable);
        assert_eq!(source.calls, 0);
    }

    #[test]
    fn slow_sub_threshold_animation_is_reported_stable() {
        // A spot walks across the sampled grid: the screen never stops
        // changing, but each step stays under the threshold.
        let frames: Vec<FrameBuffer> = (0..16).map(|n| frame_with_spot(0, n)).collect();
        let clock = ManualClock::new();
        let result = SettleDetector::new(&clock)
            .is_settled(&mut Scripted::new(frames), &params(2500, 2, 0.15))
            .unwrap();
        assert!(result.stable);
        assert_eq!(result.elapsed, Duration::from_millis(200));
    }

    #[test]
    fn transient_artifact_resets_streak() {
        let clean = vec![frame(0), frame(0), frame(0), frame(0), frame(0)];
        let clock = ManualClock::new();
        let result = SettleDetector::new(&clock)
            .is_settled(&mut Scripted::new(clean), &params(500, 3, 0.006))
            .unwrap();
        assert!(result.stable);
        assert_eq!(result.elapsed, Duration::from_millis(300));

        // Same screen with a single-sample flash at sample 3.
        let flashed = vec![frame(0), frame(0), frame(200), frame(0), frame(0)];
        let clock = ManualClock::new();
        let result = SettleDetector::new(&clock)
            .is_settled(&mut Scripted::new(flashed), &params(500, 3, 0.006))
            .unwrap();
        assert!(!result.stable);
        assert_eq!(result.elapsed, Duration::from_millis(500));
    }

    #[test]
    fn capture_failure_propagates() {
        struct Broken;
        impl SampleSource for Broken {
            fn sample(&mut self, _w: u32, _h: u32) -> Result<FrameBuffer, CaptureError> {
                Err(CaptureError::new("BitBlt", 6))
            }
        }
        let clock = ManualClock::new();
        let err = SettleDetector::new(&clock)
            .is_settled(&mut Broken, &params(500, 2, 0.006))
            .unwrap_err();
        assert_eq!(err.op, "BitBlt");
    }
}
