//! Screen perception: capture, rescaling and stability detection.
//!
//! | Module     | Purpose                                            |
//! |------------|----------------------------------------------------|
//! | `types`    | `FrameBuffer` and `PixelFormat`                    |
//! | `capture`  | GDI capture of the primary display plus cursor     |
//! | `rescale`  | Nearest-neighbor downsampling with a cached map    |
//! | `settle`   | Sleep-and-poll screen stability heuristic          |

pub mod capture;
pub mod rescale;
pub mod settle;
pub mod types;

pub use capture::{FrameSource, GdiCapturer, enable_dpi_awareness, screen_size};
pub use rescale::Rescaler;
pub use settle::{
    Downsampled, SampleSource, SettleDetector, SettleParams, SettleResult, change_ratio,
};
pub use types::{FrameBuffer, PixelFormat};
