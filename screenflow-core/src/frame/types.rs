use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;

/// A decoded screen image with its arrival order.
///
/// Cloning is cheap: the bitmap is shared.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic arrival counter, starting at 1.
    pub seq: u64,
    pub image: Arc<RgbImage>,
    pub received_at: Instant,
}

impl Frame {
    pub fn new(seq: u64, image: RgbImage) -> Self {
        Self {
            seq,
            image: Arc::new(image),
            received_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Running counters for the decode loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames decoded since start.
    pub total_frames: u64,
    /// Encoded bytes consumed since start.
    pub total_bytes: u64,
    /// Last frame width.
    pub width: u32,
    /// Last frame height.
    pub height: u32,
}
