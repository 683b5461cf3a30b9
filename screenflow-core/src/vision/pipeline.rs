//! Continuous, debounced template localization over the live frame feed.
//!
//! The pipeline owns all per-frame state (previous scaled frame, settle
//! counter, stability run). Callers interact through a [`VisionHandle`]:
//! a find call parks a template and a one-shot reply in a shared slot; the
//! pipeline answers it exactly once, when the same point has been produced
//! on enough consecutive settled frames.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::RgbImage;
use image::imageops::grayscale;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ScreenflowError;
use crate::frame::FrameSubscription;
use crate::geometry::Point;

use super::change::change_ratio_with;
use super::config::VisionConfig;
use super::matching::Matcher;
use super::scale::{downscale, restore_point, scale_by};
use super::stability::{SettleTracker, StabilityGate};

/// The single in-flight find request.
#[derive(Debug)]
struct FindRequest {
    generation: u64,
    template: Arc<RgbImage>,
    reply: Option<oneshot::Sender<Point>>,
}

#[derive(Debug, Default)]
struct RequestSlot {
    slot: Mutex<Option<FindRequest>>,
    generation: AtomicU64,
}

impl RequestSlot {
    fn lock(&self) -> MutexGuard<'_, Option<FindRequest>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a connected pipeline / handle pair.
pub fn vision_channel(config: VisionConfig, matcher: Arc<dyn Matcher>) -> (VisionPipeline, VisionHandle) {
    let requests = Arc::new(RequestSlot::default());
    (
        VisionPipeline::new(config, matcher, Arc::clone(&requests)),
        VisionHandle { requests },
    )
}

// ── VisionPipeline ───────────────────────────────────────────────

/// Per-frame matching state machine.
pub struct VisionPipeline {
    config: VisionConfig,
    matcher: Arc<dyn Matcher>,
    settle: SettleTracker,
    gate: StabilityGate,
    prev: Option<RgbImage>,
    active_generation: u64,
    requests: Arc<RequestSlot>,
}

impl std::fmt::Debug for VisionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionPipeline")
            .field("matcher", &self.matcher.name())
            .field("settle", &self.settle)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl VisionPipeline {
    fn new(config: VisionConfig, matcher: Arc<dyn Matcher>, requests: Arc<RequestSlot>) -> Self {
        Self {
            settle: SettleTracker::new(
                config.change_threshold,
                config.settle_cap,
                config.min_settle_frames,
            ),
            gate: StabilityGate::new(config.stable_frames),
            config,
            matcher,
            prev: None,
            active_generation: 0,
            requests,
        }
    }

    /// Current settle counter.
    pub fn settle_counter(&self) -> u32 {
        self.settle.counter()
    }

    /// Process one frame. Returns the point when this frame answered the
    /// pending find request.
    pub fn process_frame(&mut self, frame: &RgbImage) -> Option<Point> {
        let (scaled, scale) = downscale(frame, self.config.max_side);

        if let Some(prev) = &self.prev {
            let ratio = change_ratio_with(prev, &scaled, self.config.pixel_threshold);
            self.settle.record(ratio);
        }

        let outcome = self.match_frame(&scaled, scale);
        self.prev = Some(scaled);
        outcome
    }

    fn match_frame(&mut self, scaled: &RgbImage, scale: f64) -> Option<Point> {
        let pending = {
            let slot = self.requests.lock();
            slot.as_ref()
                .filter(|r| r.reply.is_some())
                .map(|r| (r.generation, Arc::clone(&r.template)))
        };
        let Some((generation, template)) = pending else {
            self.gate.reset();
            return None;
        };

        if generation != self.active_generation {
            self.active_generation = generation;
            self.gate.reset();
        }

        if !self.settle.is_settled() {
            self.gate.reset();
            return None;
        }

        let source = grayscale(scaled);
        let tpl = grayscale(&scale_by(&template, scale));
        let found = self
            .matcher
            .locate(&source, &tpl)
            .map(|p| restore_point(p, scale));

        let point = self.gate.observe(found)?;

        let mut slot = self.requests.lock();
        let reply = slot
            .as_mut()
            .filter(|r| r.generation == generation)
            .and_then(|r| r.reply.take())?;
        // The caller may have gone away between lock scopes.
        if reply.send(point).is_ok() {
            info!(%point, generation, "template located");
            Some(point)
        } else {
            None
        }
    }

    /// Consume frames until `cancel` fires or the frame source closes.
    pub async fn run(
        self,
        mut frames: FrameSubscription,
        cancel: CancellationToken,
    ) -> Result<(), ScreenflowError> {
        debug!(matcher = self.matcher.name(), "vision loop started");
        let mut pipeline = self;
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            pipeline = tokio::task::spawn_blocking(move || {
                pipeline.process_frame(&frame.image);
                pipeline
            })
            .await
            .map_err(|e| ScreenflowError::Other(format!("vision worker: {e}")))?;
        }
        debug!("vision loop finished");
        Ok(())
    }
}

// ── VisionHandle ─────────────────────────────────────────────────

/// Caller side of the pipeline.
#[derive(Debug, Clone)]
pub struct VisionHandle {
    requests: Arc<RequestSlot>,
}

/// Clears the slot when a find call ends, however it ends.
struct SlotGuard {
    requests: Arc<RequestSlot>,
    generation: u64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut slot = self.requests.lock();
        if slot.as_ref().is_some_and(|r| r.generation == self.generation) {
            *slot = None;
        }
    }
}

impl VisionHandle {
    /// Register `template` and wait until the pipeline reports a stable
    /// location for it.
    ///
    /// Only one find may be in flight; a second concurrent call fails with
    /// [`ScreenflowError::Busy`]. Dropping the returned future withdraws
    /// the request. The future never resolves on its own if the pipeline
    /// loop has stopped; callers race it against their cancellation token.
    pub async fn find(&self, template: Arc<RgbImage>) -> Result<Point, ScreenflowError> {
        if template.width() == 0 || template.height() == 0 {
            return Err(ScreenflowError::Template("template is empty".into()));
        }

        let (tx, rx) = oneshot::channel();
        let generation = {
            let mut slot = self.requests.lock();
            if slot.is_some() {
                return Err(ScreenflowError::Busy);
            }
            let generation = self.requests.generation.fetch_add(1, Ordering::Relaxed) + 1;
            *slot = Some(FindRequest {
                generation,
                template,
                reply: Some(tx),
            });
            generation
        };
        let _guard = SlotGuard {
            requests: Arc::clone(&self.requests),
            generation,
        };
        debug!(generation, "find registered");

        rx.await.map_err(|_| ScreenflowError::ChannelClosed)
    }

    /// Whether a find request is currently registered.
    pub fn is_busy(&self) -> bool {
        self.requests.lock().is_some()
    }
}
