//! Vision lookups and polling waits.
//!
//! Every wait here treats "not yet" as expected and retries until its
//! deadline, then fails with [`ScreenflowError::NotFound`]. A `None`
//! deadline waits until the session closes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, trace};

use crate::error::ScreenflowError;
use crate::events::EventKind;
use crate::geometry::{Point, Rect};
use crate::protocol::{ElementSelector, ScreenView};
use crate::vision::{is_frame_static, locate_once};

use super::{POLL_INTERVAL, STATIC_FRAME_INTERVAL, Session};

fn deadline_from(limit: Option<Duration>) -> Option<Instant> {
    limit.map(|d| Instant::now() + d)
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

impl Session {
    /// Run `fut` unless the session closes first.
    async fn until_closed<T, F>(&self, fut: F) -> Result<T, ScreenflowError>
    where
        F: Future<Output = Result<T, ScreenflowError>>,
    {
        let cancel = self.supervisor.token();
        tokio::select! {
            _ = cancel.cancelled() => Err(self.closed_error()),
            out = fut => out,
        }
    }

    /// Wait for a stable, debounced location of `template`.
    pub async fn find(&self, template: Arc<RgbImage>) -> Result<Point, ScreenflowError> {
        let vision = self.vision_for("find")?;
        let point = self.until_closed(vision.find(template)).await?;
        self.events.emit(EventKind::FoundImage { point });
        Ok(point)
    }

    /// [`find`](Self::find) bounded by `limit`; expiry is `NotFound`.
    pub async fn find_within(
        &self,
        template: Arc<RgbImage>,
        limit: Option<Duration>,
    ) -> Result<Point, ScreenflowError> {
        self.find_before(template, deadline_from(limit)).await
    }

    async fn find_before(
        &self,
        template: Arc<RgbImage>,
        deadline: Option<Instant>,
    ) -> Result<Point, ScreenflowError> {
        match deadline {
            None => self.find(template).await,
            Some(at) => timeout_at(at, self.find(template))
                .await
                .map_err(|_| ScreenflowError::NotFound)?,
        }
    }

    /// Locate `template` once on the latest frame.
    ///
    /// `Ok(None)` when it is not visible or no frame has arrived yet.
    pub async fn locate(&self, template: Arc<RgbImage>) -> Result<Option<Point>, ScreenflowError> {
        let feed = self.frames_for("locate")?;
        let Some(frame) = feed.latest() else {
            return Ok(None);
        };
        let locator = self.locator.clone();
        tokio::task::spawn_blocking(move || {
            locate_once(&frame.image, &template, locator.matcher.as_ref(), locator.max_side)
        })
        .await
        .map_err(|e| ScreenflowError::Other(format!("locate worker: {e}")))?
    }

    /// Wait until a stable location of `template` falls inside `area`.
    ///
    /// Without an area the first stable location is returned.
    pub async fn wait_image(
        &self,
        template: Arc<RgbImage>,
        area: Option<Rect>,
        limit: Option<Duration>,
    ) -> Result<Point, ScreenflowError> {
        let deadline = deadline_from(limit);
        loop {
            let point = self.find_before(Arc::clone(&template), deadline).await?;
            if area.is_none_or(|a| a.contains(point)) {
                return Ok(point);
            }
            debug!(%point, ?area, "image found outside area");
            if expired(deadline) {
                return Err(ScreenflowError::NotFound);
            }
            self.until_closed(async {
                sleep(POLL_INTERVAL).await;
                Ok(())
            })
            .await?;
        }
    }

    /// Poll one-shot locates until `template` is visible inside `area`.
    pub async fn wait_visible(
        &self,
        template: Arc<RgbImage>,
        area: Option<Rect>,
        limit: Option<Duration>,
    ) -> Result<Point, ScreenflowError> {
        let deadline = deadline_from(limit);
        loop {
            match self.locate(Arc::clone(&template)).await? {
                Some(point) if area.is_none_or(|a| a.contains(point)) => return Ok(point),
                Some(point) => trace!(%point, "visible outside area"),
                None => trace!("not visible"),
            }
            if expired(deadline) {
                return Err(ScreenflowError::NotFound);
            }
            self.until_closed(async {
                sleep(POLL_INTERVAL).await;
                Ok(())
            })
            .await?;
        }
    }

    /// Wait until two frames taken 250 ms apart differ by less than
    /// `threshold`.
    pub async fn wait_static_frame(
        &self,
        threshold: f64,
        limit: Option<Duration>,
    ) -> Result<(), ScreenflowError> {
        let feed = self.frames_for("wait_static_frame")?;
        let deadline = deadline_from(limit);

        self.until_closed(async {
            let mut first = match feed.latest() {
                Some(frame) => frame,
                None => feed.wait_first().await?,
            };
            loop {
                sleep(STATIC_FRAME_INTERVAL).await;
                let second = feed.latest().ok_or(ScreenflowError::ChannelClosed)?;
                if is_frame_static(&first.image, &second.image, threshold) {
                    debug!(first = first.seq, second = second.seq, "frame is static");
                    return Ok(());
                }
                if expired(deadline) {
                    return Err(ScreenflowError::NotFound);
                }
                first = second;
            }
        })
        .await
    }

    /// Poll screen dumps until an element matches `selector`.
    pub async fn wait_element(
        &self,
        selector: &ElementSelector,
        limit: Option<Duration>,
    ) -> Result<ScreenView, ScreenflowError> {
        let a11y = self.accessibility_for("wait_element")?;
        let compiled = selector.compile()?;
        let deadline = deadline_from(limit);

        self.until_closed(async {
            loop {
                let dump = a11y.screen_dump().await?;
                if let Some(node) = dump.find(&compiled) {
                    return Ok(node.clone());
                }
                if expired(deadline) {
                    return Err(ScreenflowError::NotFound);
                }
                sleep(POLL_INTERVAL).await;
            }
        })
        .await
    }
}
