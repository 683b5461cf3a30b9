//! Decode loop: MJPEG bytes in, published [`Frame`]s out.
//!
//! Frames land in one `watch` slot that always holds the most recent
//! frame. Point-in-time readers (readiness, one-shot locate, static checks)
//! borrow it; streaming readers hold a [`FrameSubscription`], which yields
//! the newest frame it has not seen yet and skips whatever it missed.

use futures::StreamExt;
use image::{ImageFormat, RgbImage};
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::codec::JpegFrameCodec;
use crate::error::ScreenflowError;

use super::types::{Frame, FrameStats};

/// Decode one JPEG buffer into an RGB bitmap.
pub fn decode_jpeg(buf: &[u8]) -> Result<RgbImage, ScreenflowError> {
    Ok(image::load_from_memory_with_format(buf, ImageFormat::Jpeg)?.to_rgb8())
}

/// Create a connected publisher / feed pair.
pub fn frame_channel() -> (FramePublisher, FrameFeed) {
    let (latest_tx, latest_rx) = watch::channel(None);
    let (stats_tx, stats_rx) = watch::channel(FrameStats::default());
    (
        FramePublisher {
            seq: 0,
            latest_tx,
            stats_tx,
        },
        FrameFeed {
            latest_rx,
            stats_rx,
        },
    )
}

// ── FramePublisher ───────────────────────────────────────────────

/// Single writer side of the frame slots.
#[derive(Debug)]
pub struct FramePublisher {
    seq: u64,
    latest_tx: watch::Sender<Option<Frame>>,
    stats_tx: watch::Sender<FrameStats>,
}

impl FramePublisher {
    /// Stamp and publish a decoded image. `encoded_len` feeds the stats.
    pub fn publish(&mut self, image: RgbImage, encoded_len: usize) -> Frame {
        self.seq += 1;
        let frame = Frame::new(self.seq, image);

        self.latest_tx.send_replace(Some(frame.clone()));
        self.stats_tx.send_modify(|s| {
            s.total_frames += 1;
            s.total_bytes += encoded_len as u64;
            s.width = frame.width();
            s.height = frame.height();
        });

        trace!(
            seq = frame.seq,
            subscribers = self.latest_tx.receiver_count(),
            "frame published"
        );
        frame
    }
}

// ── FrameFeed ────────────────────────────────────────────────────

/// Cloneable reader side of the frame slots.
#[derive(Debug, Clone)]
pub struct FrameFeed {
    latest_rx: watch::Receiver<Option<Frame>>,
    stats_rx: watch::Receiver<FrameStats>,
}

impl FrameFeed {
    /// The most recently decoded frame, if any.
    pub fn latest(&self) -> Option<Frame> {
        self.latest_rx.borrow().clone()
    }

    /// Stream frames published from now on. A slow subscriber always gets
    /// the newest frame next; the ones it fell behind on are skipped.
    pub fn subscribe(&self) -> FrameSubscription {
        let mut rx = self.latest_rx.clone();
        let seen = rx.borrow_and_update().as_ref().map_or(0, |f| f.seq);
        FrameSubscription { rx, seen }
    }

    pub fn stats(&self) -> FrameStats {
        self.stats_rx.borrow().clone()
    }

    /// Wait until a frame newer than `after` is available.
    ///
    /// `after = 0` waits for the first frame. Fails with `ChannelClosed`
    /// once the publisher is gone.
    pub async fn wait_newer(&self, after: u64) -> Result<Frame, ScreenflowError> {
        let mut rx = self.latest_rx.clone();
        let slot = rx
            .wait_for(|f| f.as_ref().is_some_and(|f| f.seq > after))
            .await
            .map_err(|_| ScreenflowError::ChannelClosed)?;
        slot.clone().ok_or(ScreenflowError::ChannelClosed)
    }

    /// Wait for the first frame.
    pub async fn wait_first(&self) -> Result<Frame, ScreenflowError> {
        self.wait_newer(0).await
    }
}

// ── FrameSubscription ────────────────────────────────────────────

/// Latest-wins frame stream handed out by [`FrameFeed::subscribe`].
#[derive(Debug)]
pub struct FrameSubscription {
    rx: watch::Receiver<Option<Frame>>,
    /// Sequence number of the last frame handed out.
    seen: u64,
}

impl FrameSubscription {
    /// Wait for a frame newer than the last one returned.
    ///
    /// Returns `None` once the publisher is gone and nothing newer is left.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.try_recv() {
                return Some(frame);
            }
            self.rx.changed().await.ok()?;
        }
    }

    /// The newest unseen frame, without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        let frame = self.rx.borrow_and_update().clone()?;
        if frame.seq <= self.seen {
            return None;
        }
        self.seen = frame.seq;
        Some(frame)
    }
}

// ── FrameDecoder ─────────────────────────────────────────────────

/// Drives a [`JpegFrameCodec`] over a byte source and publishes frames.
#[derive(Debug)]
pub struct FrameDecoder {
    publisher: FramePublisher,
    max_frame_bytes: usize,
}

impl FrameDecoder {
    pub fn new(publisher: FramePublisher) -> Self {
        Self {
            publisher,
            max_frame_bytes: crate::codec::MAX_FRAME_BYTES,
        }
    }

    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    /// Run until `cancel` fires or the source fails.
    ///
    /// End of stream is an error: the transcoder never closes its output
    /// while the session is alive.
    pub async fn run<R>(mut self, reader: R, cancel: CancellationToken) -> Result<(), ScreenflowError>
    where
        R: AsyncRead + Unpin,
    {
        let codec = JpegFrameCodec::with_max_frame_bytes(self.max_frame_bytes);
        let mut framed = FramedRead::new(reader, codec);
        debug!("decode loop started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("decode loop cancelled");
                    return Ok(());
                }
                next = framed.next() => match next {
                    Some(Ok(buf)) => {
                        let encoded_len = buf.len();
                        let image = tokio::task::spawn_blocking(move || decode_jpeg(&buf))
                            .await
                            .map_err(|e| ScreenflowError::Other(format!("decode worker: {e}")))??;
                        self.publisher.publish(image, encoded_len);
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(ScreenflowError::Io(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "transcoder output ended",
                        )));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Cursor;

    fn encode_jpeg(img: &RgbImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    fn solid(w: u32, h: u32, v: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([v, v, v]))
    }

    #[test]
    fn publisher_stamps_sequence_and_stats() {
        let (mut publisher, feed) = frame_channel();
        assert!(feed.latest().is_none());

        publisher.publish(solid(4, 3, 10), 100);
        let f = publisher.publish(solid(4, 3, 20), 50);

        assert_eq!(f.seq, 2);
        assert_eq!(feed.latest().unwrap().seq, 2);
        let stats = feed.stats();
        assert_eq!(stats.total_frames, 2);
        assert_eq!(stats.total_bytes, 150);
        assert_eq!((stats.width, stats.height), (4, 3));
    }

    #[tokio::test]
    async fn wait_first_resolves_after_publish() {
        let (mut publisher, feed) = frame_channel();
        let waiter = tokio::spawn({
            let feed = feed.clone();
            async move { feed.wait_first().await }
        });
        tokio::task::yield_now().await;
        publisher.publish(solid(2, 2, 0), 1);
        let frame = waiter.await.unwrap().unwrap();
        assert_eq!(frame.seq, 1);
    }

    #[tokio::test]
    async fn wait_fails_when_publisher_dropped() {
        let (publisher, feed) = frame_channel();
        drop(publisher);
        let err = feed.wait_first().await.unwrap_err();
        assert!(matches!(err, ScreenflowError::ChannelClosed));
    }

    #[tokio::test]
    async fn decoder_publishes_frames_then_reports_eof() {
        let mut bytes = vec![0x00, 0x01];
        bytes.extend(encode_jpeg(&solid(16, 8, 200)));
        bytes.extend(encode_jpeg(&solid(16, 8, 50)));

        let (publisher, feed) = frame_channel();
        let mut sub = feed.subscribe();
        let reader = tokio_test::io::Builder::new().read(&bytes).build();

        let err = FrameDecoder::new(publisher)
            .run(reader, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScreenflowError::Io(_)));

        let latest = feed.latest().unwrap();
        assert_eq!(latest.seq, 2);
        assert_eq!((latest.width(), latest.height()), (16, 8));
        // the subscriber skipped straight to the newest frame
        assert_eq!(sub.try_recv().unwrap().seq, 2);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn slow_subscriber_gets_newest_frame() {
        let (mut publisher, feed) = frame_channel();
        publisher.publish(solid(2, 2, 0), 1);
        let mut sub = feed.subscribe();
        assert!(sub.try_recv().is_none());

        for v in [1, 2, 3] {
            publisher.publish(solid(2, 2, v), 1);
        }
        let frame = sub.recv().await.unwrap();
        assert_eq!(frame.seq, 4);
        assert_eq!(frame.image.get_pixel(0, 0), &Rgb([3, 3, 3]));

        let waiter = tokio::spawn(async move { sub.recv().await.map(|f| f.seq) });
        tokio::task::yield_now().await;
        publisher.publish(solid(2, 2, 9), 1);
        assert_eq!(waiter.await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn subscription_ends_with_publisher() {
        let (publisher, feed) = frame_channel();
        let mut sub = feed.subscribe();
        drop(publisher);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn corrupt_jpeg_is_a_decode_error() {
        let (publisher, _feed) = frame_channel();
        let reader = tokio_test::io::Builder::new()
            .read(&[0xFF, 0xD8, 0x00, 0x00, 0xFF, 0xD9])
            .build();
        let err = FrameDecoder::new(publisher)
            .run(reader, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScreenflowError::Image(_)));
    }
}
