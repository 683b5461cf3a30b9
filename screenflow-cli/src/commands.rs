//! Offline operator commands: template localization, frame comparison and
//! transcoder probing. Each returns a serializable report.

use std::path::Path;
use std::time::{Duration, Instant};

use bytes::Bytes;
use image::RgbImage;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use screenflow_core::frame::{feed_loop, frame_channel};
use screenflow_core::vision::change::change_ratio_with;
use screenflow_core::vision::{locate_once, matcher_for};
use screenflow_core::{
    FrameDecoder, Point, Rect, ScreenflowError, Transcoder, TranscoderConfig, VisionConfig,
};

/// Raw video is fed to the transcoder in chunks of this size.
const PROBE_CHUNK_BYTES: usize = 64 * 1024;
const PROBE_QUEUE_DEPTH: usize = 8;

pub fn load_image(path: &Path) -> Result<RgbImage, ScreenflowError> {
    Ok(image::open(path)?.to_rgb8())
}

// ── locate ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocateReport {
    pub algorithm: String,
    pub point: Option<Point>,
    pub area: Option<Rect>,
    /// Found, and inside `area` when one was given.
    pub matched: bool,
    pub elapsed_ms: u64,
}

/// Locate `template` once in `screenshot`.
pub fn locate(
    screenshot: &RgbImage,
    template: &RgbImage,
    vision: &VisionConfig,
    area: Option<Rect>,
) -> Result<LocateReport, ScreenflowError> {
    let started = Instant::now();
    let matcher = matcher_for(vision);
    let point = locate_once(screenshot, template, matcher.as_ref(), vision.max_side)?;
    let matched = point.is_some_and(|p| area.is_none_or(|a| a.contains(p)));
    let elapsed_ms = started.elapsed().as_millis() as u64;

    debug!(?point, matched, elapsed_ms, "locate finished");
    Ok(LocateReport {
        algorithm: vision.algorithm.to_string(),
        point,
        area,
        matched,
        elapsed_ms,
    })
}

// ── compare ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareReport {
    pub change_ratio: f64,
    pub threshold: f64,
    pub is_static: bool,
}

/// Measure how much `b` differs from `a`.
pub fn compare(a: &RgbImage, b: &RgbImage, threshold: f64, pixel_threshold: u8) -> CompareReport {
    let change_ratio = change_ratio_with(a, b, pixel_threshold);
    CompareReport {
        change_ratio,
        threshold,
        is_static: change_ratio < threshold,
    }
}

// ── probe ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub program: String,
    pub input_bytes: u64,
    pub frames: u64,
    pub frame_bytes: u64,
    pub width: u32,
    pub height: u32,
    /// The limit expired before the transcoder finished.
    pub timed_out: bool,
    pub elapsed_ms: u64,
}

/// Pipe `input` through the transcoder and decode what comes out.
///
/// Runs until the transcoder closes its output or `limit` expires.
pub async fn probe(
    config: &TranscoderConfig,
    input: &Path,
    limit: Duration,
) -> Result<ProbeReport, ScreenflowError> {
    let data = tokio::fs::read(input).await?;
    let input_bytes = data.len() as u64;

    let mut transcoder = Transcoder::spawn(config)?;
    let stdin = transcoder.take_stdin()?;
    let stdout = transcoder.take_stdout()?;
    let (publisher, feed) = frame_channel();
    let cancel = CancellationToken::new();
    let started = Instant::now();

    let (video_tx, video_rx) = mpsc::channel(PROBE_QUEUE_DEPTH);
    let feeder = tokio::spawn(feed_loop(stdin, video_rx, cancel.clone()));
    let producer = tokio::spawn(async move {
        for chunk in data.chunks(PROBE_CHUNK_BYTES) {
            video_tx.send(Bytes::copy_from_slice(chunk)).await?;
        }
        Ok::<_, ScreenflowError>(())
    });

    let decoded = tokio::time::timeout(
        limit,
        FrameDecoder::new(publisher).run(stdout, cancel.clone()),
    )
    .await;

    cancel.cancel();
    transcoder.kill().await;
    producer.abort();
    if let Ok(Err(e)) = feeder.await {
        debug!(error = %e, "feed loop ended with error");
    }

    let timed_out = match decoded {
        Err(_) => {
            warn!(?limit, "probe limit reached");
            true
        }
        Ok(Err(ScreenflowError::Io(e))) if e.kind() == std::io::ErrorKind::UnexpectedEof => false,
        Ok(Err(e)) => return Err(e),
        Ok(Ok(())) => false,
    };

    let stats = feed.stats();
    let report = ProbeReport {
        program: config.program.clone(),
        input_bytes,
        frames: stats.total_frames,
        frame_bytes: stats.total_bytes,
        width: stats.width,
        height: stats.height,
        timed_out,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(frames = report.frames, timed_out, "probe finished");
    Ok(report)
}
