//! Mock backends shared by the integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgb, RgbImage};
use screenflow_core::protocol::InputAction;
use screenflow_core::{
    Accessibility, ClickTarget, ControlMessage, DeviceInfo, DeviceReply, GlobalAction,
    ScreenView, ScreenflowError, SwipeStart, Transport,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ── Images ───────────────────────────────────────────────────────

/// Deterministic blocky texture; every 8×8 cell has its own colour.
pub fn textured(w: u32, h: u32, seed: u32) -> RgbImage {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    let cells_x = w.div_ceil(8);
    let cells: Vec<u8> = (0..cells_x * h.div_ceil(8))
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect();
    RgbImage::from_fn(w, h, |x, y| {
        let v = cells[((y / 8) * cells_x + x / 8) as usize];
        Rgb([v, 255 - v, v / 2])
    })
}

pub fn encode_jpeg(img: &RgbImage) -> Bytes {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
    Bytes::from(out.into_inner())
}

// ── MockTransport ────────────────────────────────────────────────

/// What the mock streams once `serve` starts.
#[derive(Debug, Clone, Default)]
pub enum VideoScript {
    #[default]
    Silent,
    /// Send these units once.
    Once(Vec<Bytes>),
    /// Send this unit repeatedly until cancelled.
    Repeat(Bytes, Duration),
    /// Send these units in turn, one every interval, until cancelled.
    Cycle(Vec<Bytes>, Duration),
}

/// Records every control message with the (tokio) instant it was sent.
#[derive(Default)]
pub struct MockTransport {
    pub device: DeviceInfo,
    pub handshake_error: Option<String>,
    pub serve_error: Option<String>,
    pub video: VideoScript,
    pub clipboard: Option<String>,
    /// Zero-based send attempt that fails with a transport error.
    pub fail_send_at: Option<usize>,
    pub attempts: Mutex<usize>,
    pub sent: Mutex<Vec<(Instant, ControlMessage)>>,
    pub replies: Mutex<Option<mpsc::Sender<DeviceReply>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            device: DeviceInfo {
                name: "mock-device".into(),
                width: 1080,
                height: 2340,
            },
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(Instant, ControlMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<ControlMessage> {
        self.sent().into_iter().map(|(_, m)| m).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn handshake(&self) -> Result<DeviceInfo, ScreenflowError> {
        match &self.handshake_error {
            Some(e) => Err(ScreenflowError::Dial(e.clone())),
            None => Ok(self.device.clone()),
        }
    }

    async fn serve(
        &self,
        video_tx: Option<mpsc::Sender<Bytes>>,
        reply_tx: mpsc::Sender<DeviceReply>,
        cancel: CancellationToken,
    ) -> Result<(), ScreenflowError> {
        if let Some(e) = &self.serve_error {
            return Err(ScreenflowError::Transport(e.clone()));
        }
        *self.replies.lock().unwrap() = Some(reply_tx);

        if let Some(video_tx) = &video_tx {
            match &self.video {
                VideoScript::Silent => {}
                VideoScript::Once(units) => {
                    for unit in units {
                        video_tx.send(unit.clone()).await?;
                    }
                }
                VideoScript::Repeat(unit, every) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(*every) => video_tx.send(unit.clone()).await?,
                    }
                },
                VideoScript::Cycle(units, every) => {
                    for unit in units.iter().cycle() {
                        tokio::select! {
                            _ = cancel.cancelled() => return Ok(()),
                            _ = tokio::time::sleep(*every) => video_tx.send(unit.clone()).await?,
                        }
                    }
                }
            }
        }

        cancel.cancelled().await;
        Ok(())
    }

    async fn send(&self, message: ControlMessage) -> Result<(), ScreenflowError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            *attempts - 1
        };
        if self.fail_send_at == Some(attempt) {
            return Err(ScreenflowError::Transport("link dropped".into()));
        }
        if let ControlMessage::GetClipboard { .. } = message {
            let reply_tx = self.replies.lock().unwrap().clone();
            if let (Some(text), Some(tx)) = (&self.clipboard, reply_tx) {
                tx.try_send(DeviceReply::Clipboard(text.clone()))
                    .map_err(|_| ScreenflowError::ChannelClosed)?;
            }
        }
        self.sent.lock().unwrap().push((Instant::now(), message));
        Ok(())
    }
}

pub fn touch_action(message: &ControlMessage) -> Option<(InputAction, i32, i32)> {
    match message {
        ControlMessage::Touch(t) => Some((t.action, t.position.x, t.position.y)),
        _ => None,
    }
}

// ── MockAccessibility ────────────────────────────────────────────

/// Records calls as short strings and serves a fixed view tree.
#[derive(Default)]
pub struct MockAccessibility {
    pub unreachable: bool,
    pub tree: ScreenView,
    pub calls: Mutex<Vec<String>>,
}

impl MockAccessibility {
    pub fn with_tree(tree: ScreenView) -> Self {
        Self {
            tree,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Accessibility for MockAccessibility {
    async fn ping(&self) -> Result<(), ScreenflowError> {
        if self.unreachable {
            return Err(ScreenflowError::Accessibility("connection refused".into()));
        }
        Ok(())
    }

    async fn screen_dump(&self) -> Result<ScreenView, ScreenflowError> {
        self.record("dump".into());
        Ok(self.tree.clone())
    }

    async fn click(&self, target: ClickTarget, hold: Duration) -> Result<(), ScreenflowError> {
        let call = match target {
            ClickTarget::Point(p) => format!("click {p} {}ms", hold.as_millis()),
            ClickTarget::Element(sel) => format!("click {sel:?}"),
        };
        self.record(call);
        Ok(())
    }

    async fn swipe(
        &self,
        start: SwipeStart,
        dx: i32,
        dy: i32,
        duration: Duration,
    ) -> Result<(), ScreenflowError> {
        let from = match start {
            SwipeStart::Point(p) => p.to_string(),
            SwipeStart::Element(sel) => format!("{sel:?}"),
        };
        self.record(format!("swipe {from} by ({dx}, {dy}) {}ms", duration.as_millis()));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), ScreenflowError> {
        self.record(format!("type {text}"));
        Ok(())
    }

    async fn global_action(&self, action: GlobalAction) -> Result<(), ScreenflowError> {
        self.record(format!("global {action:?}"));
        Ok(())
    }
}

pub fn node(id: &str, text: &str, children: Vec<ScreenView>) -> ScreenView {
    ScreenView {
        unique_id: id.into(),
        text: text.into(),
        children,
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
