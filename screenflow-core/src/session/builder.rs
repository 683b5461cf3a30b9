//! Session construction: apply backend options in order, spawn the
//! background loops, then wait for the first frame.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{Accessibility, Transport};
use crate::error::{LoopError, ScreenflowError};
use crate::events::EventBus;
use crate::frame::{FrameDecoder, FrameFeed, Transcoder, TranscoderConfig, feed_loop, frame_channel};
use crate::protocol::{DeviceInfo, DeviceReply};
use crate::task::{Supervisor, wait_failure};
use crate::vision::{NccMatcher, VisionConfig, VisionHandle, matcher_for, vision_channel};

use super::{Capabilities, Locator, Session, SessionConfig};

/// Raw video units buffered between the transport and the transcoder.
const VIDEO_QUEUE_DEPTH: usize = 256;
/// Device replies buffered before routing.
const REPLY_QUEUE_DEPTH: usize = 16;

/// One backend to wire into a session.
pub enum BackendOption {
    /// A control transport; with a transcoder config it also carries video.
    Transport {
        transport: Arc<dyn Transport>,
        transcoder: Option<TranscoderConfig>,
    },
    /// An accessibility service, probed before use.
    Accessibility(Arc<dyn Accessibility>),
    /// Stable template matching over the frame feed.
    Vision(VisionConfig),
}

impl BackendOption {
    /// An input-only transport.
    pub fn transport(transport: Arc<dyn Transport>) -> Self {
        Self::Transport {
            transport,
            transcoder: None,
        }
    }

    /// A transport whose video is decoded through `transcoder`.
    pub fn transport_with_video(transport: Arc<dyn Transport>, transcoder: TranscoderConfig) -> Self {
        Self::Transport {
            transport,
            transcoder: Some(transcoder),
        }
    }

    pub fn accessibility(client: Arc<dyn Accessibility>) -> Self {
        Self::Accessibility(client)
    }

    pub fn vision(config: VisionConfig) -> Self {
        Self::Vision(config)
    }

    fn name(&self) -> &'static str {
        match self {
            BackendOption::Transport { .. } => "transport",
            BackendOption::Accessibility(_) => "accessibility",
            BackendOption::Vision(_) => "vision",
        }
    }
}

impl std::fmt::Debug for BackendOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendOption::Transport { transcoder, .. } => f
                .debug_struct("Transport")
                .field("transcoder", transcoder)
                .finish_non_exhaustive(),
            BackendOption::Accessibility(_) => f.write_str("Accessibility(..)"),
            BackendOption::Vision(cfg) => f.debug_tuple("Vision").field(cfg).finish(),
        }
    }
}

/// Collects options and connects a [`Session`].
#[derive(Debug, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    options: Vec<BackendOption>,
}

impl SessionBuilder {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            options: Vec::new(),
        }
    }

    /// Append a backend; options are applied in the order given.
    pub fn with(mut self, option: BackendOption) -> Self {
        self.options.push(option);
        self
    }

    /// Apply every option, start the loops and wait until the session is
    /// ready.
    ///
    /// Any failure tears down what was built so far and is returned as is.
    pub async fn connect(self) -> Result<Session, ScreenflowError> {
        self.connect_with_token(CancellationToken::new()).await
    }

    /// Like [`connect`](Self::connect), with loops cancelled when `parent`
    /// is.
    pub async fn connect_with_token(
        self,
        parent: CancellationToken,
    ) -> Result<Session, ScreenflowError> {
        let SessionBuilder { config, options } = self;
        let mut wiring = Wiring::new(Supervisor::with_token(parent.child_token()));

        for option in options {
            let name = option.name();
            if let Err(e) = wiring.apply(option).await {
                warn!(option = name, error = %e, "session construction failed");
                wiring.teardown().await;
                return Err(e);
            }
            debug!(option = name, "backend option applied");
        }

        if let Some(feed) = wiring.frames.clone() {
            let failures = wiring.supervisor.failure_watch();
            if let Err(e) = await_first_frame(&feed, failures, config.ready_timeout()).await {
                warn!(error = %e, "session not ready");
                wiring.teardown().await;
                return Err(e);
            }
        }

        let session = wiring.finish(config);
        info!(
            capabilities = %session.capabilities(),
            device = ?session.device_info().map(|d| d.name.as_str()),
            "session connected"
        );
        Ok(session)
    }
}

/// Block until the first frame, a loop failure, or the deadline.
async fn await_first_frame(
    feed: &FrameFeed,
    failures: watch::Receiver<Option<LoopError>>,
    ready_timeout: Duration,
) -> Result<(), ScreenflowError> {
    let deadline = Instant::now() + ready_timeout;
    let first = tokio::select! {
        biased;
        failure = wait_failure(failures.clone()) => return Err(failure.into()),
        first = timeout_at(deadline, feed.wait_first()) => first,
    };

    match first {
        Ok(Ok(frame)) => {
            debug!(seq = frame.seq, width = frame.width(), height = frame.height(), "first frame");
            Ok(())
        }
        // The decoder is gone; its loop error is about to be recorded.
        Ok(Err(_)) => match timeout_at(deadline, wait_failure(failures)).await {
            Ok(failure) => Err(failure.into()),
            Err(_) => Err(ScreenflowError::NotReady(ready_timeout)),
        },
        Err(_) => Err(ScreenflowError::NotReady(ready_timeout)),
    }
}

// ── Wiring ───────────────────────────────────────────────────────

/// Session parts assembled while options are applied.
struct Wiring {
    supervisor: Supervisor,
    capabilities: Capabilities,
    device: Option<DeviceInfo>,
    transport: Option<Arc<dyn Transport>>,
    accessibility: Option<Arc<dyn Accessibility>>,
    frames: Option<FrameFeed>,
    vision: Option<VisionHandle>,
    locator: Locator,
    clipboard_tx: watch::Sender<Option<String>>,
    transcoder: Option<Transcoder>,
}

impl Wiring {
    fn new(supervisor: Supervisor) -> Self {
        let defaults = VisionConfig::default();
        Self {
            supervisor,
            capabilities: Capabilities::empty(),
            device: None,
            transport: None,
            accessibility: None,
            frames: None,
            vision: None,
            locator: Locator {
                matcher: Arc::new(NccMatcher::new(defaults.match_confidence)),
                max_side: defaults.max_side,
            },
            clipboard_tx: watch::channel(None).0,
            transcoder: None,
        }
    }

    async fn apply(&mut self, option: BackendOption) -> Result<(), ScreenflowError> {
        match option {
            BackendOption::Transport {
                transport,
                transcoder,
            } => self.apply_transport(transport, transcoder).await,
            BackendOption::Accessibility(client) => self.apply_accessibility(client).await,
            BackendOption::Vision(config) => self.apply_vision(config),
        }
    }

    async fn apply_transport(
        &mut self,
        transport: Arc<dyn Transport>,
        transcoder: Option<TranscoderConfig>,
    ) -> Result<(), ScreenflowError> {
        if self.transport.is_some() {
            return Err(ScreenflowError::Dial("a transport is already configured".into()));
        }

        let device = transport.handshake().await.map_err(|e| match e {
            ScreenflowError::Dial(_) => e,
            other => ScreenflowError::Dial(other.to_string()),
        })?;
        info!(device = %device.name, width = device.width, height = device.height, "transport handshake complete");

        let token = self.supervisor.token();
        let video_tx = match transcoder {
            Some(cfg) => Some(self.start_video(&cfg, &token)?),
            None => None,
        };

        let (reply_tx, reply_rx) = mpsc::channel(REPLY_QUEUE_DEPTH);
        let serving = Arc::clone(&transport);
        let serve_token = token.clone();
        self.supervisor.spawn("serve", async move {
            serving.serve(video_tx, reply_tx, serve_token).await
        });
        self.supervisor
            .spawn("replies", route_replies(reply_rx, self.clipboard_tx.clone(), token));

        self.device = Some(device);
        self.transport = Some(transport);
        self.capabilities |= Capabilities::TRANSPORT;
        Ok(())
    }

    /// Spawn the transcoder with its feed and decode loops.
    fn start_video(
        &mut self,
        config: &TranscoderConfig,
        token: &CancellationToken,
    ) -> Result<mpsc::Sender<Bytes>, ScreenflowError> {
        let mut transcoder = Transcoder::spawn(config)?;
        let stdin = transcoder.take_stdin()?;
        let stdout = transcoder.take_stdout()?;
        self.transcoder = Some(transcoder);

        let (video_tx, video_rx) = mpsc::channel(VIDEO_QUEUE_DEPTH);
        let (publisher, feed) = frame_channel();

        self.supervisor
            .spawn("feed", feed_loop(stdin, video_rx, token.clone()));
        self.supervisor
            .spawn("decode", FrameDecoder::new(publisher).run(stdout, token.clone()));

        self.frames = Some(feed);
        self.capabilities |= Capabilities::FRAMES;
        Ok(video_tx)
    }

    async fn apply_accessibility(
        &mut self,
        client: Arc<dyn Accessibility>,
    ) -> Result<(), ScreenflowError> {
        client
            .ping()
            .await
            .map_err(|e| ScreenflowError::AccessibilityUnavailable(e.to_string()))?;
        info!("accessibility service reachable");
        self.accessibility = Some(client);
        self.capabilities |= Capabilities::ACCESSIBILITY;
        Ok(())
    }

    fn apply_vision(&mut self, config: VisionConfig) -> Result<(), ScreenflowError> {
        let Some(feed) = &self.frames else {
            return Err(ScreenflowError::VisionRequiresFrames);
        };
        if self.vision.is_some() {
            return Err(ScreenflowError::Other("vision is already configured".into()));
        }

        let matcher = matcher_for(&config);
        info!(algorithm = %config.algorithm, max_side = config.max_side, "vision enabled");
        self.locator = Locator {
            matcher: Arc::clone(&matcher),
            max_side: config.max_side,
        };

        let (pipeline, handle) = vision_channel(config, matcher);
        let frames = feed.subscribe();
        self.supervisor
            .spawn("vision", pipeline.run(frames, self.supervisor.token()));

        self.vision = Some(handle);
        self.capabilities |= Capabilities::VISION;
        Ok(())
    }

    async fn teardown(&mut self) {
        self.supervisor.token().cancel();
        if let Some(transcoder) = self.transcoder.as_mut() {
            transcoder.kill().await;
        }
        self.supervisor.shutdown().await;
    }

    fn finish(self, config: SessionConfig) -> Session {
        Session {
            config,
            capabilities: self.capabilities,
            device: self.device,
            transport: self.transport,
            accessibility: self.accessibility,
            frames: self.frames,
            vision: self.vision,
            locator: self.locator,
            clipboard: self.clipboard_tx.subscribe(),
            clipboard_seq: AtomicU64::new(0),
            events: EventBus::new(),
            failures: self.supervisor.failure_watch(),
            supervisor: self.supervisor,
            transcoder: self.transcoder,
        }
    }
}

/// Route device replies to the slots actions wait on.
async fn route_replies(
    mut replies: mpsc::Receiver<DeviceReply>,
    clipboard: watch::Sender<Option<String>>,
    cancel: CancellationToken,
) -> Result<(), ScreenflowError> {
    loop {
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            reply = replies.recv() => match reply {
                Some(reply) => reply,
                None => return Ok(()),
            },
        };
        match reply {
            DeviceReply::Clipboard(text) => {
                debug!(len = text.len(), "clipboard reply");
                clipboard.send_replace(Some(text));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vision_without_frames_is_rejected() {
        let err = SessionBuilder::new(SessionConfig::default())
            .with(BackendOption::vision(VisionConfig::default()))
            .connect()
            .await
            .unwrap_err();
        assert!(matches!(err, ScreenflowError::VisionRequiresFrames));
    }

    #[tokio::test]
    async fn empty_builder_connects_without_capabilities() {
        let session = SessionBuilder::default().connect().await.unwrap();
        assert!(session.capabilities().is_empty());
        assert!(session.device_info().is_none());
        let err = session.tap(crate::geometry::Point::new(1, 1), None).await.unwrap_err();
        assert!(matches!(err, ScreenflowError::NoBackend { action: "tap" }));
        session.close().await;
    }

    #[tokio::test]
    async fn replies_update_clipboard_slot() {
        let (tx, rx) = mpsc::channel(4);
        let (clip_tx, mut clip_rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let router = tokio::spawn(route_replies(rx, clip_tx, cancel.clone()));

        tx.send(DeviceReply::Clipboard("copied".into())).await.unwrap();
        clip_rx.changed().await.unwrap();
        assert_eq!(clip_rx.borrow().as_deref(), Some("copied"));

        cancel.cancel();
        router.await.unwrap().unwrap();
    }
}
