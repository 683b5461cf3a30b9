//! A connected device session.
//!
//! A [`Session`] is assembled by a [`SessionBuilder`] from an ordered list
//! of [`BackendOption`]s. Once connected, its capability set is fixed and
//! every action dispatches to the most capable backend present:
//!
//! ```text
//!   accessibility  ──►  raw transport input  ──►  vision-resolved points
//! ```
//!
//! Background work (transport serve, video feed, frame decode, vision,
//! reply routing) runs under one [`Supervisor`]. The first loop failure
//! closes the session; later calls report it as
//! [`ScreenflowError::SessionClosed`].

mod actions;
mod builder;
pub mod capabilities;
mod waits;

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::backend::{Accessibility, Transport};
use crate::error::{LoopError, ScreenflowError};
use crate::events::{EventBus, SessionEvent};
use crate::frame::{Frame, FrameFeed, FrameSubscription, Transcoder};
use crate::protocol::DeviceInfo;
use crate::task::Supervisor;
use crate::vision::{Matcher, VisionHandle};

pub use builder::{BackendOption, SessionBuilder};
pub use capabilities::Capabilities;

/// Default press duration for taps.
pub const DEFAULT_TAP_HOLD: Duration = Duration::from_millis(20);
/// Default swipe duration.
pub const DEFAULT_SWIPE_DURATION: Duration = Duration::from_millis(200);
/// Interval between interpolated swipe moves.
pub const SWIPE_STEP: Duration = Duration::from_millis(10);
/// Press duration for system keys on the transport path.
pub const KEY_PRESS_HOLD: Duration = Duration::from_millis(50);
/// Poll interval for image and element waits.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Gap between the two frames compared by a static-frame wait.
pub const STATIC_FRAME_INTERVAL: Duration = Duration::from_millis(250);

// ── SessionConfig ────────────────────────────────────────────────

/// Session-level timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// How long to wait for the first decoded frame, in milliseconds.
    pub ready_timeout_ms: u64,
    /// How long to wait for a clipboard reply, in milliseconds.
    pub clipboard_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 1_000,
            clipboard_timeout_ms: 2_000,
        }
    }
}

impl SessionConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn clipboard_timeout(&self) -> Duration {
        Duration::from_millis(self.clipboard_timeout_ms)
    }
}

// ── Session ──────────────────────────────────────────────────────

/// One-shot locator used by `locate` and flow triggers.
#[derive(Clone)]
struct Locator {
    matcher: Arc<dyn Matcher>,
    max_side: u32,
}

/// A live connection to one device.
pub struct Session {
    config: SessionConfig,
    capabilities: Capabilities,
    device: Option<DeviceInfo>,
    transport: Option<Arc<dyn Transport>>,
    accessibility: Option<Arc<dyn Accessibility>>,
    frames: Option<FrameFeed>,
    vision: Option<VisionHandle>,
    locator: Locator,
    clipboard: watch::Receiver<Option<String>>,
    clipboard_seq: AtomicU64,
    events: EventBus,
    supervisor: Supervisor,
    failures: watch::Receiver<Option<LoopError>>,
    transcoder: Option<Transcoder>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("capabilities", &self.capabilities)
            .field("device", &self.device)
            .field("loops", &self.supervisor.names())
            .field("matcher", &self.locator.matcher.name())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Handshake result of the transport, if one is configured.
    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Most recent decoded frame.
    pub fn latest_frame(&self) -> Option<Frame> {
        self.frames.as_ref().and_then(FrameFeed::latest)
    }

    /// Live latest-wins frame stream; `None` without a video path.
    pub fn frames(&self) -> Option<FrameSubscription> {
        self.frames.as_ref().map(FrameFeed::subscribe)
    }

    /// Stream of actions performed through this session.
    pub fn events(&self) -> mpsc::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The loop failure that closed this session, if any.
    pub fn failure(&self) -> Option<LoopError> {
        self.failures.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.supervisor.is_cancelled()
    }

    /// Stop every background loop and the transcoder.
    pub async fn close(mut self) {
        info!(loops = ?self.supervisor.names(), "closing session");
        self.supervisor.token().cancel();
        if let Some(transcoder) = self.transcoder.as_mut() {
            transcoder.kill().await;
        }
        self.supervisor.shutdown().await;
        info!("session closed");
    }

    // ── Dispatch helpers ─────────────────────────────────────────

    /// Error describing why the session stopped.
    fn closed_error(&self) -> ScreenflowError {
        match self.failure() {
            Some(failure) => ScreenflowError::SessionClosed(failure),
            None => ScreenflowError::Cancelled,
        }
    }

    fn ensure_open(&self) -> Result<(), ScreenflowError> {
        if self.supervisor.is_cancelled() {
            return Err(self.closed_error());
        }
        Ok(())
    }

    fn transport_for(&self, action: &'static str) -> Result<&Arc<dyn Transport>, ScreenflowError> {
        self.ensure_open()?;
        self.transport
            .as_ref()
            .ok_or(ScreenflowError::NoBackend { action })
    }

    fn accessibility_for(
        &self,
        action: &'static str,
    ) -> Result<&Arc<dyn Accessibility>, ScreenflowError> {
        self.ensure_open()?;
        self.accessibility
            .as_ref()
            .ok_or(ScreenflowError::NoBackend { action })
    }

    fn frames_for(&self, action: &'static str) -> Result<&FrameFeed, ScreenflowError> {
        self.ensure_open()?;
        self.frames
            .as_ref()
            .ok_or(ScreenflowError::NoBackend { action })
    }

    fn vision_for(&self, action: &'static str) -> Result<&VisionHandle, ScreenflowError> {
        self.ensure_open()?;
        self.vision
            .as_ref()
            .ok_or(ScreenflowError::NoBackend { action })
    }
}
