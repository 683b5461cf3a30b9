//! Control transport seam.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ScreenflowError;
use crate::protocol::{ControlMessage, DeviceInfo, DeviceReply};

/// A connection to the device's screen/control service.
///
/// Implementations own the wire encoding. The session calls
/// [`handshake`](Transport::handshake) once, runs
/// [`serve`](Transport::serve) as a supervised loop, and issues
/// [`send`](Transport::send) from any task.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection and report the device.
    async fn handshake(&self) -> Result<DeviceInfo, ScreenflowError>;

    /// Pump device traffic until `cancel` fires or the connection fails.
    ///
    /// Raw video units go to `video_tx` when a video path is wired
    /// (`None` for an input-only session). Device replies go to
    /// `reply_tx`. Returning `Err` fails the session.
    async fn serve(
        &self,
        video_tx: Option<mpsc::Sender<Bytes>>,
        reply_tx: mpsc::Sender<DeviceReply>,
        cancel: CancellationToken,
    ) -> Result<(), ScreenflowError>;

    /// Deliver one control message.
    async fn send(&self, message: ControlMessage) -> Result<(), ScreenflowError>;
}
