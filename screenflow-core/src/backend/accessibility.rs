//! Accessibility service seam.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ScreenflowError;
use crate::protocol::{ClickTarget, GlobalAction, ScreenView, SwipeStart};

/// RPC client for an on-device accessibility service.
///
/// Preferred over raw transport input whenever it is registered.
#[async_trait]
pub trait Accessibility: Send + Sync {
    /// Liveness probe, used once when the session is built.
    async fn ping(&self) -> Result<(), ScreenflowError>;

    /// Current view hierarchy.
    async fn screen_dump(&self) -> Result<ScreenView, ScreenflowError>;

    async fn click(&self, target: ClickTarget, hold: Duration) -> Result<(), ScreenflowError>;

    /// Swipe by `(dx, dy)` starting from `start`.
    async fn swipe(
        &self,
        start: SwipeStart,
        dx: i32,
        dy: i32,
        duration: Duration,
    ) -> Result<(), ScreenflowError>;

    async fn type_text(&self, text: &str) -> Result<(), ScreenflowError>;

    async fn global_action(&self, action: GlobalAction) -> Result<(), ScreenflowError>;
}
