//! Input, clipboard and control actions.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::backend::Transport;
use crate::error::ScreenflowError;
use crate::events::EventKind;
use crate::geometry::Point;
use crate::protocol::{
    ClickTarget, ControlMessage, ElementSelector, GlobalAction, KeyEvent, SwipeStart, SystemKey,
    TouchEvent,
};

use super::{DEFAULT_SWIPE_DURATION, DEFAULT_TAP_HOLD, KEY_PRESS_HOLD, SWIPE_STEP, Session};

impl Session {
    /// Press and release at `point`, holding for `hold` (20 ms by default).
    pub async fn tap(&self, point: Point, hold: Option<Duration>) -> Result<(), ScreenflowError> {
        let hold = hold.unwrap_or(DEFAULT_TAP_HOLD);
        self.ensure_open()?;

        if let Some(a11y) = &self.accessibility {
            a11y.click(ClickTarget::Point(point), hold).await?;
        } else {
            let transport = self.transport_for("tap")?;
            transport.send(ControlMessage::Touch(TouchEvent::down(point))).await?;
            sleep(hold).await;
            transport.send(ControlMessage::Touch(TouchEvent::up(point))).await?;
        }

        debug!(%point, ?hold, "tap");
        self.events.emit(EventKind::Touch { point });
        Ok(())
    }

    /// Drag from `from` to `to` over `duration` (200 ms by default).
    ///
    /// On the transport path the drag is interpolated in 10 ms steps of
    /// equal size; the final release lands exactly on `to`. If a move fails
    /// the touch is released where it stopped before the error is returned.
    pub async fn swipe(
        &self,
        from: Point,
        to: Point,
        duration: Option<Duration>,
    ) -> Result<(), ScreenflowError> {
        let duration = duration.unwrap_or(DEFAULT_SWIPE_DURATION);
        self.ensure_open()?;
        let (dx, dy) = (to.x.saturating_sub(from.x), to.y.saturating_sub(from.y));

        if let Some(a11y) = &self.accessibility {
            a11y.swipe(SwipeStart::Point(from), dx, dy, duration).await?;
        } else {
            let transport = self.transport_for("swipe")?;
            let steps = swipe_steps(duration);
            let (step_x, step_y) = (dx / steps, dy / steps);

            transport.send(ControlMessage::Touch(TouchEvent::down(from))).await?;
            let mut at = from;
            for _ in 0..steps {
                let next = at.offset(step_x, step_y);
                if let Err(e) = transport.send(ControlMessage::Touch(TouchEvent::moved(next))).await {
                    release_touch(&**transport, at).await;
                    return Err(e);
                }
                at = next;
                sleep(SWIPE_STEP).await;
            }
            transport.send(ControlMessage::Touch(TouchEvent::up(to))).await?;
        }

        debug!(%from, %to, ?duration, "swipe");
        self.events.emit(EventKind::Touch { point: from });
        Ok(())
    }

    /// Enter `text` into the focused field.
    pub async fn type_text(&self, text: &str) -> Result<(), ScreenflowError> {
        self.ensure_open()?;
        if let Some(a11y) = &self.accessibility {
            a11y.type_text(text).await?;
        } else {
            self.transport_for("type_text")?
                .send(ControlMessage::Text(text.to_string()))
                .await?;
        }
        self.events.emit(EventKind::TypeText {
            text: text.to_string(),
        });
        Ok(())
    }

    /// Press a system navigation key.
    pub async fn press_key(&self, key: SystemKey) -> Result<(), ScreenflowError> {
        self.ensure_open()?;
        if let Some(a11y) = &self.accessibility {
            a11y.global_action(GlobalAction::from(key)).await?;
        } else {
            let transport = self.transport_for("press_key")?;
            let code = key.keycode();
            transport.send(ControlMessage::Key(KeyEvent::down(code))).await?;
            sleep(KEY_PRESS_HOLD).await;
            transport.send(ControlMessage::Key(KeyEvent::up(code))).await?;
        }
        debug!(?key, "key pressed");
        self.events.emit(EventKind::PressKey {
            keycodes: vec![key.keycode()],
        });
        Ok(())
    }

    /// Press `keycodes` together: all down, hold, all up in reverse.
    ///
    /// Every key that went down is sent up again even when a send fails;
    /// the first failure is returned.
    pub async fn press_keys(&self, keycodes: &[u32], hold: Duration) -> Result<(), ScreenflowError> {
        let transport = self.transport_for("press_keys")?;
        if keycodes.is_empty() {
            return Ok(());
        }
        for (pressed, &code) in keycodes.iter().enumerate() {
            if let Err(e) = transport.send(ControlMessage::Key(KeyEvent::down(code))).await {
                release_keys(&**transport, &keycodes[..pressed]).await;
                return Err(e);
            }
        }
        sleep(hold).await;
        for (i, &code) in keycodes.iter().enumerate().rev() {
            if let Err(e) = transport.send(ControlMessage::Key(KeyEvent::up(code))).await {
                release_keys(&**transport, &keycodes[..i]).await;
                return Err(e);
            }
        }
        debug!(?keycodes, ?hold, "chord pressed");
        self.events.emit(EventKind::PressKey {
            keycodes: keycodes.to_vec(),
        });
        Ok(())
    }

    /// Set the device clipboard, optionally pasting it into the focused
    /// field.
    pub async fn set_clipboard(&self, text: &str, paste: bool) -> Result<(), ScreenflowError> {
        let transport = self.transport_for("set_clipboard")?;
        let sequence = self.clipboard_seq.fetch_add(1, Ordering::Relaxed) + 1;
        transport
            .send(ControlMessage::SetClipboard {
                sequence,
                text: text.to_string(),
                paste,
            })
            .await?;
        if paste {
            self.events.emit(EventKind::PasteText {
                text: text.to_string(),
            });
        }
        Ok(())
    }

    /// Ask the device for its clipboard and wait for the reply.
    ///
    /// `copy_key` is forwarded to the device (0 leaves the selection alone).
    pub async fn get_clipboard(&self, copy_key: u8) -> Result<String, ScreenflowError> {
        let transport = self.transport_for("get_clipboard")?;
        let mut replies = self.clipboard.clone();
        // Only replies that arrive after this request count.
        replies.borrow_and_update();

        transport.send(ControlMessage::GetClipboard { copy_key }).await?;

        let limit = self.config.clipboard_timeout();
        let cancel = self.supervisor.token();
        let reply = tokio::select! {
            _ = cancel.cancelled() => return Err(self.closed_error()),
            changed = timeout(limit, replies.changed()) => changed,
        };
        match reply {
            Ok(Ok(())) => Ok(replies.borrow_and_update().clone().unwrap_or_default()),
            Ok(Err(_)) => Err(self.closed_error()),
            Err(_) => Err(ScreenflowError::Timeout(limit)),
        }
    }

    /// Send a raw control message.
    pub async fn control(&self, message: ControlMessage) -> Result<(), ScreenflowError> {
        let transport = self.transport_for("control")?;
        debug!(kind = message.kind(), "control message");
        transport.send(message).await
    }

    // ── Accessibility-only actions ──────────────────────────────

    /// Click the first element matching `selector`.
    pub async fn tap_element(
        &self,
        selector: &ElementSelector,
        hold: Option<Duration>,
    ) -> Result<(), ScreenflowError> {
        let a11y = self.accessibility_for("tap_element")?;
        a11y.click(
            ClickTarget::Element(selector.clone()),
            hold.unwrap_or(DEFAULT_TAP_HOLD),
        )
        .await
    }

    /// Swipe by `(dx, dy)` starting on the element matching `selector`.
    pub async fn swipe_element(
        &self,
        selector: &ElementSelector,
        dx: i32,
        dy: i32,
        duration: Option<Duration>,
    ) -> Result<(), ScreenflowError> {
        let a11y = self.accessibility_for("swipe_element")?;
        a11y.swipe(
            SwipeStart::Element(selector.clone()),
            dx,
            dy,
            duration.unwrap_or(DEFAULT_SWIPE_DURATION),
        )
        .await
    }

    pub async fn screen_dump(&self) -> Result<crate::protocol::ScreenView, ScreenflowError> {
        self.accessibility_for("screen_dump")?.screen_dump().await
    }
}

/// Best-effort touch release after a failed gesture.
async fn release_touch(transport: &dyn Transport, at: Point) {
    if let Err(e) = transport.send(ControlMessage::Touch(TouchEvent::up(at))).await {
        warn!(%at, error = %e, "touch release failed");
    }
}

/// Best-effort release of `keycodes` in reverse order.
async fn release_keys(transport: &dyn Transport, keycodes: &[u32]) {
    for &code in keycodes.iter().rev() {
        if let Err(e) = transport.send(ControlMessage::Key(KeyEvent::up(code))).await {
            warn!(code, error = %e, "key release failed");
        }
    }
}

/// Number of interpolated moves for a swipe lasting `duration`.
pub(crate) fn swipe_steps(duration: Duration) -> i32 {
    let steps = duration.as_millis() / SWIPE_STEP.as_millis();
    i32::try_from(steps).unwrap_or(i32::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swipe_steps_follow_duration() {
        assert_eq!(swipe_steps(Duration::from_millis(200)), 20);
        assert_eq!(swipe_steps(Duration::from_millis(15)), 1);
        assert_eq!(swipe_steps(Duration::ZERO), 1);
    }
}
