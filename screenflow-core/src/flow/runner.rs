//! Sequential, cancellable execution of a [`Flow`].

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ScreenflowError;
use crate::geometry::{Point, Rect};
use crate::protocol::DeviceInfo;
use crate::session::Session;

use super::Flow;
use super::step::{Action, FlowStep, ImageTrigger};

/// Progress of one flow run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowState {
    pub started_at: SystemTime,
    /// Set when the run ends, successfully or not.
    pub ended_at: Option<SystemTime>,
    pub steps_count: usize,
    pub completed_steps: usize,
    pub device: Option<DeviceInfo>,
}

impl FlowState {
    fn start(steps_count: usize, device: Option<DeviceInfo>) -> Self {
        Self {
            started_at: SystemTime::now(),
            ended_at: None,
            steps_count,
            completed_steps: 0,
            device,
        }
    }

    fn finish(mut self) -> Self {
        self.ended_at = Some(SystemTime::now());
        self
    }

    /// Wall time of the run so far, or of the whole run once it ended.
    pub fn elapsed(&self) -> Duration {
        let end = self.ended_at.unwrap_or_else(SystemTime::now);
        end.duration_since(self.started_at).unwrap_or_default()
    }

    pub fn is_complete(&self) -> bool {
        self.completed_steps == self.steps_count
    }
}

/// A failed run: the frozen state plus the error that stopped it.
#[derive(Debug, Error)]
#[error("flow stopped after {} of {} steps: {error}", .state.completed_steps, .state.steps_count)]
pub struct FlowFailure {
    pub state: FlowState,
    #[source]
    pub error: ScreenflowError,
}

impl Flow {
    /// Run every step in order against `session`.
    ///
    /// Cancellation is checked before each step and interrupts the step in
    /// progress. The first failing step aborts the run with
    /// [`ScreenflowError::Step`], whose index equals the number of steps
    /// completed before it.
    pub async fn run(
        &self,
        session: &Session,
        cancel: &CancellationToken,
    ) -> Result<FlowState, FlowFailure> {
        let mut state = FlowState::start(self.steps.len(), session.device_info().cloned());
        info!(steps = state.steps_count, "flow started");

        for (index, step) in self.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(step = index, "flow cancelled");
                return Err(FlowFailure {
                    state: state.finish(),
                    error: ScreenflowError::Cancelled,
                });
            }

            debug!(step = index, action = step.action.kind(), "step started");
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ScreenflowError::Cancelled),
                outcome = run_step(session, step) => outcome,
            };

            if let Err(e) = outcome {
                warn!(step = index, action = step.action.kind(), error = %e, "step failed");
                return Err(FlowFailure {
                    state: state.finish(),
                    error: e.at_step(index),
                });
            }
            state.completed_steps += 1;
        }

        let state = state.finish();
        info!(steps = state.steps_count, elapsed = ?state.elapsed(), "flow finished");
        Ok(state)
    }
}

async fn run_step(session: &Session, step: &FlowStep) -> Result<(), ScreenflowError> {
    delay(step.pre_delay).await;
    if let Some(trigger) = &step.pre_trigger {
        await_trigger(session, trigger).await?;
    }

    perform(session, &step.action).await?;

    delay(step.post_delay).await;
    if let Some(trigger) = &step.post_trigger {
        await_trigger(session, trigger).await?;
    }
    Ok(())
}

async fn delay(d: Duration) {
    if !d.is_zero() {
        sleep(d).await;
    }
}

async fn await_trigger(session: &Session, trigger: &ImageTrigger) -> Result<(), ScreenflowError> {
    let point = session
        .wait_visible(Arc::clone(&trigger.template), trigger.area, trigger.deadline)
        .await?;
    debug!(%point, "trigger satisfied");
    Ok(())
}

/// Resolve a template to a point for image-driven actions.
async fn resolve_image(
    session: &Session,
    template: &Arc<RgbImage>,
    area: Option<Rect>,
    wait: bool,
    deadline: Option<Duration>,
) -> Result<Point, ScreenflowError> {
    if wait {
        return session.wait_image(Arc::clone(template), area, deadline).await;
    }
    let point = session.find_within(Arc::clone(template), deadline).await?;
    match area {
        Some(area) if !area.contains(point) => Err(ScreenflowError::NotFound),
        _ => Ok(point),
    }
}

async fn perform(session: &Session, action: &Action) -> Result<(), ScreenflowError> {
    match action {
        Action::Tap { at, hold } => session.tap(*at, *hold).await,
        Action::Swipe { from, to, duration } => session.swipe(*from, *to, *duration).await,
        Action::TypeText(text) => session.type_text(text).await,
        Action::Key(key) => session.press_key(*key).await,
        Action::Keyboard { keycodes, hold } => session.press_keys(keycodes, *hold).await,
        Action::SetClipboard { text, paste } => session.set_clipboard(text, *paste).await,
        Action::Delay(d) => {
            delay(*d).await;
            Ok(())
        }
        Action::TapImage {
            template,
            area,
            wait,
            deadline,
            hold,
        } => {
            let point = resolve_image(session, template, *area, *wait, *deadline).await?;
            session.tap(point, *hold).await
        }
        Action::SwipeImage {
            template,
            offset,
            area,
            wait,
            deadline,
            duration,
        } => {
            let from = resolve_image(session, template, *area, *wait, *deadline).await?;
            session
                .swipe(from, from.offset(offset.x, offset.y), *duration)
                .await
        }
        Action::WaitImage {
            template,
            area,
            deadline,
        } => session
            .wait_image(Arc::clone(template), *area, *deadline)
            .await
            .map(|_| ()),
        Action::WaitStaticFrame {
            threshold,
            deadline,
        } => session.wait_static_frame(*threshold, *deadline).await,
        Action::TapElement { selector, hold } => session.tap_element(selector, *hold).await,
        Action::SwipeElement {
            selector,
            dx,
            dy,
            duration,
        } => session.swipe_element(selector, *dx, *dy, *duration).await,
        Action::WaitElement { selector, deadline } => session
            .wait_element(selector, *deadline)
            .await
            .map(|_| ()),
        Action::Custom(custom) => custom.call(session).await,
    }
}
