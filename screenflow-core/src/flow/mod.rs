//! Scripted sequences of device actions.
//!
//! A [`Flow`] is built fluently, one step per action call. Step modifiers
//! (`pre_delay`, `post_delay`, `pre_trigger`, `post_trigger`) apply to the
//! step added last.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use screenflow_core::flow::{Flow, ImageTrigger};
//! # use screenflow_core::{Point, SystemKey};
//! # fn demo(login_button: Arc<image::RgbImage>) {
//! let flow = Flow::new()
//!     .key(SystemKey::Home)
//!     .tap(Point::new(540, 1200))
//!     .pre_trigger(ImageTrigger::new(login_button).deadline(Duration::from_secs(5)))
//!     .type_text("hello")
//!     .post_delay(Duration::from_millis(300));
//! # }
//! ```

pub mod runner;
pub mod step;

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use image::RgbImage;

use crate::error::ScreenflowError;
use crate::geometry::{Point, Rect};
use crate::protocol::{ElementSelector, SystemKey};
use crate::session::Session;

pub use runner::{FlowFailure, FlowState};
pub use step::{Action, CustomAction, CustomFn, FlowStep, ImageTrigger};

/// An ordered list of steps.
#[derive(Debug, Clone, Default)]
pub struct Flow {
    steps: Vec<FlowStep>,
}

impl Flow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[FlowStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Append a prepared step.
    pub fn step(mut self, step: impl Into<FlowStep>) -> Self {
        self.steps.push(step.into());
        self
    }

    fn modify_last(mut self, f: impl FnOnce(&mut FlowStep)) -> Self {
        if let Some(last) = self.steps.last_mut() {
            f(last);
        }
        self
    }

    // ── Step modifiers ──────────────────────────────────────────

    pub fn pre_delay(self, delay: Duration) -> Self {
        self.modify_last(|s| s.pre_delay = delay)
    }

    pub fn post_delay(self, delay: Duration) -> Self {
        self.modify_last(|s| s.post_delay = delay)
    }

    pub fn pre_trigger(self, trigger: ImageTrigger) -> Self {
        self.modify_last(|s| s.pre_trigger = Some(trigger))
    }

    pub fn post_trigger(self, trigger: ImageTrigger) -> Self {
        self.modify_last(|s| s.post_trigger = Some(trigger))
    }

    // ── Actions ─────────────────────────────────────────────────

    pub fn tap(self, at: Point) -> Self {
        self.step(Action::Tap { at, hold: None })
    }

    pub fn tap_hold(self, at: Point, hold: Duration) -> Self {
        self.step(Action::Tap {
            at,
            hold: Some(hold),
        })
    }

    pub fn swipe(self, from: Point, to: Point) -> Self {
        self.step(Action::Swipe {
            from,
            to,
            duration: None,
        })
    }

    pub fn swipe_over(self, from: Point, to: Point, duration: Duration) -> Self {
        self.step(Action::Swipe {
            from,
            to,
            duration: Some(duration),
        })
    }

    pub fn type_text(self, text: impl Into<String>) -> Self {
        self.step(Action::TypeText(text.into()))
    }

    pub fn key(self, key: SystemKey) -> Self {
        self.step(Action::Key(key))
    }

    pub fn keyboard(self, keycodes: impl Into<Vec<u32>>, hold: Duration) -> Self {
        self.step(Action::Keyboard {
            keycodes: keycodes.into(),
            hold,
        })
    }

    pub fn set_clipboard(self, text: impl Into<String>, paste: bool) -> Self {
        self.step(Action::SetClipboard {
            text: text.into(),
            paste,
        })
    }

    pub fn delay(self, delay: Duration) -> Self {
        self.step(Action::Delay(delay))
    }

    pub fn tap_image(
        self,
        template: Arc<RgbImage>,
        wait: bool,
        area: Option<Rect>,
        deadline: Option<Duration>,
    ) -> Self {
        self.step(Action::TapImage {
            template,
            area,
            wait,
            deadline,
            hold: None,
        })
    }

    /// Swipe from the template's location by `offset`.
    pub fn swipe_image(
        self,
        template: Arc<RgbImage>,
        offset: Point,
        wait: bool,
        area: Option<Rect>,
        deadline: Option<Duration>,
    ) -> Self {
        self.step(Action::SwipeImage {
            template,
            offset,
            area,
            wait,
            deadline,
            duration: None,
        })
    }

    pub fn wait_image(
        self,
        template: Arc<RgbImage>,
        area: Option<Rect>,
        deadline: Option<Duration>,
    ) -> Self {
        self.step(Action::WaitImage {
            template,
            area,
            deadline,
        })
    }

    pub fn wait_static_frame(self, threshold: f64, deadline: Option<Duration>) -> Self {
        self.step(Action::WaitStaticFrame {
            threshold,
            deadline,
        })
    }

    pub fn tap_element(self, selector: ElementSelector) -> Self {
        self.step(Action::TapElement {
            selector,
            hold: None,
        })
    }

    pub fn swipe_element(self, selector: ElementSelector, dx: i32, dy: i32) -> Self {
        self.step(Action::SwipeElement {
            selector,
            dx,
            dy,
            duration: None,
        })
    }

    pub fn wait_element(self, selector: ElementSelector, deadline: Option<Duration>) -> Self {
        self.step(Action::WaitElement { selector, deadline })
    }

    /// Run a caller-supplied async step.
    pub fn custom<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a Session) -> BoxFuture<'a, Result<(), ScreenflowError>>
            + Send
            + Sync
            + 'static,
    {
        self.step(Action::Custom(CustomAction::new(name, f)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_apply_to_last_step() {
        let flow = Flow::new()
            .tap(Point::new(1, 1))
            .type_text("a")
            .pre_delay(Duration::from_millis(5))
            .post_delay(Duration::from_millis(7));

        assert_eq!(flow.len(), 2);
        assert_eq!(flow.steps()[0].pre_delay, Duration::ZERO);
        assert_eq!(flow.steps()[1].pre_delay, Duration::from_millis(5));
        assert_eq!(flow.steps()[1].post_delay, Duration::from_millis(7));
    }

    #[test]
    fn modifiers_on_empty_flow_are_ignored() {
        let flow = Flow::new().post_delay(Duration::from_secs(1));
        assert!(flow.is_empty());
    }

    #[test]
    fn builders_produce_matching_actions() {
        let flow = Flow::new()
            .key(SystemKey::Back)
            .keyboard(vec![113, 29], Duration::from_millis(30))
            .set_clipboard("x", true)
            .wait_static_frame(0.01, None);
        let kinds: Vec<_> = flow.steps().iter().map(|s| s.action.kind()).collect();
        assert_eq!(kinds, ["key", "keyboard", "set_clipboard", "wait_static_frame"]);
    }
}
