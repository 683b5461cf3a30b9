//! Flow steps: one action plus optional delays and image gates.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use image::RgbImage;

use crate::error::ScreenflowError;
use crate::geometry::{Point, Rect};
use crate::protocol::{ElementSelector, SystemKey};
use crate::session::Session;

/// Signature of a caller-supplied step.
pub type CustomFn =
    dyn for<'a> Fn(&'a Session) -> BoxFuture<'a, Result<(), ScreenflowError>> + Send + Sync;

/// Opaque async callback run against the session.
#[derive(Clone)]
pub struct CustomAction {
    name: String,
    f: Arc<CustomFn>,
}

impl CustomAction {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a Session) -> BoxFuture<'a, Result<(), ScreenflowError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) async fn call(&self, session: &Session) -> Result<(), ScreenflowError> {
        (self.f)(session).await
    }
}

impl std::fmt::Debug for CustomAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CustomAction").field(&self.name).finish()
    }
}

/// What a step does.
#[derive(Debug, Clone)]
pub enum Action {
    Tap {
        at: Point,
        hold: Option<Duration>,
    },
    Swipe {
        from: Point,
        to: Point,
        duration: Option<Duration>,
    },
    TypeText(String),
    Key(SystemKey),
    /// Chord of raw key codes.
    Keyboard {
        keycodes: Vec<u32>,
        hold: Duration,
    },
    SetClipboard {
        text: String,
        paste: bool,
    },
    Delay(Duration),
    /// Tap wherever `template` is found.
    ///
    /// With `wait`, keeps looking until the point lies inside `area` or
    /// `deadline` passes; otherwise a point outside `area` is `NotFound`.
    TapImage {
        template: Arc<RgbImage>,
        area: Option<Rect>,
        wait: bool,
        deadline: Option<Duration>,
        hold: Option<Duration>,
    },
    /// Swipe from wherever `template` is found by `offset`.
    SwipeImage {
        template: Arc<RgbImage>,
        offset: Point,
        area: Option<Rect>,
        wait: bool,
        deadline: Option<Duration>,
        duration: Option<Duration>,
    },
    WaitImage {
        template: Arc<RgbImage>,
        area: Option<Rect>,
        deadline: Option<Duration>,
    },
    WaitStaticFrame {
        threshold: f64,
        deadline: Option<Duration>,
    },
    TapElement {
        selector: ElementSelector,
        hold: Option<Duration>,
    },
    SwipeElement {
        selector: ElementSelector,
        dx: i32,
        dy: i32,
        duration: Option<Duration>,
    },
    WaitElement {
        selector: ElementSelector,
        deadline: Option<Duration>,
    },
    Custom(CustomAction),
}

impl Action {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Tap { .. } => "tap",
            Action::Swipe { .. } => "swipe",
            Action::TypeText(_) => "type_text",
            Action::Key(_) => "key",
            Action::Keyboard { .. } => "keyboard",
            Action::SetClipboard { .. } => "set_clipboard",
            Action::Delay(_) => "delay",
            Action::TapImage { .. } => "tap_image",
            Action::SwipeImage { .. } => "swipe_image",
            Action::WaitImage { .. } => "wait_image",
            Action::WaitStaticFrame { .. } => "wait_static_frame",
            Action::TapElement { .. } => "tap_element",
            Action::SwipeElement { .. } => "swipe_element",
            Action::WaitElement { .. } => "wait_element",
            Action::Custom(_) => "custom",
        }
    }
}

/// Gate that polls the latest frame until `template` is visible.
#[derive(Debug, Clone)]
pub struct ImageTrigger {
    pub template: Arc<RgbImage>,
    pub area: Option<Rect>,
    pub deadline: Option<Duration>,
}

impl ImageTrigger {
    pub fn new(template: Arc<RgbImage>) -> Self {
        Self {
            template,
            area: None,
            deadline: None,
        }
    }

    pub fn within(mut self, area: Rect) -> Self {
        self.area = Some(area);
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// One step of a [`Flow`](super::Flow).
#[derive(Debug, Clone)]
pub struct FlowStep {
    pub action: Action,
    pub pre_delay: Duration,
    pub post_delay: Duration,
    pub pre_trigger: Option<ImageTrigger>,
    pub post_trigger: Option<ImageTrigger>,
}

impl FlowStep {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            pre_delay: Duration::ZERO,
            post_delay: Duration::ZERO,
            pre_trigger: None,
            post_trigger: None,
        }
    }
}

impl From<Action> for FlowStep {
    fn from(action: Action) -> Self {
        Self::new(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn custom_action_debug_shows_name() {
        let action = CustomAction::new("noop", |_session| async { Ok(()) }.boxed());
        assert_eq!(format!("{action:?}"), "CustomAction(\"noop\")");
        assert_eq!(Action::Custom(action).kind(), "custom");
    }

    #[test]
    fn trigger_builder_sets_bounds() {
        let t = ImageTrigger::new(Arc::new(RgbImage::new(2, 2)))
            .within(Rect::new(0, 0, 10, 10))
            .deadline(Duration::from_secs(1));
        assert_eq!(t.area, Some(Rect::new(0, 0, 10, 10)));
        assert_eq!(t.deadline, Some(Duration::from_secs(1)));
    }
}
