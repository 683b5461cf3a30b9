//! Observable record of what a session did to the device.
//!
//! Actions publish a [`SessionEvent`] after they succeed. Delivery is
//! lossy: a subscriber that falls more than [`EVENT_QUEUE_DEPTH`] events
//! behind misses the overflow.

use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::broadcast::Broadcaster;
use crate::geometry::Point;

/// Per-subscriber queue depth.
pub const EVENT_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Touch { point: Point },
    TypeText { text: String },
    PasteText { text: String },
    PressKey { keycodes: Vec<u32> },
    FoundImage { point: Point },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub at: SystemTime,
    pub kind: EventKind,
}

impl SessionEvent {
    pub fn now(kind: EventKind) -> Self {
        Self {
            at: SystemTime::now(),
            kind,
        }
    }
}

/// Cloneable publishing side shared by a session and its actions.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<Broadcaster<SessionEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<SessionEvent> {
        self.inner.subscribe_with_capacity(EVENT_QUEUE_DEPTH)
    }

    pub fn emit(&self, kind: EventKind) {
        self.inner.publish(SessionEvent::now(kind));
    }
}
