//! Payload types exchanged with the device backends.
//!
//! - [`control`]: commands and replies carried by a control transport
//! - [`accessibility`]: view hierarchy and selectors for an accessibility
//!   service

pub mod accessibility;
pub mod control;

pub use accessibility::{
    ClickTarget, CompiledSelector, ElementSelector, GlobalAction, ScreenView, SwipeStart,
};
pub use control::{
    ControlMessage, DeviceInfo, DeviceReply, InputAction, KeyEvent, SystemKey, TouchEvent,
};
