//! Device control messages handed to a [`Transport`].
//!
//! These are the structured commands the session issues; the transport
//! implementation owns their wire encoding.
//!
//! ```text
//! Session ──[ControlMessage]──────────────► Transport ──► device
//! Session ◄─[DeviceReply]───────────────── Transport ◄── device
//! ```
//!
//! [`Transport`]: crate::backend::Transport

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// Full pressure used for synthetic touches.
pub const TOUCH_PRESSURE: u16 = u16::MAX;

/// Pointer id used for single-finger gestures.
pub const PRIMARY_POINTER: u64 = 1;

/// Android key codes used by the session.
pub mod keycode {
    pub const HOME: u32 = 3;
    pub const BACK: u32 = 4;
    pub const ENTER: u32 = 66;
    pub const DEL: u32 = 67;
    pub const MENU: u32 = 82;
    pub const APP_SWITCH: u32 = 187;
}

/// Mouse/touch button bits.
pub mod buttons {
    pub const NONE: u32 = 0;
    pub const PRIMARY: u32 = 1;
}

// ── Touch ─────────────────────────────────────────────────────────

/// Phase of a touch or key event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum InputAction {
    Down,
    Up,
    Move,
}

/// A single touch sample for one pointer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TouchEvent {
    pub action: InputAction,
    pub pointer_id: u64,
    pub position: Point,
    pub pressure: u16,
    pub action_button: u32,
    pub buttons: u32,
}

impl TouchEvent {
    /// Primary finger pressed at `position`.
    pub fn down(position: Point) -> Self {
        Self {
            action: InputAction::Down,
            pointer_id: PRIMARY_POINTER,
            position,
            pressure: TOUCH_PRESSURE,
            action_button: buttons::PRIMARY,
            buttons: buttons::PRIMARY,
        }
    }

    /// Primary finger dragged to `position`.
    pub fn moved(position: Point) -> Self {
        Self {
            action: InputAction::Move,
            pointer_id: PRIMARY_POINTER,
            position,
            pressure: TOUCH_PRESSURE,
            action_button: buttons::NONE,
            buttons: buttons::PRIMARY,
        }
    }

    /// Primary finger lifted at `position`.
    pub fn up(position: Point) -> Self {
        Self {
            action: InputAction::Up,
            pointer_id: PRIMARY_POINTER,
            position,
            pressure: TOUCH_PRESSURE,
            action_button: buttons::PRIMARY,
            buttons: buttons::NONE,
        }
    }
}

// ── Keys ──────────────────────────────────────────────────────────

/// A key press or release.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyEvent {
    pub action: InputAction,
    pub keycode: u32,
    pub repeat: u32,
    pub meta: u32,
}

impl KeyEvent {
    pub fn down(keycode: u32) -> Self {
        Self {
            action: InputAction::Down,
            keycode,
            repeat: 0,
            meta: 0,
        }
    }

    pub fn up(keycode: u32) -> Self {
        Self {
            action: InputAction::Up,
            keycode,
            repeat: 0,
            meta: 0,
        }
    }
}

/// System navigation keys, served by accessibility global actions or
/// by transport key codes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SystemKey {
    Home,
    Back,
    Recents,
}

impl SystemKey {
    /// Android key code for the transport path.
    pub fn keycode(self) -> u32 {
        match self {
            SystemKey::Home => keycode::HOME,
            SystemKey::Back => keycode::BACK,
            SystemKey::Recents => keycode::APP_SWITCH,
        }
    }
}

// ── Control Message ───────────────────────────────────────────────

/// A command sent to the device over the control transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ControlMessage {
    Touch(TouchEvent),
    Key(KeyEvent),
    Text(String),
    SetClipboard {
        sequence: u64,
        text: String,
        paste: bool,
    },
    /// Ask the device to report its clipboard; answered by
    /// [`DeviceReply::Clipboard`].
    GetClipboard { copy_key: u8 },
    StartApp(String),
    SetDisplayPower(bool),
    RotateDevice,
    ExpandNotificationPanel,
    ExpandSettingsPanel,
    CollapsePanels,
    BackOrScreenOn(InputAction),
    Scroll {
        position: Point,
        horizontal: i16,
        vertical: i16,
        buttons: u32,
    },
}

impl ControlMessage {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Touch(_) => "touch",
            ControlMessage::Key(_) => "key",
            ControlMessage::Text(_) => "text",
            ControlMessage::SetClipboard { .. } => "set_clipboard",
            ControlMessage::GetClipboard { .. } => "get_clipboard",
            ControlMessage::StartApp(_) => "start_app",
            ControlMessage::SetDisplayPower(_) => "set_display_power",
            ControlMessage::RotateDevice => "rotate_device",
            ControlMessage::ExpandNotificationPanel => "expand_notification_panel",
            ControlMessage::ExpandSettingsPanel => "expand_settings_panel",
            ControlMessage::CollapsePanels => "collapse_panels",
            ControlMessage::BackOrScreenOn(_) => "back_or_screen_on",
            ControlMessage::Scroll { .. } => "scroll",
        }
    }
}

/// A device-originated message routed back to the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceReply {
    Clipboard(String),
}

/// Handshake result reported by the transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
}
