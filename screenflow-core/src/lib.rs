//! # screenflow-core
//!
//! Drive an Android device from its mirrored screen.
//!
//! This crate contains:
//! - **Session**: `SessionBuilder`, `Session`, `BackendOption`, `Capabilities`,
//!   dispatching each action to accessibility, raw transport input or vision
//! - **Backends**: the `Transport` and `Accessibility` traits implemented by
//!   protocol clients outside this crate
//! - **Protocol types**: `ControlMessage`, `TouchEvent`, `KeyEvent`, `ScreenView`,
//!   `ElementSelector`
//! - **Codec**: `JpegFrameCodec` for splitting an MJPEG byte stream via `tokio_util`
//! - **Frames**: `Transcoder`, `FrameDecoder`, `FrameFeed`, `FrameSubscription`
//! - **Events**: `SessionEvent` fan-out through a lossy queued `Broadcaster`
//! - **Vision**: change ratio, settle tracking, template / feature matching,
//!   density clustering and the debounced `VisionPipeline`
//! - **Flow**: `Flow` steps executed sequentially with delays and image triggers
//! - **Task**: `Supervisor` for named background loops under one cancellation token
//! - **Error**: `ScreenflowError`, a typed `thiserror` hierarchy

pub mod backend;
pub mod broadcast;
pub mod codec;
pub mod error;
pub mod events;
pub mod flow;
pub mod frame;
pub mod geometry;
pub mod protocol;
pub mod session;
pub mod task;
pub mod vision;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use backend::{Accessibility, Transport};
pub use codec::{JpegFrameCodec, MAX_FRAME_BYTES};
pub use error::{LoopError, ScreenflowError};
pub use events::{EventKind, SessionEvent};
pub use flow::{Action, Flow, FlowFailure, FlowState, FlowStep, ImageTrigger};
pub use frame::{
    Frame, FrameDecoder, FrameFeed, FrameStats, FrameSubscription, Transcoder, TranscoderConfig,
};
pub use geometry::{Point, Rect};
pub use protocol::{
    ClickTarget, ControlMessage, DeviceInfo, DeviceReply, ElementSelector, GlobalAction,
    ScreenView, SwipeStart, SystemKey,
};
pub use session::{BackendOption, Capabilities, Session, SessionBuilder, SessionConfig};
pub use task::Supervisor;
pub use vision::{Algorithm, Matcher, VisionConfig, VisionHandle, VisionPipeline};
