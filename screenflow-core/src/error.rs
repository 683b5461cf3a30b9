//! Domain-specific error types for screenflow.
//!
//! All fallible operations return `Result<T, ScreenflowError>`.
//! No panics on invalid input; every error is typed and recoverable
//! by the caller, even when it is fatal to the session that raised it.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for screenflow.
#[derive(Debug, Error)]
pub enum ScreenflowError {
    // ── Construction Errors ──────────────────────────────────────
    /// The control transport failed to connect or handshake.
    #[error("transport dial failed: {0}")]
    Dial(String),

    /// The accessibility service did not answer its probe.
    #[error("accessibility service unavailable: {0}")]
    AccessibilityUnavailable(String),

    /// Vision was requested before a transport with a video path.
    #[error("vision needs a transport with a video path configured before it")]
    VisionRequiresFrames,

    /// The transcoding child process could not be started or driven.
    #[error("transcoder error: {0}")]
    Transcoder(String),

    /// No frame arrived before the readiness deadline.
    #[error("no frame received within {0:?}")]
    NotReady(Duration),

    // ── Capability Errors ────────────────────────────────────────
    /// None of the backends able to perform the action is present.
    #[error("no backend available for {action}")]
    NoBackend { action: &'static str },

    // ── Decode Errors ────────────────────────────────────────────
    /// The subprocess or stream I/O layer reported an error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame grew past the codec limit without an end marker.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A frame could not be decoded into a bitmap.
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),

    // ── Matching Errors ──────────────────────────────────────────
    /// The template could not be used for matching.
    #[error("invalid template: {0}")]
    Template(String),

    /// Another find request is already in flight.
    #[error("a find request is already in flight")]
    Busy,

    // ── Not Found ────────────────────────────────────────────────
    /// The target was not located before the deadline.
    #[error("target not found")]
    NotFound,

    // ── Step Errors ──────────────────────────────────────────────
    /// A flow step failed; `index` is zero-based.
    #[error("step {index} failed: {source}")]
    Step {
        index: usize,
        #[source]
        source: Box<ScreenflowError>,
    },

    // ── Lifecycle Errors ─────────────────────────────────────────
    /// The operation was cancelled through its token.
    #[error("operation cancelled")]
    Cancelled,

    /// A background loop failed and the session is no longer usable.
    #[error("session closed: {0}")]
    SessionClosed(#[from] LoopError),

    /// The device did not answer a request in time.
    #[error("no reply from device within {0:?}")]
    Timeout(Duration),

    /// An internal channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// The transport rejected or failed to deliver a command.
    #[error("transport error: {0}")]
    Transport(String),

    /// The accessibility service rejected or failed a request.
    #[error("accessibility error: {0}")]
    Accessibility(String),

    /// A caller-supplied custom action failed.
    #[error("custom action: {0}")]
    Custom(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl ScreenflowError {
    /// Whether this error is the expected "not yet / not there" outcome
    /// rather than a hard failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            ScreenflowError::NotFound => true,
            ScreenflowError::Step { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Wrap this error with the index of the flow step that produced it.
    pub fn at_step(self, index: usize) -> Self {
        ScreenflowError::Step {
            index,
            source: Box::new(self),
        }
    }
}

// ── LoopError ────────────────────────────────────────────────────

/// Failure of one supervised background loop.
///
/// Stored by the session supervisor and cloned into every error
/// returned after the session has been torn down.
#[derive(Debug, Clone, Error)]
#[error("{name} loop failed: {message}")]
pub struct LoopError {
    /// Name the loop was spawned under (`serve`, `decode`, …).
    pub name: &'static str,
    /// Display form of the error that ended the loop.
    pub message: String,
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for ScreenflowError {
    fn from(s: String) -> Self {
        ScreenflowError::Other(s)
    }
}

impl From<&str> for ScreenflowError {
    fn from(s: &str) -> Self {
        ScreenflowError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ScreenflowError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ScreenflowError::ChannelClosed
    }
}

impl From<regex::Error> for ScreenflowError {
    fn from(e: regex::Error) -> Self {
        ScreenflowError::Accessibility(format!("invalid selector pattern: {e}"))
    }
}
