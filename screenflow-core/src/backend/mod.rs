//! Device backends consumed by a session.
//!
//! Backends are collaborators implemented outside this crate: a control
//! [`Transport`] speaking the screen/control wire protocol, and an optional
//! [`Accessibility`] service exposing the view hierarchy. The session only
//! sees these traits.

pub mod accessibility;
pub mod transport;

pub use accessibility::Accessibility;
pub use transport::Transport;
