//! Backend capability set, fixed once a session is built.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// What a connected session can do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Capabilities: u8 {
        /// Raw input and control messages through a transport.
        const TRANSPORT = 1 << 0;
        /// Structured input and view dumps through an accessibility service.
        const ACCESSIBILITY = 1 << 1;
        /// Stable template localization over the frame feed.
        const VISION = 1 << 2;
        /// Decoded frames are being published.
        const FRAMES = 1 << 3;
    }
}

impl Capabilities {
    /// Whether taps, swipes and text can be delivered somehow.
    pub fn can_input(self) -> bool {
        self.intersects(Self::TRANSPORT | Self::ACCESSIBILITY)
    }
}

impl std::fmt::Display for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        f.write_str(&names.join("|").to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_needs_a_device_backend() {
        assert!(!Capabilities::empty().can_input());
        assert!(!(Capabilities::VISION | Capabilities::FRAMES).can_input());
        assert!(Capabilities::ACCESSIBILITY.can_input());
        assert!(Capabilities::TRANSPORT.can_input());
    }

    #[test]
    fn display_lists_flags() {
        let caps = Capabilities::TRANSPORT | Capabilities::FRAMES;
        assert_eq!(caps.to_string(), "transport|frames");
        assert_eq!(Capabilities::empty().to_string(), "none");
    }
}
