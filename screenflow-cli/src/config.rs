//! Configuration for the screenflow CLI.

use std::path::Path;

use serde::{Deserialize, Serialize};

use screenflow_core::{SessionConfig, TranscoderConfig, VisionConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Readiness and clipboard timeouts.
    pub session: SessionConfig,
    /// Transcoder child used by `probe`.
    pub transcoder: TranscoderConfig,
    /// Localization tuning used by `locate`.
    pub vision: VisionConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive; `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl CliConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        std::fs::write(path, Self::default_toml()?)
    }

    pub fn default_toml() -> std::io::Result<String> {
        toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)
    }

    /// Session settings for library callers that build a `Session`.
    pub fn to_session_config(&self) -> SessionConfig {
        self.session.clone()
    }

    /// Vision settings with out-of-range values pulled back into range.
    pub fn to_vision_config(&self) -> VisionConfig {
        let mut vision = self.vision.clone();
        vision.max_side = vision.max_side.max(16);
        vision.stable_frames = vision.stable_frames.max(1);
        vision.match_confidence = vision.match_confidence.clamp(0.0, 1.0);
        vision
    }
}

// ── Tests ────────────────────────────────────────────────────────
