//! Vision: deciding *when* the screen is stable and *where* a template is.
//!
//! Per frame the pipeline downscales, measures change against the previous
//! frame, tracks how long the screen has been settled, and only then runs
//! the configured [`Matcher`]. Results must repeat on consecutive frames
//! before a caller sees them.

pub mod change;
pub mod cluster;
pub mod config;
pub mod features;
pub mod locate;
pub mod matching;
pub mod pipeline;
pub mod scale;
pub mod stability;

pub use change::{change_ratio, is_frame_static};
pub use cluster::{Clustering, dbscan, resolve_candidates};
pub use config::{Algorithm, ClusterConfig, VisionConfig};
pub use features::{CornerExtractor, FeatureExtractor, Features, Keypoint};
pub use locate::locate_once;
pub use matching::{FeatureMatcher, Matcher, NccMatcher, matcher_for};
pub use pipeline::{VisionHandle, VisionPipeline, vision_channel};
pub use stability::{SettleTracker, StabilityGate};
