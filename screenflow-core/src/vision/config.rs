use serde::{Deserialize, Serialize};

/// Localization algorithm used by the pipeline and one-shot locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Zero-mean normalized cross-correlation on grayscale.
    #[default]
    TemplateMatching,
    /// FAST corners, BRIEF descriptor matching and density clustering.
    Features,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Algorithm::TemplateMatching => write!(f, "template_matching"),
            Algorithm::Features => write!(f, "features"),
        }
    }
}

/// DBSCAN parameters for grouping feature candidates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Neighbourhood radius in pixels (inclusive).
    pub eps: f64,
    /// Other points required within `eps` for a core point.
    pub min_pts: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            eps: 128.0,
            min_pts: 3,
        }
    }
}

/// Tuning for the vision pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub algorithm: Algorithm,
    /// Frames whose longest side exceeds this are downscaled first.
    pub max_side: u32,
    /// Change ratio below which a frame counts as settled.
    pub change_threshold: f64,
    /// Luma difference above which a pixel counts as changed.
    pub pixel_threshold: u8,
    /// Saturation point of the settle counter.
    pub settle_cap: u32,
    /// Matching runs only once the settle counter exceeds this.
    pub min_settle_frames: u32,
    /// Consecutive identical results required before answering.
    pub stable_frames: u32,
    /// Minimum correlation peak for template matching.
    pub match_confidence: f32,
    /// Lowe ratio for feature matches.
    pub ratio_test: f32,
    /// Best feature matches kept per frame.
    pub top_matches: usize,
    /// Fewer feature candidates than this is no result.
    pub min_candidates: usize,
    pub cluster: ClusterConfig,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            max_side: 640,
            change_threshold: 0.10,
            pixel_threshold: 25,
            settle_cap: 120,
            min_settle_frames: 30,
            stable_frames: 5,
            match_confidence: 0.75,
            ratio_test: 0.75,
            top_matches: 50,
            min_candidates: 5,
            cluster: ClusterConfig::default(),
        }
    }
}
