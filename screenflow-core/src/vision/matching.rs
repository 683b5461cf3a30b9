//! Template localization strategies.

use std::sync::Arc;

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::definitions::Image;
use imageproc::integral_image::{integral_image, integral_squared_image};
use imageproc::template_matching::{MatchTemplateMethod, find_extremes, match_template};
use tracing::trace;

use crate::geometry::Point;

use super::cluster::resolve_candidates;
use super::config::{Algorithm, ClusterConfig, VisionConfig};
use super::features::{CornerExtractor, FeatureExtractor, knn_ratio_matches};

/// Locates a template inside a source image.
///
/// Both images are grayscale and already at matching scale. The returned
/// point is in source coordinates.
pub trait Matcher: Send + Sync {
    fn locate(&self, source: &GrayImage, template: &GrayImage) -> Option<Point>;

    fn name(&self) -> &'static str;
}

/// Build the matcher selected by `config.algorithm`.
pub fn matcher_for(config: &VisionConfig) -> Arc<dyn Matcher> {
    match config.algorithm {
        Algorithm::TemplateMatching => Arc::new(NccMatcher::new(config.match_confidence)),
        Algorithm::Features => Arc::new(FeatureMatcher::from_config(config)),
    }
}

// ── NccMatcher ───────────────────────────────────────────────────

/// Zero-mean normalized cross-correlation.
///
/// Scores every placement of the template; accepts the best one when its
/// score exceeds `threshold`. The point is the centre of that placement.
#[derive(Debug, Clone)]
pub struct NccMatcher {
    pub threshold: f32,
}

impl NccMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Best placement and its score, if the template fits at all.
    ///
    /// The raw correlation comes from `imageproc`; window sums from integral
    /// images turn it into a mean-subtracted score in `[-1, 1]`. Flat source
    /// windows score `-1`.
    pub fn best_placement(source: &GrayImage, template: &GrayImage) -> Option<(u32, u32, f32)> {
        let (sw, sh) = source.dimensions();
        let (tw, th) = template.dimensions();
        if tw == 0 || th == 0 || tw > sw || th > sh {
            return None;
        }

        let n = f64::from(tw * th);
        let (t_sum, t_sum_sq) = template.as_raw().iter().fold((0f64, 0f64), |(s, s2), &v| {
            let v = f64::from(v);
            (s + v, s2 + v * v)
        });
        let t_var = t_sum_sq - t_sum * t_sum / n;
        if t_var < 1e-6 {
            return None;
        }

        let cross = match_template(source, template, MatchTemplateMethod::CrossCorrelation);
        let sums = integral_image::<_, u64>(source);
        let squares = integral_squared_image::<_, u64>(source);

        let scores: Image<Luma<f32>> = ImageBuffer::from_fn(cross.width(), cross.height(), |x, y| {
            let sum = window_sum(&sums, x, y, tw, th);
            let var = window_sum(&squares, x, y, tw, th) - sum * sum / n;
            if var <= 1e-6 {
                return Luma([-1.0]);
            }
            let numerator = f64::from(cross.get_pixel(x, y)[0]) - sum * t_sum / n;
            Luma([(numerator / (var * t_var).sqrt()) as f32])
        });

        let peak = find_extremes(&scores);
        let (x, y) = peak.max_value_location;
        Some((x, y, peak.max_value))
    }
}

impl Matcher for NccMatcher {
    fn locate(&self, source: &GrayImage, template: &GrayImage) -> Option<Point> {
        let (x, y, score) = Self::best_placement(source, template)?;
        trace!(x, y, score, "correlation peak");
        if score <= self.threshold {
            return None;
        }
        Some(Point::new(
            (x + template.width() / 2) as i32,
            (y + template.height() / 2) as i32,
        ))
    }

    fn name(&self) -> &'static str {
        "template_matching"
    }
}

/// Sum of the `w × h` window at `(x, y)` from an integral image with a
/// leading zero row and column.
fn window_sum(integral: &Image<Luma<u64>>, x: u32, y: u32, w: u32, h: u32) -> f64 {
    let at = |x: u32, y: u32| integral.get_pixel(x, y)[0] as f64;
    let (x1, y1) = (x + w, y + h);
    at(x1, y1) - at(x, y1) - at(x1, y) + at(x, y)
}

// ── FeatureMatcher ───────────────────────────────────────────────

/// Descriptor matching followed by density clustering.
pub struct FeatureMatcher {
    extractor: Box<dyn FeatureExtractor>,
    pub ratio_test: f32,
    pub top_matches: usize,
    pub min_candidates: usize,
    pub cluster: ClusterConfig,
}

impl std::fmt::Debug for FeatureMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureMatcher")
            .field("ratio_test", &self.ratio_test)
            .field("top_matches", &self.top_matches)
            .field("min_candidates", &self.min_candidates)
            .field("cluster", &self.cluster)
            .finish_non_exhaustive()
    }
}

impl FeatureMatcher {
    pub fn from_config(config: &VisionConfig) -> Self {
        Self {
            extractor: Box::new(CornerExtractor::default()),
            ratio_test: config.ratio_test,
            top_matches: config.top_matches,
            min_candidates: config.min_candidates,
            cluster: config.cluster,
        }
    }

    /// Swap in a different keypoint extractor.
    pub fn with_extractor(mut self, extractor: impl FeatureExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// Candidate source points for the best matches, best first.
    pub fn candidates(&self, source: &GrayImage, template: &GrayImage) -> Vec<Point> {
        let tpl = self.extractor.extract(template, None);
        if tpl.is_empty() {
            return Vec::new();
        }
        let src = self.extractor.extract(source, Some(&tpl));

        let mut good = knn_ratio_matches(&tpl, &src, self.ratio_test);
        good.truncate(self.top_matches);
        good.iter()
            .map(|m| {
                let kp = src.keypoints[m.source_idx];
                Point::new(kp.x as i32, kp.y as i32)
            })
            .collect()
    }
}

impl Matcher for FeatureMatcher {
    fn locate(&self, source: &GrayImage, template: &GrayImage) -> Option<Point> {
        let candidates = self.candidates(source, template);
        trace!(candidates = candidates.len(), "feature candidates");
        resolve_candidates(&candidates, self.min_candidates, &self.cluster)
    }

    fn name(&self) -> &'static str {
        "features"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::features::tests::textured;
    use image::{GenericImage, GenericImageView, Luma};

    fn paste(background: u8, w: u32, h: u32, patch: &GrayImage, at: (u32, u32)) -> GrayImage {
        let mut img = GrayImage::from_pixel(w, h, Luma([background]));
        img.copy_from(patch, at.0, at.1).unwrap();
        img
    }

    #[test]
    fn ncc_finds_exact_crop() {
        let source = textured(120, 90, 42);
        let template = source.view(40, 30, 24, 18).to_image();
        let p = NccMatcher::new(0.75).locate(&source, &template).unwrap();
        assert_eq!(p, Point::new(40 + 12, 30 + 9));
    }

    #[test]
    fn ncc_exact_crop_peaks_at_one() {
        let mut source = textured(90, 60, 5);
        // flat band on the left must not outscore the real placement
        for y in 0..60 {
            for x in 0..30 {
                source.put_pixel(x, y, Luma([77]));
            }
        }
        let template = source.view(50, 20, 16, 16).to_image();
        let (x, y, score) = NccMatcher::best_placement(&source, &template).unwrap();
        assert_eq!((x, y), (50, 20));
        assert!((score - 1.0).abs() < 1e-3, "score = {score}");
    }

    #[test]
    fn ncc_is_brightness_invariant() {
        let source = textured(100, 100, 9);
        let mut template = source.view(10, 60, 20, 20).to_image();
        template.pixels_mut().for_each(|p| p[0] = p[0] / 2 + 40);
        let (x, y, score) = NccMatcher::best_placement(&source, &template).unwrap();
        assert_eq!((x, y), (10, 60));
        assert!(score > 0.95);
    }

    #[test]
    fn ncc_rejects_unrelated_template() {
        let source = textured(100, 100, 1);
        let template = textured(40, 40, 999);
        assert!(NccMatcher::new(0.75).locate(&source, &template).is_none());
    }

    #[test]
    fn ncc_rejects_oversized_and_flat_templates() {
        let source = textured(30, 30, 2);
        assert!(NccMatcher::new(0.75).locate(&source, &textured(40, 10, 2)).is_none());
        let flat = GrayImage::from_pixel(8, 8, Luma([10]));
        assert!(NccMatcher::new(0.75).locate(&source, &flat).is_none());
    }

    #[test]
    fn features_locate_pasted_template() {
        let template = textured(60, 60, 77);
        let source = paste(128, 320, 240, &template, (150, 100));
        let matcher = FeatureMatcher::from_config(&VisionConfig::default());

        let p = matcher.locate(&source, &template).unwrap();
        assert!((150..210).contains(&p.x), "x = {}", p.x);
        assert!((100..160).contains(&p.y), "y = {}", p.y);
    }

    #[test]
    fn features_give_up_on_flat_template() {
        let source = textured(200, 200, 4);
        let template = GrayImage::from_pixel(40, 40, Luma([0]));
        let matcher = FeatureMatcher::from_config(&VisionConfig::default());
        assert!(matcher.locate(&source, &template).is_none());
    }

    #[test]
    fn matcher_for_follows_algorithm() {
        let mut cfg = VisionConfig::default();
        assert_eq!(matcher_for(&cfg).name(), "template_matching");
        cfg.algorithm = Algorithm::Features;
        assert_eq!(matcher_for(&cfg).name(), "features");
    }
}
