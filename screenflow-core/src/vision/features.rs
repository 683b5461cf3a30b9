//! Keypoint detection and description for feature matching.
//!
//! The built-in [`CornerExtractor`] finds FAST-9 corners and describes each
//! one with a BRIEF binary descriptor, both from `imageproc`. BRIEF samples
//! random point pairs around the keypoint; a source image must be described
//! with the same pairs as the template it is compared against, so
//! extraction takes the template's [`Features`] as a reference.

use image::GrayImage;
use imageproc::binary_descriptors::BinaryDescriptor;
use imageproc::binary_descriptors::brief::{BriefDescriptor, TestPair, brief};
use imageproc::corners::corners_fast9;
use imageproc::point::Point as PixelPoint;
use tracing::debug;

/// Descriptor length in bits; BRIEF needs a multiple of 128.
pub const DESCRIPTOR_BITS: usize = 256;
/// Keypoints closer than this to an edge cannot be described.
pub const BORDER: u32 = 20;

/// A detected interest point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// Keypoints and their descriptors, index-aligned, plus the sampling
/// pattern the descriptors were computed with.
#[derive(Clone, Default)]
pub struct Features {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<BriefDescriptor>,
    pub test_pairs: Vec<TestPair>,
}

impl std::fmt::Debug for Features {
    // `BriefDescriptor` does not implement `Debug`; report the count instead.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Features")
            .field("keypoints", &self.keypoints)
            .field("descriptors", &format_args!("[{} descriptors]", self.descriptors.len()))
            .field("test_pairs", &self.test_pairs)
            .finish()
    }
}

impl Features {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Detects and describes keypoints in a grayscale image.
pub trait FeatureExtractor: Send + Sync {
    /// Describe `image`. With a `reference`, descriptors are computed so
    /// that they are comparable with the reference's.
    fn extract(&self, image: &GrayImage, reference: Option<&Features>) -> Features;
}

// ── CornerExtractor ──────────────────────────────────────────────

/// FAST-9 corners with BRIEF descriptors.
#[derive(Debug, Clone)]
pub struct CornerExtractor {
    /// Intensity difference a FAST arc must exceed.
    pub threshold: u8,
    /// Minimum spacing between accepted corners.
    pub min_distance: f32,
    /// Upper bound on corners per image.
    pub max_corners: usize,
}

impl Default for CornerExtractor {
    fn default() -> Self {
        Self {
            threshold: 20,
            min_distance: 3.0,
            max_corners: 1000,
        }
    }
}

impl CornerExtractor {
    /// Strongest corners first, spaced at least `min_distance` apart and
    /// clear of the border.
    fn detect(&self, image: &GrayImage) -> Vec<Keypoint> {
        let (w, h) = image.dimensions();
        if w <= 2 * BORDER || h <= 2 * BORDER {
            return Vec::new();
        }

        let mut corners: Vec<Keypoint> = corners_fast9(image, self.threshold)
            .into_iter()
            .filter(|c| (BORDER..w - BORDER).contains(&c.x) && (BORDER..h - BORDER).contains(&c.y))
            .map(|c| Keypoint {
                x: c.x,
                y: c.y,
                score: c.score,
            })
            .collect();
        corners.sort_by(|a, b| b.score.total_cmp(&a.score));

        let min_d2 = self.min_distance * self.min_distance;
        let mut accepted: Vec<Keypoint> = Vec::new();
        for kp in corners {
            if accepted.len() >= self.max_corners {
                break;
            }
            let clear = accepted.iter().all(|a| {
                let dx = a.x as f32 - kp.x as f32;
                let dy = a.y as f32 - kp.y as f32;
                dx * dx + dy * dy >= min_d2
            });
            if clear {
                accepted.push(kp);
            }
        }
        accepted
    }
}

impl FeatureExtractor for CornerExtractor {
    fn extract(&self, image: &GrayImage, reference: Option<&Features>) -> Features {
        let keypoints = self.detect(image);
        if keypoints.is_empty() {
            return Features::default();
        }

        let points: Vec<PixelPoint<u32>> =
            keypoints.iter().map(|k| PixelPoint::new(k.x, k.y)).collect();
        let pairs = reference
            .map(|r| &r.test_pairs)
            .filter(|pairs| !pairs.is_empty());

        match brief(image, &points, DESCRIPTOR_BITS, pairs) {
            Ok((descriptors, test_pairs)) => Features {
                keypoints,
                descriptors,
                test_pairs,
            },
            Err(e) => {
                debug!(error = %e, "descriptor extraction failed");
                Features::default()
            }
        }
    }
}

/// One accepted template→source correspondence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMatch {
    pub template_idx: usize,
    pub source_idx: usize,
    /// Hamming distance between the two descriptors.
    pub distance: u32,
}

/// Two-nearest-neighbour matching with a ratio test, best first.
///
/// For each template descriptor the two closest source descriptors are
/// found; the match is kept when `nearest < ratio * second`.
pub fn knn_ratio_matches(template: &Features, source: &Features, ratio: f32) -> Vec<FeatureMatch> {
    if source.descriptors.len() < 2 {
        return Vec::new();
    }

    let mut good = Vec::new();
    for (ti, td) in template.descriptors.iter().enumerate() {
        let mut best = (u32::MAX, usize::MAX);
        let mut second = u32::MAX;
        for (si, sd) in source.descriptors.iter().enumerate() {
            let d = td.hamming_distance(sd);
            if d < best.0 {
                second = best.0;
                best = (d, si);
            } else if d < second {
                second = d;
            }
        }
        if (best.0 as f32) < ratio * second as f32 {
            good.push(FeatureMatch {
                template_idx: ti,
                source_idx: best.1,
                distance: best.0,
            });
        }
    }
    good.sort_by_key(|m| m.distance);
    good
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Luma;

    /// Deterministic blocky texture: 6×6 cells of pseudo-random grey.
    pub(crate) fn textured(w: u32, h: u32, seed: u32) -> GrayImage {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        let cells_x = w.div_ceil(6);
        let cells_y = h.div_ceil(6);
        let mut cells = Vec::with_capacity((cells_x * cells_y) as usize);
        for _ in 0..cells_x * cells_y {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            cells.push((state >> 24) as u8);
        }
        GrayImage::from_fn(w, h, |x, y| Luma([cells[((y / 6) * cells_x + x / 6) as usize]]))
    }

    #[test]
    fn flat_image_has_no_corners() {
        let img = GrayImage::from_pixel(64, 64, Luma([90]));
        assert!(CornerExtractor::default().extract(&img, None).is_empty());
    }

    #[test]
    fn textured_image_has_described_corners() {
        let img = textured(96, 96, 7);
        let f = CornerExtractor::default().extract(&img, None);
        assert!(f.len() > 10);
        assert_eq!(f.keypoints.len(), f.descriptors.len());
        assert_eq!(f.test_pairs.len(), DESCRIPTOR_BITS);
        for d in &f.descriptors {
            assert_eq!(d.get_size() as usize, DESCRIPTOR_BITS);
        }
    }

    #[test]
    fn keypoints_keep_clear_of_border() {
        let img = textured(96, 64, 3);
        for kp in CornerExtractor::default().extract(&img, None).keypoints {
            assert!((BORDER..96 - BORDER).contains(&kp.x));
            assert!((BORDER..64 - BORDER).contains(&kp.y));
        }
    }

    #[test]
    fn small_images_yield_nothing() {
        let img = textured(2 * BORDER, 2 * BORDER, 3);
        assert!(CornerExtractor::default().extract(&img, None).is_empty());
    }

    #[test]
    fn reference_pins_the_sampling_pattern() {
        let extractor = CornerExtractor::default();
        let img = textured(80, 80, 11);
        let template = extractor.extract(&img, None);
        let source = extractor.extract(&img, Some(&template));
        assert_eq!(source.len(), template.len());
        assert_eq!(source.test_pairs.len(), template.test_pairs.len());
        for (a, b) in source.descriptors.iter().zip(&template.descriptors) {
            assert_eq!(a.hamming_distance(b), 0);
        }
    }

    #[test]
    fn ratio_test_accepts_identical_descriptors() {
        let extractor = CornerExtractor::default();
        let img = textured(80, 80, 11);
        let template = extractor.extract(&img, None);
        let source = extractor.extract(&img, Some(&template));
        let matches = knn_ratio_matches(&template, &source, 0.75);
        assert!(!matches.is_empty());
        for m in &matches {
            assert_eq!(m.template_idx, m.source_idx);
            assert_eq!(m.distance, 0);
        }
    }

    #[test]
    fn too_few_source_descriptors_yield_nothing() {
        let f = CornerExtractor::default().extract(&textured(80, 80, 5), None);
        assert!(knn_ratio_matches(&f, &Features::default(), 0.75).is_empty());
    }
}
