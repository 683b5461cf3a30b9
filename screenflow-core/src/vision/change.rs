//! Frame-to-frame change measurement.

use image::RgbImage;

/// Luma difference above which a pixel counts as changed.
pub const PIXEL_CHANGE_THRESHOLD: u8 = 25;

/// Fraction of pixels that changed between `a` and `b`, in `[0, 1]`.
///
/// Frames of different size (or empty frames) are fully changed.
pub fn change_ratio(a: &RgbImage, b: &RgbImage) -> f64 {
    change_ratio_with(a, b, PIXEL_CHANGE_THRESHOLD)
}

/// [`change_ratio`] with an explicit per-pixel threshold.
pub fn change_ratio_with(a: &RgbImage, b: &RgbImage, pixel_threshold: u8) -> f64 {
    if a.dimensions() != b.dimensions() || a.width() == 0 || a.height() == 0 {
        return 1.0;
    }

    let threshold = f64::from(pixel_threshold);
    let changed = a
        .pixels()
        .zip(b.pixels())
        .filter(|(pa, pb)| {
            let d = |i: usize| f64::from(pa[i].abs_diff(pb[i]));
            let luma = 0.299 * d(0) + 0.587 * d(1) + 0.114 * d(2);
            luma.round() > threshold
        })
        .count();

    let total = u64::from(a.width()) * u64::from(a.height());
    changed as f64 / total as f64
}

/// Whether two frames differ by less than `threshold`.
pub fn is_frame_static(a: &RgbImage, b: &RgbImage, threshold: f64) -> bool {
    change_ratio(a, b) < threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(w: u32, h: u32, v: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([v, v, v]))
    }

    #[test]
    fn identical_frames_have_zero_ratio() {
        let a = solid(10, 10, 128);
        assert_eq!(change_ratio(&a, &a.clone()), 0.0);
    }

    #[test]
    fn fully_different_frames_have_unit_ratio() {
        assert_eq!(change_ratio(&solid(10, 10, 0), &solid(10, 10, 255)), 1.0);
    }

    #[test]
    fn size_mismatch_is_fully_changed() {
        assert_eq!(change_ratio(&solid(10, 10, 0), &solid(10, 11, 0)), 1.0);
    }

    #[test]
    fn small_differences_are_ignored() {
        assert_eq!(change_ratio(&solid(8, 8, 100), &solid(8, 8, 120)), 0.0);
    }

    #[test]
    fn ratio_grows_with_changed_area() {
        let base = solid(20, 20, 0);
        let mut prev = 0.0;
        for rows in [2u32, 5, 10, 20] {
            let mut next = base.clone();
            for y in 0..rows {
                for x in 0..20 {
                    next.put_pixel(x, y, Rgb([255, 255, 255]));
                }
            }
            let r = change_ratio(&base, &next);
            assert!(r > prev);
            prev = r;
        }
        assert_eq!(prev, 1.0);
    }

    #[test]
    fn static_check_uses_threshold() {
        let a = solid(10, 10, 0);
        let mut b = a.clone();
        b.put_pixel(0, 0, Rgb([255, 255, 255]));
        assert!(is_frame_static(&a, &b, 0.05));
        assert!(!is_frame_static(&a, &b, 0.01));
    }
}
