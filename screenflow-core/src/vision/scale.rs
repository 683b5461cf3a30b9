//! Downscaling before matching, and mapping results back.

use image::RgbImage;
use image::imageops::{self, FilterType};

use crate::geometry::Point;

/// Factor that brings the longest side of a `width × height` image down to
/// `max_side`, or `1.0` when it already fits.
pub fn scale_factor(width: u32, height: u32, max_side: u32) -> f64 {
    let longest = width.max(height);
    if longest <= max_side || longest == 0 {
        1.0
    } else {
        f64::from(max_side) / f64::from(longest)
    }
}

/// Resize by `scale` with bilinear filtering. Each side is at least 1.
pub fn scale_by(image: &RgbImage, scale: f64) -> RgbImage {
    if scale == 1.0 {
        return image.clone();
    }
    let w = ((f64::from(image.width()) * scale) as u32).max(1);
    let h = ((f64::from(image.height()) * scale) as u32).max(1);
    imageops::resize(image, w, h, FilterType::Triangle)
}

/// Downscale a frame so its longest side is at most `max_side`.
pub fn downscale(image: &RgbImage, max_side: u32) -> (RgbImage, f64) {
    let scale = scale_factor(image.width(), image.height(), max_side);
    (scale_by(image, scale), scale)
}

/// Map a point found in scaled coordinates back to the original frame.
pub fn restore_point(p: Point, scale: f64) -> Point {
    if scale == 1.0 {
        return p;
    }
    Point::new(
        (f64::from(p.x) / scale).round() as i32,
        (f64::from(p.y) / scale).round() as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn small_frames_are_untouched() {
        assert_eq!(scale_factor(640, 480, 640), 1.0);
        let img = RgbImage::from_pixel(100, 50, Rgb([1, 2, 3]));
        let (out, scale) = downscale(&img, 640);
        assert_eq!(scale, 1.0);
        assert_eq!(out.dimensions(), (100, 50));
    }

    #[test]
    fn longest_side_becomes_max_side() {
        let img = RgbImage::new(1080, 2400);
        let (out, scale) = downscale(&img, 640);
        assert_eq!(out.height(), 640);
        assert_eq!(out.width(), 288);
        assert!((scale - 640.0 / 2400.0).abs() < 1e-12);
    }

    #[test]
    fn restore_is_within_a_pixel_on_the_scaled_grid() {
        // (frame size, max side, original pixels per scaled step)
        let cases = [
            ((1080, 2400), 640, 15),
            ((1080, 1920), 640, 3),
            ((720, 1280), 640, 2),
            ((1600, 800), 1280, 5),
            ((2560, 1440), 640, 4),
        ];
        for ((w, h), max_side, step) in cases {
            let scale = scale_factor(w, h, max_side);
            for k in 0..w.min(h) as i32 / step {
                let original = Point::new(k * step, (k / 2) * step);
                let scaled = Point::new(
                    (f64::from(original.x) * scale).round() as i32,
                    (f64::from(original.y) * scale).round() as i32,
                );
                let back = restore_point(scaled, scale);
                assert!(
                    (back.x - original.x).abs() <= 1 && (back.y - original.y).abs() <= 1,
                    "scale {scale}: {original} -> {scaled} -> {back}"
                );
            }
        }
    }

    #[test]
    fn restore_is_exact_for_scaled_grid_points() {
        let scale = 0.5;
        assert_eq!(restore_point(Point::new(10, 21), scale), Point::new(20, 42));
        let third = scale_factor(1080, 1920, 640);
        assert_eq!(restore_point(Point::new(10, 7), third), Point::new(30, 21));
    }

    #[test]
    fn tiny_templates_keep_a_pixel() {
        let tpl = RgbImage::new(2, 2);
        assert_eq!(scale_by(&tpl, 0.1).dimensions(), (1, 1));
    }
}
