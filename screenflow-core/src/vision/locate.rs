//! One-shot localization on a single frame, without settling or debounce.

use image::RgbImage;
use image::imageops::grayscale;

use crate::error::ScreenflowError;
use crate::geometry::Point;

use super::matching::Matcher;
use super::scale::{downscale, restore_point, scale_by};

/// Locate `template` in `frame` once.
///
/// Both images are scaled the way the pipeline scales them, so results
/// agree with [`VisionHandle::find`](super::VisionHandle::find) for a
/// settled screen. `Ok(None)` means the template is not on screen.
pub fn locate_once(
    frame: &RgbImage,
    template: &RgbImage,
    matcher: &dyn Matcher,
    max_side: u32,
) -> Result<Option<Point>, ScreenflowError> {
    if template.width() == 0 || template.height() == 0 {
        return Err(ScreenflowError::Template("template is empty".into()));
    }
    if frame.width() == 0 || frame.height() == 0 {
        return Ok(None);
    }

    let (scaled, scale) = downscale(frame, max_side);
    let source = grayscale(&scaled);
    let tpl = grayscale(&scale_by(template, scale));
    Ok(matcher.locate(&source, &tpl).map(|p| restore_point(p, scale)))
}
