//! Mask construction from user input or detected regions.
//!
//! A mask is a single-channel raster with the same dimensions as the
//! source image; values above 127 mark pixels to be repainted. Masks are
//! built once per request and never partially mutated.

use image::{imageops, GrayImage, Luma};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::filter::gaussian_blur_f32;
use imageproc::rect::Rect;
use tracing::debug;

use crate::config::EngineConfig;
use crate::region::{filter_regions, Region};

/// Value above which a mask pixel counts as "to be repainted".
pub const MASK_THRESHOLD: u8 = 127;

/// Build a binary mask aligned to the source image dimensions.
///
/// A supplied user mask takes precedence over detector regions. User
/// masks with mismatched dimensions are resampled with nearest-neighbor
/// (masks are binary; smooth resampling would introduce spurious gray
/// levels). Without a user mask, surviving regions are expanded by
/// `region_padding`, rasterized as filled rectangles and blurred slightly
/// to soften corners. With neither input, or when no region survives
/// filtering, the mask is all zero, which signals a no-op downstream.
#[must_use]
pub fn build_mask(
    width: u32,
    height: u32,
    user_mask: Option<&GrayImage>,
    regions: Option<&[Region]>,
    cfg: &EngineConfig,
) -> GrayImage {
    if let Some(mask) = user_mask {
        return align_user_mask(mask, width, height);
    }

    let Some(regions) = regions else {
        return GrayImage::new(width, height);
    };

    let kept = filter_regions(regions, width, height, cfg);
    debug!(
        detected = regions.len(),
        kept = kept.len(),
        "building mask from detector regions"
    );
    if kept.is_empty() {
        return GrayImage::new(width, height);
    }

    let mut mask = GrayImage::new(width, height);
    for region in &kept {
        let pad = cfg.region_padding;
        let x = region.x.saturating_sub(pad);
        let y = region.y.saturating_sub(pad);
        if x >= width || y >= height {
            continue;
        }
        let w = (region.width + 2 * pad).min(width - x);
        let h = (region.height + 2 * pad).min(height - y);
        if w == 0 || h == 0 {
            continue;
        }
        #[allow(clippy::cast_possible_wrap)]
        let rect = Rect::at(x as i32, y as i32).of_size(w, h);
        draw_filled_rect_mut(&mut mask, rect, Luma([255u8]));
    }

    // Soften rectangle corners; feathering re-binarizes downstream.
    gaussian_blur_f32(&mask, cfg.mask_blur_sigma)
}

/// Resample a user mask to the image dimensions when they differ.
fn align_user_mask(mask: &GrayImage, width: u32, height: u32) -> GrayImage {
    if mask.width() == width && mask.height() == height {
        return mask.clone();
    }
    debug!(
        from_w = mask.width(),
        from_h = mask.height(),
        to_w = width,
        to_h = height,
        "resampling user mask to image dimensions"
    );
    imageops::resize(mask, width, height, imageops::FilterType::Nearest)
}

/// Count mask pixels above [`MASK_THRESHOLD`].
#[must_use]
pub fn masked_pixel_count(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p[0] > MASK_THRESHOLD).count()
}
