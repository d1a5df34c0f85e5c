//! Feathered compositing of inferred tiles onto the source image.
//!
//! A binary mask composited directly would leave a visible edge at the
//! repaint boundary. Blurring the binarized mask into a `[0, 1]` alpha
//! gradient, while forcing alpha to exactly 1 inside the mask interior,
//! replaces fully-masked pixels outright and fades smoothly to the
//! original outside.

use image::{GrayImage, Luma, RgbImage};
use imageproc::filter::gaussian_blur_f32;

use crate::mask::MASK_THRESHOLD;

/// Build a feather alpha map for a tile mask crop.
///
/// The mask is binarized, Gaussian-blurred with a kernel spanning
/// `2 * feather_radius + 1` pixels, normalized to `[0, 1]`, then forced
/// back to exactly 1.0 wherever the binarized mask is set. Returned as a
/// flat row-major `Vec<f32>` of length `width * height`.
#[must_use]
pub fn feather_mask(mask_crop: &GrayImage, feather_radius: u32) -> Vec<f32> {
    let (w, h) = mask_crop.dimensions();

    let binary = GrayImage::from_fn(w, h, |x, y| {
        if mask_crop.get_pixel(x, y)[0] > MASK_THRESHOLD {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });

    // Sigma matching a blur kernel of size 2r+1.
    #[allow(clippy::cast_precision_loss)]
    let sigma = 0.3 * (feather_radius as f32 - 1.0) + 0.8;
    let blurred = gaussian_blur_f32(&binary, sigma.max(0.1));

    let mut alpha = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            if binary.get_pixel(x, y)[0] > MASK_THRESHOLD {
                alpha.push(1.0);
            } else {
                alpha.push(f32::from(blurred.get_pixel(x, y)[0]) / 255.0);
            }
        }
    }
    alpha
}

/// Composite an inferred tile over `base` at `(x, y)` using a feathered
/// alpha map built from the tile's mask crop.
///
/// Per channel: `out = base * (1 - alpha) + inferred * alpha`, accumulated
/// in float and rounded back to `u8`. For multi-tile plans this is called
/// tile-by-tile on a shared accumulating buffer in plan order; later
/// writes only replace pixels where their own alpha is nonzero.
pub fn blend_tile(
    base: &mut RgbImage,
    inferred: &RgbImage,
    mask_crop: &GrayImage,
    x: u32,
    y: u32,
    feather_radius: u32,
) {
    let (tile_w, tile_h) = inferred.dimensions();
    let (img_w, img_h) = base.dimensions();

    // Clip to image bounds
    let x2 = (x + tile_w).min(img_w);
    let y2 = (y + tile_h).min(img_h);
    if x >= x2 || y >= y2 {
        return;
    }

    let alpha = feather_mask(mask_crop, feather_radius);

    for dy in 0..(y2 - y) {
        for dx in 0..(x2 - x) {
            let a = alpha[(dy * tile_w + dx) as usize];
            if a <= 0.0 {
                continue;
            }
            let src = inferred.get_pixel(dx, dy);
            let dst = base.get_pixel_mut(x + dx, y + dy);
            for ch in 0..3 {
                let blended = f32::from(dst[ch]) * (1.0 - a) + f32::from(src[ch]) * a;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    dst[ch] = blended.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(w: u32, h: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb(color))
    }

    fn rect_mask(w: u32, h: u32, rx: u32, ry: u32, rw: u32, rh: u32) -> GrayImage {
        let mut mask = GrayImage::new(w, h);
        for y in ry..ry + rh {
            for x in rx..rx + rw {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        mask
    }

    #[test]
    fn feather_is_one_inside_mask_interior() {
        let mask = rect_mask(64, 64, 20, 20, 24, 24);
        let alpha = feather_mask(&mask, 16);
        for y in 20..44u32 {
            for x in 20..44u32 {
                let a = alpha[(y * 64 + x) as usize];
                assert!((a - 1.0).abs() < f32::EPSILON, "alpha at ({x},{y}) = {a}");
            }
        }
    }

    #[test]
    fn feather_decays_to_zero_far_from_mask() {
        let mask = rect_mask(128, 128, 60, 60, 8, 8);
        let alpha = feather_mask(&mask, 8);
        assert!(alpha[0] < 0.01);
        assert!(alpha[127] < 0.01);
        assert!(alpha[127 * 128] < 0.01);
    }

    #[test]
    fn feather_gradient_is_monotonic_leaving_the_mask() {
        let mask = rect_mask(96, 96, 40, 40, 16, 16);
        let alpha = feather_mask(&mask, 16);
        // Walking left from the mask edge, alpha should not increase.
        let y = 48u32;
        let mut prev = alpha[(y * 96 + 39) as usize];
        for x in (20..39u32).rev() {
            let a = alpha[(y * 96 + x) as usize];
            assert!(a <= prev + 1e-6, "alpha rose from {prev} to {a} at x={x}");
            prev = a;
        }
    }

    #[test]
    fn blend_replaces_interior_and_preserves_far_exterior() {
        let mut base = solid(100, 100, [10, 20, 30]);
        let inferred = solid(100, 100, [200, 100, 50]);
        let mask = rect_mask(100, 100, 40, 40, 20, 20);

        blend_tile(&mut base, &inferred, &mask, 0, 0, 8);

        // Fully-masked pixels take the inferred value exactly.
        assert_eq!(*base.get_pixel(50, 50), Rgb([200, 100, 50]));
        // Pixels far outside the feather stay original.
        assert_eq!(*base.get_pixel(2, 2), Rgb([10, 20, 30]));
    }

    #[test]
    fn blend_offsets_tile_by_origin() {
        let mut base = solid(200, 200, [0, 0, 0]);
        let inferred = solid(50, 50, [255, 255, 255]);
        let mask = rect_mask(50, 50, 10, 10, 30, 30);

        blend_tile(&mut base, &inferred, &mask, 100, 120, 4);

        assert_eq!(*base.get_pixel(125, 145), Rgb([255, 255, 255]));
        assert_eq!(*base.get_pixel(50, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn blend_clips_tiles_exceeding_image_bounds() {
        let mut base = solid(60, 60, [5, 5, 5]);
        let inferred = solid(50, 50, [250, 250, 250]);
        let mask = rect_mask(50, 50, 0, 0, 50, 50);

        // Tile extends past the bottom-right corner; must not panic.
        blend_tile(&mut base, &inferred, &mask, 30, 30, 4);
        assert_eq!(*base.get_pixel(59, 59), Rgb([250, 250, 250]));
    }

    #[test]
    fn empty_mask_leaves_base_untouched() {
        let mut base = solid(40, 40, [9, 9, 9]);
        let snapshot = base.clone();
        let inferred = solid(40, 40, [111, 111, 111]);
        let mask = GrayImage::new(40, 40);

        blend_tile(&mut base, &inferred, &mask, 0, 0, 16);
        assert_eq!(base, snapshot);
    }
}
