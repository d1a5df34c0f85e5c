//! Patch planning: from a mask to a set of inference tiles.
//!
//! The planner computes the tight bounding box of the masked pixels,
//! expands it with context margin, guarantees the fixed model input size
//! where the image allows it, and falls back to an overlapping raster of
//! tiles when the region is larger than one model input.

use image::GrayImage;
use tracing::debug;

use crate::config::EngineConfig;
use crate::mask::MASK_THRESHOLD;

/// One planned crop of the image+mask, in source-image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSpec {
    /// Left edge of the crop.
    pub x: u32,
    /// Top edge of the crop.
    pub y: u32,
    /// Crop width.
    pub width: u32,
    /// Crop height.
    pub height: u32,
}

/// The planner's output: tiles in row-major order.
///
/// Order is significant: later tiles' blending can overwrite earlier
/// tiles' feather-boundary pixels in overlap zones, so processing tiles
/// in plan order keeps multi-tile results deterministic.
#[derive(Debug, Clone, Default)]
pub struct TilePlan {
    /// Planned tiles, top-to-bottom then left-to-right.
    pub tiles: Vec<TileSpec>,
}

impl TilePlan {
    /// True when the mask had no pixels to repaint.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// Tight bounding box `(x, y, w, h)` of mask pixels above the threshold,
/// or `None` for an all-zero mask.
#[must_use]
pub fn mask_bbox(mask: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let (w, h) = mask.dimensions();
    let mut min_x = w;
    let mut min_y = h;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut any = false;

    for (x, y, p) in mask.enumerate_pixels() {
        if p[0] > MASK_THRESHOLD {
            any = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    any.then(|| (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

/// Expand a bounding box by the context margin, then grow it symmetrically
/// around its center until each axis reaches the model input size, clamped
/// to image bounds throughout.
fn expand_bbox(
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    img_w: u32,
    img_h: u32,
    cfg: &EngineConfig,
) -> (u32, u32, u32, u32) {
    let margin = cfg.context_margin;
    let size = cfg.input_size;

    let mut x = x.saturating_sub(margin);
    let mut y = y.saturating_sub(margin);
    let mut w = (w + 2 * margin).min(img_w - x);
    let mut h = (h + 2 * margin).min(img_h - y);

    if w < size {
        let left = (size - w) / 2;
        x = x.saturating_sub(left);
        w = size.min(img_w - x);
        if w < size {
            // Hit the right edge; take the remainder from the left.
            x = x.saturating_sub(size - w);
            w = size.min(img_w - x);
        }
    }
    if h < size {
        let top = (size - h) / 2;
        y = y.saturating_sub(top);
        h = size.min(img_h - y);
        if h < size {
            y = y.saturating_sub(size - h);
            h = size.min(img_h - y);
        }
    }

    (x, y, w, h)
}

/// Count masked pixels inside a tile.
#[must_use]
pub fn masked_pixels_in(mask: &GrayImage, tile: &TileSpec) -> usize {
    let mut count = 0usize;
    for dy in 0..tile.height {
        for dx in 0..tile.width {
            if mask.get_pixel(tile.x + dx, tile.y + dy)[0] > MASK_THRESHOLD {
                count += 1;
            }
        }
    }
    count
}

/// Plan the tiles needed to repaint `mask`.
///
/// An all-zero mask yields an empty plan (no-op path). A masked region
/// that fits one model input yields a single expanded tile; larger
/// regions are covered by an overlapping raster scan with stride
/// `input_size - tile_overlap`, skipping tiles that intersect fewer than
/// `min_masked_pixels` masked pixels.
#[must_use]
pub fn plan_tiles(mask: &GrayImage, cfg: &EngineConfig) -> TilePlan {
    let (img_w, img_h) = mask.dimensions();

    let Some((bx, by, bw, bh)) = mask_bbox(mask) else {
        return TilePlan::default();
    };

    let (cx, cy, cw, ch) = expand_bbox(bx, by, bw, bh, img_w, img_h, cfg);
    let size = cfg.input_size;

    if cw <= size && ch <= size {
        debug!(x = cx, y = cy, w = cw, h = ch, "single-tile plan");
        return TilePlan {
            tiles: vec![TileSpec {
                x: cx,
                y: cy,
                width: cw,
                height: ch,
            }],
        };
    }

    // An overlap tuned to >= the input size would stall the raster.
    let stride = size.saturating_sub(cfg.tile_overlap).max(1);
    let mut tiles = Vec::new();

    let mut y = cy;
    while y < cy + ch {
        let mut x = cx;
        while x < cx + cw {
            let tile = TileSpec {
                x,
                y,
                width: size.min(img_w - x),
                height: size.min(img_h - y),
            };
            if masked_pixels_in(mask, &tile) >= cfg.min_masked_pixels {
                tiles.push(tile);
            }
            x += stride;
        }
        y += stride;
    }

    debug!(tiles = tiles.len(), "multi-tile plan");
    TilePlan { tiles }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn mask_with_rect(w: u32, h: u32, rx: u32, ry: u32, rw: u32, rh: u32) -> GrayImage {
        let mut mask = GrayImage::new(w, h);
        for y in ry..ry + rh {
            for x in rx..rx + rw {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        mask
    }

    #[test]
    fn bbox_of_empty_mask_is_none() {
        let mask = GrayImage::new(100, 100);
        assert!(mask_bbox(&mask).is_none());
    }

    #[test]
    fn bbox_is_tight() {
        let mask = mask_with_rect(100, 100, 30, 40, 10, 5);
        assert_eq!(mask_bbox(&mask), Some((30, 40, 10, 5)));
    }

    #[test]
    fn empty_mask_yields_empty_plan() {
        let cfg = EngineConfig::default();
        let mask = GrayImage::new(512, 512);
        assert!(plan_tiles(&mask, &cfg).is_empty());
    }

    #[test]
    fn small_rect_in_large_image_yields_single_full_size_tile() {
        let cfg = EngineConfig::default();
        // A 40x20 rect at (100,100) of a 512x512 image fits one tile.
        let mask = mask_with_rect(512, 512, 100, 100, 40, 20);
        let plan = plan_tiles(&mask, &cfg);

        assert_eq!(plan.tiles.len(), 1);
        let tile = plan.tiles[0];
        assert_eq!(tile.width, 512);
        assert_eq!(tile.height, 512);
        assert!(tile.x + tile.width <= 512);
        assert!(tile.y + tile.height <= 512);
    }

    #[test]
    fn expanded_tile_meets_input_size_whenever_image_allows() {
        let cfg = EngineConfig::default();
        for (mx, my) in [(0, 0), (700, 20), (10, 700), (750, 750)] {
            let mask = mask_with_rect(800, 800, mx, my, 30, 30);
            let plan = plan_tiles(&mask, &cfg);
            assert_eq!(plan.tiles.len(), 1);
            let tile = plan.tiles[0];
            assert!(tile.width >= cfg.input_size, "tile width {}", tile.width);
            assert!(tile.height >= cfg.input_size, "tile height {}", tile.height);
            assert!(tile.x + tile.width <= 800);
            assert!(tile.y + tile.height <= 800);
        }
    }

    #[test]
    fn tile_clamped_for_images_smaller_than_input_size() {
        let cfg = EngineConfig::default();
        let mask = mask_with_rect(300, 200, 50, 50, 40, 40);
        let plan = plan_tiles(&mask, &cfg);
        assert_eq!(plan.tiles.len(), 1);
        let tile = plan.tiles[0];
        assert_eq!((tile.x, tile.y), (0, 0));
        assert_eq!((tile.width, tile.height), (300, 200));
    }

    #[test]
    fn large_mask_yields_overlapping_multi_tile_plan() {
        let cfg = EngineConfig::default();
        // A 900x900 masked region in a 2000x2000 image needs a raster.
        let mask = mask_with_rect(2000, 2000, 500, 500, 900, 900);
        let plan = plan_tiles(&mask, &cfg);

        assert!(plan.tiles.len() > 1);
        let stride = cfg.input_size - cfg.tile_overlap;
        // Expanded box is 964x964; the raster covers it in ceil(964/448)=3
        // steps per axis, and every tile intersects the big central mask.
        let expected_per_axis = 964_u32.div_ceil(stride);
        assert_eq!(plan.tiles.len(), (expected_per_axis * expected_per_axis) as usize);

        for tile in &plan.tiles {
            assert!(tile.x + tile.width <= 2000);
            assert!(tile.y + tile.height <= 2000);
        }
    }

    #[test]
    fn multi_tile_plan_is_row_major() {
        let cfg = EngineConfig::default();
        let mask = mask_with_rect(2000, 2000, 500, 500, 900, 900);
        let plan = plan_tiles(&mask, &cfg);

        for pair in plan.tiles.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(b.y > a.y || (b.y == a.y && b.x > a.x));
        }
    }

    #[test]
    fn multi_tile_plan_covers_every_masked_pixel() {
        let cfg = EngineConfig::default();
        let mask = mask_with_rect(2000, 2000, 500, 500, 900, 900);
        let plan = plan_tiles(&mask, &cfg);

        let mut covered = vec![false; 2000 * 2000];
        for tile in &plan.tiles {
            for dy in 0..tile.height {
                for dx in 0..tile.width {
                    covered[((tile.y + dy) * 2000 + tile.x + dx) as usize] = true;
                }
            }
        }
        for (x, y, p) in mask.enumerate_pixels() {
            if p[0] > MASK_THRESHOLD {
                assert!(covered[(y * 2000 + x) as usize], "uncovered mask pixel ({x},{y})");
            }
        }
    }

    #[test]
    fn overlap_at_or_above_input_size_still_terminates() {
        let cfg = EngineConfig {
            input_size: 32,
            tile_overlap: 48,
            ..EngineConfig::default()
        };
        let mask = mask_with_rect(100, 100, 20, 20, 60, 60);
        let plan = plan_tiles(&mask, &cfg);
        assert!(!plan.is_empty());
        for tile in &plan.tiles {
            assert!(tile.x + tile.width <= 100);
            assert!(tile.y + tile.height <= 100);
        }
    }

    #[test]
    fn tiles_touching_only_margin_are_skipped() {
        let cfg = EngineConfig::default();
        // Two distant blobs force a wide expanded box with empty middle.
        let mut mask = mask_with_rect(3000, 600, 100, 250, 60, 60);
        for y in 250..310 {
            for x in 2800..2860 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let plan = plan_tiles(&mask, &cfg);
        assert!(!plan.is_empty());
        for tile in &plan.tiles {
            assert!(masked_pixels_in(&mask, tile) >= cfg.min_masked_pixels);
        }
    }
}
