//! Candidate watermark regions and the detector seam.

use image::RgbImage;
use serde::Serialize;

use crate::config::EngineConfig;

/// A candidate watermark/text region reported by a detector.
///
/// Coordinates are in source-image pixels. Regions are immutable once
/// produced and are consumed only by the mask builder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    /// Left edge of the bounding box.
    pub x: u32,
    /// Top edge of the bounding box.
    pub y: u32,
    /// Bounding box width.
    pub width: u32,
    /// Bounding box height.
    pub height: u32,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    /// Recognized text, when the detector provides it.
    pub text: Option<String>,
}

/// Text/watermark region detector, treated as a black box.
///
/// Implementations wrap an external detection capability (OCR, template
/// matching, a dedicated model). May return an empty list; no latency
/// guarantees.
pub trait RegionDetector: Send + Sync {
    /// Detect candidate regions in `image`.
    fn detect(&self, image: &RgbImage) -> Vec<Region>;
}

/// Filter raw detector output down to plausible watermark candidates.
///
/// Drops regions below the minimum pixel footprint and regions covering
/// more than `max_region_area_fraction` of the image (body text or photo
/// content rather than a watermark), then keeps the `max_regions` highest
/// confidence survivors.
#[must_use]
pub fn filter_regions(
    regions: &[Region],
    image_width: u32,
    image_height: u32,
    cfg: &EngineConfig,
) -> Vec<Region> {
    #[allow(clippy::cast_precision_loss)]
    let image_area = (image_width as f32) * (image_height as f32);
    if image_area <= 0.0 {
        return Vec::new();
    }

    let mut kept: Vec<Region> = regions
        .iter()
        .filter(|r| r.width >= cfg.min_region_width && r.height >= cfg.min_region_height)
        .filter(|r| {
            #[allow(clippy::cast_precision_loss)]
            let area = (r.width as f32) * (r.height as f32);
            area / image_area <= cfg.max_region_area_fraction
        })
        .cloned()
        .collect();

    kept.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    kept.truncate(cfg.max_regions);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: u32, y: u32, w: u32, h: u32, conf: f32) -> Region {
        Region {
            x,
            y,
            width: w,
            height: h,
            confidence: conf,
            text: None,
        }
    }

    #[test]
    fn filter_drops_tiny_regions() {
        let cfg = EngineConfig::default();
        let regions = vec![region(0, 0, 19, 30, 0.9), region(0, 0, 30, 9, 0.9)];
        assert!(filter_regions(&regions, 1000, 1000, &cfg).is_empty());
    }

    #[test]
    fn filter_drops_oversized_regions() {
        let cfg = EngineConfig::default();
        // 80% of a 100x100 image, well above the 15% ceiling.
        let regions = vec![region(0, 0, 100, 80, 0.99)];
        assert!(filter_regions(&regions, 100, 100, &cfg).is_empty());
    }

    #[test]
    fn filter_keeps_top_confidence_regions_in_order() {
        let cfg = EngineConfig::default();
        let regions: Vec<Region> = (0..8)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let confidence = 0.1 + (i as f32) * 0.1;
                region(i * 30, 0, 25, 15, confidence)
            })
            .collect();

        let kept = filter_regions(&regions, 2000, 2000, &cfg);
        assert_eq!(kept.len(), cfg.max_regions);
        for pair in kept.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn filter_of_empty_input_is_empty() {
        let cfg = EngineConfig::default();
        assert!(filter_regions(&[], 640, 480, &cfg).is_empty());
    }
}
