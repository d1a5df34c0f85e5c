//! Core inpainting engine and its upward-facing surface.

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use serde::Serialize;
use std::io::Cursor;
use tracing::{debug, info};

use crate::backend::{BackendChain, ClassicalBackend, CloudBackend, LocalBackend};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::mask::{build_mask, masked_pixel_count};
use crate::region::{Region, RegionDetector};

/// Backend availability snapshot for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    /// The preferred backend the engine will try first: `"cloud"`,
    /// `"local"`, or `"classical"`.
    pub mode: String,
    /// Whether the local neural model is loaded.
    pub local_loaded: bool,
    /// Whether a cloud credential is configured.
    pub cloud_available: bool,
}

/// The watermark-inpainting engine.
///
/// Owns the loaded model and the backend fallback chain. Create once at
/// process start and share by reference: the loaded model is read-only
/// after initialization and safe for concurrent requests, while each
/// request exclusively owns its own image, mask, and tile buffers.
///
/// ```no_run
/// use watermark_inpaint::{EngineConfig, InpaintEngine};
///
/// # async fn example(image_bytes: Vec<u8>) -> watermark_inpaint::Result<()> {
/// let engine = InpaintEngine::new(EngineConfig::default());
/// let cleaned = engine.remove_watermark(&image_bytes, None).await?;
/// # Ok(())
/// # }
/// ```
pub struct InpaintEngine {
    config: EngineConfig,
    chain: BackendChain,
    detector: Option<Box<dyn RegionDetector>>,
    local_loaded: bool,
    cloud_available: bool,
}

impl InpaintEngine {
    /// Build the engine: load the local model if configured, set up the
    /// cloud client if a credential is present, and assemble the fallback
    /// chain. Construction never fails; missing models or credentials
    /// only shrink the set of available backends (the classical fallback
    /// is always present).
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let local = LocalBackend::new(&config);
        let local_loaded = local.is_loaded();
        let cloud_available = config.cloud_configured();

        let mut backends: Vec<Box<dyn crate::backend::InpaintBackend>> = Vec::with_capacity(3);
        if cloud_available {
            backends.push(Box::new(CloudBackend::new(&config)));
        }
        backends.push(Box::new(local));
        backends.push(Box::new(ClassicalBackend));

        let chain = BackendChain::new(backends);
        info!(
            local_loaded,
            cloud_available,
            backends = ?chain.names().collect::<Vec<_>>(),
            "inpainting engine initialized"
        );

        Self {
            config,
            chain,
            detector: None,
            local_loaded,
            cloud_available,
        }
    }

    /// Attach a region detector used when no user mask is supplied.
    #[must_use]
    pub fn with_detector(mut self, detector: Box<dyn RegionDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Remove watermark content from an encoded image.
    ///
    /// With `mask_bytes`, the supplied mask selects the pixels to
    /// repaint; without it, the attached detector's regions drive the
    /// mask. An all-zero mask (nothing detected, or everything filtered)
    /// is a no-op: the input bytes are returned unchanged. Otherwise the
    /// backend chain runs and the winning image is PNG-encoded.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] when the image or mask cannot be decoded
    /// (detected before any backend runs); [`Error::AllBackendsExhausted`]
    /// when no backend produced an image.
    pub async fn remove_watermark(
        &self,
        image_bytes: &[u8],
        mask_bytes: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        let image = decode_rgb(image_bytes)?;
        let (width, height) = image.dimensions();

        let mask = match mask_bytes {
            Some(bytes) => {
                let user_mask = decode_mask(bytes)?;
                build_mask(width, height, Some(&user_mask), None, &self.config)
            }
            None => {
                let regions = self.detector.as_ref().map(|d| d.detect(&image));
                build_mask(width, height, None, regions.as_deref(), &self.config)
            }
        };

        if masked_pixel_count(&mask) == 0 {
            debug!("mask is empty, returning input unchanged");
            return Ok(image_bytes.to_vec());
        }

        let result = self.chain.run(&image, &mask).await?;
        encode_png(&result)
    }

    /// Detect candidate watermark regions in an encoded image.
    ///
    /// Returns raw (unfiltered) detector output; an engine without a
    /// detector reports no regions.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] when the image cannot be decoded.
    pub fn detect_regions(&self, image_bytes: &[u8]) -> Result<Vec<Region>> {
        let image = decode_rgb(image_bytes)?;
        Ok(self
            .detector
            .as_ref()
            .map(|d| d.detect(&image))
            .unwrap_or_default())
    }

    /// Report which backends are currently available.
    #[must_use]
    pub fn backend_status(&self) -> BackendStatus {
        let mode = if self.cloud_available {
            "cloud"
        } else if self.local_loaded {
            "local"
        } else {
            "classical"
        };
        BackendStatus {
            mode: mode.to_string(),
            local_loaded: self.local_loaded,
            cloud_available: self.cloud_available,
        }
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Decode image bytes to RGB, converting other color modes.
fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| Error::InvalidInput(format!("undecodable image: {e}")))
}

/// Decode mask bytes to a single-channel raster.
fn decode_mask(bytes: &[u8]) -> Result<GrayImage> {
    image::load_from_memory(bytes)
        .map(|img| img.to_luma8())
        .map_err(|e| Error::InvalidInput(format!("undecodable mask: {e}")))
}

/// PNG-encode an RGB image.
fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone()).write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    struct FixedDetector(Vec<Region>);

    impl RegionDetector for FixedDetector {
        fn detect(&self, _image: &RgbImage) -> Vec<Region> {
            self.0.clone()
        }
    }

    fn png_bytes(image: &RgbImage) -> Vec<u8> {
        encode_png(image).unwrap()
    }

    #[test]
    fn status_without_model_or_credential_is_classical() {
        let engine = InpaintEngine::new(EngineConfig::default());
        let status = engine.backend_status();
        assert_eq!(status.mode, "classical");
        assert!(!status.local_loaded);
        assert!(!status.cloud_available);
    }

    #[test]
    fn status_with_credential_prefers_cloud() {
        let config = EngineConfig {
            cloud_api_token: Some("r8_test".to_string()),
            ..EngineConfig::default()
        };
        let engine = InpaintEngine::new(config);
        assert_eq!(engine.backend_status().mode, "cloud");
        assert!(engine.backend_status().cloud_available);
    }

    #[tokio::test]
    async fn undecodable_image_is_rejected_before_any_backend() {
        let engine = InpaintEngine::new(EngineConfig::default());
        let err = engine
            .remove_watermark(b"definitely not an image", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn undecodable_mask_is_rejected() {
        let engine = InpaintEngine::new(EngineConfig::default());
        let image = png_bytes(&RgbImage::new(16, 16));
        let err = engine
            .remove_watermark(&image, Some(b"junk".as_slice()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn no_detector_and_no_mask_is_a_byte_identical_no_op() {
        let engine = InpaintEngine::new(EngineConfig::default());
        let image = png_bytes(&RgbImage::from_pixel(32, 32, Rgb([120, 90, 30])));
        let output = engine.remove_watermark(&image, None).await.unwrap();
        assert_eq!(output, image);
    }

    #[tokio::test]
    async fn filtered_out_detection_is_a_no_op() {
        // A region covering 80% of the image area must be filtered,
        // leaving an empty mask and a byte-identical output.
        let detector = FixedDetector(vec![Region {
            x: 0,
            y: 0,
            width: 64,
            height: 52,
            confidence: 0.99,
            text: Some("HUGE".to_string()),
        }]);
        let engine =
            InpaintEngine::new(EngineConfig::default()).with_detector(Box::new(detector));
        let image = png_bytes(&RgbImage::from_pixel(64, 64, Rgb([5, 6, 7])));

        let output = engine.remove_watermark(&image, None).await.unwrap();
        assert_eq!(output, image);
    }

    #[test]
    fn detect_regions_passes_through_detector_output() {
        let regions = vec![Region {
            x: 10,
            y: 12,
            width: 40,
            height: 14,
            confidence: 0.8,
            text: Some("sample".to_string()),
        }];
        let engine = InpaintEngine::new(EngineConfig::default())
            .with_detector(Box::new(FixedDetector(regions.clone())));
        let image = png_bytes(&RgbImage::new(100, 100));

        assert_eq!(engine.detect_regions(&image).unwrap(), regions);
    }

    #[test]
    fn detect_regions_without_detector_is_empty() {
        let engine = InpaintEngine::new(EngineConfig::default());
        let image = png_bytes(&RgbImage::new(10, 10));
        assert!(engine.detect_regions(&image).unwrap().is_empty());
    }
}
