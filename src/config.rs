//! Engine configuration and empirical tunables.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for [`crate::InpaintEngine`].
///
/// The geometry constants (padding, margins, overlap, feather radius,
/// region filters) are empirically chosen; they are exposed here as
/// tunables rather than hardcoded at their use sites. The defaults
/// reproduce the reference behavior.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the local inpainting model (ONNX). `None` disables the
    /// local neural backend.
    pub model_path: Option<PathBuf>,
    /// API token for the cloud backend. `None` disables the cloud backend.
    pub cloud_api_token: Option<String>,
    /// Base URL of the cloud prediction API.
    pub cloud_endpoint: String,
    /// Model version identifier submitted with cloud jobs.
    pub cloud_model_version: String,
    /// Positive prompt for cloud inpainting.
    pub cloud_prompt: String,
    /// Negative prompt for cloud inpainting.
    pub cloud_negative_prompt: String,
    /// Maximum image dimension sent to the cloud backend; larger inputs
    /// are downscaled before submission and the result upscaled back.
    pub cloud_max_dimension: u32,
    /// Per-request timeout for cloud HTTP calls (submit, poll, output
    /// fetch). Bounds each call so a non-responding server cannot stall
    /// the attempt beyond the poll budget.
    pub http_timeout: Duration,
    /// Delay between cloud job status polls.
    pub poll_interval: Duration,
    /// Maximum number of status polls before the cloud attempt is
    /// abandoned. Together with `poll_interval` this bounds the whole
    /// cloud attempt.
    pub max_polls: u32,
    /// Fixed spatial input size `S` of the local neural model. Every tile
    /// is fed to inference at exactly `S`x`S`.
    pub input_size: u32,
    /// Context margin added around the mask bounding box before cropping.
    pub context_margin: u32,
    /// Overlap between adjacent tiles in multi-tile plans. Must be
    /// smaller than `input_size`; larger values are clamped so the
    /// raster stride stays at least one pixel.
    pub tile_overlap: u32,
    /// Feather radius for the blend alpha gradient.
    pub feather_radius: u32,
    /// Padding added around each detected region when rasterizing the
    /// auto-generated mask.
    pub region_padding: u32,
    /// Gaussian sigma applied to the auto-generated mask to soften
    /// rectangle corners.
    pub mask_blur_sigma: f32,
    /// Detected regions narrower than this are dropped.
    pub min_region_width: u32,
    /// Detected regions shorter than this are dropped.
    pub min_region_height: u32,
    /// Detected regions covering more than this fraction of the image
    /// area are dropped (likely body text or photo content, not a
    /// watermark).
    pub max_region_area_fraction: f32,
    /// At most this many detected regions are kept, highest confidence
    /// first.
    pub max_regions: usize,
    /// Tiles intersecting fewer masked pixels than this are skipped.
    pub min_masked_pixels: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            cloud_api_token: None,
            cloud_endpoint: "https://api.replicate.com/v1".to_string(),
            cloud_model_version: "95b7223104132402a9ae91cc677285bc5eb997834bd2349fa486f53910fd68b3"
                .to_string(),
            cloud_prompt: "clean background, seamless, high quality, detailed".to_string(),
            cloud_negative_prompt: "watermark, text, logo, blurry, low quality".to_string(),
            cloud_max_dimension: 1024,
            http_timeout: Duration::from_secs(180),
            poll_interval: Duration::from_secs(1),
            max_polls: 90,
            input_size: 512,
            context_margin: 32,
            tile_overlap: 64,
            feather_radius: 16,
            region_padding: 10,
            mask_blur_sigma: 2.0,
            min_region_width: 20,
            min_region_height: 10,
            max_region_area_fraction: 0.15,
            max_regions: 5,
            min_masked_pixels: 10,
        }
    }
}

impl EngineConfig {
    /// True when a cloud credential is configured.
    #[must_use]
    pub fn cloud_configured(&self) -> bool {
        self.cloud_api_token
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }
}
