//! Local neural backend: ONNX inpainting over planned tiles.
//!
//! The session is loaded once at engine construction and shared by
//! reference across requests; ONNX Runtime requires `&mut` for `run`, so
//! calls are serialized through a mutex. Each request runs the
//! plan -> tile -> blend pipeline sequentially (tiles share a mutating
//! output buffer) inside `spawn_blocking` so inference does not stall the
//! caller's scheduler.

use std::borrow::Cow;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{imageops, GrayImage, RgbImage};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputs};
use ort::value::TensorRef;
use tracing::{debug, info, warn};

use super::{BackendOutcome, InpaintBackend};
use crate::blend::blend_tile;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::mask::masked_pixel_count;
use crate::plan::plan_tiles;
use crate::tile::{process_tile, TileInference};

/// The local neural backend.
pub struct LocalBackend {
    session: Option<Arc<Mutex<Session>>>,
    config: EngineConfig,
}

impl LocalBackend {
    /// Construct the backend, loading the model when a path is
    /// configured. A missing or unloadable model leaves the backend
    /// unavailable rather than failing engine construction.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        let session = match &config.model_path {
            Some(path) => match load_session(path) {
                Ok(session) => {
                    info!(model = %path.display(), "local inpainting model loaded");
                    Some(Arc::new(Mutex::new(session)))
                }
                Err(e) => {
                    warn!(model = %path.display(), error = %e, "local model load failed");
                    None
                }
            },
            None => None,
        };
        Self {
            session,
            config: config.clone(),
        }
    }

    /// True when the model is loaded and the backend can run.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }
}

/// Load an ONNX session from a model file.
fn load_session(path: &Path) -> Result<Session> {
    Session::builder()
        .and_then(|b| Ok(b.with_optimization_level(GraphOptimizationLevel::Level3)?))
        .and_then(|mut b| b.commit_from_file(path))
        .map_err(|e| Error::ModelLoad(e.to_string()))
}

/// [`TileInference`] over a shared ONNX session.
///
/// Input tensors are routed by name: the model input whose name contains
/// `"mask"` receives the mask tensor, every other input receives the
/// image tensor. The first output is taken as the inpainted result.
struct OrtTileInference {
    session: Arc<Mutex<Session>>,
}

impl TileInference for OrtTileInference {
    fn infer(&self, image: &Array4<f32>, mask: &Array4<f32>) -> Result<Array4<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::BackendFailed("inference session lock poisoned".to_string()))?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        let output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| Error::BackendFailed("model declares no outputs".to_string()))?;

        let mut feeds = Vec::with_capacity(input_names.len());
        for name in &input_names {
            let source = if name.to_lowercase().contains("mask") {
                mask
            } else {
                image
            };
            let dims: Vec<i64> = source.shape().iter().map(|&d| d as i64).collect();
            let data = source.as_slice().ok_or_else(|| {
                Error::BackendFailed("input tensor is not contiguous".to_string())
            })?;
            let tensor = TensorRef::from_array_view((dims, data))
                .map_err(|e| Error::BackendFailed(format!("failed to build input tensor: {e}")))?;
            feeds.push((Cow::Owned(name.clone()), tensor.into()));
        }

        let inputs: SessionInputs<'_, '_, 0> = SessionInputs::ValueMap(feeds);
        let outputs = session
            .run(inputs)
            .map_err(|e| Error::BackendFailed(format!("inference failed: {e}")))?;

        let (shape, data) = outputs[output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::BackendFailed(format!("failed to extract output: {e}")))?;

        let dims: Vec<usize> = shape
            .iter()
            .map(|&d| usize::try_from(d).unwrap_or(0))
            .collect();
        if dims.len() != 4 {
            return Err(Error::BackendFailed(format!(
                "expected 4-D output, got shape {dims:?}"
            )));
        }
        Array4::from_shape_vec((dims[0], dims[1], dims[2], dims[3]), data.to_vec())
            .map_err(|e| Error::BackendFailed(format!("output shape mismatch: {e}")))
    }
}

/// Run the full tiled pipeline synchronously. Shared by the async
/// `attempt` wrapper and tests that substitute a mock inference.
pub(crate) fn inpaint_tiled(
    image: &RgbImage,
    mask: &GrayImage,
    inference: &dyn TileInference,
    cfg: &EngineConfig,
) -> Result<RgbImage> {
    if masked_pixel_count(mask) < cfg.min_masked_pixels {
        return Ok(image.clone());
    }

    let plan = plan_tiles(mask, cfg);
    if plan.is_empty() {
        return Ok(image.clone());
    }

    let mut result = image.clone();
    for tile in &plan.tiles {
        debug!(
            x = tile.x,
            y = tile.y,
            w = tile.width,
            h = tile.height,
            "processing tile"
        );
        let image_crop =
            imageops::crop_imm(image, tile.x, tile.y, tile.width, tile.height).to_image();
        let mask_crop =
            imageops::crop_imm(mask, tile.x, tile.y, tile.width, tile.height).to_image();

        let inferred = process_tile(&image_crop, &mask_crop, inference, cfg.input_size)?;
        blend_tile(
            &mut result,
            &inferred,
            &mask_crop,
            tile.x,
            tile.y,
            cfg.feather_radius,
        );
    }
    Ok(result)
}

#[async_trait]
impl InpaintBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn available(&self) -> bool {
        self.is_loaded()
    }

    async fn attempt(&self, image: &RgbImage, mask: &GrayImage) -> BackendOutcome {
        let Some(session) = &self.session else {
            return BackendOutcome::Unavailable("local model not loaded".to_string());
        };

        let inference = OrtTileInference {
            session: Arc::clone(session),
        };
        let image = image.clone();
        let mask = mask.clone();
        let cfg = self.config.clone();

        let joined = tokio::task::spawn_blocking(move || {
            inpaint_tiled(&image, &mask, &inference, &cfg)
        })
        .await;

        match joined {
            Ok(Ok(result)) => BackendOutcome::Success(result),
            Ok(Err(e)) => BackendOutcome::Failed(e.to_string()),
            Err(e) => BackendOutcome::Failed(format!("inference task panicked: {e}")),
        }
    }
}
