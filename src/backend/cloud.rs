//! Cloud backend: submit/poll inpainting jobs against a prediction API.
//!
//! The remote service handles arbitrary image sizes, so the whole image
//! and mask are submitted untiled (downscaled when they exceed the
//! service limit, with the result scaled back). The attempt is bounded:
//! one submission, then at most `max_polls` status checks.

use std::io::Cursor;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{imageops::FilterType, DynamicImage, GrayImage, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{BackendOutcome, InpaintBackend};
use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// Cloud inpainting backend. Constructed only when a credential is
/// configured; a missing credential makes the backend unavailable.
pub struct CloudBackend {
    client: reqwest::Client,
    config: EngineConfig,
}

#[derive(Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

#[derive(Serialize)]
struct PredictionInput<'a> {
    image: String,
    mask: String,
    prompt: &'a str,
    negative_prompt: &'a str,
    num_inference_steps: u32,
    guidance_scale: f32,
}

#[derive(Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl CloudBackend {
    /// Build the backend from the engine configuration.
    ///
    /// Every HTTP call is bounded by `config.http_timeout`, so the whole
    /// attempt is limited to roughly `max_polls * (poll_interval +
    /// http_timeout)` even against a server that accepts connections and
    /// never responds.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "cloud client builder failed, using defaults");
                reqwest::Client::new()
            });
        Self {
            client,
            config: config.clone(),
        }
    }

    fn token(&self) -> Option<&str> {
        self.config
            .cloud_api_token
            .as_deref()
            .filter(|t| !t.is_empty())
    }

    async fn run(&self, image: &RgbImage, mask: &GrayImage, token: &str) -> Result<RgbImage> {
        let original_dims = image.dimensions();
        let (image, mask) = downscale_for_submission(image, mask, self.config.cloud_max_dimension);

        let request = PredictionRequest {
            version: &self.config.cloud_model_version,
            input: PredictionInput {
                image: png_data_uri(&DynamicImage::ImageRgb8(image))?,
                mask: png_data_uri(&DynamicImage::ImageLuma8(mask))?,
                prompt: &self.config.cloud_prompt,
                negative_prompt: &self.config.cloud_negative_prompt,
                num_inference_steps: 30,
                guidance_scale: 7.5,
            },
        };

        let response = self
            .client
            .post(format!("{}/predictions", self.config.cloud_endpoint))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::BackendFailed(format!("cloud submit failed: {e}")))?;

        if response.status() != reqwest::StatusCode::CREATED {
            return Err(Error::BackendFailed(format!(
                "cloud submit returned {}",
                response.status()
            )));
        }

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| Error::BackendFailed(format!("cloud submit response invalid: {e}")))?;
        debug!(job = %prediction.id, "cloud job submitted");

        for _ in 0..self.config.max_polls {
            tokio::time::sleep(self.config.poll_interval).await;

            let status: Prediction = self
                .client
                .get(format!(
                    "{}/predictions/{}",
                    self.config.cloud_endpoint, prediction.id
                ))
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| Error::BackendFailed(format!("cloud poll failed: {e}")))?
                .json()
                .await
                .map_err(|e| Error::BackendFailed(format!("cloud poll response invalid: {e}")))?;

            match status.status.as_str() {
                "succeeded" => {
                    let url = output_url(status.output.as_ref()).ok_or_else(|| {
                        Error::BackendFailed("cloud job succeeded without output".to_string())
                    })?;
                    info!(job = %prediction.id, "cloud job succeeded");
                    return self.fetch_result(&url, original_dims).await;
                }
                "failed" => {
                    return Err(Error::BackendFailed(format!(
                        "cloud job failed: {}",
                        status.error.unwrap_or_else(|| "unknown error".to_string())
                    )));
                }
                _ => {}
            }
        }

        Err(Error::BackendFailed(format!(
            "cloud job did not finish within {} polls",
            self.config.max_polls
        )))
    }

    async fn fetch_result(&self, url: &str, original_dims: (u32, u32)) -> Result<RgbImage> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::BackendFailed(format!("cloud output fetch failed: {e}")))?
            .bytes()
            .await
            .map_err(|e| Error::BackendFailed(format!("cloud output read failed: {e}")))?;

        let result = image::load_from_memory(&bytes)
            .map_err(|e| Error::BackendFailed(format!("cloud output undecodable: {e}")))?
            .to_rgb8();

        if result.dimensions() == original_dims {
            Ok(result)
        } else {
            Ok(image::imageops::resize(
                &result,
                original_dims.0,
                original_dims.1,
                FilterType::Lanczos3,
            ))
        }
    }
}

/// Downscale image and mask so the longest side fits the service limit.
/// Lanczos for pixels, nearest for the binary mask.
fn downscale_for_submission(
    image: &RgbImage,
    mask: &GrayImage,
    max_dimension: u32,
) -> (RgbImage, GrayImage) {
    let (w, h) = image.dimensions();
    if w <= max_dimension && h <= max_dimension {
        return (image.clone(), mask.clone());
    }

    let ratio = f64::from(max_dimension) / f64::from(w.max(h));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (nw, nh) = (
        ((f64::from(w) * ratio) as u32).max(1),
        ((f64::from(h) * ratio) as u32).max(1),
    );
    (
        image::imageops::resize(image, nw, nh, FilterType::Lanczos3),
        image::imageops::resize(mask, nw, nh, FilterType::Nearest),
    )
}

/// PNG-encode an image as a `data:` URI.
fn png_data_uri(image: &DynamicImage) -> Result<String> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(format!(
        "data:image/png;base64,{}",
        BASE64.encode(buffer.into_inner())
    ))
}

/// Extract the output URL from a prediction result, which may be a
/// single string or a list of strings.
fn output_url(output: Option<&serde_json::Value>) -> Option<String> {
    match output? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => items
            .first()
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

#[async_trait]
impl InpaintBackend for CloudBackend {
    fn name(&self) -> &'static str {
        "cloud"
    }

    fn available(&self) -> bool {
        self.token().is_some()
    }

    async fn attempt(&self, image: &RgbImage, mask: &GrayImage) -> BackendOutcome {
        let Some(token) = self.token() else {
            return BackendOutcome::Unavailable("cloud credential missing".to_string());
        };
        match self.run(image, mask, token).await {
            Ok(result) => BackendOutcome::Success(result),
            Err(e) => BackendOutcome::Failed(e.to_string()),
        }
    }
}
