//! Inpainting backends and the prioritized fallback chain.
//!
//! Three execution strategies share one interface: a cloud prediction
//! service (highest quality, needs a credential and network), a local
//! neural model (bounded latency, needs a loaded model), and a classical
//! diffusion fallback (always available, degraded quality). The chain
//! tries them in that order and returns the first success.

mod classical;
mod cloud;
mod local;

pub use classical::{inpaint_diffusion, ClassicalBackend};
pub use cloud::CloudBackend;
pub use local::LocalBackend;

use async_trait::async_trait;
use image::{GrayImage, RgbImage};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Outcome of one backend attempt.
///
/// `Unavailable` means the backend could not run at all (missing model or
/// credential); `Failed` means it ran and produced no image. Both cause
/// the chain to continue; neither is surfaced to the caller directly.
#[derive(Debug)]
pub enum BackendOutcome {
    /// The backend produced a full-size inpainted image.
    Success(RgbImage),
    /// The backend cannot run in the current configuration.
    Unavailable(String),
    /// The backend ran and failed.
    Failed(String),
}

/// One inpainting execution strategy.
#[async_trait]
pub trait InpaintBackend: Send + Sync {
    /// Short stable name for logs and status reporting.
    fn name(&self) -> &'static str;

    /// Whether the backend could run right now (used for status
    /// reporting; `attempt` re-checks and reports `Unavailable` itself).
    fn available(&self) -> bool;

    /// Try to inpaint the masked pixels of `image`.
    async fn attempt(&self, image: &RgbImage, mask: &GrayImage) -> BackendOutcome;
}

/// Priority-ordered chain of backends.
pub struct BackendChain {
    backends: Vec<Box<dyn InpaintBackend>>,
}

impl BackendChain {
    /// Build a chain from backends in priority order.
    #[must_use]
    pub fn new(backends: Vec<Box<dyn InpaintBackend>>) -> Self {
        Self { backends }
    }

    /// Names of the chain's backends, in priority order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.backends.iter().map(|b| b.name())
    }

    /// Run the chain: first `Success` wins; `Unavailable` and `Failed`
    /// transition to the next backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllBackendsExhausted`] when no backend produced
    /// an image.
    pub async fn run(&self, image: &RgbImage, mask: &GrayImage) -> Result<RgbImage> {
        for backend in &self.backends {
            match backend.attempt(image, mask).await {
                BackendOutcome::Success(result) => {
                    info!(backend = backend.name(), "inpainting succeeded");
                    return Ok(result);
                }
                BackendOutcome::Unavailable(reason) => {
                    debug!(backend = backend.name(), %reason, "backend unavailable");
                }
                BackendOutcome::Failed(reason) => {
                    warn!(backend = backend.name(), %reason, "backend failed, falling back");
                }
            }
        }
        Err(Error::AllBackendsExhausted)
    }
}
