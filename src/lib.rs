//! Watermark removal via mask-guided image inpainting.
//!
//! Given a source image and either a user-supplied mask or auto-detected
//! candidate regions, this crate removes the masked content and
//! reconstructs plausible background with no visible seam at the edit
//! boundary. A fixed-size neural backend is reconciled with arbitrary
//! image and mask geometry through bounding-box extraction, context
//! padding, tiling of oversized regions, and feathered compositing.
//!
//! Three backends of different latency/quality/availability are tried in
//! priority order: a cloud prediction service, a local ONNX model, and a
//! classical diffusion fallback that always succeeds.
//!
//! # Quick Start
//!
//! ```no_run
//! use watermark_inpaint::{EngineConfig, InpaintEngine};
//!
//! # async fn example() -> watermark_inpaint::Result<()> {
//! let config = EngineConfig {
//!     model_path: Some("models/lama_fp32.onnx".into()),
//!     ..EngineConfig::default()
//! };
//! let engine = InpaintEngine::new(config);
//!
//! let image = std::fs::read("photo.png")?;
//! let mask = std::fs::read("mask.png")?;
//! let cleaned = engine.remove_watermark(&image, Some(&mask)).await?;
//! std::fs::write("cleaned.png", cleaned)?;
//! # Ok(())
//! # }
//! ```
//!
//! Without a mask, an attached [`RegionDetector`] drives mask generation;
//! when nothing plausible is detected the call is a no-op and returns the
//! input unchanged.

#![deny(missing_docs)]

pub mod backend;
pub mod blend;
pub mod config;
mod engine;
pub mod error;
pub mod mask;
pub mod plan;
pub mod region;
pub mod tile;

pub use backend::{BackendChain, BackendOutcome, InpaintBackend};
pub use config::EngineConfig;
pub use engine::{BackendStatus, InpaintEngine};
pub use error::{Error, Result};
pub use region::{Region, RegionDetector};
