//! Error types for the watermark-inpaint crate.

/// Errors that can occur while detecting regions or inpainting an image.
///
/// Backend-related variants are split by whether the backend could run at
/// all ([`Error::BackendUnavailable`]) or ran and did not produce an image
/// ([`Error::BackendFailed`]). Both are caught by the fallback chain and
/// converted into a transition to the next backend; callers only ever see
/// [`Error::InvalidInput`] or [`Error::AllBackendsExhausted`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input image or mask could not be decoded or converted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A backend cannot run (model not loaded, credential missing).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A backend ran but failed to produce an image (inference error,
    /// remote job failed or timed out).
    #[error("backend failed: {0}")]
    BackendFailed(String),

    /// Every backend in the chain, including the classical fallback,
    /// failed to produce an image.
    #[error("all inpainting backends exhausted")]
    AllBackendsExhausted,

    /// The local neural model could not be loaded.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error occurred during image processing (load, save, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
