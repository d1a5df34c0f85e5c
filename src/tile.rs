//! Tile preparation and tensor bookkeeping for fixed-size inference.
//!
//! The model runs at a fixed `S`x`S` spatial size with a 3-channel image
//! and a 1-channel mask, both NCHW. Crops smaller than `S` (image edges)
//! are padded up: edge reflection for pixels, zero fill for the mask. The
//! raw output is cropped back to the unpadded crop size before returning.

use image::{GrayImage, Rgb, RgbImage};
use ndarray::Array4;

use crate::error::{Error, Result};
use crate::mask::MASK_THRESHOLD;

/// Fixed-size inference seam.
///
/// Implemented by the local ONNX session wrapper; tests substitute mocks.
/// Input shapes are `[1, 3, S, S]` (image, values in `[0, 1]`) and
/// `[1, 1, S, S]` (mask, values in `{0, 1}`); the output is `[1, 3, S, S]`
/// with pixel values in `[0, 255]`.
pub trait TileInference: Send + Sync {
    /// Run one fixed-size inference call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendFailed`] when inference cannot produce an
    /// output tensor.
    fn infer(&self, image: &Array4<f32>, mask: &Array4<f32>) -> Result<Array4<f32>>;
}

/// Geometry carried alongside a raw inference output: the crop size
/// actually produced, as opposed to the padded input size.
#[derive(Debug, Clone, Copy)]
pub struct CropSize {
    /// Unpadded crop width.
    pub width: u32,
    /// Unpadded crop height.
    pub height: u32,
}

/// Mirror an out-of-range index back into `0..len` (reflection without
/// edge repetition, matching reflect padding).
fn reflect(i: usize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let m = i % period;
    if m < len {
        m
    } else {
        period - m
    }
}

/// Lay out an image crop and mask crop as the NCHW tensors the model
/// expects, padding up to `input_size` when the crop is smaller.
#[must_use]
pub fn prepare_input(
    image_crop: &RgbImage,
    mask_crop: &GrayImage,
    input_size: u32,
) -> (Array4<f32>, Array4<f32>, CropSize) {
    let s = input_size as usize;
    let w = image_crop.width() as usize;
    let h = image_crop.height() as usize;

    let mut image_tensor = Array4::<f32>::zeros((1, 3, s, s));
    let mut mask_tensor = Array4::<f32>::zeros((1, 1, s, s));

    for ty in 0..s {
        let sy = reflect(ty, h);
        for tx in 0..s {
            let sx = reflect(tx, w);
            #[allow(clippy::cast_possible_truncation)]
            let px = image_crop.get_pixel(sx as u32, sy as u32);
            for c in 0..3 {
                image_tensor[[0, c, ty, tx]] = f32::from(px[c]) / 255.0;
            }
            // Mask is zero-filled outside the crop, never reflected.
            if ty < h && tx < w {
                #[allow(clippy::cast_possible_truncation)]
                let m = mask_crop.get_pixel(tx as u32, ty as u32)[0];
                if m > MASK_THRESHOLD {
                    mask_tensor[[0, 0, ty, tx]] = 1.0;
                }
            }
        }
    }

    let crop = CropSize {
        width: image_crop.width(),
        height: image_crop.height(),
    };
    (image_tensor, mask_tensor, crop)
}

/// Convert a raw model output back into pixels, cropped to the unpadded
/// crop size and clamped to the valid range.
///
/// # Errors
///
/// Returns [`Error::BackendFailed`] when the output tensor is smaller
/// than the crop it is supposed to cover.
pub fn process_output(output: &Array4<f32>, crop: CropSize) -> Result<RgbImage> {
    let shape = output.shape();
    if shape[0] < 1
        || shape[1] < 3
        || shape[2] < crop.height as usize
        || shape[3] < crop.width as usize
    {
        return Err(Error::BackendFailed(format!(
            "unexpected output tensor shape {shape:?} for {}x{} crop",
            crop.width, crop.height
        )));
    }

    let mut result = RgbImage::new(crop.width, crop.height);
    for y in 0..crop.height as usize {
        for x in 0..crop.width as usize {
            let mut px = [0u8; 3];
            for (c, v) in px.iter_mut().enumerate() {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    *v = output[[0, c, y, x]].round().clamp(0.0, 255.0) as u8;
                }
            }
            #[allow(clippy::cast_possible_truncation)]
            result.put_pixel(x as u32, y as u32, Rgb(px));
        }
    }
    Ok(result)
}

/// Run one tile through inference: prepare tensors, infer at fixed size,
/// crop the output back down.
///
/// # Errors
///
/// Propagates inference failures as [`Error::BackendFailed`]; the caller
/// fails the whole request over to the next backend rather than blending
/// tiles from different backends.
pub fn process_tile(
    image_crop: &RgbImage,
    mask_crop: &GrayImage,
    inference: &dyn TileInference,
    input_size: u32,
) -> Result<RgbImage> {
    let (image_tensor, mask_tensor, crop) = prepare_input(image_crop, mask_crop, input_size);
    let output = inference.infer(&image_tensor, &mask_tensor)?;
    process_output(&output, crop)
}
