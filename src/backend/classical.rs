//! Classical, non-learned inpainting fallback.
//!
//! Diffusion-style structural inpainting: masked pixels are filled from
//! the boundary inward with the mean of their already-known neighbors
//! (onion peel), then a few averaging passes restricted to the masked
//! interior smooth out fill-order artifacts. Deterministic, always
//! succeeds on valid inputs, degraded quality compared to the neural
//! backends.

use async_trait::async_trait;
use image::{GrayImage, RgbImage};
use rayon::prelude::*;
use tracing::debug;

use super::{BackendOutcome, InpaintBackend};
use crate::mask::MASK_THRESHOLD;

/// Number of smoothing passes after the boundary fill.
const SMOOTHING_PASSES: usize = 8;

/// The always-available classical backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClassicalBackend;

#[async_trait]
impl InpaintBackend for ClassicalBackend {
    fn name(&self) -> &'static str {
        "classical"
    }

    fn available(&self) -> bool {
        true
    }

    async fn attempt(&self, image: &RgbImage, mask: &GrayImage) -> BackendOutcome {
        BackendOutcome::Success(inpaint_diffusion(image, mask))
    }
}

/// Offsets of the 8-connected neighborhood.
const NEIGHBORS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Fill masked pixels by diffusion from the surrounding known content.
#[must_use]
pub fn inpaint_diffusion(image: &RgbImage, mask: &GrayImage) -> RgbImage {
    let (w, h) = image.dimensions();
    let (wu, hu) = (w as usize, h as usize);

    let mut pixels: Vec<[f32; 3]> = image
        .pixels()
        .map(|p| [f32::from(p[0]), f32::from(p[1]), f32::from(p[2])])
        .collect();
    let mut known: Vec<bool> = mask.pixels().map(|p| p[0] <= MASK_THRESHOLD).collect();
    let originally_masked: Vec<bool> = known.iter().map(|k| !k).collect();

    let mut unknown: Vec<usize> = known
        .iter()
        .enumerate()
        .filter_map(|(i, k)| (!k).then_some(i))
        .collect();
    if unknown.is_empty() {
        return image.clone();
    }
    debug!(pixels = unknown.len(), "classical diffusion fill");

    // Onion peel: each round fills every unknown pixel that touches a
    // known one. A fully-masked image has no seed ring; seed with black.
    while !unknown.is_empty() {
        let mut filled_this_round = Vec::new();
        let mut still_unknown = Vec::new();

        for &idx in &unknown {
            let (x, y) = ((idx % wu) as i64, (idx / wu) as i64);
            let mut acc = [0.0f32; 3];
            let mut count = 0u32;
            for (dx, dy) in NEIGHBORS {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                #[allow(clippy::cast_sign_loss)]
                let nidx = ny as usize * wu + nx as usize;
                if known[nidx] {
                    let p = pixels[nidx];
                    acc[0] += p[0];
                    acc[1] += p[1];
                    acc[2] += p[2];
                    count += 1;
                }
            }
            if count > 0 {
                #[allow(clippy::cast_precision_loss)]
                let n = count as f32;
                filled_this_round.push((idx, [acc[0] / n, acc[1] / n, acc[2] / n]));
            } else {
                still_unknown.push(idx);
            }
        }

        if filled_this_round.is_empty() {
            // No pixel borders known content: the whole image is masked.
            for &idx in &still_unknown {
                pixels[idx] = [0.0, 0.0, 0.0];
                known[idx] = true;
            }
            break;
        }

        for (idx, value) in filled_this_round {
            pixels[idx] = value;
            known[idx] = true;
        }
        unknown = still_unknown;
    }

    // Smoothing passes over the filled interior only, so the fill-front
    // rings blend into each other. Known exterior pixels never change.
    for _ in 0..SMOOTHING_PASSES {
        let snapshot = pixels.clone();
        pixels = (0..hu)
            .into_par_iter()
            .flat_map_iter(|y| {
                let snapshot = &snapshot;
                let originally_masked = &originally_masked;
                (0..wu).map(move |x| {
                    let idx = y * wu + x;
                    if !originally_masked[idx] {
                        return snapshot[idx];
                    }
                    let mut acc = snapshot[idx];
                    let mut count = 1u32;
                    for (dx, dy) in NEIGHBORS {
                        let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                        if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                            continue;
                        }
                        #[allow(clippy::cast_sign_loss)]
                        let p = snapshot[ny as usize * wu + nx as usize];
                        acc[0] += p[0];
                        acc[1] += p[1];
                        acc[2] += p[2];
                        count += 1;
                    }
                    #[allow(clippy::cast_precision_loss)]
                    let n = count as f32;
                    [acc[0] / n, acc[1] / n, acc[2] / n]
                })
            })
            .collect();
    }

    RgbImage::from_fn(w, h, |x, y| {
        let p = pixels[y as usize * wu + x as usize];
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let px = [
            p[0].round().clamp(0.0, 255.0) as u8,
            p[1].round().clamp(0.0, 255.0) as u8,
            p[2].round().clamp(0.0, 255.0) as u8,
        ];
        image::Rgb(px)
    })
}
