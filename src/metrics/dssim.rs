//! DSSIM (Structural Dissimilarity) metric calculation.
//!
//! Wraps the `dssim-core` crate for perceptual image comparison.

use dssim_core::Dssim;
use imgref::ImgVec;
use rgb::RGBA;

use crate::error::{Error, Result};
use crate::pixels::PixelBuffer;

/// Calculate DSSIM between two pixel buffers.
///
/// # Returns
///
/// DSSIM value where 0 = identical, higher = more different.
///
/// # Errors
///
/// Returns an error if the buffers have different shapes or if `dssim-core`
/// cannot build an image from them (e.g. too small).
pub fn calculate_dssim(reference: &PixelBuffer, candidate: &PixelBuffer) -> Result<f64> {
    reference.ensure_comparable(candidate)?;

    let dssim = Dssim::new();

    let ref_image = dssim
        .create_image(&to_linear_rgba(reference))
        .ok_or_else(|| Error::MetricCalculation {
            metric: "DSSIM".to_string(),
            reason: "Failed to create reference image".to_string(),
        })?;

    let test_image = dssim
        .create_image(&to_linear_rgba(candidate))
        .ok_or_else(|| Error::MetricCalculation {
            metric: "DSSIM".to_string(),
            reason: "Failed to create candidate image".to_string(),
        })?;

    let (dssim_val, _ssim_maps) = dssim.compare(&ref_image, test_image);

    Ok(f64::from(dssim_val))
}

/// Convert a buffer to linear-light RGBA f32, the input `dssim-core` expects.
fn to_linear_rgba(image: &PixelBuffer) -> ImgVec<RGBA<f32>> {
    let pixels: Vec<RGBA<f32>> = image
        .to_rgb8_img()
        .pixels()
        .map(|p| RGBA::new(srgb_to_linear(p.r), srgb_to_linear(p.g), srgb_to_linear(p.b), 1.0))
        .collect();
    ImgVec::new(pixels, image.width(), image.height())
}

/// Apply sRGB gamma decoding (sRGB u8 → linear f32).
#[inline]
fn srgb_to_linear(srgb: u8) -> f32 {
    let s = f32::from(srgb) / 255.0;
    if s <= 0.04045 {
        s / 12.92
    } else {
        ((s + 0.055) / 1.055).powf(2.4)
    }
}
