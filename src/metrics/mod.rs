//! Distortion metrics between a reference image and a candidate.
//!
//! All metrics are pure functions over two equally shaped [`PixelBuffer`]s.
//! Comparing buffers of different shape fails with
//! [`Error::ShapeMismatch`](crate::Error::ShapeMismatch).
//!
//! - **MSE**: mean squared sample difference (lower is better, 0 = identical)
//! - **PSNR**: peak signal-to-noise ratio in dB (higher is better, `inf` = identical)
//! - **SSIM**: windowed structural similarity (1.0 = identical)
//! - **DSSIM** (feature `dssim`): perceptual structural dissimilarity via `dssim-core`
//!
//! ## PSNR guide
//!
//! | PSNR (dB) | Typical appearance |
//! |-----------|--------------------|
//! | > 50 | Visually identical |
//! | 40-50 | Very good |
//! | 30-40 | Good, artifacts on inspection |
//! | 20-30 | Fair, visible artifacts |
//! | < 20 | Poor |

#[cfg(feature = "dssim")]
pub mod dssim;
pub mod ssim;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pixels::PixelBuffer;

pub use ssim::{calculate_ssim, ssim_window_size};

/// Peak sample value for 8-bit images.
pub const MAX_SAMPLE: f64 = 255.0;

/// Configuration for optional metrics.
///
/// PSNR, SSIM and MSE are always computed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Calculate DSSIM (requires the `dssim` feature).
    pub dssim: bool,
}

impl MetricConfig {
    /// Calculate all available metrics.
    #[must_use]
    pub fn all() -> Self {
        Self {
            dssim: cfg!(feature = "dssim"),
        }
    }

    /// Only the mandatory metrics.
    #[must_use]
    pub fn fast() -> Self {
        Self { dssim: false }
    }
}

/// Results from metric calculations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    /// PSNR in dB; `f64::INFINITY` for bit-identical buffers.
    #[serde(with = "inf_float")]
    pub psnr: f64,
    /// Mean SSIM; 0.0 when the image is too small for a 3x3 window.
    pub ssim: f64,
    /// Mean squared error.
    pub mse: f64,
    /// DSSIM value (lower is better, 0 = identical).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dssim: Option<f64>,
}

impl MetricResult {
    /// True if the candidate is bit-identical to the reference.
    #[must_use]
    pub fn is_lossless(&self) -> bool {
        self.mse == 0.0
    }
}

/// Compute every configured metric between `reference` and `candidate`.
pub fn evaluate(
    reference: &PixelBuffer,
    candidate: &PixelBuffer,
    config: &MetricConfig,
) -> Result<MetricResult> {
    reference.ensure_comparable(candidate)?;

    let mse = calculate_mse(reference, candidate)?;
    let psnr = psnr_from_mse(mse);
    let ssim = calculate_ssim(reference, candidate)?;

    #[cfg(feature = "dssim")]
    let dssim = if config.dssim {
        Some(dssim::calculate_dssim(reference, candidate)?)
    } else {
        None
    };
    #[cfg(not(feature = "dssim"))]
    let dssim = {
        let _ = config;
        None
    };

    Ok(MetricResult {
        psnr,
        ssim,
        mse,
        dssim,
    })
}

/// Mean over all samples of the squared difference.
///
/// Returns 0.0 for empty buffers.
pub fn calculate_mse(reference: &PixelBuffer, candidate: &PixelBuffer) -> Result<f64> {
    reference.ensure_comparable(candidate)?;

    let samples = reference.byte_len();
    if samples == 0 {
        return Ok(0.0);
    }

    let sum: u64 = reference
        .as_bytes()
        .iter()
        .zip(candidate.as_bytes())
        .map(|(&r, &c)| {
            let d = u64::from(r.abs_diff(c));
            d * d
        })
        .sum();

    Ok(sum as f64 / samples as f64)
}

/// PSNR in dB for a given MSE; `f64::INFINITY` when `mse == 0`.
#[must_use]
pub fn psnr_from_mse(mse: f64) -> f64 {
    if mse == 0.0 {
        f64::INFINITY
    } else {
        10.0 * (MAX_SAMPLE * MAX_SAMPLE / mse).log10()
    }
}

/// Calculate PSNR between two images.
///
/// Returns `f64::INFINITY` if the images are identical.
pub fn calculate_psnr(reference: &PixelBuffer, candidate: &PixelBuffer) -> Result<f64> {
    calculate_mse(reference, candidate).map(psnr_from_mse)
}

// JSON has no infinity; encode it as the string "inf"
pub(crate) mod inf_float {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(f64),
        Text(String),
    }

    pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if value.is_infinite() {
            let text = if *value > 0.0 { "inf" } else { "-inf" };
            text.serialize(serializer)
        } else {
            value.serialize(serializer)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Num(v) => Ok(v),
            Repr::Text(s) => match s.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(serde::de::Error::custom(format!("invalid float: {other}"))),
            },
        }
    }
}
