//! Knee detection on a rate-distortion curve.
//!
//! The knee is where spending more bytes stops buying much more PSNR. This
//! is a heuristic on the discrete curve, not an optimality criterion:
//!
//! 1. slopes between consecutive points, `slope[i] = Δpsnr / Δsize`
//! 2. second difference of the slopes, `diff[i] = slope[i+1] - slope[i]`
//! 3. knee = `argmax(diff) + 1`
//!
//! The `+ 1` lands on the right endpoint of the first segment of the pair
//! with the largest slope change. Curves with fewer than three points have
//! no knee.
//!
//! A `+inf` slope change (a bit-identical tier after lossy ones) wins the
//! argmax like any other value. NaN changes (duplicate sizes, `inf - inf`)
//! are skipped; if every change is NaN the first candidate (index 1) is
//! returned so callers always get an in-bounds point.

use serde::{Deserialize, Serialize};

/// One point on the rate-distortion curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RdPoint {
    /// Encoded size in KB.
    pub size_kb: f64,
    /// PSNR in dB.
    #[serde(with = "crate::metrics::inf_float")]
    pub psnr: f64,
}

impl RdPoint {
    #[must_use]
    pub fn new(size_kb: f64, psnr: f64) -> Self {
        Self { size_kb, psnr }
    }
}

/// Index of the knee in `points` (ordered by ascending size), or `None` for
/// fewer than three points.
#[must_use]
pub fn find_knee(points: &[RdPoint]) -> Option<usize> {
    if points.len() < 3 {
        return None;
    }

    let slopes: Vec<f64> = points
        .windows(2)
        .map(|w| (w[1].psnr - w[0].psnr) / (w[1].size_kb - w[0].size_kb))
        .collect();

    if slopes.len() < 2 {
        return None;
    }

    let mut best_index = 0;
    let mut best_diff = f64::NEG_INFINITY;
    for (i, pair) in slopes.windows(2).enumerate() {
        let diff = pair[1] - pair[0];
        // Strict comparison keeps the first of equal maxima
        if !diff.is_nan() && diff > best_diff {
            best_diff = diff;
            best_index = i;
        }
    }

    Some(best_index + 1)
}
