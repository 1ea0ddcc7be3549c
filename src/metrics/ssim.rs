//! Windowed structural similarity (SSIM).
//!
//! Uniform (box) window, sample covariance, `K1 = 0.01`, `K2 = 0.03`,
//! dynamic range 255. Each channel is scored independently over every window
//! that lies fully inside the image; the reported value is the mean over
//! channels.
//!
//! Window size is `min(7, min(height, width))`, made odd by subtracting one
//! if needed. Images whose window would fall below 3 score 0.0.

use crate::error::Result;
use crate::pixels::PixelBuffer;

const K1: f64 = 0.01;
const K2: f64 = 0.03;
const MAX_WINDOW: usize = 7;
const MIN_WINDOW: usize = 3;

/// Window size used for an image of the given dimensions, or `None` if the
/// image is too small for SSIM.
#[must_use]
pub fn ssim_window_size(height: usize, width: usize) -> Option<usize> {
    let mut win = MAX_WINDOW.min(height.min(width));
    if win % 2 == 0 {
        win = win.saturating_sub(1);
    }
    (win >= MIN_WINDOW).then_some(win)
}

/// Mean SSIM between two equally shaped buffers.
pub fn calculate_ssim(reference: &PixelBuffer, candidate: &PixelBuffer) -> Result<f64> {
    reference.ensure_comparable(candidate)?;

    let Some(win) = ssim_window_size(reference.height(), reference.width()) else {
        return Ok(0.0);
    };

    let channels = reference.channels();
    let total: f64 = (0..channels)
        .map(|c| {
            let x = Integrals::from_channel(reference, candidate, c);
            x.mean_ssim(win)
        })
        .sum();

    Ok(total / channels as f64)
}

/// Summed-area tables for one channel pair.
struct Integrals {
    width: usize,
    height: usize,
    sx: Vec<f64>,
    sy: Vec<f64>,
    sxx: Vec<f64>,
    syy: Vec<f64>,
    sxy: Vec<f64>,
}

impl Integrals {
    fn from_channel(reference: &PixelBuffer, candidate: &PixelBuffer, channel: usize) -> Self {
        let width = reference.width();
        let height = reference.height();
        let channels = reference.channels();
        let stride = width + 1;
        let len = stride * (height + 1);

        let mut tables = Self {
            width,
            height,
            sx: vec![0.0; len],
            sy: vec![0.0; len],
            sxx: vec![0.0; len],
            syy: vec![0.0; len],
            sxy: vec![0.0; len],
        };

        let a = reference.as_bytes();
        let b = candidate.as_bytes();
        for row in 0..height {
            let (mut rx, mut ry, mut rxx, mut ryy, mut rxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
            for col in 0..width {
                let idx = (row * width + col) * channels + channel;
                let x = f64::from(a[idx]);
                let y = f64::from(b[idx]);
                rx += x;
                ry += y;
                rxx += x * x;
                ryy += y * y;
                rxy += x * y;

                let above = row * stride + col + 1;
                let here = above + stride;
                tables.sx[here] = tables.sx[above] + rx;
                tables.sy[here] = tables.sy[above] + ry;
                tables.sxx[here] = tables.sxx[above] + rxx;
                tables.syy[here] = tables.syy[above] + ryy;
                tables.sxy[here] = tables.sxy[above] + rxy;
            }
        }
        tables
    }

    fn window_sum(table: &[f64], stride: usize, top: usize, left: usize, win: usize) -> f64 {
        let bottom = top + win;
        let right = left + win;
        table[bottom * stride + right] - table[top * stride + right] - table[bottom * stride + left]
            + table[top * stride + left]
    }

    fn mean_ssim(&self, win: usize) -> f64 {
        let stride = self.width + 1;
        let n = (win * win) as f64;
        let cov_norm = n / (n - 1.0);
        let c1 = (K1 * 255.0).powi(2);
        let c2 = (K2 * 255.0).powi(2);

        let rows = self.height - win + 1;
        let cols = self.width - win + 1;
        let mut total = 0.0;

        for top in 0..rows {
            for left in 0..cols {
                let ux = Self::window_sum(&self.sx, stride, top, left, win) / n;
                let uy = Self::window_sum(&self.sy, stride, top, left, win) / n;
                let uxx = Self::window_sum(&self.sxx, stride, top, left, win) / n;
                let uyy = Self::window_sum(&self.syy, stride, top, left, win) / n;
                let uxy = Self::window_sum(&self.sxy, stride, top, left, win) / n;

                let vx = cov_norm * (uxx - ux * ux);
                let vy = cov_norm * (uyy - uy * uy);
                let vxy = cov_norm * (uxy - ux * uy);

                let num = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
                let den = (ux * ux + uy * uy + c1) * (vx + vy + c2);
                total += num / den;
            }
        }

        total / (rows * cols) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(h: usize, w: usize, seed: usize) -> PixelBuffer {
        let data = (0..h * w * 3)
            .map(|i| ((i * 31 + seed * 17) % 251) as u8)
            .collect();
        PixelBuffer::new(data, h, w, 3).unwrap()
    }

    #[test]
    fn test_window_size_policy() {
        assert_eq!(ssim_window_size(64, 64), Some(7));
        assert_eq!(ssim_window_size(6, 100), Some(5));
        assert_eq!(ssim_window_size(5, 5), Some(5));
        assert_eq!(ssim_window_size(4, 4), Some(3));
        assert_eq!(ssim_window_size(3, 9), Some(3));
        assert_eq!(ssim_window_size(2, 9), None);
        assert_eq!(ssim_window_size(1, 1), None);
        assert_eq!(ssim_window_size(0, 0), None);
    }

    #[test]
    fn test_identical_is_one() {
        let img = pattern(20, 30, 1);
        let ssim = calculate_ssim(&img, &img).unwrap();
        assert!((ssim - 1.0).abs() < 1e-9, "ssim = {ssim}");
    }

    #[test]
    fn test_identical_solid_is_one() {
        let img = PixelBuffer::solid_rgb(16, 16, [200, 10, 90]);
        let ssim = calculate_ssim(&img, &img).unwrap();
        assert!((ssim - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_too_small_is_zero() {
        let img = PixelBuffer::solid_rgb(2, 50, [1, 2, 3]);
        assert_eq!(calculate_ssim(&img, &img).unwrap(), 0.0);
    }

    #[test]
    fn test_different_is_below_one() {
        let a = pattern(16, 16, 1);
        let b = PixelBuffer::solid_rgb(16, 16, [128, 128, 128]);
        let ssim = calculate_ssim(&a, &b).unwrap();
        assert!(ssim < 0.5, "ssim = {ssim}");
        assert!(ssim >= -1.0);
    }

    #[test]
    fn test_small_perturbation_stays_high() {
        let a = pattern(24, 24, 3);
        let mut data = a.as_bytes().to_vec();
        for v in data.iter_mut().step_by(5) {
            *v = v.saturating_add(2);
        }
        let b = PixelBuffer::new(data, 24, 24, 3).unwrap();
        let ssim = calculate_ssim(&a, &b).unwrap();
        assert!(ssim > 0.95 && ssim < 1.0, "ssim = {ssim}");
    }

    #[test]
    fn test_grayscale() {
        let data: Vec<u8> = (0..10 * 10).map(|i| (i * 3 % 256) as u8).collect();
        let img = PixelBuffer::new(data, 10, 10, 1).unwrap();
        assert!((calculate_ssim(&img, &img).unwrap() - 1.0).abs() < 1e-9);
    }
}
