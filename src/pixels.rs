//! Pixel buffers used as ground truth and as decoded candidates.
//!
//! A [`PixelBuffer`] is an interleaved, row-major `height x width x channels`
//! array of 8-bit samples. Grayscale (1 channel) and RGB (3 channels) are
//! supported, which covers every layout a baseline JPEG round-trip produces.

use std::path::Path;

use imgref::ImgVec;
use rgb::RGB8;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, Shape};

/// Interleaved 8-bit image samples.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBuffer {
    data: Vec<u8>,
    height: usize,
    width: usize,
    channels: usize,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("height", &self.height)
            .field("width", &self.width)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

impl PixelBuffer {
    /// Wrap raw interleaved samples.
    ///
    /// Fails if `channels` is not 1 or 3, or if `data` is not exactly
    /// `height * width * channels` bytes long.
    pub fn new(data: Vec<u8>, height: usize, width: usize, channels: usize) -> Result<Self> {
        if channels != 1 && channels != 3 {
            return Err(Error::InvalidBuffer(format!(
                "unsupported channel count {channels} (expected 1 or 3)"
            )));
        }
        let expected = height * width * channels;
        if data.len() != expected {
            return Err(Error::InvalidBuffer(format!(
                "expected {expected} samples for {height}x{width}x{channels}, got {}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            height,
            width,
            channels,
        })
    }

    /// A buffer where every pixel has the same RGB value.
    #[must_use]
    pub fn solid_rgb(height: usize, width: usize, color: [u8; 3]) -> Self {
        let data = std::iter::repeat_n(color, height * width).flatten().collect();
        Self {
            data,
            height,
            width,
            channels: 3,
        }
    }

    /// Load any image file the `image` crate understands, as RGB8.
    pub fn open(path: &Path) -> Result<Self> {
        let img = image::open(path).map_err(|e| Error::ImageLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let rgb = img.to_rgb8();
        let width = rgb.width() as usize;
        let height = rgb.height() as usize;
        Self::new(rgb.into_raw(), height, width, 3)
    }

    /// Image height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Image width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Samples per pixel.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// `(height, width, channels)`.
    #[must_use]
    pub fn shape(&self) -> Shape {
        (self.height, self.width, self.channels)
    }

    /// True if the image has no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }

    /// Raw interleaved samples.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer, returning its samples.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Uncompressed size in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Fail with [`Error::ShapeMismatch`] unless both buffers have the same shape.
    pub fn ensure_comparable(&self, other: &Self) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.shape(),
                actual: other.shape(),
            });
        }
        Ok(())
    }

    /// Convert to an RGB8 `imgref` image, replicating gray samples.
    #[must_use]
    pub fn to_rgb8_img(&self) -> ImgVec<RGB8> {
        let pixels: Vec<RGB8> = match self.channels {
            1 => self.data.iter().map(|&g| RGB8::new(g, g, g)).collect(),
            _ => self
                .data
                .chunks_exact(3)
                .map(|c| RGB8::new(c[0], c[1], c[2]))
                .collect(),
        };
        ImgVec::new(pixels, self.width, self.height)
    }
}

impl From<ImgVec<RGB8>> for PixelBuffer {
    fn from(img: ImgVec<RGB8>) -> Self {
        let width = img.width();
        let height = img.height();
        let data = img.pixels().flat_map(|p| [p.r, p.g, p.b]).collect();
        Self {
            data,
            height,
            width,
            channels: 3,
        }
    }
}
