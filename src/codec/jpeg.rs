//! Baseline JPEG codec.
//!
//! Encoding goes through the `image` crate's JPEG encoder; decoding goes
//! through `jpeg-decoder`, which reports the pixel format so grayscale
//! inputs round-trip as single-channel buffers.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::{Codec, EncodedBlob, QualityLevel};
use crate::error::{Error, Result};
use crate::pixels::PixelBuffer;

/// Baseline JPEG encoder/decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCodec;

impl JpegCodec {
    /// Create a JPEG codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Codec for JpegCodec {
    fn id(&self) -> &str {
        "jpeg-baseline"
    }

    fn format(&self) -> &str {
        "jpeg"
    }

    fn extensions(&self) -> &[&str] {
        &["jpg", "jpeg"]
    }

    fn encode(&self, image: &PixelBuffer, quality: QualityLevel) -> Result<EncodedBlob> {
        let encode_err = |reason: String| Error::Encode {
            quality: i64::from(quality.get()),
            reason,
        };

        if image.is_empty() {
            return Err(encode_err("image has zero area".to_string()));
        }

        let color = match image.channels() {
            1 => ExtendedColorType::L8,
            3 => ExtendedColorType::Rgb8,
            n => return Err(encode_err(format!("unsupported channel count {n}"))),
        };
        let width = u32::try_from(image.width()).map_err(|e| encode_err(e.to_string()))?;
        let height = u32::try_from(image.height()).map_err(|e| encode_err(e.to_string()))?;

        let mut out = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut out, quality.get());
        encoder
            .write_image(image.as_bytes(), width, height, color)
            .map_err(|e| encode_err(e.to_string()))?;

        Ok(EncodedBlob::new(out, quality))
    }

    fn decode(&self, blob: &EncodedBlob) -> Result<PixelBuffer> {
        decode_jpeg(blob.as_bytes())
    }
}

/// Decode JPEG bytes into a gray or RGB pixel buffer.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the data is not a valid JPEG or uses a
/// CMYK color space.
pub fn decode_jpeg(data: &[u8]) -> Result<PixelBuffer> {
    let mut decoder = jpeg_decoder::Decoder::new(Cursor::new(data));
    let pixels = decoder.decode().map_err(|e| Error::Decode(e.to_string()))?;

    let info = decoder
        .info()
        .ok_or_else(|| Error::Decode("missing JPEG info after decode".to_string()))?;

    let width = usize::from(info.width);
    let height = usize::from(info.height);

    match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => PixelBuffer::new(pixels, height, width, 3),
        jpeg_decoder::PixelFormat::L8 => PixelBuffer::new(pixels, height, width, 1),
        jpeg_decoder::PixelFormat::L16 => {
            // Keep the high byte (big endian samples)
            let gray = pixels.chunks_exact(2).map(|c| c[0]).collect();
            PixelBuffer::new(gray, height, width, 1)
        }
        jpeg_decoder::PixelFormat::CMYK32 => Err(Error::Decode(
            "CMYK JPEGs are not supported".to_string(),
        )),
    }
    .map_err(|e| match e {
        Error::InvalidBuffer(reason) => Error::Decode(reason),
        other => other,
    })
}
