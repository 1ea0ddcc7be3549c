//! Codec adapters.
//!
//! A [`Codec`] turns a [`PixelBuffer`] into an [`EncodedBlob`] at a given
//! [`QualityLevel`] and back. The quality search and the analysis run only
//! talk to this trait, so any lossy codec with a 1-100 quality knob can be
//! plugged in:
//!
//! - [`jpeg::JpegCodec`]: baseline JPEG (encode via `image`, decode via
//!   `jpeg-decoder`)
//! - [`CallbackCodec`]: closures supplied by the caller

pub mod jpeg;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pixels::PixelBuffer;

pub use jpeg::JpegCodec;

/// Encoder quality setting in `1..=100`.
///
/// Higher means less compression, larger output, better fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct QualityLevel(u8);

impl QualityLevel {
    /// Lowest legal quality.
    pub const MIN: Self = Self(1);
    /// Highest legal quality.
    pub const MAX: Self = Self(100);

    /// Validate a raw quality value.
    pub fn new(value: i64) -> Result<Self> {
        if (1..=100).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(Error::InvalidQuality(value))
        }
    }

    /// Clamp a raw value into `1..=100`.
    #[must_use]
    pub const fn clamped(value: u8) -> Self {
        if value < 1 {
            Self::MIN
        } else if value > 100 {
            Self::MAX
        } else {
            Self(value)
        }
    }

    /// The raw value.
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for QualityLevel {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<QualityLevel> for u8 {
    fn from(q: QualityLevel) -> Self {
        q.0
    }
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Encoded bytes plus the quality they were produced at.
///
/// Owned by whoever requested the encode; never shared.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedBlob {
    bytes: Vec<u8>,
    quality: QualityLevel,
}

impl std::fmt::Debug for EncodedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedBlob")
            .field("len", &self.bytes.len())
            .field("quality", &self.quality)
            .finish()
    }
}

impl EncodedBlob {
    /// Wrap encoder output.
    #[must_use]
    pub fn new(bytes: Vec<u8>, quality: QualityLevel) -> Self {
        Self { bytes, quality }
    }

    /// Encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the blob, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if the codec produced no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Size in KiB (1 KB = 1024 bytes).
    #[must_use]
    pub fn size_kb(&self) -> f64 {
        self.bytes.len() as f64 / 1024.0
    }

    /// Quality the blob was encoded at.
    #[must_use]
    pub fn quality(&self) -> QualityLevel {
        self.quality
    }
}

/// A lossy codec with a 1-100 quality control.
///
/// Implementations must be deterministic for a fixed `(image, quality)`
/// pair and free of side effects.
pub trait Codec: Send + Sync {
    /// Short identifier used in logs and reports.
    fn id(&self) -> &str;

    /// File format this codec writes (e.g. `"jpeg"`).
    fn format(&self) -> &str;

    /// File extensions (lowercase, no dot) that map to [`Codec::format`].
    fn extensions(&self) -> &[&str];

    /// Encode `image` at `quality`.
    ///
    /// Fails with [`Error::Encode`] for zero-area images.
    fn encode(&self, image: &PixelBuffer, quality: QualityLevel) -> Result<EncodedBlob>;

    /// Decode a blob produced by [`Codec::encode`].
    ///
    /// Fails with [`Error::Decode`] if the bytes are not valid for this codec.
    fn decode(&self, blob: &EncodedBlob) -> Result<PixelBuffer>;

    /// True if a file extension (case-insensitive) belongs to this codec's format.
    fn handles_extension(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.extensions().iter().any(|e| *e == ext)
    }
}

/// Encode callback type.
///
/// Takes image data and quality, returns encoded bytes.
pub type EncodeFn = Box<dyn Fn(&PixelBuffer, QualityLevel) -> Result<Vec<u8>> + Send + Sync>;

/// Decode callback type.
///
/// Takes encoded bytes, returns decoded image data.
pub type DecodeFn = Box<dyn Fn(&[u8]) -> Result<PixelBuffer> + Send + Sync>;

/// Codec built from caller-supplied encode/decode callbacks.
///
/// # Example
///
/// ```rust,ignore
/// use rd_budget::codec::CallbackCodec;
///
/// let codec = CallbackCodec::new(
///     "my-codec",
///     "myfmt",
///     Box::new(|image, quality| my_encode(image, quality.get())),
///     Box::new(|bytes| my_decode(bytes)),
/// );
/// ```
pub struct CallbackCodec {
    id: String,
    format: String,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl CallbackCodec {
    /// Create a codec from callbacks.
    #[must_use]
    pub fn new(id: &str, format: &str, encode: EncodeFn, decode: DecodeFn) -> Self {
        Self {
            id: id.to_string(),
            format: format.to_string(),
            encode,
            decode,
        }
    }
}

impl Codec for CallbackCodec {
    fn id(&self) -> &str {
        &self.id
    }

    fn format(&self) -> &str {
        &self.format
    }

    fn extensions(&self) -> &[&str] {
        &[]
    }

    fn encode(&self, image: &PixelBuffer, quality: QualityLevel) -> Result<EncodedBlob> {
        if image.is_empty() {
            return Err(Error::Encode {
                quality: i64::from(quality.get()),
                reason: "image has zero area".to_string(),
            });
        }
        let bytes = (self.encode)(image, quality)?;
        Ok(EncodedBlob::new(bytes, quality))
    }

    fn decode(&self, blob: &EncodedBlob) -> Result<PixelBuffer> {
        (self.decode)(blob.as_bytes())
    }

    fn handles_extension(&self, ext: &str) -> bool {
        ext.eq_ignore_ascii_case(&self.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_bounds() {
        assert!(QualityLevel::new(1).is_ok());
        assert!(QualityLevel::new(100).is_ok());
        assert!(matches!(QualityLevel::new(0), Err(Error::InvalidQuality(0))));
        assert!(matches!(QualityLevel::new(101), Err(Error::InvalidQuality(101))));
        assert!(QualityLevel::new(-5).is_err());
    }

    #[test]
    fn test_quality_clamped() {
        assert_eq!(QualityLevel::clamped(0), QualityLevel::MIN);
        assert_eq!(QualityLevel::clamped(95).get(), 95);
        assert_eq!(QualityLevel::clamped(250), QualityLevel::MAX);
    }

    #[test]
    fn test_quality_serde() {
        let q = QualityLevel::new(42).unwrap();
        assert_eq!(serde_json::to_string(&q).unwrap(), "42");
        let back: QualityLevel = serde_json::from_str("42").unwrap();
        assert_eq!(back, q);
        assert!(serde_json::from_str::<QualityLevel>("0").is_err());
    }

    #[test]
    fn test_blob_size_kb() {
        let blob = EncodedBlob::new(vec![0; 2048], QualityLevel::MAX);
        assert_eq!(blob.len(), 2048);
        assert!((blob.size_kb() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_callback_codec_rejects_empty() {
        let codec = CallbackCodec::new(
            "raw",
            "raw",
            Box::new(|image, _| Ok(image.as_bytes().to_vec())),
            Box::new(|_| Err(Error::Decode("unused".to_string()))),
        );
        let empty = PixelBuffer::new(Vec::new(), 0, 4, 3).unwrap();
        assert!(matches!(
            codec.encode(&empty, QualityLevel::MAX),
            Err(Error::Encode { .. })
        ));
        assert!(codec.handles_extension("RAW"));
    }
}
