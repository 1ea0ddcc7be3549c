//! Bounded quality search under a byte budget.
//!
//! Finds the highest [`QualityLevel`] whose encoded size fits the budget by
//! bisecting `1..=100`. Encoded size is assumed to be non-decreasing in
//! quality, but plateaus and ties are tolerated: a probe only needs to tell
//! whether *that* quality fits, and a fitting probe always pushes the search
//! upward. The search needs at most 7 encodes.
//!
//! If no probed quality fits, the search falls back to quality 1 and flags
//! the outcome with `budget_missed`, so callers always get a usable
//! candidate and can still report the miss.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::{Codec, EncodedBlob, QualityLevel};
use crate::error::Result;
use crate::pixels::PixelBuffer;

/// One encode performed during the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    /// Quality probed.
    pub quality: QualityLevel,
    /// Encoded size in bytes.
    pub bytes: usize,
    /// Whether the size was within budget.
    pub fits: bool,
}

/// Result of a quality search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Chosen quality.
    pub quality: QualityLevel,
    /// Blob encoded at [`SearchOutcome::quality`].
    pub blob: EncodedBlob,
    /// True when even quality 1 exceeded the budget.
    pub budget_missed: bool,
    /// Probes in the order they were made.
    pub probes: Vec<Probe>,
}

/// Find the maximal quality whose encoded size is `<= target_bytes`.
///
/// # Errors
///
/// Propagates codec errors (e.g. [`Error::Encode`](crate::Error::Encode) for
/// a zero-area image).
pub fn search_quality(
    codec: &dyn Codec,
    image: &PixelBuffer,
    target_bytes: u64,
) -> Result<SearchOutcome> {
    let mut low = i64::from(QualityLevel::MIN.get());
    let mut high = i64::from(QualityLevel::MAX.get());
    let mut best: Option<EncodedBlob> = None;
    let mut floor: Option<EncodedBlob> = None;
    let mut probes = Vec::with_capacity(7);

    while low <= high {
        let mid = (low + high) / 2;
        let quality = QualityLevel::new(mid)?;
        let blob = codec.encode(image, quality)?;
        let bytes = blob.len();
        let fits = bytes as u64 <= target_bytes;

        debug!(codec = codec.id(), quality = mid, bytes, target_bytes, fits, "probe");
        probes.push(Probe { quality, bytes, fits });

        if fits {
            best = Some(blob);
            low = mid + 1;
        } else {
            if quality == QualityLevel::MIN {
                floor = Some(blob);
            }
            high = mid - 1;
        }
    }

    if let Some(blob) = best {
        return Ok(SearchOutcome {
            quality: blob.quality(),
            blob,
            budget_missed: false,
            probes,
        });
    }

    // Encoding is deterministic, so the quality-1 probe can stand in for a re-encode
    let blob = match floor {
        Some(blob) => blob,
        None => codec.encode(image, QualityLevel::MIN)?,
    };
    warn!(
        codec = codec.id(),
        target_bytes,
        min_bytes = blob.len(),
        "budget unattainable, falling back to minimum quality"
    );

    Ok(SearchOutcome {
        quality: QualityLevel::MIN,
        blob,
        budget_missed: true,
        probes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CallbackCodec, JpegCodec};
    use crate::error::Error;

    /// Codec whose output size is `size_of(quality)` bytes.
    fn sized_codec(size_of: fn(u8) -> usize) -> CallbackCodec {
        CallbackCodec::new(
            "sized",
            "sized",
            Box::new(move |_, q| Ok(vec![0u8; size_of(q.get())])),
            Box::new(|_| Err(Error::Decode("not decodable".to_string()))),
        )
    }

    fn any_image() -> PixelBuffer {
        PixelBuffer::solid_rgb(8, 8, [1, 2, 3])
    }

    fn textured(h: usize, w: usize) -> PixelBuffer {
        let data = (0..h * w * 3)
            .map(|i| ((i * 7919 + (i / 3) * 104729) % 256) as u8)
            .collect();
        PixelBuffer::new(data, h, w, 3).unwrap()
    }

    #[test]
    fn test_linear_size_exact_boundary() {
        let codec = sized_codec(|q| usize::from(q) * 10);
        let out = search_quality(&codec, &any_image(), 555).unwrap();
        assert_eq!(out.quality.get(), 55);
        assert_eq!(out.blob.len(), 550);
        assert!(!out.budget_missed);
        assert!(out.probes.len() <= 7);
    }

    #[test]
    fn test_everything_fits_returns_max() {
        let codec = sized_codec(|q| usize::from(q));
        let out = search_quality(&codec, &any_image(), 1_000_000).unwrap();
        assert_eq!(out.quality, QualityLevel::MAX);
        assert!(!out.budget_missed);
    }

    #[test]
    fn test_plateau_prefers_highest() {
        // Flat size everywhere up to 80, then jumps
        let codec = sized_codec(|q| if q <= 80 { 100 } else { 500 });
        let out = search_quality(&codec, &any_image(), 100).unwrap();
        assert_eq!(out.quality.get(), 80);
    }

    #[test]
    fn test_unattainable_falls_back_to_min() {
        let codec = sized_codec(|q| 1000 + usize::from(q));
        let out = search_quality(&codec, &any_image(), 1).unwrap();
        assert_eq!(out.quality, QualityLevel::MIN);
        assert!(out.budget_missed);
        assert_eq!(out.blob.len(), 1001);
        assert_eq!(out.blob.quality(), QualityLevel::MIN);
        assert!(out.probes.iter().all(|p| !p.fits));
        assert_eq!(out.probes.last().map(|p| p.quality), Some(QualityLevel::MIN));
    }

    #[test]
    fn test_min_quality_fits_exactly() {
        let codec = sized_codec(|q| usize::from(q) * 100);
        let out = search_quality(&codec, &any_image(), 100).unwrap();
        assert_eq!(out.quality, QualityLevel::MIN);
        assert!(!out.budget_missed);
    }

    #[test]
    fn test_jpeg_one_byte_budget() {
        let codec = JpegCodec::new();
        let out = search_quality(&codec, &textured(32, 32), 1).unwrap();
        assert_eq!(out.quality, QualityLevel::MIN);
        assert!(out.budget_missed);
        assert!(out.blob.len() > 1);
    }

    #[test]
    fn test_jpeg_result_fits_or_is_min() {
        let codec = JpegCodec::new();
        let img = textured(64, 64);
        for target in [500u64, 2_000, 5_000, 20_000] {
            let out = search_quality(&codec, &img, target).unwrap();
            assert!(out.blob.len() as u64 <= target || out.quality == QualityLevel::MIN);
            assert_eq!(out.budget_missed, out.blob.len() as u64 > target);
        }
    }

    #[test]
    fn test_idempotent() {
        let codec = JpegCodec::new();
        let img = textured(48, 48);
        let a = search_quality(&codec, &img, 3_000).unwrap();
        let b = search_quality(&codec, &img, 3_000).unwrap();
        assert_eq!(a.quality, b.quality);
        assert_eq!(a.blob.len(), b.blob.len());
        assert_eq!(a.probes, b.probes);
    }

    #[test]
    fn test_zero_area_propagates() {
        let codec = JpegCodec::new();
        let empty = PixelBuffer::new(Vec::new(), 0, 10, 3).unwrap();
        assert!(matches!(
            search_quality(&codec, &empty, 1000),
            Err(Error::Encode { .. })
        ));
    }
}
