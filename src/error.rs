//! Error types for rd-budget operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for rd-budget operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Shape of a pixel buffer as `(height, width, channels)`.
pub type Shape = (usize, usize, usize);

/// Errors that can occur during rate-distortion analysis.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Failed to load an image file.
    #[error("Image load failed: {path}: {reason}")]
    ImageLoad {
        /// Path to the image that failed to load.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// Failed to write an image file.
    #[error("Image save failed: {path}: {reason}")]
    ImageSave {
        /// Destination path.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// The codec refused or failed to encode an image.
    #[error("Encode failed at quality {quality}: {reason}")]
    Encode {
        /// Quality level that was requested.
        quality: i64,
        /// Reason for the failure.
        reason: String,
    },

    /// The codec could not decode a blob.
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Metrics were requested on buffers of different shape.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Shape of the reference buffer (height, width, channels).
        expected: Shape,
        /// Shape of the candidate buffer (height, width, channels).
        actual: Shape,
    },

    /// Pixel data does not describe a valid buffer.
    #[error("Invalid pixel buffer: {0}")]
    InvalidBuffer(String),

    /// Quality level outside 1-100.
    #[error("Invalid quality value: {0} (expected 1-100)")]
    InvalidQuality(i64),

    /// Target budget is not strictly positive.
    #[error("Invalid target size: {0} KB (must be > 0)")]
    InvalidTarget(u32),

    /// Failed to calculate a quality metric.
    #[error("Metric calculation failed: {metric}: {reason}")]
    MetricCalculation {
        /// Name of the metric that failed.
        metric: String,
        /// Reason for the failure.
        reason: String,
    },

    /// The background worker stopped without delivering a result.
    #[error("Analysis worker disconnected")]
    WorkerDisconnected,

    /// Error writing report or output files.
    #[error("Report error: {0}")]
    Report(String),

    /// I/O error wrapper.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// True for errors that only invalidate a single target of a run.
    ///
    /// Anything a codec or metric raises fails its own target. Shape
    /// mismatches after a codec round-trip and invalid targets break an
    /// invariant of the whole run and are not target-local.
    #[must_use]
    pub fn is_target_local(&self) -> bool {
        !matches!(self, Self::ShapeMismatch { .. } | Self::InvalidTarget(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_errors_are_target_local() {
        assert!(Error::Decode("bad".to_string()).is_target_local());
        assert!(Error::InvalidBuffer("short".to_string()).is_target_local());
        assert!(Error::Io(std::io::Error::other("disk")).is_target_local());
        assert!(
            Error::Encode {
                quality: 50,
                reason: "refused".to_string()
            }
            .is_target_local()
        );
    }

    #[test]
    fn test_run_invariants_are_fatal() {
        let mismatch = Error::ShapeMismatch {
            expected: (8, 8, 3),
            actual: (4, 4, 3),
        };
        assert!(!mismatch.is_target_local());
        assert!(!Error::InvalidTarget(0).is_target_local());
    }
}
