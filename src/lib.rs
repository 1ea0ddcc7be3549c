//! # rd-budget
//!
//! Rate-distortion analysis for lossy image codecs under a byte budget.
//!
//! For each target size the library searches for the highest encoder
//! quality whose output fits, decodes the result and measures it against
//! the source. The per-target rows form a rate-distortion curve whose knee
//! marks where extra bytes stop buying much fidelity.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rd_budget::{AnalysisConfig, JpegCodec, PixelBuffer, render_text, run_analysis};
//!
//! let image = Arc::new(PixelBuffer::open("photo.png".as_ref())?);
//! let config = AnalysisConfig::builder().targets_kb(vec![30, 100, 500]).build();
//! let run = run_analysis(&JpegCodec::new(), image, &config)?;
//! println!("{}", render_text(&run));
//! ```
//!
//! ## Modules
//!
//! - [`error`]: Error types for the library
//! - [`pixels`]: Decoded 8-bit pixel buffers
//! - [`codec`]: The [`Codec`] trait, JPEG and callback codecs
//! - [`search`]: Quality search under a byte budget
//! - [`metrics`]: PSNR, SSIM, MSE and optional DSSIM
//! - [`analysis`]: Analysis runs, knee detection, background workers, reports
//! - [`edit`]: Cropping and glare-removal collaborator traits
//! - [`session`]: Editing-session state around analysis runs

pub mod analysis;
pub mod codec;
pub mod edit;
pub mod error;
pub mod metrics;
pub mod pixels;
pub mod search;
pub mod session;

// Re-export commonly used types
pub use analysis::{
    AnalysisConfig, AnalysisResult, AnalysisRun, RdPoint, RunEvent, RunId, RunTicket,
    TargetFailure, VisualTier, Warning, find_knee, render_text, run_analysis, spawn_analysis,
    write_configured_reports, write_reports,
};
pub use codec::{CallbackCodec, Codec, EncodedBlob, JpegCodec, QualityLevel};
pub use edit::{CropStage, Cropper, GlareRemover};
pub use error::{Error, Result};
pub use metrics::{MetricConfig, MetricResult};
pub use pixels::PixelBuffer;
pub use search::{SearchOutcome, search_quality};
pub use session::{EditSession, EventDisposition, SaveSummary};
