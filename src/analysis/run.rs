//! Analysis run: quality search plus metrics for each target budget.
//!
//! [`run_analysis`] is a pure function from `(codec, source image, config)`
//! to an [`AnalysisRun`]. It never touches caller state; forwarding the
//! single-target candidate to an editing session is the job of
//! [`worker`](super::worker).

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::knee::{RdPoint, find_knee};
use crate::codec::{Codec, QualityLevel};
use crate::error::{Error, Result};
use crate::metrics::{self, MetricConfig, MetricResult};
use crate::pixels::PixelBuffer;
use crate::search::search_quality;

/// Target tiers offered by default: 30 KB, 100 KB, 500 KB, 1 MB.
pub const DEFAULT_TARGETS_KB: [u32; 4] = [30, 100, 500, 1024];

/// Quality used for saves when no analysis quality is remembered.
pub const DEFAULT_SAVE_QUALITY: u8 = 95;

/// Configuration for an analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Target budgets in KB (1 KB = 1024 bytes), processed in this order.
    pub targets_kb: Vec<u32>,

    /// Which optional metrics to calculate.
    pub metrics: MetricConfig,

    /// Directory for JSON/CSV report output.
    pub report_dir: Option<PathBuf>,

    /// Quality used when saving without a remembered analysis quality.
    pub default_save_quality: QualityLevel,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AnalysisConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::default()
    }

    /// Copy of this configuration with a different target list.
    #[must_use]
    pub fn with_targets(&self, targets_kb: Vec<u32>) -> Self {
        Self {
            targets_kb,
            ..self.clone()
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug, Default)]
pub struct AnalysisConfigBuilder {
    targets_kb: Option<Vec<u32>>,
    metrics: Option<MetricConfig>,
    report_dir: Option<PathBuf>,
    default_save_quality: Option<QualityLevel>,
}

impl AnalysisConfigBuilder {
    /// Set the target budgets in KB.
    #[must_use]
    pub fn targets_kb(mut self, targets: Vec<u32>) -> Self {
        self.targets_kb = Some(targets);
        self
    }

    /// Set which optional metrics to calculate.
    #[must_use]
    pub fn metrics(mut self, metrics: MetricConfig) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the report output directory.
    #[must_use]
    pub fn report_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(path.into());
        self
    }

    /// Set the fallback save quality.
    #[must_use]
    pub fn default_save_quality(mut self, quality: QualityLevel) -> Self {
        self.default_save_quality = Some(quality);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> AnalysisConfig {
        AnalysisConfig {
            targets_kb: self
                .targets_kb
                .unwrap_or_else(|| DEFAULT_TARGETS_KB.to_vec()),
            metrics: self.metrics.unwrap_or_else(MetricConfig::fast),
            report_dir: self.report_dir,
            default_save_quality: self
                .default_save_quality
                .unwrap_or(QualityLevel::clamped(DEFAULT_SAVE_QUALITY)),
        }
    }
}

/// Process-unique identifier of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(u64);

impl RunId {
    /// Allocate the next identifier.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw identifier.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Result for one target budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Requested budget in KB.
    pub target_kb: f64,
    /// Size of the chosen encode in KB.
    pub actual_kb: f64,
    /// Chosen quality level.
    pub quality: QualityLevel,
    /// PSNR in dB (`inf` if bit-identical).
    #[serde(with = "crate::metrics::inf_float")]
    pub psnr: f64,
    /// Mean SSIM.
    pub ssim: f64,
    /// Mean squared error.
    pub mse: f64,
    /// DSSIM, when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dssim: Option<f64>,
    /// True when no quality fit the budget and quality 1 was used anyway.
    pub budget_missed: bool,
    /// Number of encodes the search performed.
    pub probes: usize,
}

impl AnalysisResult {
    /// Metric values as a [`MetricResult`].
    #[must_use]
    pub fn metrics(&self) -> MetricResult {
        MetricResult {
            psnr: self.psnr,
            ssim: self.ssim,
            mse: self.mse,
            dssim: self.dssim,
        }
    }

    /// Compression ratio against the uncompressed size.
    #[must_use]
    pub fn compression_ratio(&self, uncompressed_bytes: usize) -> f64 {
        if self.actual_kb == 0.0 {
            0.0
        } else {
            uncompressed_bytes as f64 / (self.actual_kb * 1024.0)
        }
    }
}

/// A target that produced no result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFailure {
    /// Requested budget in KB.
    pub target_kb: u32,
    /// Why it failed.
    pub reason: String,
}

/// Non-fatal conditions worth surfacing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Warning {
    /// Even quality 1 exceeded the budget; the quality-1 encode was kept.
    NoFeasibleQuality {
        /// Requested budget in KB.
        target_kb: f64,
        /// Size actually produced in KB.
        actual_kb: f64,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoFeasibleQuality {
                target_kb,
                actual_kb,
            } => write!(
                f,
                "{target_kb:.0} KB target unattainable; minimum quality gives {actual_kb:.2} KB"
            ),
        }
    }
}

/// All results of one analysis action against one source image.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRun {
    /// Run identifier.
    pub id: RunId,

    /// Codec identifier.
    pub codec_id: String,

    /// Source image width in pixels.
    pub width: usize,

    /// Source image height in pixels.
    pub height: usize,

    /// Requested targets, in request order.
    pub targets_kb: Vec<u32>,

    /// One result per successful target, in request order.
    pub results: Vec<AnalysisResult>,

    /// Targets that failed, in request order.
    pub failures: Vec<TargetFailure>,

    /// When the run started.
    #[serde(with = "chrono_serde")]
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Wall time of the run.
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,

    /// Ground truth the results were measured against.
    #[serde(skip)]
    pub source: Arc<PixelBuffer>,
}

impl AnalysisRun {
    /// Targets that failed, with reasons.
    pub fn failures(&self) -> impl Iterator<Item = &TargetFailure> {
        self.failures.iter()
    }

    /// Budget misses among the results.
    #[must_use]
    pub fn warnings(&self) -> Vec<Warning> {
        self.results
            .iter()
            .filter(|r| r.budget_missed)
            .map(|r| Warning::NoFeasibleQuality {
                target_kb: r.target_kb,
                actual_kb: r.actual_kb,
            })
            .collect()
    }

    /// Results ordered by ascending actual size (stable for ties).
    #[must_use]
    pub fn sorted_by_size(&self) -> Vec<&AnalysisResult> {
        let mut sorted: Vec<&AnalysisResult> = self.results.iter().collect();
        sorted.sort_by(|a, b| a.actual_kb.total_cmp(&b.actual_kb));
        sorted
    }

    /// `(actual_kb, psnr)` curve in ascending size order.
    #[must_use]
    pub fn rd_curve(&self) -> Vec<RdPoint> {
        self.sorted_by_size()
            .into_iter()
            .map(|r| RdPoint::new(r.actual_kb, r.psnr))
            .collect()
    }

    /// Index into [`AnalysisRun::sorted_by_size`] of the knee, if any.
    #[must_use]
    pub fn knee(&self) -> Option<usize> {
        find_knee(&self.rd_curve())
    }

    /// The knee result itself.
    #[must_use]
    pub fn knee_result(&self) -> Option<&AnalysisResult> {
        let sorted = self.sorted_by_size();
        self.knee().and_then(|i| sorted.get(i).copied())
    }

    /// Uncompressed source size in bytes.
    #[must_use]
    pub fn uncompressed_size(&self) -> usize {
        self.source.byte_len()
    }

    /// True if every target produced a result.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A decoded candidate, kept alongside its result.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Budget the candidate was searched for.
    pub target_kb: u32,
    /// Chosen quality.
    pub quality: QualityLevel,
    /// Decoded pixels.
    pub image: PixelBuffer,
}

/// A run plus the decoded candidates of its successful targets.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// The analysis record.
    pub run: AnalysisRun,
    /// Candidates, parallel to `run.results`.
    pub candidates: Vec<Candidate>,
}

/// Run the analysis and return only the record.
pub fn run_analysis(
    codec: &dyn Codec,
    source: Arc<PixelBuffer>,
    config: &AnalysisConfig,
) -> Result<AnalysisRun> {
    run_analysis_with_candidates(codec, source, config, RunId::next()).map(|out| out.run)
}

/// Run the analysis, keeping decoded candidates.
///
/// Targets are evaluated in parallel; results keep request order. Codec
/// and metric failures are recorded per target. A shape mismatch between
/// the source and a decoded candidate aborts the whole run.
///
/// # Errors
///
/// [`Error::InvalidTarget`] if any target is zero, or
/// [`Error::ShapeMismatch`] if the codec does not preserve shape.
pub fn run_analysis_with_candidates(
    codec: &dyn Codec,
    source: Arc<PixelBuffer>,
    config: &AnalysisConfig,
    id: RunId,
) -> Result<RunOutput> {
    if let Some(&bad) = config.targets_kb.iter().find(|&&t| t == 0) {
        return Err(Error::InvalidTarget(bad));
    }

    let timestamp = chrono::Utc::now();
    let start = Instant::now();
    info!(
        run = %id,
        codec = codec.id(),
        width = source.width(),
        height = source.height(),
        targets = ?config.targets_kb,
        "analysis started"
    );

    let outcomes: Vec<(u32, Result<(AnalysisResult, Candidate)>)> = config
        .targets_kb
        .par_iter()
        .map(|&target_kb| (target_kb, analyze_target(codec, &source, target_kb, &config.metrics)))
        .collect();

    let mut results = Vec::with_capacity(outcomes.len());
    let mut candidates = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();

    for (target_kb, outcome) in outcomes {
        match outcome {
            Ok((result, candidate)) => {
                results.push(result);
                candidates.push(candidate);
            }
            Err(e) if e.is_target_local() => {
                warn!(run = %id, target_kb, error = %e, "target failed");
                failures.push(TargetFailure {
                    target_kb,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    let run = AnalysisRun {
        id,
        codec_id: codec.id().to_string(),
        width: source.width(),
        height: source.height(),
        targets_kb: config.targets_kb.clone(),
        results,
        failures,
        timestamp,
        elapsed: start.elapsed(),
        source,
    };

    info!(
        run = %id,
        results = run.results.len(),
        failures = run.failures.len(),
        elapsed_ms = run.elapsed.as_millis() as u64,
        "analysis complete"
    );

    Ok(RunOutput { run, candidates })
}

fn analyze_target(
    codec: &dyn Codec,
    source: &PixelBuffer,
    target_kb: u32,
    metric_config: &MetricConfig,
) -> Result<(AnalysisResult, Candidate)> {
    let target_bytes = u64::from(target_kb) * 1024;
    let outcome = search_quality(codec, source, target_bytes)?;
    let decoded = codec.decode(&outcome.blob)?;
    let metrics = metrics::evaluate(source, &decoded, metric_config)?;

    info!(
        target_kb,
        quality = outcome.quality.get(),
        bytes = outcome.blob.len(),
        psnr = metrics.psnr,
        ssim = metrics.ssim,
        budget_missed = outcome.budget_missed,
        "target analyzed"
    );

    let result = AnalysisResult {
        target_kb: f64::from(target_kb),
        actual_kb: outcome.blob.size_kb(),
        quality: outcome.quality,
        psnr: metrics.psnr,
        ssim: metrics.ssim,
        mse: metrics.mse,
        dssim: metrics.dssim,
        budget_missed: outcome.budget_missed,
        probes: outcome.probes.len(),
    };
    let candidate = Candidate {
        target_kb,
        quality: outcome.quality,
        image: decoded,
    };
    Ok((result, candidate))
}

// Custom serialization for Duration as milliseconds
mod duration_millis {
    use serde::{Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }
}

mod chrono_serde {
    use chrono::{DateTime, Utc};
    use serde::{Serialize, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        dt.to_rfc3339().serialize(serializer)
    }
}
