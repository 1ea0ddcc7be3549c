//! Human- and machine-readable reports for an analysis run.
//!
//! The text report has three sections:
//!
//! 1. a rate-distortion table ordered by actual size
//! 2. a subjective quality narrative per tier
//! 3. a recommendation referencing the knee of the curve
//!
//! JSON and CSV variants are written for external plotting and tooling.
//!
//! ## Visual tiers
//!
//! | Actual size | Tier |
//! |-------------|------|
//! | < 50 KB | Poor |
//! | < 200 KB | Acceptable |
//! | < 800 KB | Good |
//! | >= 800 KB | Excellent |

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::knee::RdPoint;
use super::run::{AnalysisConfig, AnalysisResult, AnalysisRun};
use crate::error::Result;

/// Subjective quality tier, judged from the encoded size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisualTier {
    /// < 50 KB - heavy artifacts.
    Poor,
    /// < 200 KB - minor artifacts on inspection.
    Acceptable,
    /// < 800 KB - very few artifacts.
    Good,
    /// >= 800 KB - essentially none.
    Excellent,
}

impl VisualTier {
    /// Determine the tier from an encoded size in KB.
    #[must_use]
    pub fn from_size_kb(size_kb: f64) -> Self {
        if size_kb < 50.0 {
            Self::Poor
        } else if size_kb < 200.0 {
            Self::Acceptable
        } else if size_kb < 800.0 {
            Self::Good
        } else {
            Self::Excellent
        }
    }

    /// Description of the artifacts to expect.
    #[must_use]
    pub fn artifacts(self) -> &'static str {
        match self {
            Self::Poor => "Heavy blocking, ringing, and color banding are very noticeable.",
            Self::Acceptable => "Minor blocking and softness are visible upon inspection.",
            Self::Good => {
                "Very few artifacts. Slight softness might be visible in high-frequency areas."
            }
            Self::Excellent => "Essentially none.",
        }
    }
}

impl std::fmt::Display for VisualTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Poor => write!(f, "Poor"),
            Self::Acceptable => write!(f, "Acceptable"),
            Self::Good => write!(f, "Good"),
            Self::Excellent => write!(f, "Excellent"),
        }
    }
}

/// Data an external plot layer needs: the curve and the knee marker.
#[derive(Debug, Clone, Serialize)]
pub struct CurveData {
    /// Points ordered by ascending size.
    pub points: Vec<RdPoint>,
    /// Index of the knee in `points`.
    pub knee: Option<usize>,
}

impl CurveData {
    /// Extract plot data from a run.
    #[must_use]
    pub fn from_run(run: &AnalysisRun) -> Self {
        let points = run.rd_curve();
        let knee = super::knee::find_knee(&points);
        Self { points, knee }
    }
}

const RULE_WIDTH: usize = 40;
const TABLE_WIDTH: usize = 75;

fn heading(out: &mut String, title: &str) {
    let rule = "=".repeat(RULE_WIDTH);
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{rule}");
    out.push('\n');
}

fn format_psnr(psnr: f64) -> String {
    if psnr.is_infinite() {
        "inf".to_string()
    } else {
        format!("{psnr:.2}")
    }
}

/// Render the rate-distortion table.
///
/// Rows ordered by actual size. `*` marks a missed budget, `<` the knee.
#[must_use]
pub fn render_table(run: &AnalysisRun) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<15}{:<15}{:<10}{:<15}{:<10}{:<10}",
        "Target Size", "Actual Size", "Quality", "PSNR (dB)", "SSIM", "MSE"
    );
    let _ = writeln!(out, "{}", "-".repeat(TABLE_WIDTH));

    let knee = run.knee();
    for (i, r) in run.sorted_by_size().into_iter().enumerate() {
        let actual = format!("{:.2}{}", r.actual_kb, if r.budget_missed { "*" } else { "" });
        let marker = if knee == Some(i) { "  < knee" } else { "" };
        let _ = writeln!(
            out,
            "{:<15.0}{:<15}{:<10}{:<15}{:<10.4}{:<10.2}{}",
            r.target_kb,
            actual,
            r.quality,
            format_psnr(r.psnr),
            r.ssim,
            r.mse,
            marker
        );
    }

    if run.results.iter().any(|r| r.budget_missed) {
        out.push('\n');
        let _ = writeln!(
            out,
            "* budget unattainable even at quality 1; minimum-quality result shown"
        );
    }
    out
}

/// Render the per-tier subjective narrative.
#[must_use]
pub fn render_narrative(run: &AnalysisRun) -> String {
    let mut out = String::new();
    for r in run.sorted_by_size() {
        let tier = VisualTier::from_size_kb(r.actual_kb);
        let _ = writeln!(out, "--- {} KB Target ---", r.target_kb);
        let _ = writeln!(out, "Visual Quality: {tier}.");
        let _ = writeln!(out, "Artifacts: {}", tier.artifacts());
        out.push('\n');
    }
    out
}

/// Render the recommendation paragraph.
#[must_use]
pub fn render_recommendation(run: &AnalysisRun) -> String {
    let mut out = String::from(
        "The 'Optimal Point' marks the 'knee' of the rate-distortion curve, where \
         increasing the file size yields diminishing returns in quality.\n",
    );

    match run.knee_result() {
        Some(r) => {
            let _ = writeln!(
                out,
                "For a good balance of size and quality, the {} KB target \
                 (quality {}, {:.2} KB) is recommended.",
                r.target_kb, r.quality, r.actual_kb
            );
        }
        None => {
            let _ = writeln!(
                out,
                "At least three tiers are needed to locate the knee; \
                 compare the rows above directly."
            );
        }
    }

    if let Some(top) = run.sorted_by_size().last() {
        let _ = writeln!(
            out,
            "For high-quality archival, use the highest setting ({} KB target, quality {}).",
            top.target_kb, top.quality
        );
    }
    out
}

/// Render the full text report.
#[must_use]
pub fn render_text(run: &AnalysisRun) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Compression & Rate-Distortion Analysis");
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    out.push('\n');
    out.push_str(&render_table(run));

    out.push_str("\n\n");
    heading(&mut out, "Subjective Analysis");
    out.push_str(&render_narrative(run));

    out.push('\n');
    heading(&mut out, "Recommendation");
    out.push_str(&render_recommendation(run));

    if !run.failures.is_empty() {
        out.push('\n');
        heading(&mut out, "Failed Targets");
        for f in run.failures() {
            let _ = writeln!(out, "{} KB: {}", f.target_kb, f.reason);
        }
    }
    out
}

/// Write the run as pretty JSON.
pub fn write_json(run: &AnalysisRun, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(run)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Write one CSV row per result, in request order.
pub fn write_csv(run: &AnalysisRun, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "target_kb",
        "actual_kb",
        "quality",
        "psnr",
        "ssim",
        "mse",
        "dssim",
        "budget_missed",
        "probes",
        "compression_ratio",
    ])?;

    let uncompressed = run.uncompressed_size();
    for r in &run.results {
        write_row(&mut wtr, r, uncompressed)?;
    }

    wtr.flush()?;
    Ok(())
}

fn write_row<W: std::io::Write>(
    wtr: &mut csv::Writer<W>,
    r: &AnalysisResult,
    uncompressed: usize,
) -> Result<()> {
    wtr.write_record([
        &format!("{:.0}", r.target_kb),
        &format!("{:.2}", r.actual_kb),
        &r.quality.to_string(),
        &format_psnr(r.psnr),
        &format!("{:.6}", r.ssim),
        &format!("{:.4}", r.mse),
        &r.dssim.map_or(String::new(), |d| format!("{:.6}", d)),
        &r.budget_missed.to_string(),
        &r.probes.to_string(),
        &format!("{:.2}", r.compression_ratio(uncompressed)),
    ])?;
    Ok(())
}

/// Write `<name>.json`, `<name>.csv` and `<name>.txt` into `dir`.
///
/// Returns the paths written.
pub fn write_reports(run: &AnalysisRun, dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let json_path = dir.join(format!("{name}.json"));
    write_json(run, &json_path)?;

    let csv_path = dir.join(format!("{name}.csv"));
    write_csv(run, &csv_path)?;

    let txt_path = dir.join(format!("{name}.txt"));
    std::fs::write(&txt_path, render_text(run))?;

    Ok(vec![json_path, csv_path, txt_path])
}

/// Write reports into `config.report_dir`, if one is configured.
///
/// Returns the paths written; empty when no directory is set.
pub fn write_configured_reports(
    run: &AnalysisRun,
    config: &AnalysisConfig,
    name: &str,
) -> Result<Vec<PathBuf>> {
    match &config.report_dir {
        Some(dir) => write_reports(run, dir, name),
        None => Ok(Vec::new()),
    }
}
