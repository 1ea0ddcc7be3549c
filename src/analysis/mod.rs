//! Rate-distortion analysis.
//!
//! - [`run`]: per-target quality search and metrics, [`AnalysisConfig`]
//! - [`knee`]: knee detection on the resulting curve
//! - [`worker`]: background execution with run-tagged notifications
//! - [`report`]: text, JSON and CSV reports

pub mod knee;
pub mod report;
pub mod run;
pub mod worker;

pub use knee::{RdPoint, find_knee};
pub use report::{CurveData, VisualTier, render_text, write_configured_reports, write_reports};
pub use run::{
    AnalysisConfig, AnalysisResult, AnalysisRun, Candidate, RunId, RunOutput, TargetFailure,
    Warning, run_analysis, run_analysis_with_candidates,
};
pub use worker::{RunEvent, RunTicket, analyze_in_background, spawn_analysis};
