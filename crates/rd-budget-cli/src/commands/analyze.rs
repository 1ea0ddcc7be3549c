//! Rate-distortion analysis command.

use std::path::PathBuf;
use std::sync::{Arc, mpsc};

use anyhow::{Context, Result, bail};
use rd_budget::analysis::report::{write_csv, write_json};
use rd_budget::{
    AnalysisConfig, EditSession, JpegCodec, MetricConfig, render_text, write_configured_reports,
};
use tracing::info;

pub fn run(
    image: PathBuf,
    targets: Vec<u32>,
    json: Option<PathBuf>,
    csv: Option<PathBuf>,
    report_dir: Option<PathBuf>,
    dssim: bool,
    save: Option<PathBuf>,
) -> Result<()> {
    if targets.is_empty() {
        bail!("At least one target size is required");
    }

    let metrics = if dssim { MetricConfig::all() } else { MetricConfig::fast() };
    let mut builder = AnalysisConfig::builder()
        .targets_kb(targets.clone())
        .metrics(metrics);
    if let Some(dir) = report_dir {
        builder = builder.report_dir(dir);
    }
    let config = builder.build();
    let mut session = EditSession::open(&image, Arc::new(JpegCodec::new()), config)
        .with_context(|| format!("Failed to open {}", image.display()))?;

    let (tx, rx) = mpsc::channel();
    let ticket = session.start_analysis(targets, tx)?;
    for event in rx {
        session.apply_event(event).context("Analysis failed")?;
    }
    ticket.join()?;

    let run = session
        .analysis()
        .context("Analysis finished without a result")?;

    print!("{}", render_text(run));

    if let Some(path) = json {
        write_json(run, &path).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "JSON written");
    }

    if let Some(path) = csv {
        write_csv(run, &path).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "CSV written");
    }

    let name = image
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("analysis");
    let written =
        write_configured_reports(run, session.config(), name).context("Failed to write reports")?;
    for path in written {
        info!(path = %path.display(), "report written");
    }

    if let Some(path) = save {
        let summary = session
            .save(&path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        match summary.quality {
            Some(q) if summary.used_remembered => {
                eprintln!("Saved {} at analysed quality {}", path.display(), q);
            }
            Some(q) => eprintln!("Saved {} at quality {}", path.display(), q),
            None => eprintln!("Saved {}", path.display()),
        }
    }

    Ok(())
}
