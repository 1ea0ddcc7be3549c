//! Single-budget quality search command.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use rd_budget::{JpegCodec, PixelBuffer, search_quality};

pub fn run(image: PathBuf, target: u32, output: Option<PathBuf>) -> Result<()> {
    if target == 0 {
        bail!("Target size must be greater than 0 KB");
    }

    let source = PixelBuffer::open(&image)
        .with_context(|| format!("Failed to open {}", image.display()))?;
    let outcome = search_quality(&JpegCodec::new(), &source, u64::from(target) * 1024)?;

    println!("{:>8} {:>10} {:>6}", "Quality", "Bytes", "Fits");
    println!("{:-<26}", "");
    for probe in &outcome.probes {
        println!("{:>8} {:>10} {:>6}", probe.quality, probe.bytes, probe.fits);
    }
    println!();

    if outcome.budget_missed {
        println!(
            "No quality fits {} KB; minimum quality gives {:.2} KB",
            target,
            outcome.blob.size_kb()
        );
    } else {
        println!(
            "Quality {} fits {} KB ({:.2} KB)",
            outcome.quality,
            target,
            outcome.blob.size_kb()
        );
    }

    if let Some(path) = output {
        std::fs::write(&path, outcome.blob.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("Wrote {}", path.display());
    }

    Ok(())
}
