//! rd-budget CLI - Rate-distortion analysis under a byte budget

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// Rate-distortion analysis for lossy image encoding.
#[derive(Parser)]
#[command(name = "rd-budget")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an image against one or more size targets
    Analyze {
        /// Source image
        image: PathBuf,

        /// Target sizes in KB
        #[arg(
            short,
            long,
            env = "RD_BUDGET_TARGETS",
            value_delimiter = ',',
            default_values_t = rd_budget::analysis::run::DEFAULT_TARGETS_KB
        )]
        targets: Vec<u32>,

        /// Write the run as JSON to this file
        #[arg(long)]
        json: Option<PathBuf>,

        /// Write the result rows as CSV to this file
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Directory to write JSON, CSV and text reports to
        #[arg(long, env = "RD_BUDGET_REPORT_DIR")]
        report_dir: Option<PathBuf>,

        /// Also compute DSSIM
        #[arg(long)]
        dssim: bool,

        /// Save the working image here afterwards (single target reuses its quality)
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Find the highest quality that fits one budget
    Search {
        /// Source image
        image: PathBuf,

        /// Target size in KB
        #[arg(short, long)]
        target: u32,

        /// Write the chosen encode here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "rd_budget=debug" } else { "rd_budget=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Analyze { image, targets, json, csv, report_dir, dssim, save } => {
            commands::analyze::run(image, targets, json, csv, report_dir, dssim, save)
        }
        Commands::Search { image, target, output } => commands::search::run(image, target, output),
    }
}
