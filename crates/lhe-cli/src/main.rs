//! lheplot CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod config;
mod fill;
mod joblog;
mod output;

#[derive(Parser)]
#[command(name = "lheplot")]
#[command(about = "lheplot - Event selection and histogram filling for Les Houches event files")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every configured event file and write histograms + summary
    Fill {
        /// Run configuration (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Histogram definitions; replaces the `histograms` list of the config
        #[arg(long)]
        histos: Option<PathBuf>,

        /// Base output directory (flag suffixes are appended)
        #[arg(long, default_value = "batch_output")]
        outdir: PathBuf,

        /// Histogram artifact path. Defaults to `<outdir>/output<suffix>.json`.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Process files in parallel; failed files are reported together.
        #[arg(long)]
        batch: bool,

        /// Threads for batch mode (0 = auto).
        #[arg(long, default_value = "0")]
        threads: usize,

        /// Per-event cut diagnostics (same as `--log-level trace`).
        #[arg(long)]
        verbose: bool,

        /// Zero the artifact timestamp so identical inputs give identical bytes.
        #[arg(long)]
        deterministic: bool,
    },

    /// Count event records in an LHE file and compare with its header
    Count {
        /// Event file (`.lhe` or `.lhe.gz`)
        input: PathBuf,
    },

    /// Compile every cut and histogram of a configuration without reading events
    Validate {
        /// Run configuration (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Histogram definitions; replaces the `histograms` list of the config
        #[arg(long)]
        histos: Option<PathBuf>,
    },

    /// Print version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match &cli.command {
        Commands::Fill { verbose: true, .. } => tracing::Level::TRACE,
        _ => cli.log_level,
    };
    // Per-sample logs always carry the start and pass-count lines.
    let job_logs = joblog::JobLogs::new();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(LevelFilter::from_level(level)),
        )
        .with(job_logs.clone().with_filter(LevelFilter::from_level(level.max(tracing::Level::INFO))))
        .init();

    match cli.command {
        Commands::Fill { config, histos, outdir, output, batch, threads, verbose: _, deterministic } => {
            fill::cmd_fill(&fill::FillArgs {
                config,
                histos,
                outdir,
                output,
                batch,
                threads,
                deterministic,
                job_logs,
            })
        }
        Commands::Count { input } => cmd_count(&input),
        Commands::Validate { config, histos } => cmd_validate(&config, histos.as_deref()),
        Commands::Version => {
            println!("lheplot {}", lhe_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_count(input: &Path) -> Result<()> {
    let lhe_core::FileScan { header, events } = lhe_core::scan_file(input)?;
    if let Some(declared) = header.declared_events
        && declared != events
    {
        tracing::warn!(declared, counted = events, "header event count disagrees with records");
    }
    let run = header.run.as_ref();
    let output_json = serde_json::json!({
        "path": input.display().to_string(),
        "events": events,
        "declared_events": header.declared_events,
        "beam_ids": run.map(|r| r.beam_ids),
        "beam_energies": run.map(|r| r.beam_energies),
        "cross_section_pb": run.map(|r| r.total_cross_section()),
    });
    write_json(output_json)
}

fn cmd_validate(config: &Path, histos: Option<&Path>) -> Result<()> {
    let cfg = config::load(config, histos)?;
    // Cuts are compiled even when `apply_cuts` is off so typos surface early.
    let cuts = lhe_core::CutSet::compile(&cfg.cuts).context("invalid cut")?;
    let analysis = cfg.analysis()?;

    let missing: Vec<String> = cfg
        .files
        .iter()
        .filter(|f| !f.path.exists())
        .map(|f| f.path.display().to_string())
        .collect();
    for m in &missing {
        tracing::warn!(path = %m, "input file does not exist");
    }

    let output_json = serde_json::json!({
        "ok": true,
        "files": cfg.files.len(),
        "missing_files": missing,
        "cuts": cuts.len(),
        "apply_cuts": cfg.apply_cuts,
        "histograms": analysis.histograms().iter().map(|h| h.name.as_str()).collect::<Vec<_>>(),
    });
    write_json(output_json)
}

fn write_json(value: serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
