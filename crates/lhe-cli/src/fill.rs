//! `lheplot fill`: process every configured file and write the run outputs.

use anyhow::{Context, Result};
use lhe_core::RunOutput;
use lhe_viz::HistogramsArtifact;
use std::path::{Path, PathBuf};

use crate::config;
use crate::joblog::JobLogs;
use crate::output;

pub struct FillArgs {
    pub config: PathBuf,
    pub histos: Option<PathBuf>,
    pub outdir: PathBuf,
    pub output: Option<PathBuf>,
    pub batch: bool,
    pub threads: usize,
    pub deterministic: bool,
    /// Enabled in batch mode to write `<out_dir>/<label>.log` per sample.
    pub job_logs: JobLogs,
}

pub fn cmd_fill(args: &FillArgs) -> Result<()> {
    let cfg = config::load(&args.config, args.histos.as_deref())?;
    let analysis = cfg.analysis()?;
    if cfg.files.is_empty() {
        anyhow::bail!("no input files in {}", args.config.display());
    }

    let out_dir = output::output_dir(&args.outdir, &cfg);
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let mut used: Vec<&Path> = vec![args.config.as_path()];
    used.extend(args.histos.as_deref());
    output::copy_config_files(&out_dir, &used)?;
    if args.batch {
        args.job_logs.enable(&out_dir);
    }

    tracing::info!(
        files = cfg.files.len(),
        batch = args.batch,
        out_dir = %out_dir.display(),
        "starting run"
    );

    let run: RunOutput = if args.batch {
        if args.threads > 0 {
            // Best-effort; if a global pool already exists, keep going.
            let _ = rayon::ThreadPoolBuilder::new().num_threads(args.threads).build_global();
        }
        analysis.process_batch(&cfg.files)?
    } else {
        analysis.process_sequential(&cfg.files).context("processing failed")?
    };

    if !run.failures.is_empty() {
        for f in &run.failures {
            eprintln!("FAILED {}: {}", f.path.display(), f.error);
        }
        anyhow::bail!(
            "{} of {} files failed; no outputs written",
            run.failures.len(),
            cfg.files.len()
        );
    }

    for s in &run.summaries {
        tracing::info!(
            file = %s.filename,
            passed = s.passed_events,
            total = s.total_events,
            visible_xsec_pb = s.visible_cross_section(),
            "summary"
        );
    }

    let suffix = output::label_suffix(&cfg);
    let mut artifact = HistogramsArtifact::from_run(
        &run.registry,
        analysis.histograms(),
        analysis.normalization(),
        &run.summaries,
    )?;
    if args.deterministic {
        artifact.meta.created_unix_ms = 0;
    }

    let artifact_path =
        args.output.clone().unwrap_or_else(|| out_dir.join(format!("output{suffix}.json")));
    output::write_artifact(&artifact_path, &artifact)?;
    let summary_path = out_dir.join(format!("summary{suffix}.csv"));
    output::write_summary_csv(&summary_path, &run.summaries)?;

    println!("{}", artifact_path.display());
    println!("{}", summary_path.display());
    Ok(())
}
