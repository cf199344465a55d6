//! Output naming and writing: directory suffixes, config copies, JSON and CSV.

use anyhow::{Context, Result};
use lhe_core::FileSummary;
use lhe_viz::HistogramsArtifact;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::RunConfig;

/// Flags that shape output names, in suffix order.
fn suffix_flags(cfg: &RunConfig, dummy_tag: &'static str) -> Vec<&'static str> {
    let p = &cfg.plots;
    [
        (cfg.apply_cuts, "cuts"),
        (p.normalize_by_cross_section, "norm"),
        (p.log_scale, "logy"),
        (p.log_x, "logx"),
        (p.stacked, "stacked"),
        (p.add_dummy_data, dummy_tag),
    ]
    .into_iter()
    .filter_map(|(on, tag)| on.then_some(tag))
    .collect()
}

fn join_suffix(tags: &[&str]) -> String {
    if tags.is_empty() { String::new() } else { format!("_{}", tags.join("_")) }
}

/// Suffix for output file names, e.g. `_cuts_norm_logy`.
pub fn label_suffix(cfg: &RunConfig) -> String {
    join_suffix(&suffix_flags(cfg, "data"))
}

/// `base` (trailing slashes trimmed) plus the flag suffix.
///
/// Dummy data is tagged `dummy` here and `data` in file names.
pub fn output_dir(base: &Path, cfg: &RunConfig) -> PathBuf {
    let base = base.to_string_lossy();
    let trimmed = base.trim_end_matches('/');
    let trimmed = if trimmed.is_empty() { "/" } else { trimmed };
    PathBuf::from(format!("{trimmed}{}", join_suffix(&suffix_flags(cfg, "dummy"))))
}

/// Copy the config files used for this run next to its outputs.
pub fn copy_config_files(out_dir: &Path, files: &[&Path]) -> Result<()> {
    for f in files {
        if !f.exists() {
            continue;
        }
        let Some(name) = f.file_name() else { continue };
        let dest = out_dir.join(name);
        std::fs::copy(f, &dest)
            .with_context(|| format!("failed to copy {} to {}", f.display(), dest.display()))?;
    }
    Ok(())
}

pub fn write_artifact(path: &Path, artifact: &HistogramsArtifact) -> Result<()> {
    let json = serde_json::to_string_pretty(artifact)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), histograms = artifact.histograms.len(), "wrote histograms");
    Ok(())
}

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    filename: &'a str,
    total_events: u64,
    passed_events: u64,
    passed_percent: String,
}

/// One CSV row per file: `filename,total_events,passed_events,passed_percent`.
pub fn write_summary_csv(path: &Path, summaries: &[FileSummary]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for s in summaries {
        wtr.serialize(SummaryRow {
            filename: &s.filename,
            total_events: s.total_events,
            passed_events: s.passed_events,
            passed_percent: format!("{:.2}", s.passed_percent()),
        })?;
    }
    wtr.flush()?;
    tracing::info!(path = %path.display(), rows = summaries.len(), "wrote summary");
    Ok(())
}
