//! Run configuration (`--config`) and histogram lists (`--histos`).

use anyhow::{Context, Result};
use lhe_core::{Analysis, CutSpec, DEFAULT_BEAM_ENERGY, HistogramSpec, SampleConfig};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Input event files.
    pub files: Vec<SampleConfig>,

    /// Which particle ids the reader keeps.
    pub particles: ParticlesConfig,

    /// Turn the cut list on.
    #[serde(default)]
    pub apply_cuts: bool,

    #[serde(default)]
    pub cuts: Vec<CutSpec>,

    /// Value of the `beam_energy` expression constant (GeV).
    #[serde(default = "default_beam_energy")]
    pub beam_energy: f64,

    #[serde(default)]
    pub plots: PlotsConfig,

    /// Histogram definitions; replaced wholesale by `--histos`.
    #[serde(default)]
    pub histograms: Vec<HistogramSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParticlesConfig {
    pub include: Vec<i32>,
}

/// Weighting and presentation flags. Only the weighting ones change the
/// filled numbers; the others feed output naming.
#[derive(Debug, Clone, Deserialize)]
pub struct PlotsConfig {
    #[serde(default)]
    pub normalize_by_cross_section: bool,
    #[serde(default = "default_lumi")]
    pub lumi: f64,
    #[serde(default)]
    pub log_scale: bool,
    #[serde(default)]
    pub log_x: bool,
    #[serde(default)]
    pub stacked: bool,
    #[serde(default)]
    pub add_dummy_data: bool,
}

impl Default for PlotsConfig {
    fn default() -> Self {
        Self {
            normalize_by_cross_section: false,
            lumi: default_lumi(),
            log_scale: false,
            log_x: false,
            stacked: false,
            add_dummy_data: false,
        }
    }
}

fn default_beam_energy() -> f64 {
    DEFAULT_BEAM_ENERGY
}

fn default_lumi() -> f64 {
    1.0
}

/// A `--histos` file: either `{histograms: [...]}` or a bare list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistogramList {
    Wrapped { histograms: Vec<HistogramSpec> },
    Bare(Vec<HistogramSpec>),
}

fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let doc = if ext == "json" {
        serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse JSON {}", path.display()))?
    } else {
        // Default: YAML (serde_yaml_ng).
        serde_yaml_ng::from_slice(&bytes)
            .with_context(|| format!("failed to parse YAML {}", path.display()))?
    };
    Ok(doc)
}

pub fn read_run_config(path: &Path) -> Result<RunConfig> {
    read_document(path)
}

pub fn read_histogram_list(path: &Path) -> Result<Vec<HistogramSpec>> {
    Ok(match read_document::<HistogramList>(path)? {
        HistogramList::Wrapped { histograms } | HistogramList::Bare(histograms) => histograms,
    })
}

/// Load `--config`, apply a `--histos` override and require at least one histogram.
pub fn load(config: &Path, histos: Option<&Path>) -> Result<RunConfig> {
    let mut cfg = read_run_config(config)?;
    if let Some(h) = histos {
        cfg.histograms = read_histogram_list(h)?;
        tracing::info!(path = %h.display(), count = cfg.histograms.len(), "histograms loaded");
    }
    if cfg.histograms.is_empty() {
        anyhow::bail!("no histograms found in {} or via --histos", config.display());
    }
    Ok(cfg)
}

impl RunConfig {
    /// Compile cuts and histograms into a runnable plan.
    pub fn analysis(&self) -> Result<Analysis> {
        let mut builder = Analysis::builder()
            .include(self.particles.include.iter().copied())
            .cuts(self.cuts.clone())
            .apply_cuts(self.apply_cuts)
            .histograms(self.histograms.clone())
            .beam_energy(self.beam_energy);
        if self.plots.normalize_by_cross_section {
            builder = builder.normalize(self.plots.lumi);
        }
        builder.build().context("invalid analysis configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
files:
  - path: dy.lhe
    label: dy
    cross_section: 2000
  - path: tt.lhe.gz
particles:
  include: [13, -13]
histograms:
  - name: mll
    id: [13, -13]
    mode: pair
    function: "(X+Y).M()"
    bins: 40
    xmin: 0
    xmax: 200
"#;

    #[test]
    fn defaults_apply() {
        let cfg: RunConfig = serde_yaml_ng::from_str(MINIMAL).unwrap();
        assert_eq!(cfg.files.len(), 2);
        assert_eq!(cfg.files[1].cross_section, 1.0);
        assert_eq!(cfg.files[1].label, None);
        assert!(!cfg.apply_cuts);
        assert!(cfg.cuts.is_empty());
        assert_eq!(cfg.beam_energy, 6500.0);
        assert!(!cfg.plots.normalize_by_cross_section);
        assert_eq!(cfg.plots.lumi, 1.0);
        assert!(cfg.analysis().is_ok());
    }

    #[test]
    fn histogram_list_forms() {
        let wrapped: HistogramList = serde_yaml_ng::from_str(
            "histograms:\n  - name: a\n    id: [13]\n    function: X.Pt()\n    bins: 1\n    xmin: 0\n    xmax: 1\n",
        )
        .unwrap();
        let bare: HistogramList = serde_yaml_ng::from_str(
            "- name: a\n  id: [13]\n  function: X.Pt()\n  bins: 1\n  xmin: 0\n  xmax: 1\n",
        )
        .unwrap();
        for list in [wrapped, bare] {
            let (HistogramList::Wrapped { histograms } | HistogramList::Bare(histograms)) = list;
            assert_eq!(histograms[0].name, "a");
        }
    }

    #[test]
    fn invalid_histogram_is_reported() {
        let mut cfg: RunConfig = serde_yaml_ng::from_str(MINIMAL).unwrap();
        cfg.histograms[0].mode = "3d".into();
        let err = cfg.analysis().unwrap_err();
        assert!(format!("{err:#}").contains("unknown histogram mode"));
    }
}
