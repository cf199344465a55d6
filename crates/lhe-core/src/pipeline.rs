//! Per-file processing: count, weight, stream, select, fill, summarise.
//!
//! Each file is an independent task that owns its reader, registry and
//! weight. Several files run in parallel on the rayon pool and their
//! registries are merged only once every task has finished.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cuts::CutSet;
use crate::error::{LheError, Result};
use crate::event::{Event, IdSet};
use crate::filler::{HistogramDef, compile_histograms, fill_event};
use crate::reader::{LheReader, scan_file};
use crate::registry::HistogramRegistry;
use crate::spec::{CutSpec, HistogramSpec};

/// Beam energy (GeV) used when none is configured.
pub const DEFAULT_BEAM_ENERGY: f64 = 6500.0;

/// Events between progress messages.
pub const DEFAULT_PROGRESS_EVERY: u64 = 10_000;

fn default_cross_section() -> f64 {
    1.0
}

/// One input event file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SampleConfig {
    /// Path to an `.lhe` or `.lhe.gz` file.
    pub path: PathBuf,
    /// Sample label used in histogram keys.
    #[serde(default)]
    pub label: Option<String>,
    /// Production cross section in pb.
    #[serde(default = "default_cross_section")]
    pub cross_section: f64,
}

impl SampleConfig {
    /// Sample with unit cross section.
    pub fn new(path: impl Into<PathBuf>, label: Option<&str>) -> Self {
        Self {
            path: path.into(),
            label: label.map(str::to_string),
            cross_section: default_cross_section(),
        }
    }

    /// Set the cross section.
    pub fn cross_section(mut self, xsec: f64) -> Self {
        self.cross_section = xsec;
        self
    }

    fn label(&self) -> Option<&str> {
        self.label.as_deref().filter(|l| !l.is_empty())
    }
}

/// Per-event weight policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalization {
    /// Every event weighs 1.
    Unit,
    /// Events weigh `cross_section * lumi / total_events`.
    CrossSection {
        /// Integrated luminosity.
        lumi: f64,
    },
}

/// Weight applied to every fill from one file.
///
/// Zero events with cross-section normalization is a [`LheError::Data`].
pub fn event_weight(norm: Normalization, cross_section: f64, total_events: u64) -> Result<f64> {
    match norm {
        Normalization::Unit => Ok(1.0),
        Normalization::CrossSection { .. } if total_events == 0 => Err(LheError::Data(
            "cannot normalise by cross section: file contains zero events".into(),
        )),
        Normalization::CrossSection { lumi } => Ok(cross_section * lumi / total_events as f64),
    }
}

/// Bookkeeping for one processed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    /// Input path as given.
    pub filename: String,
    /// Sample label.
    pub label: Option<String>,
    /// Cross section from the sample config.
    pub cross_section: f64,
    /// Canonical event count.
    pub total_events: u64,
    /// Events that passed selection and had an included particle.
    pub passed_events: u64,
    /// Weight applied to each fill.
    pub weight: f64,
}

impl FileSummary {
    /// Passed fraction in percent; 0 for an empty file.
    pub fn passed_percent(&self) -> f64 {
        if self.total_events == 0 {
            0.0
        } else {
            100.0 * self.passed_events as f64 / self.total_events as f64
        }
    }

    /// `cross_section * passed / total`; 0 for an empty file.
    pub fn visible_cross_section(&self) -> f64 {
        if self.total_events == 0 {
            0.0
        } else {
            self.cross_section * self.passed_events as f64 / self.total_events as f64
        }
    }
}

/// Output of one file task.
#[derive(Debug, Clone)]
pub struct FileResult {
    /// Accumulators filled from this file.
    pub registry: HistogramRegistry,
    /// Event bookkeeping.
    pub summary: FileSummary,
}

/// A file that failed in batch mode.
#[derive(Debug)]
pub struct FileFailure {
    /// Input path.
    pub path: PathBuf,
    /// Sample label.
    pub label: Option<String>,
    /// Why it failed.
    pub error: LheError,
}

/// Merged output of a set of files.
#[derive(Debug, Default)]
pub struct RunOutput {
    /// Accumulators from every successful file.
    pub registry: HistogramRegistry,
    /// One summary per successful file, in input order.
    pub summaries: Vec<FileSummary>,
    /// Files that failed (batch mode only).
    pub failures: Vec<FileFailure>,
}

impl RunOutput {
    fn absorb(&mut self, result: FileResult) -> Result<()> {
        self.registry.merge(result.registry)?;
        self.summaries.push(result.summary);
        Ok(())
    }
}

/// A compiled selection and histogramming plan, ready to run over files.
#[derive(Debug, Clone)]
pub struct Analysis {
    include: IdSet,
    cuts: Option<CutSet>,
    histograms: Vec<HistogramDef>,
    beam_energy: f64,
    normalization: Normalization,
    progress_every: u64,
}

impl Analysis {
    /// Start configuring an analysis.
    pub fn builder() -> AnalysisBuilder {
        AnalysisBuilder::new()
    }

    /// Compiled histogram definitions.
    pub fn histograms(&self) -> &[HistogramDef] {
        &self.histograms
    }

    /// Weight policy.
    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    fn accepts(&self, event: &Event) -> Result<bool> {
        let passes_cuts = match &self.cuts {
            Some(cuts) => cuts.passes(event, self.beam_energy)?,
            None => true,
        };
        Ok(passes_cuts && !event.is_empty())
    }

    /// Process one file from count to summary.
    pub fn process_file(&self, sample: &SampleConfig) -> Result<FileResult> {
        let path = sample.path.as_path();
        let name = path.display().to_string();
        let label = sample.label();
        let span = tracing::info_span!("file", label = label.unwrap_or("-"), path = %name);
        let _enter = span.enter();

        if !(sample.cross_section.is_finite() && sample.cross_section >= 0.0) {
            return Err(LheError::Config(format!(
                "{name}: cross_section must be finite and >= 0, got {}",
                sample.cross_section
            )));
        }
        let total = self.establish_event_count(path)?;
        let weight = event_weight(self.normalization, sample.cross_section, total)
            .map_err(|e| match e {
                LheError::Data(msg) => LheError::Data(format!("{name}: {msg}")),
                other => other,
            })?;
        tracing::info!(file = %name, events = total, weight, "processing");

        let mut registry = HistogramRegistry::build(&self.histograms, &self.include, label);
        let mut reader = LheReader::open(path, self.include.clone())?;
        let mut passed = 0u64;

        let mut n = 0u64;
        for event in reader.by_ref() {
            let event = event?;
            n += 1;
            if self.accepts(&event)? {
                passed += 1;
                fill_event(
                    &mut registry,
                    &event,
                    &self.histograms,
                    label,
                    weight,
                    self.beam_energy,
                )?;
            }
            if self.progress_every > 0 && n % self.progress_every == 0 {
                tracing::debug!(processed = n, total, "progress");
            }
        }

        if reader.events_read() != total {
            return Err(LheError::Data(format!(
                "{name}: read {} event records but counted {total}",
                reader.events_read()
            )));
        }

        let summary = FileSummary {
            filename: name,
            label: label.map(str::to_string),
            cross_section: sample.cross_section,
            total_events: total,
            passed_events: passed,
            weight,
        };
        if total == 0 {
            tracing::warn!(file = %summary.filename, "file contains no events");
        }
        tracing::info!(
            passed,
            total,
            percent = %format!("{:.2}", summary.passed_percent()),
            visible_xsec_pb = summary.visible_cross_section(),
            "done"
        );
        Ok(FileResult { registry, summary })
    }

    fn establish_event_count(&self, path: &Path) -> Result<u64> {
        let scan = scan_file(path)?;
        let (header, counted) = (scan.header, scan.events);
        if let Some(run) = &header.run {
            tracing::debug!(
                beams = ?run.beam_ids,
                energies = ?run.beam_energies,
                xsec_pb = run.total_cross_section(),
                "run info"
            );
        }
        match header.declared_events {
            Some(declared) if declared != counted => tracing::warn!(
                declared,
                counted,
                "header event count disagrees with event records; using the record count"
            ),
            Some(declared) => tracing::debug!(declared, "header event count confirmed"),
            None => tracing::debug!(counted, "no event count in header"),
        }
        Ok(counted)
    }

    /// Process files one after another; the first failure aborts the run.
    pub fn process_sequential(&self, samples: &[SampleConfig]) -> Result<RunOutput> {
        let mut out = RunOutput::default();
        for sample in samples {
            out.absorb(self.process_file(sample)?)?;
        }
        Ok(out)
    }

    /// Process files in parallel on the current rayon pool.
    ///
    /// A failing file does not stop its siblings; it is reported in
    /// [`RunOutput::failures`]. Results are merged in input order after
    /// every task has completed.
    pub fn process_batch(&self, samples: &[SampleConfig]) -> Result<RunOutput> {
        let results: Vec<Result<FileResult>> =
            samples.par_iter().map(|s| self.process_file(s)).collect();

        let mut out = RunOutput::default();
        for (sample, result) in samples.iter().zip(results) {
            match result {
                Ok(r) => out.absorb(r)?,
                Err(error) => {
                    tracing::error!(file = %sample.path.display(), %error, "file failed");
                    out.failures.push(FileFailure {
                        path: sample.path.clone(),
                        label: sample.label.clone(),
                        error,
                    });
                }
            }
        }
        Ok(out)
    }
}

/// Builder for [`Analysis`].
///
/// ```no_run
/// use lhe_core::{Analysis, CutSpec, HistogramSpec, SampleConfig};
///
/// let analysis = Analysis::builder()
///     .include([13, -13])
///     .cuts(vec![CutSpec::single("Pt()", &[13, -13], 25.0, f64::INFINITY)])
///     .apply_cuts(true)
///     .histograms(vec![HistogramSpec::one_d("mll", &[13, -13], "pair", "(X+Y).M()", 40, 0.0, 200.0)])
///     .normalize(139.0)
///     .build()
///     .unwrap();
/// let out = analysis.process_file(&SampleConfig::new("dy.lhe", Some("dy")).cross_section(2.0e3));
/// ```
#[derive(Debug, Clone)]
pub struct AnalysisBuilder {
    include: IdSet,
    cuts: Vec<CutSpec>,
    apply_cuts: bool,
    histograms: Vec<HistogramSpec>,
    beam_energy: f64,
    normalization: Normalization,
    progress_every: u64,
}

impl Default for AnalysisBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisBuilder {
    /// Defaults: no particles, no cuts, unit weights, 6500 GeV beams.
    pub fn new() -> Self {
        Self {
            include: IdSet::new(),
            cuts: Vec::new(),
            apply_cuts: false,
            histograms: Vec::new(),
            beam_energy: DEFAULT_BEAM_ENERGY,
            normalization: Normalization::Unit,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }

    /// Particle ids the reader keeps.
    pub fn include(mut self, ids: impl IntoIterator<Item = i32>) -> Self {
        self.include = ids.into_iter().collect();
        self
    }

    /// Cut list (only used when [`Self::apply_cuts`] is on).
    pub fn cuts(mut self, cuts: Vec<CutSpec>) -> Self {
        self.cuts = cuts;
        self
    }

    /// Enable or disable the cut list.
    pub fn apply_cuts(mut self, on: bool) -> Self {
        self.apply_cuts = on;
        self
    }

    /// Histogram list.
    pub fn histograms(mut self, specs: Vec<HistogramSpec>) -> Self {
        self.histograms = specs;
        self
    }

    /// Value of the `beam_energy` expression constant.
    pub fn beam_energy(mut self, e: f64) -> Self {
        self.beam_energy = e;
        self
    }

    /// Weight events by `cross_section * lumi / total_events`.
    pub fn normalize(mut self, lumi: f64) -> Self {
        self.normalization = Normalization::CrossSection { lumi };
        self
    }

    /// Events between progress messages; 0 disables them.
    pub fn progress_every(mut self, n: u64) -> Self {
        self.progress_every = n;
        self
    }

    /// Validate and compile everything before any file is touched.
    pub fn build(self) -> Result<Analysis> {
        if !self.beam_energy.is_finite() {
            return Err(LheError::Config(format!(
                "beam_energy must be finite, got {}",
                self.beam_energy
            )));
        }
        if let Normalization::CrossSection { lumi } = self.normalization
            && !(lumi.is_finite() && lumi >= 0.0)
        {
            return Err(LheError::Config(format!("lumi must be finite and >= 0, got {lumi}")));
        }
        if self.include.is_empty() {
            tracing::warn!("no particle ids included; every event will be empty");
        }
        let cuts = if self.apply_cuts { Some(CutSet::compile(&self.cuts)?) } else { None };
        let histograms = compile_histograms(&self.histograms)?;
        Ok(Analysis {
            include: self.include,
            cuts,
            histograms,
            beam_energy: self.beam_energy,
            normalization: self.normalization,
            progress_every: self.progress_every,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn unit_weight() {
        assert_eq!(event_weight(Normalization::Unit, 5.0, 0).unwrap(), 1.0);
        assert_eq!(event_weight(Normalization::Unit, 5.0, 100).unwrap(), 1.0);
    }

    #[test]
    fn normalised_weight() {
        let w = event_weight(Normalization::CrossSection { lumi: 10.0 }, 2.0, 100).unwrap();
        assert_relative_eq!(w, 0.2, epsilon = 1e-15);
    }

    #[test]
    fn zero_events_with_normalisation_is_data_error() {
        let err = event_weight(Normalization::CrossSection { lumi: 1.0 }, 1.0, 0).unwrap_err();
        assert!(matches!(err, LheError::Data(_)));
    }

    #[test]
    fn summary_percentages() {
        let s = FileSummary {
            filename: "a.lhe".into(),
            label: None,
            cross_section: 3.0,
            total_events: 8,
            passed_events: 2,
            weight: 1.0,
        };
        assert_relative_eq!(s.passed_percent(), 25.0);
        assert_relative_eq!(s.visible_cross_section(), 0.75);
        let empty = FileSummary { total_events: 0, passed_events: 0, ..s };
        assert_eq!(empty.passed_percent(), 0.0);
    }

    #[test]
    fn builder_validation() {
        assert!(matches!(
            Analysis::builder().beam_energy(f64::NAN).build(),
            Err(LheError::Config(_))
        ));
        assert!(matches!(Analysis::builder().normalize(-1.0).build(), Err(LheError::Config(_))));

        // Cuts are only compiled when enabled.
        let bad = CutSpec { function: None, ..CutSpec::single("", &[13], 0.0, 1.0) };
        assert!(Analysis::builder().cuts(vec![bad.clone()]).build().is_ok());
        assert!(Analysis::builder().cuts(vec![bad]).apply_cuts(true).build().is_err());
    }

    #[test]
    fn invalid_cross_section_is_rejected_before_reading() {
        let analysis = Analysis::builder()
            .include([13])
            .histograms(vec![HistogramSpec::one_d("pt", &[13], "single", "X.Pt()", 1, 0.0, 1.0)])
            .build()
            .unwrap();
        for xsec in [f64::NAN, -1.0, f64::INFINITY] {
            let sample = SampleConfig::new("does-not-exist.lhe", None).cross_section(xsec);
            match analysis.process_file(&sample) {
                Err(LheError::Config(msg)) => assert!(msg.contains("cross_section"), "{msg}"),
                other => panic!("expected config error for {xsec}, got {other:?}"),
            }
        }
    }

    #[test]
    fn sample_config_defaults() {
        let s: SampleConfig = serde_yaml_ng::from_str("path: a.lhe\n").unwrap();
        assert_eq!(s.cross_section, 1.0);
        assert_eq!(s.label, None);
    }
}
