//! Filled-histogram artifacts (numbers-first, one entry per registry key).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use lhe_core::{
    Accumulator, Axis, FileSummary, Flows, Histogram1D, Histogram2D, HistogramDef, HistogramKey,
    HistogramRegistry, LheError, Normalization, Result,
};
use serde::{Deserialize, Serialize};

use crate::summary::SampleEntry;

/// Schema tag written into every histogram artifact.
pub const HISTOGRAMS_SCHEMA_VERSION: &str = "lheplot.histograms.v1";

/// Top-level artifact: every filled histogram of a run plus per-sample bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramsArtifact {
    /// Schema identifier.
    pub schema_version: String,
    /// Producer and weighting information.
    pub meta: HistogramsMeta,
    /// One entry per processed file.
    #[serde(default)]
    pub samples: Vec<SampleEntry>,
    /// Histograms in registry key order.
    pub histograms: Vec<HistogramArtifact>,
}

/// Artifact metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramsMeta {
    /// Producing tool.
    pub tool: String,
    /// Producing tool version.
    pub tool_version: String,
    /// Creation time.
    pub created_unix_ms: u128,
    /// Whether contents are cross-section normalised.
    pub normalized: bool,
    /// Luminosity used for normalisation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lumi: Option<f64>,
}

/// Histogram dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistogramKind {
    /// 1D.
    H1,
    /// 2D.
    H2,
}

/// One axis with precomputed edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisArtifact {
    /// Number of bins.
    pub bins: usize,
    /// Lower edge.
    pub min: f64,
    /// Upper edge.
    pub max: f64,
    /// `bins + 1` edges.
    pub edges: Vec<f64>,
    /// Axis title.
    #[serde(default)]
    pub label: String,
    /// Unit.
    #[serde(default)]
    pub unit: String,
}

impl AxisArtifact {
    fn new(axis: &Axis, label: &str, unit: &str) -> Self {
        Self {
            bins: axis.n_bins(),
            min: axis.min(),
            max: axis.max(),
            edges: axis.edges(),
            label: label.to_string(),
            unit: unit.to_string(),
        }
    }

    fn to_axis(&self) -> Result<Axis> {
        let axis = Axis::new(self.bins, self.min, self.max)?;
        if self.edges.len() != self.bins + 1 {
            return Err(LheError::Data(format!(
                "axis has {} edges for {} bins",
                self.edges.len(),
                self.bins
            )));
        }
        Ok(axis)
    }
}

/// One filled histogram.
///
/// 2D content is row-major over y then x: cell `(ix, iy)` is at
/// `iy * x.bins + ix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramArtifact {
    /// Rendered registry key (`name__label`).
    pub key: String,
    /// Observable name.
    pub name: String,
    /// Sample label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Dimensionality.
    pub kind: HistogramKind,
    /// x axis.
    pub x: AxisArtifact,
    /// y axis (2D only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<AxisArtifact>,
    /// Per-bin sum of weights.
    pub content: Vec<f64>,
    /// Per-bin error, `sqrt(sumw2)`.
    pub error: Vec<f64>,
    /// Per-bin sum of squared weights.
    pub sumw2: Vec<f64>,
    /// Underflow content (1D).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underflow: Option<f64>,
    /// Overflow content (1D).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow: Option<f64>,
    /// Underflow sum of squared weights (1D).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underflow_sumw2: Option<f64>,
    /// Overflow sum of squared weights (1D).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow_sumw2: Option<f64>,
    /// Weight outside either axis (2D).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_of_range: Option<f64>,
    /// Squared weight outside either axis (2D).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_of_range_sumw2: Option<f64>,
    /// Number of fills.
    pub entries: u64,
}

struct AxisTitles<'a> {
    xlabel: &'a str,
    ylabel: &'a str,
    unit: &'a str,
}

impl HistogramArtifact {
    fn base(
        key: &HistogramKey,
        kind: HistogramKind,
        x: AxisArtifact,
        y: Option<AxisArtifact>,
        content: &[f64],
        sumw2: &[f64],
        entries: u64,
    ) -> Self {
        Self {
            key: key.to_string(),
            name: key.name.clone(),
            label: key.label.clone(),
            kind,
            x,
            y,
            content: content.to_vec(),
            error: sumw2.iter().map(|s| s.sqrt()).collect(),
            sumw2: sumw2.to_vec(),
            underflow: None,
            overflow: None,
            underflow_sumw2: None,
            overflow_sumw2: None,
            out_of_range: None,
            out_of_range_sumw2: None,
            entries,
        }
    }

    fn build(key: &HistogramKey, acc: &Accumulator, titles: &AxisTitles<'_>) -> Self {
        match acc {
            Accumulator::H1(h) => {
                let flows = h.flows();
                Self {
                    underflow: Some(flows.underflow),
                    overflow: Some(flows.overflow),
                    underflow_sumw2: Some(flows.underflow_sumw2),
                    overflow_sumw2: Some(flows.overflow_sumw2),
                    ..Self::base(
                        key,
                        HistogramKind::H1,
                        AxisArtifact::new(h.axis(), titles.xlabel, titles.unit),
                        None,
                        h.content(),
                        h.sumw2(),
                        h.entries(),
                    )
                }
            }
            Accumulator::H2(h) => {
                let (oor, oor_w2) = h.out_of_range();
                Self {
                    out_of_range: Some(oor),
                    out_of_range_sumw2: Some(oor_w2),
                    ..Self::base(
                        key,
                        HistogramKind::H2,
                        AxisArtifact::new(h.x_axis(), titles.xlabel, titles.unit),
                        Some(AxisArtifact::new(h.y_axis(), titles.ylabel, "")),
                        h.content(),
                        h.sumw2(),
                        h.entries(),
                    )
                }
            }
        }
    }

    /// Rebuild the accumulator this entry was written from.
    pub fn to_accumulator(&self) -> Result<Accumulator> {
        let x = self.x.to_axis()?;
        match (self.kind, &self.y) {
            (HistogramKind::H1, _) => {
                let flows = Flows {
                    underflow: self.underflow.unwrap_or(0.0),
                    overflow: self.overflow.unwrap_or(0.0),
                    underflow_sumw2: self.underflow_sumw2.unwrap_or(0.0),
                    overflow_sumw2: self.overflow_sumw2.unwrap_or(0.0),
                };
                Histogram1D::from_parts(
                    x,
                    self.content.clone(),
                    self.sumw2.clone(),
                    flows,
                    self.entries,
                )
                .map(Accumulator::H1)
            }
            (HistogramKind::H2, Some(y)) => Histogram2D::from_parts(
                x,
                y.to_axis()?,
                self.content.clone(),
                self.sumw2.clone(),
                (self.out_of_range.unwrap_or(0.0), self.out_of_range_sumw2.unwrap_or(0.0)),
                self.entries,
            )
            .map(Accumulator::H2),
            (HistogramKind::H2, None) => {
                Err(LheError::Data(format!("2D histogram '{}' has no y axis", self.key)))
            }
        }
    }
}

fn now_unix_ms() -> Result<u128> {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| LheError::Data(format!("system time error: {e}")))?;
    Ok(d.as_millis())
}

impl HistogramsArtifact {
    /// Build from a merged registry.
    ///
    /// `defs` supply axis titles by observable name; histograms without a
    /// matching definition get empty titles.
    pub fn from_run(
        registry: &HistogramRegistry,
        defs: &[HistogramDef],
        normalization: Normalization,
        summaries: &[FileSummary],
    ) -> Result<Self> {
        let titles: HashMap<&str, AxisTitles<'_>> = defs
            .iter()
            .map(|d| {
                let t = AxisTitles { xlabel: &d.xlabel, ylabel: &d.ylabel, unit: &d.unit };
                (d.name.as_str(), t)
            })
            .collect();
        let untitled = AxisTitles { xlabel: "", ylabel: "", unit: "" };

        let histograms = registry
            .iter()
            .map(|(key, acc)| {
                let t = titles.get(key.name.as_str()).unwrap_or(&untitled);
                HistogramArtifact::build(key, acc, t)
            })
            .collect();

        let (normalized, lumi) = match normalization {
            Normalization::Unit => (false, None),
            Normalization::CrossSection { lumi } => (true, Some(lumi)),
        };

        Ok(Self {
            schema_version: HISTOGRAMS_SCHEMA_VERSION.to_string(),
            meta: HistogramsMeta {
                tool: "lheplot".to_string(),
                tool_version: lhe_core::VERSION.to_string(),
                created_unix_ms: now_unix_ms()?,
                normalized,
                lumi,
            },
            samples: summaries.iter().map(SampleEntry::from).collect(),
            histograms,
        })
    }

    /// Rebuild a registry from the artifact.
    pub fn to_registry(&self) -> Result<HistogramRegistry> {
        if self.schema_version != HISTOGRAMS_SCHEMA_VERSION {
            return Err(LheError::Data(format!(
                "unsupported histogram artifact schema '{}'",
                self.schema_version
            )));
        }
        let mut reg = HistogramRegistry::new();
        for h in &self.histograms {
            let key = HistogramKey::new(h.name.clone(), h.label.as_deref());
            if key.to_string() != h.key {
                return Err(LheError::Data(format!(
                    "histogram key '{}' does not match name '{}' and label {:?}",
                    h.key, h.name, h.label
                )));
            }
            if reg.insert(key, h.to_accumulator()?).is_some() {
                return Err(LheError::Data(format!("duplicate histogram key '{}'", h.key)));
            }
        }
        Ok(reg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> HistogramRegistry {
        let mut reg = HistogramRegistry::new();
        let mut h = Histogram1D::new(Axis::new(4, 0.0, 40.0).unwrap());
        h.fill(20.0, 0.5);
        h.fill(20.0, 0.5);
        h.fill(-1.0, 2.0);
        reg.insert(HistogramKey::new("mll", Some("dy")), Accumulator::H1(h));

        let mut h2 =
            Histogram2D::new(Axis::new(2, 0.0, 2.0).unwrap(), Axis::new(3, 0.0, 3.0).unwrap());
        h2.fill(1.5, 2.5, 3.0);
        h2.fill(9.0, 0.5, 1.0);
        reg.insert(HistogramKey::new("pt_eta", None), Accumulator::H2(h2));
        reg
    }

    #[test]
    fn one_d_entry_layout() {
        let art =
            HistogramsArtifact::from_run(&registry(), &[], Normalization::Unit, &[]).unwrap();
        assert_eq!(art.histograms.len(), 2);
        let h = &art.histograms[0];
        assert_eq!(h.key, "mll__dy");
        assert_eq!(h.kind, HistogramKind::H1);
        assert_eq!(h.x.edges, vec![0.0, 10.0, 20.0, 30.0, 40.0]);
        assert_eq!(h.content, vec![0.0, 0.0, 1.0, 0.0]);
        assert_eq!(h.sumw2, vec![0.0, 0.0, 0.5, 0.0]);
        assert!((h.error[2] - 0.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(h.underflow, Some(2.0));
        assert_eq!(h.entries, 3);
        assert!(!art.meta.normalized);
    }

    #[test]
    fn two_d_entry_layout() {
        let art = HistogramsArtifact::from_run(
            &registry(),
            &[],
            Normalization::CrossSection { lumi: 3.0 },
            &[],
        )
        .unwrap();
        let h = &art.histograms[1];
        assert_eq!(h.key, "pt_eta");
        assert_eq!(h.kind, HistogramKind::H2);
        assert_eq!(h.y.as_ref().map(|y| y.bins), Some(3));
        assert_eq!(h.content, vec![0.0, 0.0, 0.0, 0.0, 0.0, 3.0]);
        assert_eq!(h.out_of_range, Some(1.0));
        assert_eq!(h.underflow, None);
        assert_eq!(art.meta.lumi, Some(3.0));
    }

    #[test]
    fn registry_round_trip() {
        let reg = registry();
        let art = HistogramsArtifact::from_run(&reg, &[], Normalization::Unit, &[]).unwrap();
        assert_eq!(art.to_registry().unwrap(), reg);
    }

    #[test]
    fn rejects_foreign_schema_and_bad_shapes() {
        let mut art =
            HistogramsArtifact::from_run(&registry(), &[], Normalization::Unit, &[]).unwrap();
        art.histograms[0].content.pop();
        assert!(art.to_registry().is_err());

        let mut art =
            HistogramsArtifact::from_run(&registry(), &[], Normalization::Unit, &[]).unwrap();
        art.schema_version = "something.else".into();
        assert!(art.to_registry().is_err());

        let mut art =
            HistogramsArtifact::from_run(&registry(), &[], Normalization::Unit, &[]).unwrap();
        art.histograms[1].y = None;
        assert!(art.to_registry().is_err());

        let mut art =
            HistogramsArtifact::from_run(&registry(), &[], Normalization::Unit, &[]).unwrap();
        art.histograms[0].key = "mll__tt".into();
        let err = art.to_registry().unwrap_err();
        assert!(err.to_string().contains("does not match"), "{err}");
    }
}
