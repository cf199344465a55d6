//! Configuration records for cuts and histograms, as written in YAML.
//!
//! These are the raw, user-facing shapes. They are validated and compiled into
//! [`crate::cuts::CutSet`] and [`crate::filler::HistogramDef`] before any event
//! is read.

use serde::{Deserialize, Serialize};

fn default_mode() -> String {
    "single".to_string()
}

fn neg_inf() -> f64 {
    f64::NEG_INFINITY
}

fn pos_inf() -> f64 {
    f64::INFINITY
}

/// One inclusive-range acceptance test.
///
/// ```yaml
/// - function: "Pt()"
///   id: [13, -13]
///   mode: single
///   min: 25
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CutSpec {
    /// Expression evaluated per particle (or per combined pair).
    #[serde(default)]
    pub function: Option<String>,
    /// Particle ids the cut applies to.
    #[serde(default)]
    pub id: Vec<i32>,
    /// `single` or `pair`.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Inclusive lower bound.
    #[serde(default = "neg_inf")]
    pub min: f64,
    /// Inclusive upper bound.
    #[serde(default = "pos_inf")]
    pub max: f64,
}

impl CutSpec {
    /// Single-particle cut on `function` with bounds `[min, max]`.
    pub fn single(function: impl Into<String>, ids: &[i32], min: f64, max: f64) -> Self {
        Self { function: Some(function.into()), id: ids.to_vec(), mode: default_mode(), min, max }
    }

    /// Pair cut: at least one pair's combined vector must satisfy the bounds.
    pub fn pair(function: impl Into<String>, ids: &[i32], min: f64, max: f64) -> Self {
        Self { mode: "pair".into(), ..Self::single(function, ids, min, max) }
    }
}

/// Histogram expression: one string for 1D modes, `[x, y]` for `2d`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FunctionSpec {
    /// A single expression.
    Single(String),
    /// x- and y-expressions.
    List(Vec<String>),
}

/// One observable to histogram.
///
/// ```yaml
/// - name: mll
///   id: [13, -13]
///   mode: pair
///   function: "(X+Y).M()"
///   bins: 40
///   xmin: 0
///   xmax: 200
///   xlabel: "m_{#mu#mu}"
///   unit: GeV
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HistogramSpec {
    /// Observable name; the registry key prefix.
    pub name: String,
    /// Particle ids that feed this histogram.
    #[serde(default)]
    pub id: Vec<i32>,
    /// `single`, `pair` or `2d`.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Expression(s) to evaluate.
    #[serde(default)]
    pub function: Option<FunctionSpec>,
    /// Number of bins (1D).
    #[serde(default)]
    pub bins: Option<usize>,
    /// Number of x bins (2D; accepted as a fallback for `bins` in 1D).
    #[serde(default)]
    pub xbins: Option<usize>,
    /// Number of y bins (2D).
    #[serde(default)]
    pub ybins: Option<usize>,
    /// Lower x edge.
    #[serde(default)]
    pub xmin: Option<f64>,
    /// Upper x edge.
    #[serde(default)]
    pub xmax: Option<f64>,
    /// Lower y edge (2D).
    #[serde(default)]
    pub ymin: Option<f64>,
    /// Upper y edge (2D).
    #[serde(default)]
    pub ymax: Option<f64>,
    /// Axis title for plotting.
    #[serde(default)]
    pub xlabel: String,
    /// y-axis title for 2D plots.
    #[serde(default)]
    pub ylabel: String,
    /// Unit of the observable, for plotting.
    #[serde(default)]
    pub unit: String,
}

impl HistogramSpec {
    /// 1D histogram spec.
    pub fn one_d(
        name: impl Into<String>,
        ids: &[i32],
        mode: &str,
        function: impl Into<String>,
        bins: usize,
        xmin: f64,
        xmax: f64,
    ) -> Self {
        Self {
            name: name.into(),
            id: ids.to_vec(),
            mode: mode.to_string(),
            function: Some(FunctionSpec::Single(function.into())),
            bins: Some(bins),
            xbins: None,
            ybins: None,
            xmin: Some(xmin),
            xmax: Some(xmax),
            ymin: None,
            ymax: None,
            xlabel: String::new(),
            ylabel: String::new(),
            unit: String::new(),
        }
    }

    /// 2D histogram spec over `(x_function, y_function)`.
    #[allow(clippy::too_many_arguments)]
    pub fn two_d(
        name: impl Into<String>,
        ids: &[i32],
        x_function: impl Into<String>,
        y_function: impl Into<String>,
        (xbins, xmin, xmax): (usize, f64, f64),
        (ybins, ymin, ymax): (usize, f64, f64),
    ) -> Self {
        Self {
            mode: "2d".into(),
            function: Some(FunctionSpec::List(vec![x_function.into(), y_function.into()])),
            bins: None,
            xbins: Some(xbins),
            ybins: Some(ybins),
            ymin: Some(ymin),
            ymax: Some(ymax),
            ..Self::one_d(name, ids, "2d", "", 0, xmin, xmax)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cut_defaults_from_yaml() {
        let cuts: Vec<CutSpec> =
            serde_yaml_ng::from_str("- function: \"Pt()\"\n  id: [13]\n  min: 5\n").unwrap();
        assert_eq!(cuts[0].mode, "single");
        assert_eq!(cuts[0].min, 5.0);
        assert_eq!(cuts[0].max, f64::INFINITY);

        let cuts: Vec<CutSpec> = serde_yaml_ng::from_str("- id: [13]\n").unwrap();
        assert!(cuts[0].function.is_none());
        assert_eq!(cuts[0].min, f64::NEG_INFINITY);
    }

    #[test]
    fn histogram_function_forms() {
        let yaml = r#"
- name: pt
  id: [13]
  function: "X.Pt()"
  bins: 10
  xmin: 0
  xmax: 100
- name: pt_vs_eta
  id: [13]
  mode: 2d
  function: ["X.Pt()", "X.Eta()"]
  xbins: 10
  xmin: 0
  xmax: 100
  ybins: 5
  ymin: -2.5
  ymax: 2.5
"#;
        let specs: Vec<HistogramSpec> = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(specs[0].function, Some(FunctionSpec::Single("X.Pt()".into())));
        assert_eq!(specs[0].mode, "single");
        assert_eq!(
            specs[1].function,
            Some(FunctionSpec::List(vec!["X.Pt()".into(), "X.Eta()".into()]))
        );
        assert_eq!(specs[1].ybins, Some(5));
    }
}
