//! Per-event histogram filling from compiled observable definitions.

use std::collections::HashSet;

use crate::error::{LheError, Result};
use crate::event::{Event, IdSet, for_each_pair};
use crate::expr::CompiledExpr;
use crate::histogram::{Accumulator, Axis, Histogram1D, Histogram2D};
use crate::kinematics::FourVector;
use crate::registry::HistogramRegistry;
use crate::spec::{FunctionSpec, HistogramSpec};

/// How a definition turns selected particles into fill values.
#[derive(Debug, Clone)]
pub enum FillMode {
    /// One value per selected particle, `X` bound to the particle.
    Single(CompiledExpr),
    /// One value per unordered pair `i < j`, `X` and `Y` bound in file order.
    Pair(CompiledExpr),
    /// One `(x, y)` point per selected particle.
    TwoD {
        /// x-axis expression.
        x: CompiledExpr,
        /// y-axis expression.
        y: CompiledExpr,
    },
}

/// Axis layout of the accumulator a definition produces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Binning {
    /// 1D histogram.
    OneD(Axis),
    /// 2D histogram over (x, y).
    TwoD(Axis, Axis),
}

/// A validated, compiled histogram definition.
#[derive(Debug, Clone)]
pub struct HistogramDef {
    /// Observable name.
    pub name: String,
    /// Particle ids this observable is filled from.
    pub ids: IdSet,
    /// Compiled expression(s) and fill pattern.
    pub mode: FillMode,
    /// Accumulator shape.
    pub binning: Binning,
    /// x-axis title.
    pub xlabel: String,
    /// y-axis title (2D).
    pub ylabel: String,
    /// Unit of the observable.
    pub unit: String,
}

impl HistogramDef {
    /// Validate `spec` and compile its expressions.
    pub fn compile(spec: &HistogramSpec) -> Result<Self> {
        let name = spec.name.as_str();
        let cfg = |msg: String| LheError::Config(format!("histogram '{name}': {msg}"));

        if name.is_empty() {
            return Err(LheError::Config("histogram with empty name".into()));
        }
        let function = spec.function.as_ref().ok_or_else(|| cfg("missing function".into()))?;
        let single_function = || match function {
            FunctionSpec::Single(f) => Ok(f.as_str()),
            FunctionSpec::List(_) => {
                Err(cfg(format!("mode '{}' takes a single function, not a list", spec.mode)))
            }
        };
        let no_y = |e: CompiledExpr| {
            if e.uses_y() {
                Err(cfg(format!(
                    "function '{}' uses Y but mode '{}' binds only X",
                    e.source(),
                    spec.mode
                )))
            } else {
                Ok(e)
            }
        };
        let required = |v: Option<f64>, field: &str| v.ok_or_else(|| cfg(format!("missing {field}")));
        let axis = |bins: Option<usize>, lo: Option<f64>, hi: Option<f64>, which: char| {
            let n = bins.ok_or_else(|| cfg(format!("missing bin count for {which} axis")))?;
            let lo = required(lo, if which == 'x' { "xmin" } else { "ymin" })?;
            let hi = required(hi, if which == 'x' { "xmax" } else { "ymax" })?;
            Axis::new(n, lo, hi).map_err(|e| cfg(e.to_string()))
        };

        let (mode, binning) = match spec.mode.as_str() {
            "single" => (
                FillMode::Single(no_y(CompiledExpr::compile(single_function()?)?)?),
                Binning::OneD(axis(spec.bins.or(spec.xbins), spec.xmin, spec.xmax, 'x')?),
            ),
            "pair" => (
                FillMode::Pair(CompiledExpr::compile(single_function()?)?),
                Binning::OneD(axis(spec.bins.or(spec.xbins), spec.xmin, spec.xmax, 'x')?),
            ),
            "2d" => {
                let [fx, fy] = match function {
                    FunctionSpec::List(fs) if fs.len() == 2 => [fs[0].as_str(), fs[1].as_str()],
                    _ => return Err(cfg("mode '2d' needs a list of two functions [x, y]".into())),
                };
                (
                    FillMode::TwoD {
                        x: no_y(CompiledExpr::compile(fx)?)?,
                        y: no_y(CompiledExpr::compile(fy)?)?,
                    },
                    Binning::TwoD(
                        axis(spec.xbins.or(spec.bins), spec.xmin, spec.xmax, 'x')?,
                        axis(spec.ybins, spec.ymin, spec.ymax, 'y')?,
                    ),
                )
            }
            other => return Err(cfg(format!("unknown histogram mode '{other}'"))),
        };

        Ok(Self {
            name: spec.name.clone(),
            ids: spec.id.iter().copied().collect(),
            mode,
            binning,
            xlabel: spec.xlabel.clone(),
            ylabel: spec.ylabel.clone(),
            unit: spec.unit.clone(),
        })
    }

    /// Fresh, empty accumulator of the right shape.
    pub fn new_accumulator(&self) -> Accumulator {
        match self.binning {
            Binning::OneD(x) => Accumulator::H1(Histogram1D::new(x)),
            Binning::TwoD(x, y) => Accumulator::H2(Histogram2D::new(x, y)),
        }
    }
}

/// Compile a list of specs, rejecting duplicate names.
pub fn compile_histograms(specs: &[HistogramSpec]) -> Result<Vec<HistogramDef>> {
    let mut seen = HashSet::new();
    specs
        .iter()
        .map(|s| {
            if !seen.insert(s.name.as_str()) {
                return Err(LheError::Config(format!("duplicate histogram name '{}'", s.name)));
            }
            HistogramDef::compile(s)
        })
        .collect()
}

/// Fill every definition's accumulator from one event.
///
/// Definitions with no accumulator under `label` (or unlabelled) are skipped,
/// as are particles without a four-vector. Expression failures abort with
/// [`LheError::Expression`].
pub fn fill_event(
    registry: &mut HistogramRegistry,
    event: &Event,
    defs: &[HistogramDef],
    label: Option<&str>,
    weight: f64,
    beam_energy: f64,
) -> Result<()> {
    for def in defs {
        let Some(acc) = registry.get_mut(&def.name, label) else {
            continue;
        };
        let vectors: Vec<&FourVector> =
            event.select(&def.ids).filter_map(|p| p.vector.as_ref()).collect();
        if vectors.is_empty() {
            continue;
        }

        match (&def.mode, acc) {
            (FillMode::Single(f), Accumulator::H1(h)) => {
                for v in &vectors {
                    h.fill(f.eval(v, None, beam_energy)?, weight);
                }
            }
            (FillMode::Pair(f), Accumulator::H1(h)) => {
                for_each_pair(&vectors, |a, b| {
                    h.fill(f.eval(a, Some(*b), beam_energy)?, weight);
                    Ok::<_, LheError>(false)
                })?;
            }
            (FillMode::TwoD { x, y }, Accumulator::H2(h)) => {
                for v in &vectors {
                    h.fill(x.eval(v, None, beam_energy)?, y.eval(v, None, beam_energy)?, weight);
                }
            }
            _ => {
                return Err(LheError::Config(format!(
                    "histogram '{}': accumulator dimension does not match its mode",
                    def.name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Particle;

    fn muons() -> IdSet {
        [13, -13].into_iter().collect()
    }

    fn dimuon_event() -> Event {
        Event::new(vec![
            Particle::new(13, FourVector::new(10.0, 0.0, 0.0, 10.0)),
            Particle::new(-13, FourVector::new(-10.0, 0.0, 0.0, 10.0)),
        ])
    }

    fn config_err(spec: HistogramSpec) -> String {
        match HistogramDef::compile(&spec) {
            Err(LheError::Config(msg)) => msg,
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn pair_mass_single_fill() {
        let spec = HistogramSpec::one_d("mll", &[13, -13], "pair", "(X+Y).M()", 10, 0.0, 40.0);
        let defs = compile_histograms(&[spec]).unwrap();
        let mut reg = HistogramRegistry::build(&defs, &muons(), None);
        fill_event(&mut reg, &dimuon_event(), &defs, None, 1.0, 6500.0).unwrap();

        let h = reg.get("mll", None).and_then(Accumulator::as_h1).unwrap();
        assert_eq!(h.entries(), 1);
        assert_eq!(h.content()[5], 1.0);
        assert_eq!(h.integral(), 1.0);
    }

    #[test]
    fn pair_mode_is_exhaustive() {
        let spec = HistogramSpec::one_d("dr", &[13], "pair", "X.DeltaR(Y)", 10, 0.0, 10.0);
        let defs = compile_histograms(&[spec]).unwrap();
        let include: IdSet = [13].into_iter().collect();
        let mut reg = HistogramRegistry::build(&defs, &include, None);
        let ev = Event::new(
            (0..4)
                .map(|i| Particle::new(13, FourVector::new(1.0, i as f64, 0.5, 3.0)))
                .collect(),
        );
        fill_event(&mut reg, &ev, &defs, None, 1.0, 0.0).unwrap();
        assert_eq!(reg.get("dr", None).unwrap().entries(), 6);
    }

    #[test]
    fn absent_vectors_are_skipped() {
        let spec = HistogramSpec::one_d("pt", &[13], "single", "X.Pt()", 10, 0.0, 100.0);
        let defs = compile_histograms(&[spec]).unwrap();
        let include: IdSet = [13].into_iter().collect();
        let mut reg = HistogramRegistry::build(&defs, &include, Some("s"));
        let ev = Event::new(vec![
            Particle { type_id: 13, vector: None },
            Particle::new(13, FourVector::new(30.0, 40.0, 0.0, 50.0)),
        ]);
        fill_event(&mut reg, &ev, &defs, Some("s"), 0.5, 0.0).unwrap();
        let h = reg.get("pt", Some("s")).and_then(Accumulator::as_h1).unwrap();
        assert_eq!(h.entries(), 1);
        assert_eq!(h.content()[5], 0.5);
    }

    #[test]
    fn missing_accumulator_is_a_no_op() {
        let spec = HistogramSpec::one_d("ph", &[22], "single", "X.Pt()", 10, 0.0, 100.0);
        let defs = compile_histograms(&[spec]).unwrap();
        let mut reg = HistogramRegistry::build(&defs, &muons(), None);
        assert!(reg.is_empty());
        fill_event(&mut reg, &dimuon_event(), &defs, None, 1.0, 0.0).unwrap();
        assert!(reg.is_empty());
    }

    #[test]
    fn two_d_fill() {
        let spec = HistogramSpec::two_d(
            "pt_eta",
            &[13, -13],
            "X.Pt()",
            "X.Eta()",
            (10, 0.0, 100.0),
            (4, -2.0, 2.0),
        );
        let defs = compile_histograms(&[spec]).unwrap();
        let mut reg = HistogramRegistry::build(&defs, &muons(), None);
        fill_event(&mut reg, &dimuon_event(), &defs, None, 1.0, 0.0).unwrap();
        let h = reg.get("pt_eta", None).and_then(Accumulator::as_h2).unwrap();
        assert_eq!(h.entries(), 2);
        assert_eq!(h.bin_content(1, 2), 2.0);
    }

    #[test]
    fn expression_failure_propagates() {
        let spec = HistogramSpec::one_d("bad", &[13], "single", "1 / (X.Pt() - 10)", 10, 0.0, 1.0);
        let defs = compile_histograms(&[spec]).unwrap();
        let mut reg = HistogramRegistry::build(&defs, &muons(), None);
        let err = fill_event(&mut reg, &dimuon_event(), &defs, None, 1.0, 0.0).unwrap_err();
        assert!(matches!(err, LheError::Expression { .. }));
    }

    #[test]
    fn compile_rejections() {
        let mut s = HistogramSpec::one_d("h", &[13], "triple", "X.Pt()", 10, 0.0, 1.0);
        assert!(config_err(s.clone()).contains("unknown histogram mode"));

        s.mode = "single".into();
        s.function = None;
        assert!(config_err(s.clone()).contains("missing function"));

        s.function = Some(FunctionSpec::Single("(X+Y).M()".into()));
        assert!(config_err(s.clone()).contains("uses Y"));

        s.function = Some(FunctionSpec::Single("X.Pt()".into()));
        s.bins = Some(0);
        assert!(config_err(s.clone()).contains("at least one bin"));

        s.bins = None;
        assert!(config_err(s.clone()).contains("missing bin count"));

        s.bins = Some(5);
        s.xmax = Some(-1.0);
        assert!(config_err(s.clone()).contains("must exceed"));

        s.xmax = Some(1.0);
        s.mode = "2d".into();
        assert!(config_err(s).contains("two functions"));
    }

    #[test]
    fn duplicate_names_rejected() {
        let s = HistogramSpec::one_d("h", &[13], "single", "X.Pt()", 10, 0.0, 1.0);
        assert!(matches!(compile_histograms(&[s.clone(), s]), Err(LheError::Config(_))));
    }
}
