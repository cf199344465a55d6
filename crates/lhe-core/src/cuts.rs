//! Event acceptance from an ordered list of range cuts.
//!
//! A cut selects particles by id and tests a function of them against an
//! inclusive `[min, max]` range:
//!
//! - `single`: every selected particle must be in range (universal);
//! - `pair`: some unordered pair's combined four-vector `X` must be in range
//!   (existential).
//!
//! An event with no selected particle fails the cut. Cuts are a conjunction
//! evaluated in order with short-circuit on the first failure.

use crate::error::{LheError, Result};
use crate::event::{Event, IdSet, for_each_pair};
use crate::expr::CompiledExpr;
use crate::kinematics::FourVector;
use crate::spec::CutSpec;

/// How a cut quantifies over the selected particles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutMode {
    /// All selected particles must pass.
    Single,
    /// At least one pair must pass.
    Pair,
}

/// A compiled range cut.
#[derive(Debug, Clone)]
pub struct Cut {
    /// Particle ids the cut looks at.
    pub ids: IdSet,
    /// Quantifier.
    pub mode: CutMode,
    /// Function of `X` (the particle, or the summed pair).
    pub function: CompiledExpr,
    /// Inclusive lower bound.
    pub min: f64,
    /// Inclusive upper bound.
    pub max: f64,
}

impl Cut {
    /// Validate and compile one cut spec.
    pub fn compile(spec: &CutSpec) -> Result<Self> {
        let function = spec
            .function
            .as_deref()
            .ok_or_else(|| LheError::Config(format!("cut on ids {:?}: missing function", spec.id)))?;
        let mode = match spec.mode.as_str() {
            "single" => CutMode::Single,
            "pair" => CutMode::Pair,
            other => {
                return Err(LheError::Config(format!("cut '{function}': unknown cut mode '{other}'")));
            }
        };
        if spec.min.is_nan() || spec.max.is_nan() {
            return Err(LheError::Config(format!("cut '{function}': bounds must not be NaN")));
        }
        let compiled = CompiledExpr::compile_cut(function)?;
        if compiled.uses_y() {
            return Err(LheError::Config(format!(
                "cut '{function}': cut functions bind only X (use (X+Y) in histograms)"
            )));
        }
        Ok(Self {
            ids: spec.id.iter().copied().collect(),
            mode,
            function: compiled,
            min: spec.min,
            max: spec.max,
        })
    }

    fn in_range(&self, v: f64) -> bool {
        self.min <= v && v <= self.max
    }

    /// Evaluate this cut on one event.
    pub fn passes(&self, event: &Event, beam_energy: f64) -> Result<bool> {
        let selected: Vec<_> = event.select(&self.ids).collect();
        if selected.is_empty() {
            tracing::trace!(cut = self.function.source(), "no selected particles");
            return Ok(false);
        }
        match self.mode {
            CutMode::Single => {
                for p in &selected {
                    let v = self.function.eval_particles(p, None, beam_energy)?;
                    if !self.in_range(v) {
                        tracing::trace!(
                            cut = self.function.source(),
                            type_id = p.type_id,
                            value = v,
                            "particle out of range"
                        );
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            CutMode::Pair => {
                let vectors = selected
                    .iter()
                    .map(|p| {
                        p.vector.ok_or_else(|| {
                            LheError::expression(
                                self.function.source(),
                                format!("particle (id {}) has no four-vector", p.type_id),
                            )
                        })
                    })
                    .collect::<Result<Vec<FourVector>>>()?;
                let hit = for_each_pair(&vectors, |a, b| {
                    let v = self.function.eval(&(*a + *b), None, beam_energy)?;
                    Ok::<_, LheError>(self.in_range(v))
                })?;
                if !hit {
                    tracing::trace!(cut = self.function.source(), "no pair in range");
                }
                Ok(hit)
            }
        }
    }
}

/// Ordered conjunction of cuts.
#[derive(Debug, Clone, Default)]
pub struct CutSet {
    cuts: Vec<Cut>,
}

impl CutSet {
    /// Compile every spec; the first invalid one is reported.
    pub fn compile(specs: &[CutSpec]) -> Result<Self> {
        let cuts = specs.iter().map(Cut::compile).collect::<Result<Vec<_>>>()?;
        Ok(Self { cuts })
    }

    /// Compiled cuts in evaluation order.
    pub fn cuts(&self) -> &[Cut] {
        &self.cuts
    }

    /// Number of cuts.
    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    /// `true` for an empty (always passing) set.
    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    /// `true` if the event passes every cut.
    pub fn passes(&self, event: &Event, beam_energy: f64) -> Result<bool> {
        for cut in &self.cuts {
            if !cut.passes(event, beam_energy)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Particle;

    fn dimuon() -> Event {
        Event::new(vec![
            Particle::new(13, FourVector::new(10.0, 0.0, 0.0, 10.0)),
            Particle::new(-13, FourVector::new(-10.0, 0.0, 0.0, 10.0)),
        ])
    }

    fn cuts(specs: &[CutSpec]) -> CutSet {
        CutSet::compile(specs).unwrap()
    }

    #[test]
    fn single_cut_passes_in_range() {
        let set = cuts(&[CutSpec::single("Pt()", &[13], 5.0, 50.0)]);
        assert!(set.passes(&dimuon(), 6500.0).unwrap());
    }

    #[test]
    fn bounds_are_inclusive() {
        assert!(cuts(&[CutSpec::single("Pt()", &[13, -13], 10.0, 10.0)])
            .passes(&dimuon(), 0.0)
            .unwrap());
    }

    #[test]
    fn single_cut_is_universal() {
        let ev = Event::new(vec![
            Particle::new(13, FourVector::new(10.0, 0.0, 0.0, 10.0)),
            Particle::new(13, FourVector::new(2.0, 0.0, 0.0, 2.0)),
        ]);
        assert!(!cuts(&[CutSpec::single("Pt()", &[13], 5.0, 50.0)]).passes(&ev, 0.0).unwrap());
    }

    #[test]
    fn no_selected_particles_rejects() {
        let set = cuts(&[CutSpec::single("Pt()", &[22], f64::NEG_INFINITY, f64::INFINITY)]);
        assert!(!set.passes(&dimuon(), 0.0).unwrap());
        assert!(!set.passes(&Event::default(), 0.0).unwrap());
    }

    #[test]
    fn pair_cut_is_existential() {
        let mass_window = cuts(&[CutSpec::pair("M()", &[13, -13], 15.0, 25.0)]);
        assert!(mass_window.passes(&dimuon(), 0.0).unwrap());

        let off_window = cuts(&[CutSpec::pair("M()", &[13, -13], 80.0, 100.0)]);
        assert!(!off_window.passes(&dimuon(), 0.0).unwrap());

        let lone = Event::new(vec![Particle::new(13, FourVector::new(1.0, 0.0, 0.0, 1.0))]);
        let any = cuts(&[CutSpec::pair("M()", &[13], f64::NEG_INFINITY, f64::INFINITY)]);
        assert!(!any.passes(&lone, 0.0).unwrap());
    }

    #[test]
    fn pair_cut_finds_one_good_pair_among_many() {
        let ev = Event::new(vec![
            Particle::new(13, FourVector::new(1.0, 0.0, 0.0, 1.0)),
            Particle::new(13, FourVector::new(10.0, 0.0, 0.0, 10.0)),
            Particle::new(13, FourVector::new(-10.0, 0.0, 0.0, 10.0)),
        ]);
        assert!(cuts(&[CutSpec::pair("M()", &[13], 19.0, 21.0)]).passes(&ev, 0.0).unwrap());
    }

    #[test]
    fn conjunction_short_circuits() {
        let set = cuts(&[
            CutSpec::single("Pt()", &[13], 50.0, 100.0),
            CutSpec::single("1/(X.Pt()-10)", &[13], 0.0, 1.0),
        ]);
        // The second cut would fail with division by zero if evaluated.
        assert!(!set.passes(&dimuon(), 0.0).unwrap());
        let set = cuts(&[
            CutSpec::single("Pt()", &[13], 0.0, 100.0),
            CutSpec::single("1/(X.Pt()-10)", &[13], 0.0, 1.0),
        ]);
        assert!(matches!(set.passes(&dimuon(), 0.0), Err(LheError::Expression { .. })));
    }

    #[test]
    fn missing_vector_in_cut_is_expression_error() {
        let ev = Event::new(vec![Particle { type_id: 13, vector: None }]);
        let set = cuts(&[CutSpec::single("Pt()", &[13], 0.0, 1.0)]);
        assert!(matches!(set.passes(&ev, 0.0), Err(LheError::Expression { .. })));
    }

    #[test]
    fn beam_energy_constant_available() {
        let set = cuts(&[CutSpec::single("E() / beam_energy", &[13], 0.0, 0.01)]);
        assert!(set.passes(&dimuon(), 6500.0).unwrap());
        assert!(!set.passes(&dimuon(), 500.0).unwrap());
    }

    #[test]
    fn compile_errors() {
        let mut spec = CutSpec::single("Pt()", &[13], 0.0, 1.0);
        spec.function = None;
        assert!(matches!(Cut::compile(&spec), Err(LheError::Config(_))));

        let mut spec = CutSpec::single("Pt()", &[13], 0.0, 1.0);
        spec.mode = "triple".into();
        assert!(matches!(Cut::compile(&spec), Err(LheError::Config(_))));

        let spec = CutSpec::single("(X+Y).M()", &[13], 0.0, 1.0);
        assert!(matches!(Cut::compile(&spec), Err(LheError::Config(_))));

        let spec = CutSpec::single("__import__('os')", &[13], 0.0, 1.0);
        assert!(matches!(Cut::compile(&spec), Err(LheError::Expression { .. })));
    }
}
