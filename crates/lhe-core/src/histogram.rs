//! Fixed-width weighted histogram accumulators.
//!
//! Binning follows the usual half-open convention: bin `i` covers
//! `[min + i*w, min + (i+1)*w)`, values below `min` go to the underflow cell
//! and values `>= max` to the overflow cell. Accumulators are created once
//! with their final shape and only ever grow by `fill` or `merge`.

use crate::error::{LheError, Result};

/// Where a value lands on an [`Axis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinSlot {
    /// Below the lower edge.
    Underflow,
    /// In-range bin index.
    Bin(usize),
    /// At or above the upper edge.
    Overflow,
}

/// Uniform binning `bins` over `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axis {
    n_bins: usize,
    min: f64,
    max: f64,
}

impl Axis {
    /// Validated axis; zero bins, non-finite or inverted edges are a config error.
    pub fn new(n_bins: usize, min: f64, max: f64) -> Result<Self> {
        if n_bins == 0 {
            return Err(LheError::Config("axis must have at least one bin".into()));
        }
        if !min.is_finite() || !max.is_finite() {
            return Err(LheError::Config(format!("axis edges must be finite (got {min}, {max})")));
        }
        if max <= min {
            return Err(LheError::Config(format!("axis max ({max}) must exceed min ({min})")));
        }
        Ok(Self { n_bins, min, max })
    }

    /// Number of in-range bins.
    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    /// Lower edge.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Upper edge.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Bin width.
    pub fn width(&self) -> f64 {
        (self.max - self.min) / self.n_bins as f64
    }

    /// Bin edges, `n_bins + 1` values from `min` to `max`.
    pub fn edges(&self) -> Vec<f64> {
        let w = self.width();
        (0..=self.n_bins)
            .map(|i| if i == self.n_bins { self.max } else { self.min + i as f64 * w })
            .collect()
    }

    /// Locate `v`; `None` for NaN.
    pub fn locate(&self, v: f64) -> Option<BinSlot> {
        if v.is_nan() {
            return None;
        }
        if v < self.min {
            return Some(BinSlot::Underflow);
        }
        if v >= self.max {
            return Some(BinSlot::Overflow);
        }
        // Rounding can push values just below `max` one past the last bin.
        let i = ((v - self.min) / self.width()) as usize;
        Some(BinSlot::Bin(i.min(self.n_bins - 1)))
    }
}

/// Weighted out-of-range cells of a 1D histogram.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Flows {
    /// Sum of weights below the lower edge.
    pub underflow: f64,
    /// Sum of weights at or above the upper edge.
    pub overflow: f64,
    /// Sum of squared weights below the lower edge.
    pub underflow_sumw2: f64,
    /// Sum of squared weights at or above the upper edge.
    pub overflow_sumw2: f64,
}

/// A 1D weighted histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram1D {
    axis: Axis,
    content: Vec<f64>,
    sumw2: Vec<f64>,
    flows: Flows,
    entries: u64,
    nan_entries: u64,
}

impl Histogram1D {
    /// Empty histogram over `axis`.
    pub fn new(axis: Axis) -> Self {
        let n = axis.n_bins();
        Self {
            axis,
            content: vec![0.0; n],
            sumw2: vec![0.0; n],
            flows: Flows::default(),
            entries: 0,
            nan_entries: 0,
        }
    }

    /// Rebuild from stored cells, checking that lengths match the axis.
    pub fn from_parts(
        axis: Axis,
        content: Vec<f64>,
        sumw2: Vec<f64>,
        flows: Flows,
        entries: u64,
    ) -> Result<Self> {
        let n = axis.n_bins();
        if content.len() != n || sumw2.len() != n {
            return Err(LheError::Data(format!(
                "histogram cells do not match axis (bins={n}, content={}, sumw2={})",
                content.len(),
                sumw2.len()
            )));
        }
        Ok(Self { axis, content, sumw2, flows, entries, nan_entries: 0 })
    }

    /// Add `(x, w)`. NaN values are counted separately and not binned.
    pub fn fill(&mut self, x: f64, w: f64) {
        let Some(slot) = self.axis.locate(x) else {
            self.nan_entries += 1;
            return;
        };
        let w2 = w * w;
        match slot {
            BinSlot::Underflow => {
                self.flows.underflow += w;
                self.flows.underflow_sumw2 += w2;
            }
            BinSlot::Overflow => {
                self.flows.overflow += w;
                self.flows.overflow_sumw2 += w2;
            }
            BinSlot::Bin(i) => {
                self.content[i] += w;
                self.sumw2[i] += w2;
            }
        }
        self.entries += 1;
    }

    /// Binning.
    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    /// Per-bin sum of weights.
    pub fn content(&self) -> &[f64] {
        &self.content
    }

    /// Per-bin sum of squared weights.
    pub fn sumw2(&self) -> &[f64] {
        &self.sumw2
    }

    /// Per-bin statistical error, `sqrt(sumw2)`.
    pub fn errors(&self) -> Vec<f64> {
        self.sumw2.iter().map(|s| s.sqrt()).collect()
    }

    /// Out-of-range cells.
    pub fn flows(&self) -> &Flows {
        &self.flows
    }

    /// Number of fills, including out-of-range ones.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Number of NaN values that were dropped.
    pub fn nan_entries(&self) -> u64 {
        self.nan_entries
    }

    /// Sum of in-range weights.
    pub fn integral(&self) -> f64 {
        self.content.iter().sum()
    }

    /// Add `other` cell by cell; axes must be identical.
    pub fn merge(&mut self, other: &Histogram1D) -> Result<()> {
        if self.axis != other.axis {
            return Err(LheError::Config(format!(
                "cannot merge histograms with different binning ({:?} vs {:?})",
                self.axis, other.axis
            )));
        }
        for (a, b) in self.content.iter_mut().zip(&other.content) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        self.flows.underflow += other.flows.underflow;
        self.flows.overflow += other.flows.overflow;
        self.flows.underflow_sumw2 += other.flows.underflow_sumw2;
        self.flows.overflow_sumw2 += other.flows.overflow_sumw2;
        self.entries += other.entries;
        self.nan_entries += other.nan_entries;
        Ok(())
    }
}

/// A 2D weighted histogram. In-range cells are stored row-major over y then x.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram2D {
    x: Axis,
    y: Axis,
    content: Vec<f64>,
    sumw2: Vec<f64>,
    out_of_range: f64,
    out_of_range_sumw2: f64,
    entries: u64,
    nan_entries: u64,
}

impl Histogram2D {
    /// Empty histogram over `x` × `y`.
    pub fn new(x: Axis, y: Axis) -> Self {
        let n = x.n_bins() * y.n_bins();
        Self {
            x,
            y,
            content: vec![0.0; n],
            sumw2: vec![0.0; n],
            out_of_range: 0.0,
            out_of_range_sumw2: 0.0,
            entries: 0,
            nan_entries: 0,
        }
    }

    /// Rebuild from stored cells.
    pub fn from_parts(
        x: Axis,
        y: Axis,
        content: Vec<f64>,
        sumw2: Vec<f64>,
        out_of_range: (f64, f64),
        entries: u64,
    ) -> Result<Self> {
        let n = x.n_bins() * y.n_bins();
        if content.len() != n || sumw2.len() != n {
            return Err(LheError::Data(format!(
                "2D histogram cells do not match axes (cells={n}, content={}, sumw2={})",
                content.len(),
                sumw2.len()
            )));
        }
        Ok(Self {
            x,
            y,
            content,
            sumw2,
            out_of_range: out_of_range.0,
            out_of_range_sumw2: out_of_range.1,
            entries,
            nan_entries: 0,
        })
    }

    /// Add `(x, y, w)`.
    pub fn fill(&mut self, x: f64, y: f64, w: f64) {
        let (Some(sx), Some(sy)) = (self.x.locate(x), self.y.locate(y)) else {
            self.nan_entries += 1;
            return;
        };
        self.entries += 1;
        match (sx, sy) {
            (BinSlot::Bin(ix), BinSlot::Bin(iy)) => {
                let k = iy * self.x.n_bins() + ix;
                self.content[k] += w;
                self.sumw2[k] += w * w;
            }
            _ => {
                self.out_of_range += w;
                self.out_of_range_sumw2 += w * w;
            }
        }
    }

    /// x binning.
    pub fn x_axis(&self) -> &Axis {
        &self.x
    }

    /// y binning.
    pub fn y_axis(&self) -> &Axis {
        &self.y
    }

    /// Content of cell `(ix, iy)`.
    pub fn bin_content(&self, ix: usize, iy: usize) -> f64 {
        self.content[iy * self.x.n_bins() + ix]
    }

    /// All in-range cells, row-major over y then x.
    pub fn content(&self) -> &[f64] {
        &self.content
    }

    /// Per-cell sum of squared weights.
    pub fn sumw2(&self) -> &[f64] {
        &self.sumw2
    }

    /// Per-cell statistical error.
    pub fn errors(&self) -> Vec<f64> {
        self.sumw2.iter().map(|s| s.sqrt()).collect()
    }

    /// Weight (and squared weight) that fell outside either axis.
    pub fn out_of_range(&self) -> (f64, f64) {
        (self.out_of_range, self.out_of_range_sumw2)
    }

    /// Number of fills, including out-of-range ones.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Number of fills dropped because x or y was NaN.
    pub fn nan_entries(&self) -> u64 {
        self.nan_entries
    }

    /// Add `other` cell by cell; both axes must be identical.
    pub fn merge(&mut self, other: &Histogram2D) -> Result<()> {
        if self.x != other.x || self.y != other.y {
            return Err(LheError::Config(
                "cannot merge 2D histograms with different binning".into(),
            ));
        }
        for (a, b) in self.content.iter_mut().zip(&other.content) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        self.out_of_range += other.out_of_range;
        self.out_of_range_sumw2 += other.out_of_range_sumw2;
        self.entries += other.entries;
        self.nan_entries += other.nan_entries;
        Ok(())
    }
}

/// A registry slot: either dimensionality.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// One-dimensional.
    H1(Histogram1D),
    /// Two-dimensional.
    H2(Histogram2D),
}

impl Accumulator {
    /// Number of fills.
    pub fn entries(&self) -> u64 {
        match self {
            Accumulator::H1(h) => h.entries(),
            Accumulator::H2(h) => h.entries(),
        }
    }

    /// Merge same-shaped accumulators.
    pub fn merge(&mut self, other: &Accumulator) -> Result<()> {
        match (self, other) {
            (Accumulator::H1(a), Accumulator::H1(b)) => a.merge(b),
            (Accumulator::H2(a), Accumulator::H2(b)) => a.merge(b),
            _ => Err(LheError::Config("cannot merge a 1D histogram with a 2D histogram".into())),
        }
    }

    /// The 1D histogram, if this is one.
    pub fn as_h1(&self) -> Option<&Histogram1D> {
        match self {
            Accumulator::H1(h) => Some(h),
            Accumulator::H2(_) => None,
        }
    }

    /// The 2D histogram, if this is one.
    pub fn as_h2(&self) -> Option<&Histogram2D> {
        match self {
            Accumulator::H2(h) => Some(h),
            Accumulator::H1(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_validation() {
        assert!(Axis::new(0, 0.0, 1.0).is_err());
        assert!(Axis::new(10, 1.0, 1.0).is_err());
        assert!(Axis::new(10, 2.0, 1.0).is_err());
        assert!(Axis::new(10, f64::NEG_INFINITY, 1.0).is_err());
        let err = Axis::new(10, 0.0, f64::NAN).unwrap_err();
        assert!(matches!(err, LheError::Config(_)));
    }

    #[test]
    fn locate_edge_cases() {
        let a = Axis::new(10, 0.0, 40.0).unwrap();
        assert_eq!(a.locate(-0.1), Some(BinSlot::Underflow));
        assert_eq!(a.locate(0.0), Some(BinSlot::Bin(0)));
        assert_eq!(a.locate(4.0), Some(BinSlot::Bin(1)));
        assert_eq!(a.locate(20.0), Some(BinSlot::Bin(5)));
        assert_eq!(a.locate(39.999_999), Some(BinSlot::Bin(9)));
        assert_eq!(a.locate(40.0), Some(BinSlot::Overflow));
        assert_eq!(a.locate(f64::INFINITY), Some(BinSlot::Overflow));
        assert_eq!(a.locate(f64::NAN), None);
        assert_eq!(a.edges().len(), 11);
        assert_eq!(a.edges()[10], 40.0);
    }

    #[test]
    fn fill_simple() {
        let mut h = Histogram1D::new(Axis::new(3, 0.0, 3.0).unwrap());
        for v in [0.5, 1.5, 2.5, 0.5, -1.0, 3.5, f64::NAN] {
            h.fill(v, 1.0);
        }
        assert_eq!(h.content(), &[2.0, 1.0, 1.0]);
        assert_eq!(h.flows().underflow, 1.0);
        assert_eq!(h.flows().overflow, 1.0);
        assert_eq!(h.entries(), 6);
        assert_eq!(h.nan_entries(), 1);
    }

    #[test]
    fn fill_with_weight() {
        let mut h = Histogram1D::new(Axis::new(2, 0.0, 2.0).unwrap());
        h.fill(0.5, 2.0);
        h.fill(0.5, 3.0);
        h.fill(1.5, -1.0);
        assert_eq!(h.content(), &[5.0, -1.0]);
        assert_eq!(h.sumw2(), &[13.0, 1.0]);
        assert!((h.errors()[0] - 13f64.sqrt()).abs() < 1e-12);
        assert_eq!(h.integral(), 4.0);
    }

    #[test]
    fn merge_adds_and_rejects_mismatch() {
        let axis = Axis::new(2, 0.0, 2.0).unwrap();
        let mut a = Histogram1D::new(axis);
        let mut b = Histogram1D::new(axis);
        a.fill(0.5, 1.0);
        b.fill(0.5, 2.0);
        b.fill(5.0, 1.0);
        a.merge(&b).unwrap();
        assert_eq!(a.content(), &[3.0, 0.0]);
        assert_eq!(a.sumw2(), &[5.0, 0.0]);
        assert_eq!(a.flows().overflow, 1.0);
        assert_eq!(a.entries(), 3);

        let c = Histogram1D::new(Axis::new(4, 0.0, 2.0).unwrap());
        assert!(a.merge(&c).is_err());
        let mut h1 = Accumulator::H1(a);
        let h2 = Accumulator::H2(Histogram2D::new(axis, axis));
        assert!(h1.merge(&h2).is_err());
    }

    #[test]
    fn fill_2d_row_major() {
        let x = Axis::new(2, 0.0, 2.0).unwrap();
        let y = Axis::new(3, 0.0, 3.0).unwrap();
        let mut h = Histogram2D::new(x, y);
        h.fill(1.5, 0.5, 1.0);
        h.fill(0.5, 2.5, 2.0);
        h.fill(5.0, 0.5, 4.0);
        assert_eq!(h.bin_content(1, 0), 1.0);
        assert_eq!(h.bin_content(0, 2), 2.0);
        assert_eq!(h.content(), &[0.0, 1.0, 0.0, 0.0, 2.0, 0.0]);
        assert_eq!(h.out_of_range(), (4.0, 16.0));
        assert_eq!(h.entries(), 3);
    }

    #[test]
    fn from_parts_checks_lengths() {
        let axis = Axis::new(2, 0.0, 2.0).unwrap();
        assert!(Histogram1D::from_parts(axis, vec![1.0], vec![1.0, 0.0], Flows::default(), 1)
            .is_err());
        let h = Histogram1D::from_parts(axis, vec![1.0, 0.0], vec![1.0, 0.0], Flows::default(), 1)
            .unwrap();
        assert_eq!(h.content(), &[1.0, 0.0]);
    }
}
