//! # lhe-core
//!
//! Event selection and histogram filling for Les Houches Event files.
//!
//! Streams `.lhe` / `.lhe.gz` files, keeps the particles of interest, applies
//! range cuts written as small kinematic expressions over four-vectors `X`
//! and `Y`, and fills weighted 1D/2D histograms keyed by observable and
//! sample label.
//!
//! ## Example
//!
//! ```no_run
//! use lhe_core::{Analysis, HistogramSpec, SampleConfig};
//!
//! let analysis = Analysis::builder()
//!     .include([13, -13])
//!     .histograms(vec![HistogramSpec::one_d(
//!         "mll", &[13, -13], "pair", "(X+Y).M()", 40, 0.0, 200.0,
//!     )])
//!     .build()
//!     .unwrap();
//! let result = analysis.process_file(&SampleConfig::new("dy.lhe", Some("dy"))).unwrap();
//! println!("{} / {} events passed", result.summary.passed_events, result.summary.total_events);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cuts;
pub mod error;
pub mod event;
pub mod expr;
pub mod filler;
pub mod histogram;
pub mod kinematics;
pub mod pipeline;
pub mod reader;
pub mod registry;
pub mod spec;

/// Crate version, reported by the CLI and written into artifacts.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use cuts::{Cut, CutMode, CutSet};
pub use error::{LheError, Result};
pub use event::{Event, IdSet, Particle};
pub use expr::{CompiledExpr, evaluate};
pub use filler::{Binning, FillMode, HistogramDef, compile_histograms, fill_event};
pub use histogram::{Accumulator, Axis, BinSlot, Flows, Histogram1D, Histogram2D};
pub use kinematics::{FourVector, ThreeVector};
pub use pipeline::{
    Analysis, AnalysisBuilder, DEFAULT_BEAM_ENERGY, FileFailure, FileResult, FileSummary,
    Normalization, RunOutput, SampleConfig, event_weight,
};
pub use reader::{FileScan, LheHeader, LheReader, RunInfo, scan_file};
pub use registry::{HistogramKey, HistogramRegistry};
pub use spec::{CutSpec, FunctionSpec, HistogramSpec};
