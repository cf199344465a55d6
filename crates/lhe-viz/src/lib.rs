//! # lhe-viz
//!
//! Plot-friendly artifacts for filled LHE histograms.
//!
//! Maps histogram registries to serde structures (arrays instead of nested objects) and back.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Filled 1D/2D histogram artifacts.
pub mod histograms;

/// Per-sample bookkeeping entries.
pub mod summary;

pub use histograms::{
    AxisArtifact, HISTOGRAMS_SCHEMA_VERSION, HistogramArtifact, HistogramKind, HistogramsArtifact,
    HistogramsMeta,
};
pub use summary::SampleEntry;
