//! Per-sample bookkeeping carried alongside the histograms.

use lhe_core::FileSummary;
use serde::{Deserialize, Serialize};

/// One processed file, as needed to label and scale plots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEntry {
    /// Input path.
    pub filename: String,
    /// Sample label (histogram key suffix).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Production cross section (pb).
    pub cross_section: f64,
    /// Canonical event count.
    pub total_events: u64,
    /// Events that passed the selection.
    pub passed_events: u64,
    /// Passed fraction in percent.
    pub passed_percent: f64,
    /// `cross_section * passed / total` (pb).
    pub visible_cross_section: f64,
    /// Weight applied to each fill.
    pub weight: f64,
}

impl From<&FileSummary> for SampleEntry {
    fn from(s: &FileSummary) -> Self {
        Self {
            filename: s.filename.clone(),
            label: s.label.clone(),
            cross_section: s.cross_section,
            total_events: s.total_events,
            passed_events: s.passed_events,
            passed_percent: s.passed_percent(),
            visible_cross_section: s.visible_cross_section(),
            weight: s.weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_fields() {
        let s = FileSummary {
            filename: "ttbar.lhe".into(),
            label: Some("ttbar".into()),
            cross_section: 800.0,
            total_events: 1000,
            passed_events: 250,
            weight: 0.8,
        };
        let e = SampleEntry::from(&s);
        assert_eq!(e.passed_percent, 25.0);
        assert_eq!(e.visible_cross_section, 200.0);

        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["label"], "ttbar");
        assert_eq!(json["total_events"], 1000);
    }
}
