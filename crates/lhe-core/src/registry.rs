//! Named histogram collection keyed by observable and sample label.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{LheError, Result};
use crate::event::IdSet;
use crate::filler::HistogramDef;
use crate::histogram::Accumulator;

const KEY_SEPARATOR: &str = "__";

/// Registry key: observable name plus optional sample label.
///
/// Renders as `name__label`, or just `name` when unlabelled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HistogramKey {
    /// Observable name from the histogram spec.
    pub name: String,
    /// Sample label; empty labels are normalised to `None`.
    pub label: Option<String>,
}

impl HistogramKey {
    /// Build a key; an empty label counts as no label.
    pub fn new(name: impl Into<String>, label: Option<&str>) -> Self {
        Self {
            name: name.into(),
            label: label.filter(|l| !l.is_empty()).map(str::to_string),
        }
    }
}

impl fmt::Display for HistogramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(l) => write!(f, "{}{KEY_SEPARATOR}{l}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Histogram accumulators owned by one processing task (or the merged run).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramRegistry {
    entries: BTreeMap<HistogramKey, Accumulator>,
}

impl HistogramRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate one accumulator per definition whose ids overlap `include`.
    pub fn build(defs: &[HistogramDef], include: &IdSet, label: Option<&str>) -> Self {
        let mut reg = Self::new();
        for def in defs {
            if def.ids.is_disjoint(include) {
                tracing::debug!(histogram = %def.name, "no included particle ids; skipping");
                continue;
            }
            reg.entries.insert(HistogramKey::new(def.name.clone(), label), def.new_accumulator());
        }
        reg
    }

    /// Insert or replace an accumulator.
    pub fn insert(&mut self, key: HistogramKey, acc: Accumulator) -> Option<Accumulator> {
        self.entries.insert(key, acc)
    }

    /// Resolve `name` for `label`, falling back to the unlabelled key.
    pub fn resolve(&self, name: &str, label: Option<&str>) -> Option<&HistogramKey> {
        let labelled = HistogramKey::new(name, label);
        if let Some((k, _)) = self.entries.get_key_value(&labelled) {
            return Some(k);
        }
        self.entries.get_key_value(&HistogramKey::new(name, None)).map(|(k, _)| k)
    }

    /// Accumulator for `name` and `label`, with unlabelled fallback.
    pub fn get(&self, name: &str, label: Option<&str>) -> Option<&Accumulator> {
        let key = self.resolve(name, label)?;
        self.entries.get(key)
    }

    /// Mutable accumulator for `name` and `label`, with unlabelled fallback.
    pub fn get_mut(&mut self, name: &str, label: Option<&str>) -> Option<&mut Accumulator> {
        let key = self.resolve(name, label)?.clone();
        self.entries.get_mut(&key)
    }

    /// Exact key lookup.
    pub fn get_key(&self, key: &HistogramKey) -> Option<&Accumulator> {
        self.entries.get(key)
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&HistogramKey, &Accumulator)> {
        self.entries.iter()
    }

    /// Number of accumulators.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no accumulator was instantiated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold `other` into `self`.
    ///
    /// New keys are moved in; clashing keys must have identical binning and
    /// their contents are added.
    pub fn merge(&mut self, other: HistogramRegistry) -> Result<()> {
        for (key, acc) in other.entries {
            match self.entries.get_mut(&key) {
                Some(existing) => existing
                    .merge(&acc)
                    .map_err(|e| LheError::Config(format!("merging '{key}': {e}")))?,
                None => {
                    self.entries.insert(key, acc);
                }
            }
        }
        Ok(())
    }
}

impl IntoIterator for HistogramRegistry {
    type Item = (HistogramKey, Accumulator);
    type IntoIter = std::collections::btree_map::IntoIter<HistogramKey, Accumulator>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
