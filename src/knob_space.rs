//! Knob catalogue and configuration data model.
//!
//! A `KnobSpace` is the typed parameter catalogue loaded once per tuning
//! session from an external JSON file (see `KnobSpace::load`). A
//! `Configuration` is always complete over the space: every knob name in
//! the space has a concrete value, constants included.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DbTuneError, Result};

/// The type of a single tunable server parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnobKind {
    Integer,
    Real,
    Constant,
}

/// A concrete value assigned to one knob.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KnobValue {
    Integer(i64),
    Real(f64),
}

impl KnobValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            KnobValue::Integer(v) => *v as f64,
            KnobValue::Real(v) => *v,
        }
    }
}

/// One tunable (or fixed) server parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Knob {
    #[serde(rename = "type")]
    pub kind: KnobKind,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl Knob {
    /// A knob is not tuned when its range has collapsed to a single point.
    pub fn is_tunable(&self) -> bool {
        self.kind != KnobKind::Constant && self.min != self.max
    }

    /// Cast and clamp-free validation that a raw value belongs to this knob.
    pub fn cast(&self, raw: f64) -> KnobValue {
        match self.kind {
            KnobKind::Integer => KnobValue::Integer(raw.round() as i64),
            KnobKind::Real | KnobKind::Constant => KnobValue::Real(raw),
        }
    }

    pub fn default_value(&self) -> KnobValue {
        self.cast(self.default)
    }
}

/// The full knob catalogue for one tuning session: name -> definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnobSpace {
    #[serde(flatten)]
    knobs: HashMap<String, Knob>,
}

impl KnobSpace {
    /// Loads a KnobSpace from a JSON file mapping names to
    /// `{type, min, max, default}`. See SPEC_FULL.md 10.1: this is a
    /// deliberately minimal loader, not the richer external tool the
    /// distilled spec excludes.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let space: KnobSpace = serde_json::from_str(&text)?;
        for (name, knob) in &space.knobs {
            if !(knob.min <= knob.default && knob.default <= knob.max) {
                return Err(DbTuneError::Config(format!(
                    "knob {name}: default {} not within [{}, {}]",
                    knob.default, knob.min, knob.max
                )));
            }
        }
        Ok(space)
    }

    pub fn get(&self, name: &str) -> Option<&Knob> {
        self.knobs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.knobs.keys().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Knob)> {
        self.knobs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn tunable_count(&self) -> usize {
        self.knobs.values().filter(|k| k.is_tunable()).count()
    }

    pub fn len(&self) -> usize {
        self.knobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.knobs.is_empty()
    }

    /// The all-defaults Configuration, complete over the space.
    pub fn defaults(&self) -> Configuration {
        let mut values = HashMap::with_capacity(self.knobs.len());
        for (name, knob) in &self.knobs {
            values.insert(name.clone(), knob.default_value());
        }
        Configuration { values }
    }
}

/// A complete assignment over a KnobSpace. Never mutated after creation;
/// the driver only ever constructs new Configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    values: HashMap<String, KnobValue>,
}

impl Configuration {
    pub fn new(values: HashMap<String, KnobValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<KnobValue> {
        self.values.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, KnobValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns a copy of `self` with every knob in `space` present,
    /// injecting constants (and any other knob the caller omitted) from
    /// their default values. This is what lets an optimizer only reason
    /// about the tunable subset while the driver always evaluates a
    /// complete Configuration (§3, §4.5).
    pub fn completed_over(&self, space: &KnobSpace) -> Configuration {
        let mut values = self.values.clone();
        for (name, knob) in space.iter() {
            values.entry(name.to_string()).or_insert_with(|| knob.default_value());
        }
        Configuration { values }
    }

    /// True iff every value in `self` respects its knob's declared range
    /// and type (§8 Range respect).
    pub fn respects(&self, space: &KnobSpace) -> bool {
        for (name, value) in self.iter() {
            let Some(knob) = space.get(name) else {
                return false;
            };
            match (knob.kind, value) {
                (KnobKind::Integer, KnobValue::Integer(v)) => {
                    if (v as f64) < knob.min || (v as f64) > knob.max {
                        return false;
                    }
                }
                (KnobKind::Real, KnobValue::Real(v)) | (KnobKind::Constant, KnobValue::Real(v)) => {
                    if v < knob.min || v > knob.max {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }
}
