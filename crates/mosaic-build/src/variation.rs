//! Variation selectors
//!
//! A variant is identified by its module name plus an ordered list of
//! `(axis, value)` selectors, one per split it went through. The selector
//! string ("subdir") joins the non-empty values with `_`, e.g.
//! `android_arm64_armv8-a_core_static`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One `(axis, value)` selector
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variation {
    pub axis: String,
    pub value: String,
}

impl Variation {
    pub fn new(axis: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            axis: axis.into(),
            value: value.into(),
        }
    }
}

/// Ordered selector list, at most one entry per axis
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variations(Vec<Variation>);

impl Variations {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Value on `axis`, if the list carries that axis
    pub fn get(&self, axis: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|v| v.axis == axis)
            .map(|v| v.value.as_str())
    }

    pub fn contains_axis(&self, axis: &str) -> bool {
        self.0.iter().any(|v| v.axis == axis)
    }

    /// Set `axis` to `value`, keeping the axis' position if already present
    pub fn set(&mut self, axis: impl Into<String>, value: impl Into<String>) {
        let axis = axis.into();
        let value = value.into();
        match self.0.iter_mut().find(|v| v.axis == axis) {
            Some(existing) => existing.value = value,
            None => self.0.push(Variation { axis, value }),
        }
    }

    /// Builder form of [`Variations::set`]
    pub fn with(mut self, axis: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(axis, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variation> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Selector string used in output paths and lookups
    pub fn subdir(&self) -> String {
        self.0
            .iter()
            .filter(|v| !v.value.is_empty())
            .map(|v| v.value.as_str())
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl fmt::Display for Variations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|v| format!("{}:{}", v.axis, v.value))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

impl FromIterator<Variation> for Variations {
    fn from_iter<I: IntoIterator<Item = Variation>>(iter: I) -> Self {
        let mut variations = Variations::new();
        for v in iter {
            variations.set(v.axis, v.value);
        }
        variations
    }
}
