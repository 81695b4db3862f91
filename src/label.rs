//! Label pairs and key-safe label rendering.
//!
//! A sample is labeled with a shape and a color. The dataset label is the two
//! joined with `_`. Backends whose key namespace is restricted (object keys,
//! directory names) use [`LabelPair::key_safe`], which strips diacritics and
//! maps everything outside `[A-Za-z0-9-]` to `-`, so `_` only ever appears as
//! the separator.

use std::fmt;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Placeholder for a label component that is empty after sanitising.
const UNLABELED: &str = "unlabeled";

/// The (shape, color) combination describing what was meant to be drawn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelPair {
    pub shape: String,
    pub color: String,
}

impl LabelPair {
    pub fn new(shape: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            shape: shape.into(),
            color: color.into(),
        }
    }

    /// `"{shape}_{color}"`, the string written to the label vector.
    pub fn dataset_label(&self) -> String {
        format!("{}_{}", self.shape, self.color)
    }

    /// Both components rendered for a restricted key namespace.
    pub fn key_safe(&self) -> Self {
        Self {
            shape: key_component(&self.shape),
            color: key_component(&self.color),
        }
    }

    /// Parse a key-safe `"{shape}_{color}"` segment back into a pair.
    ///
    /// Only meaningful for segments produced from [`LabelPair::key_safe`].
    pub fn from_key_segment(segment: &str) -> Option<Self> {
        let (shape, color) = segment.split_once('_')?;
        if shape.is_empty() || color.is_empty() || color.contains('_') {
            return None;
        }
        Some(Self::new(shape, color))
    }
}

impl fmt::Display for LabelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.shape, self.color)
    }
}

/// Remove accents and diacritics: `"amarillá"` becomes `"amarilla"`.
pub fn strip_accents(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

fn key_component(s: &str) -> String {
    let cleaned: String = strip_accents(s.trim())
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    if cleaned.is_empty() {
        UNLABELED.to_string()
    } else {
        cleaned
    }
}
