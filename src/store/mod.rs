//! Storage backends for uploaded samples.
//!
//! Three backends implement [`SampleStore`]:
//!
//! - [`DurableStore`]: relational-style redb table with a sequence id per sample
//! - [`BucketStore`]: object-storage-style flat key namespace (DashMap)
//! - [`DirStore`]: one directory per label pair on the local filesystem
//!
//! Grouping never depends on storage layout: every backend answers
//! [`SampleStore::index`] with an explicit [`LabelIndex`].

pub mod bucket;
pub mod dir;
pub mod durable;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StoreError};
use crate::label::LabelPair;

pub use bucket::BucketStore;
pub use dir::DirStore;
pub use durable::DurableStore;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Backend-assigned uniqueness token for one sample.
///
/// Sequence number for the relational backend, object key for the bucket
/// backend, relative file path for the filesystem backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleId(String);

impl SampleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// All samples of one label pair, in enumeration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelGroup {
    pub labels: LabelPair,
    pub samples: Vec<SampleId>,
}

/// Explicit label pair → sample ids mapping.
///
/// Groups appear in the order their label pair was first enumerated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelIndex {
    groups: Vec<LabelGroup>,
    positions: HashMap<LabelPair, usize>,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample under its label pair.
    pub fn push(&mut self, labels: LabelPair, id: SampleId) {
        match self.positions.get(&labels) {
            Some(&pos) => self.groups[pos].samples.push(id),
            None => {
                self.positions.insert(labels.clone(), self.groups.len());
                self.groups.push(LabelGroup {
                    labels,
                    samples: vec![id],
                });
            }
        }
    }

    pub fn groups(&self) -> &[LabelGroup] {
        &self.groups
    }

    /// Total number of samples across all groups.
    pub fn sample_count(&self) -> usize {
        self.groups.iter().map(|g| g.samples.len()).sum()
    }

    /// Number of samples stored under `labels`.
    pub fn count_for(&self, labels: &LabelPair) -> usize {
        self.positions
            .get(labels)
            .map(|&pos| self.groups[pos].samples.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl FromIterator<(LabelPair, SampleId)> for LabelIndex {
    fn from_iter<I: IntoIterator<Item = (LabelPair, SampleId)>>(iter: I) -> Self {
        let mut index = Self::new();
        for (labels, id) in iter {
            index.push(labels, id);
        }
        index
    }
}

/// A persistence mechanism for samples.
///
/// Implementations are synchronous; async callers run them on a blocking pool.
pub trait SampleStore: Send + Sync + fmt::Debug {
    /// Which variant this is.
    fn backend(&self) -> Backend;

    /// Persist one PNG under a label pair, returning its new id.
    fn insert(&self, labels: &LabelPair, png: &[u8]) -> StoreResult<SampleId>;

    /// Enumerate every stored sample, grouped by label pair.
    fn index(&self) -> StoreResult<LabelIndex>;

    /// Fetch the PNG bytes of one sample.
    fn load(&self, id: &SampleId) -> StoreResult<Vec<u8>>;
}

/// Storage variant selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Relational,
    Bucket,
    Filesystem,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Relational => "relational",
            Backend::Bucket => "bucket",
            Backend::Filesystem => "filesystem",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relational" | "redb" | "db" => Ok(Backend::Relational),
            "bucket" | "object" => Ok(Backend::Bucket),
            "filesystem" | "fs" | "dir" => Ok(Backend::Filesystem),
            _ => Err(ConfigError::UnknownBackend { name: s.to_string() }),
        }
    }
}

/// Construct the store for `backend`, rooted at `data_dir` where applicable.
pub fn open(backend: Backend, data_dir: &Path) -> StoreResult<Arc<dyn SampleStore>> {
    let store: Arc<dyn SampleStore> = match backend {
        Backend::Relational => Arc::new(DurableStore::open(data_dir)?),
        Backend::Bucket => Arc::new(BucketStore::new()),
        Backend::Filesystem => Arc::new(DirStore::open(data_dir)?),
    };
    tracing::info!(backend = %backend, data_dir = %data_dir.display(), "sample store opened");
    Ok(store)
}
