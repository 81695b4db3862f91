//! Object-storage-style bucket held in a concurrent hashmap.
//!
//! Objects live in a flat key namespace named `{shape}_{color}/{uuid}.png`,
//! built from key-safe labels since bucket keys disallow accents and path
//! separators inside a segment. Listing returns keys in lexicographic order,
//! like a bucket listing. All data is lost on process exit.

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::StoreError;
use crate::label::LabelPair;
use crate::store::{Backend, LabelIndex, SampleId, SampleStore, StoreResult};

/// Concurrent in-memory object namespace.
#[derive(Debug, Default)]
pub struct BucketStore {
    objects: DashMap<String, Vec<u8>>,
}

impl BucketStore {
    /// Create an empty bucket.
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
        }
    }

    /// Object key for a new sample under `labels`.
    pub fn object_key(labels: &LabelPair, token: Uuid) -> String {
        format!("{}/{token}.png", labels.key_safe().dataset_label())
    }

    /// All object keys, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the bucket is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl SampleStore for BucketStore {
    fn backend(&self) -> Backend {
        Backend::Bucket
    }

    fn insert(&self, labels: &LabelPair, png: &[u8]) -> StoreResult<SampleId> {
        let key = Self::object_key(labels, Uuid::new_v4());
        self.objects.insert(key.clone(), png.to_vec());
        Ok(SampleId::new(key))
    }

    fn index(&self) -> StoreResult<LabelIndex> {
        let mut index = LabelIndex::new();
        for key in self.list() {
            let labels = key
                .split_once('/')
                .and_then(|(prefix, _)| LabelPair::from_key_segment(prefix));
            match labels {
                Some(labels) => index.push(labels, SampleId::new(key)),
                None => tracing::warn!(key = %key, "skipping object with unparseable key"),
            }
        }
        Ok(index)
    }

    fn load(&self, id: &SampleId) -> StoreResult<Vec<u8>> {
        self.objects
            .get(id.as_str())
            .map(|v| v.value().clone())
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }
}
