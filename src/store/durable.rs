//! Relational-style sample table backed by redb.
//!
//! One row per sample: a `u64` sequence id key and a `(shape, color, png)`
//! value. Ids are allocated inside the insert transaction as the current last
//! key plus one, so concurrent uploads never share an id. Enumeration follows
//! id order.

use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::error::StoreError;
use crate::label::LabelPair;
use crate::store::{Backend, LabelIndex, SampleId, SampleStore, StoreResult};

/// `id -> (shape, color, png)`.
const SAMPLES_TABLE: TableDefinition<u64, (&str, &str, &[u8])> = TableDefinition::new("samples");

/// File name of the database inside the data directory.
pub const DB_FILE: &str = "samples.redb";

fn redb_err<E: Display>(op: &'static str) -> impl FnOnce(E) -> StoreError {
    move |e| StoreError::Redb {
        message: format!("{op} failed: {e}"),
    }
}

/// Durable sample table using redb.
///
/// All writes go through transactions. Reads use MVCC snapshots, so an index
/// taken during an upload sees either all or none of it.
pub struct DurableStore {
    db: Arc<Database>,
}

impl DurableStore {
    /// Open or create the sample table in the given directory.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io {
            path: data_dir.display().to_string(),
            source: e,
        })?;
        let db_path = data_dir.join(DB_FILE);
        let db = Database::create(&db_path).map_err(|e| StoreError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;

        // Create the table up front so read transactions never see it missing.
        let txn = db.begin_write().map_err(redb_err("begin_write"))?;
        txn.open_table(SAMPLES_TABLE)
            .map_err(redb_err("open_table"))?;
        txn.commit().map_err(redb_err("commit"))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Number of rows in the table.
    pub fn len(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn
            .open_table(SAMPLES_TABLE)
            .map_err(redb_err("open_table"))?;
        table.len().map_err(redb_err("len"))
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        self.len().map(|n| n == 0)
    }
}

impl SampleStore for DurableStore {
    fn backend(&self) -> Backend {
        Backend::Relational
    }

    fn insert(&self, labels: &LabelPair, png: &[u8]) -> StoreResult<SampleId> {
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        let id = {
            let mut table = txn
                .open_table(SAMPLES_TABLE)
                .map_err(redb_err("open_table"))?;
            let next = table
                .last()
                .map_err(redb_err("last"))?
                .map(|(key, _)| key.value() + 1)
                .unwrap_or(1);
            table
                .insert(next, (labels.shape.as_str(), labels.color.as_str(), png))
                .map_err(redb_err("insert"))?;
            next
        };
        txn.commit().map_err(redb_err("commit"))?;
        Ok(SampleId::new(id.to_string()))
    }

    fn index(&self) -> StoreResult<LabelIndex> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn
            .open_table(SAMPLES_TABLE)
            .map_err(redb_err("open_table"))?;
        let mut index = LabelIndex::new();
        for row in table.iter().map_err(redb_err("iter"))? {
            let (key, value) = row.map_err(redb_err("iter"))?;
            let (shape, color, _) = value.value();
            index.push(
                LabelPair::new(shape, color),
                SampleId::new(key.value().to_string()),
            );
        }
        Ok(index)
    }

    fn load(&self, id: &SampleId) -> StoreResult<Vec<u8>> {
        let key: u64 = id.as_str().parse().map_err(|_| StoreError::InvalidId {
            id: id.to_string(),
        })?;
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn
            .open_table(SAMPLES_TABLE)
            .map_err(redb_err("open_table"))?;
        let row = table.get(key).map_err(redb_err("get"))?;
        match row {
            Some(guard) => {
                let (_, _, png) = guard.value();
                Ok(png.to_vec())
            }
            None => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn insert_assigns_sequential_ids() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();

        let a = store.insert(&LabelPair::new("bandera", "roja"), b"one").unwrap();
        let b = store.insert(&LabelPair::new("bandera", "azul"), b"two").unwrap();
        assert_eq!(a.as_str(), "1");
        assert_eq!(b.as_str(), "2");
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.load(&b).unwrap(), b"two".to_vec());
    }

    #[test]
    fn labels_are_stored_verbatim() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        store.insert(&LabelPair::new("bandera", "amarillá"), b"x").unwrap();

        let index = store.index().unwrap();
        assert_eq!(index.groups()[0].labels, LabelPair::new("bandera", "amarillá"));
    }

    #[test]
    fn index_follows_id_order() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        store.insert(&LabelPair::new("square", "red"), b"1").unwrap();
        store.insert(&LabelPair::new("square", "blue"), b"2").unwrap();
        store.insert(&LabelPair::new("square", "red"), b"3").unwrap();

        let index = store.index().unwrap();
        let labels: Vec<String> = index
            .groups()
            .iter()
            .map(|g| g.labels.dataset_label())
            .collect();
        assert_eq!(labels, vec!["square_red", "square_blue"]);
        assert_eq!(
            index.groups()[0].samples,
            vec![SampleId::new("1"), SampleId::new("3")]
        );
    }

    #[test]
    fn persistence_across_reopens() {
        let dir = TempDir::new().unwrap();
        {
            let store = DurableStore::open(dir.path()).unwrap();
            store.insert(&LabelPair::new("square", "red"), b"png").unwrap();
        }

        let store = DurableStore::open(dir.path()).unwrap();
        assert_eq!(store.index().unwrap().sample_count(), 1);
        let next = store.insert(&LabelPair::new("square", "red"), b"png").unwrap();
        assert_eq!(next.as_str(), "2");
    }

    #[test]
    fn load_rejects_unknown_and_malformed_ids() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load(&SampleId::new("99")),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.load(&SampleId::new("square_red/abc.png")),
            Err(StoreError::InvalidId { .. })
        ));
    }
}
