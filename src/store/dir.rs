//! Filesystem sample store: one directory per label pair.
//!
//! Layout is `{root}/{shape}_{color}/{uuid}.png` with key-safe labels. The
//! directory name is parsed back into a [`LabelPair`] when the index is built;
//! directories and files that do not fit the layout are skipped with a warning.

use std::fs::File;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::error::StoreError;
use crate::label::LabelPair;
use crate::store::{Backend, LabelIndex, SampleId, SampleStore, StoreResult};

#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Entries of `dir` sorted by file name.
fn sorted_entries(dir: &Path) -> std::io::Result<Vec<std::fs::DirEntry>> {
    let mut entries = std::fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

/// Write `bytes` to a fresh file at `path` and flush it to disk.
fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

impl DirStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(root).map_err(io_err(root))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Resolve an id to a path, refusing anything outside the layout.
    fn resolve(&self, id: &SampleId) -> StoreResult<PathBuf> {
        let rel = Path::new(id.as_str());
        let parts: Vec<Component<'_>> = rel.components().collect();
        let valid = parts.len() == 2
            && parts.iter().all(|c| matches!(c, Component::Normal(_)))
            && rel
                .parent()
                .and_then(|p| p.to_str())
                .and_then(LabelPair::from_key_segment)
                .is_some()
            && rel.extension().is_some_and(|ext| ext == "png");
        if !valid {
            return Err(StoreError::InvalidId { id: id.to_string() });
        }
        Ok(self.root.join(rel))
    }

    fn push_label_dir(&self, index: &mut LabelIndex, labels: LabelPair, segment: &str, dir: &Path) {
        let entries = match sorted_entries(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable label directory");
                return;
            }
        };
        for entry in entries {
            let path = entry.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "png") {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                tracing::warn!(path = %path.display(), "skipping non-UTF-8 file name");
                continue;
            };
            index.push(labels.clone(), SampleId::new(format!("{segment}/{name}")));
        }
    }
}

impl SampleStore for DirStore {
    fn backend(&self) -> Backend {
        Backend::Filesystem
    }

    fn insert(&self, labels: &LabelPair, png: &[u8]) -> StoreResult<SampleId> {
        let segment = labels.key_safe().dataset_label();
        let dir = self.root.join(&segment);
        std::fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        let name = format!("{}.png", Uuid::new_v4());
        let path = dir.join(&name);
        let tmp = dir.join(format!(".{name}.tmp"));
        if let Err(e) = write_synced(&tmp, png).and_then(|()| std::fs::rename(&tmp, &path)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&path)(e));
        }
        Ok(SampleId::new(format!("{segment}/{name}")))
    }

    fn index(&self) -> StoreResult<LabelIndex> {
        let mut index = LabelIndex::new();
        for entry in sorted_entries(&self.root).map_err(io_err(&self.root))? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let labels = name.to_str().and_then(|segment| {
                LabelPair::from_key_segment(segment).map(|labels| (segment.to_owned(), labels))
            });
            match labels {
                Some((segment, labels)) => self.push_label_dir(&mut index, labels, &segment, &path),
                None => tracing::warn!(dir = %path.display(), "skipping directory not named {{shape}}_{{color}}"),
            }
        }
        Ok(index)
    }

    fn load(&self, id: &SampleId) -> StoreResult<Vec<u8>> {
        let path = self.resolve(id)?;
        std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound { id: id.to_string() }
            } else {
                StoreError::Io {
                    path: path.display().to_string(),
                    source,
                }
            }
        })
    }
}
