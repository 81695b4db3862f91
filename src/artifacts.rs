//! The two exported dataset files, `X.npy` (images) and `y.npy` (labels).
//!
//! Both are replaced wholesale on every export. Each is written to a temporary
//! sibling and renamed into place, so a concurrent download sees either the
//! previous file or the new one.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::dataset::{self, BuildReport, Dataset, DatasetOptions};
use crate::error::DatasetError;
use crate::store::SampleStore;

pub const IMAGES_FILE: &str = "X.npy";
pub const LABELS_FILE: &str = "y.npy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Images,
    Labels,
}

impl Artifact {
    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::Images => IMAGES_FILE,
            Artifact::Labels => LABELS_FILE,
        }
    }
}

/// Location of the output artifacts.
#[derive(Debug, Clone)]
pub struct Artifacts {
    dir: PathBuf,
}

impl Artifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    /// Overwrite both artifacts with `dataset`.
    pub fn write(&self, dataset: &Dataset) -> Result<(), DatasetError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| DatasetError::ArtifactWrite {
            path: self.dir.display().to_string(),
            source,
        })?;
        self.replace(Artifact::Images, |w| dataset.write_images(w))?;
        self.replace(Artifact::Labels, |w| dataset.write_labels(w))
    }

    fn replace<F>(&self, artifact: Artifact, encode: F) -> Result<(), DatasetError>
    where
        F: FnOnce(&mut BufWriter<File>) -> Result<(), DatasetError>,
    {
        let target = self.path(artifact);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", artifact.file_name(), Uuid::new_v4()));
        let write_err = |source: std::io::Error| DatasetError::ArtifactWrite {
            path: target.display().to_string(),
            source,
        };

        let result = File::create(&tmp).map_err(write_err).and_then(|file| {
            let mut w = BufWriter::new(file);
            encode(&mut w)?;
            w.flush().map_err(write_err)?;
            w.get_ref().sync_all().map_err(write_err)
        });
        let result = result.and_then(|()| std::fs::rename(&tmp, &target).map_err(write_err));
        if result.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        result
    }

    /// Contents of `artifact`, or `None` if it has never been generated.
    pub fn read(&self, artifact: Artifact) -> Result<Option<Vec<u8>>, DatasetError> {
        let path = self.path(artifact);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(DatasetError::ArtifactRead {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Build the dataset from `store` and overwrite both artifacts.
    pub fn export(
        &self,
        store: &dyn SampleStore,
        options: &DatasetOptions,
    ) -> Result<BuildReport, DatasetError> {
        let (dataset, report) = dataset::build(store, options)?;
        self.write(&dataset)?;
        tracing::info!(
            dir = %self.dir.display(),
            samples = report.samples,
            "artifacts written"
        );
        Ok(report)
    }
}
