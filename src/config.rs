//! Server and export configuration.
//!
//! Precedence, lowest first: built-in defaults, an optional TOML file,
//! `SKETCHSET_*` environment variables, then CLI flags (applied by the binary).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::artifacts::Artifacts;
use crate::dataset::{DEFAULT_CANVAS_SIZE, DatasetOptions};
use crate::error::{ConfigError, SketchResult};
use crate::store::Backend;

pub const ENV_BIND: &str = "SKETCHSET_BIND";
pub const ENV_PORT: &str = "SKETCHSET_PORT";
pub const ENV_BACKEND: &str = "SKETCHSET_BACKEND";
pub const ENV_DATA_DIR: &str = "SKETCHSET_DATA_DIR";
pub const ENV_OUTPUT_DIR: &str = "SKETCHSET_OUTPUT_DIR";

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Interface the HTTP server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Where samples are stored.
    #[serde(default)]
    pub backend: Backend,
    /// Root for the relational and filesystem backends.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Directory receiving `X.npy` and `y.npy`.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Image height recorded for an empty dataset.
    #[serde(default = "default_canvas_size")]
    pub empty_height: u32,
    /// Image width recorded for an empty dataset.
    #[serde(default = "default_canvas_size")]
    pub empty_width: u32,
    /// Request body limit for uploads.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_canvas_size() -> u32 {
    DEFAULT_CANVAS_SIZE
}
fn default_max_upload_bytes() -> usize {
    8 * 1024 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            backend: Backend::default(),
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
            empty_height: default_canvas_size(),
            empty_width: default_canvas_size(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Config {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Defaults, overlaid with `path` if given, then the process environment.
    pub fn resolve(path: Option<&Path>) -> SketchResult<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values found through `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup(ENV_BIND) {
            self.bind = bind;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_PORT.into(),
                value: port.clone(),
            })?;
        }
        if let Some(backend) = lookup(ENV_BACKEND) {
            self.backend = backend.parse()?;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_OUTPUT_DIR) {
            self.output_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// `bind:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn dataset_options(&self) -> DatasetOptions {
        DatasetOptions {
            empty_height: self.empty_height,
            empty_width: self.empty_width,
        }
    }

    pub fn artifacts(&self) -> Artifacts {
        Artifacts::new(&self.output_dir)
    }
}
