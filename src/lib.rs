// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # sketchset
//!
//! Collects hand-drawn, labeled sketches from a browser canvas and exports
//! them as a NumPy image dataset.
//!
//! ## Architecture
//!
//! - **Labels** (`label`): (shape, color) pairs and key-safe rendering
//! - **Storage** (`store`): relational (redb), bucket (DashMap) and filesystem backends
//!   behind the [`store::SampleStore`] trait
//! - **Uploads** (`upload`): data-URL decoding and persistence
//! - **Dataset** (`dataset`): decode, force RGB, stack and concatenate; `.npy` encoding
//! - **Artifacts** (`artifacts`): atomic `X.npy` / `y.npy` output
//! - **Server** (`server`, feature `server`): axum routes for the drawing page and exports
//!
//! ## Library usage
//!
//! ```no_run
//! use sketchset::artifacts::Artifacts;
//! use sketchset::dataset::DatasetOptions;
//! use sketchset::store::{self, Backend};
//! use sketchset::upload::{self, Upload};
//!
//! let store = store::open(Backend::Relational, "data".as_ref()).unwrap();
//! let upload = Upload {
//!     shape: "bandera".into(),
//!     color: "roja".into(),
//!     image: "data:image/png;base64,iVBORw0KGgo=".into(),
//! };
//! upload::accept(store.as_ref(), &upload).unwrap();
//! let report = Artifacts::new(".")
//!     .export(store.as_ref(), &DatasetOptions::default())
//!     .unwrap();
//! println!("{} samples exported", report.samples);
//! ```

pub mod artifacts;
pub mod config;
pub mod dataset;
pub mod error;
pub mod label;
#[cfg(feature = "server")]
pub mod server;
pub mod store;
pub mod upload;
