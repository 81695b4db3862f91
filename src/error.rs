//! Rich diagnostic error types for sketchset.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so operators know exactly
//! what went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the CLI or the HTTP layer.
#[derive(Debug, Error, Diagnostic)]
pub enum SketchError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Upload errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum UploadError {
    #[error("missing form field: {field}")]
    #[diagnostic(
        code(sketch::upload::missing_field),
        help("The upload form must carry `poligono`, `color` and `myImage` fields.")
    )]
    MissingField { field: String },

    #[error("image payload is not valid base64: {message}")]
    #[diagnostic(
        code(sketch::upload::base64),
        help(
            "The image must be a data URL such as `data:image/png;base64,iVBOR...` \
             or a bare standard-alphabet base64 string."
        )
    )]
    Base64 { message: String },

    #[error("image payload is empty")]
    #[diagnostic(
        code(sketch::upload::empty),
        help("The canvas was serialised to an empty string. Draw something and submit again.")
    )]
    EmptyPayload,

    #[error("malformed form body: {message}")]
    #[diagnostic(
        code(sketch::upload::form),
        help("Post the form as multipart/form-data or application/x-www-form-urlencoded.")
    )]
    Form { message: String },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    #[diagnostic(
        code(sketch::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(sketch::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             This may indicate corruption; try a fresh data directory. \
             If the problem persists, file a bug report."
        )
    )]
    Redb { message: String },

    #[error("sample not found: {id}")]
    #[diagnostic(
        code(sketch::store::not_found),
        help("The sample id does not exist in this backend. Rebuild the index and retry.")
    )]
    NotFound { id: String },

    #[error("invalid sample id: {id}")]
    #[diagnostic(
        code(sketch::store::invalid_id),
        help("Sample ids are produced by the backend that stored them; do not construct them by hand.")
    )]
    InvalidId { id: String },
}

// ---------------------------------------------------------------------------
// Dataset errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DatasetError {
    #[error(
        "image {id} is {actual_height}x{actual_width}, expected {expected_height}x{expected_width}"
    )]
    #[diagnostic(
        code(sketch::dataset::shape_mismatch),
        help(
            "All samples must share the same canvas size to be stacked. \
             Remove the offending sample or re-draw it on the standard canvas."
        )
    )]
    ShapeMismatch {
        id: String,
        expected_height: u32,
        expected_width: u32,
        actual_height: u32,
        actual_width: u32,
    },

    #[error("failed to write artifact {path}: {source}")]
    #[diagnostic(
        code(sketch::dataset::artifact_write),
        help("Ensure the output directory exists and is writable.")
    )]
    ArtifactWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read artifact {path}: {source}")]
    #[diagnostic(
        code(sketch::dataset::artifact_read),
        help("Run `sketchset prepare` or GET /prepare to generate the artifacts first.")
    )]
    ArtifactRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed npy header: {message}")]
    #[diagnostic(
        code(sketch::dataset::npy_header),
        help(
            "The file is not a NumPy format 1.0 array written by this tool, \
             or its header would exceed 65535 bytes."
        )
    )]
    NpyHeader { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(sketch::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(sketch::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("unknown storage backend: \"{name}\"")]
    #[diagnostic(
        code(sketch::config::backend),
        help("Valid backends are: relational, bucket, filesystem.")
    )]
    UnknownBackend { name: String },

    #[error("invalid value for {key}: \"{value}\"")]
    #[diagnostic(
        code(sketch::config::invalid_value),
        help("Check the environment variable or CLI flag for {key}.")
    )]
    InvalidValue { key: String, value: String },
}

/// Convenience alias for functions returning sketchset results.
pub type SketchResult<T> = std::result::Result<T, SketchError>;
