//! Upload handling: data-URL decoding and handoff to the sample store.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use crate::error::{SketchResult, UploadError};
use crate::label::LabelPair;
use crate::store::{SampleId, SampleStore};

/// One submitted drawing.
#[derive(Debug, Clone, Deserialize)]
pub struct Upload {
    pub shape: String,
    pub color: String,
    /// `data:image/png;base64,...` or bare base64.
    pub image: String,
}

impl Upload {
    pub fn labels(&self) -> LabelPair {
        LabelPair::new(self.shape.clone(), self.color.clone())
    }
}

/// Decode a canvas `toDataURL()` value to raw bytes.
///
/// Everything up to the first `,` of a `data:` URL is dropped, ASCII whitespace
/// is ignored, and the rest must be standard-alphabet base64.
pub fn decode_data_url(value: &str) -> Result<Vec<u8>, UploadError> {
    let value = value.trim();
    let payload = match value.strip_prefix("data:") {
        Some(rest) => match rest.split_once(',') {
            Some((_, data)) => data,
            None => {
                return Err(UploadError::Base64 {
                    message: "data URL has no ',' separator".into(),
                });
            }
        },
        None => value,
    };
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(compact).map_err(|e| UploadError::Base64 {
        message: e.to_string(),
    })?;
    if bytes.is_empty() {
        return Err(UploadError::EmptyPayload);
    }
    Ok(bytes)
}

/// Decode `upload` and persist it, returning the new sample's id.
pub fn accept(store: &dyn SampleStore, upload: &Upload) -> SketchResult<SampleId> {
    let png = decode_data_url(&upload.image)?;
    let labels = upload.labels();
    let id = store.insert(&labels, &png)?;
    tracing::info!(label = %labels, id = %id, bytes = png.len(), "sample stored");
    Ok(id)
}
