//! Dataset assembly: every stored sample becomes one `H x W x 3` slab of the
//! image tensor, with its `"{shape}_{color}"` label at the same position in the
//! label vector.
//!
//! Samples are decoded group by group in [`LabelIndex`](crate::store::LabelIndex)
//! order. Per-sample load or decode failures are logged and skipped; a sample
//! whose dimensions differ from the first decoded one aborts the build, since
//! the tensor cannot be stacked.

pub mod npy;

use std::io::Write;

use image::RgbImage;
use serde::Serialize;

use crate::error::DatasetError;
use crate::store::{SampleId, SampleStore};

/// Channels per pixel in the image tensor.
pub const CHANNELS: usize = 3;

/// Canvas size of the drawing page, used for the shape of an empty dataset.
pub const DEFAULT_CANVAS_SIZE: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetOptions {
    /// Height recorded in the tensor shape when there are no samples.
    pub empty_height: u32,
    /// Width recorded in the tensor shape when there are no samples.
    pub empty_width: u32,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            empty_height: DEFAULT_CANVAS_SIZE,
            empty_width: DEFAULT_CANVAS_SIZE,
        }
    }
}

/// Image tensor plus the index-aligned label vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    images: Vec<u8>,
    labels: Vec<String>,
    height: u32,
    width: u32,
}

impl Dataset {
    /// A dataset with no samples and the given per-image dimensions.
    pub fn empty(height: u32, width: u32) -> Self {
        Self {
            images: Vec::new(),
            labels: Vec::new(),
            height,
            width,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// `(N, H, W, 3)`.
    pub fn shape(&self) -> [usize; 4] {
        [
            self.len(),
            self.height as usize,
            self.width as usize,
            CHANNELS,
        ]
    }

    /// The whole tensor, C order.
    pub fn images(&self) -> &[u8] {
        &self.images
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Pixels of the `i`-th image, row-major RGB.
    pub fn image(&self, i: usize) -> Option<&[u8]> {
        let stride = self.image_stride();
        self.images.get(i * stride..(i + 1) * stride)
    }

    fn image_stride(&self) -> usize {
        self.height as usize * self.width as usize * CHANNELS
    }

    /// Encode the image tensor as a `|u1` npy array.
    pub fn write_images<W: Write>(&self, w: W) -> Result<(), DatasetError> {
        npy::write_u8(w, &self.shape(), &self.images)
    }

    /// Encode the label vector as a `<U{n}` npy array.
    pub fn write_labels<W: Write>(&self, w: W) -> Result<(), DatasetError> {
        npy::write_unicode(w, &self.labels)
    }
}

/// Summary of one build, for logging and the HTTP response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Samples that made it into the dataset.
    pub samples: usize,
    /// Samples that failed to load or decode.
    pub skipped: usize,
    /// `(dataset label, samples included)` per label group, in tensor order.
    pub groups: Vec<(String, usize)>,
    pub height: u32,
    pub width: u32,
}

/// Decode a stored blob to 8-bit RGB, dropping any alpha channel.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, image::ImageError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

fn load_rgb(store: &dyn SampleStore, id: &SampleId) -> Option<RgbImage> {
    let bytes = match store.load(id) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(id = %id, error = %e, "skipping sample that failed to load");
            return None;
        }
    };
    match decode_rgb(&bytes) {
        Ok(img) => Some(img),
        Err(e) => {
            tracing::warn!(id = %id, error = %e, "skipping sample that failed to decode");
            None
        }
    }
}

/// Build the full dataset from the current contents of `store`.
pub fn build(
    store: &dyn SampleStore,
    options: &DatasetOptions,
) -> Result<(Dataset, BuildReport), DatasetError> {
    let index = store.index()?;
    let mut dims: Option<(u32, u32)> = None;
    let mut images = Vec::new();
    let mut labels = Vec::new();
    let mut report = BuildReport::default();

    for group in index.groups() {
        let label = group.labels.dataset_label();
        let mut stacked = Vec::new();
        let mut count = 0;

        for id in &group.samples {
            let Some(img) = load_rgb(store, id) else {
                report.skipped += 1;
                continue;
            };
            let (width, height) = img.dimensions();
            match dims {
                None => dims = Some((height, width)),
                Some((h, w)) if (h, w) != (height, width) => {
                    return Err(DatasetError::ShapeMismatch {
                        id: id.to_string(),
                        expected_height: h,
                        expected_width: w,
                        actual_height: height,
                        actual_width: width,
                    });
                }
                Some(_) => {}
            }
            tracing::debug!(id = %id, label = %label, "sample decoded");
            stacked.extend_from_slice(img.as_raw());
            count += 1;
        }

        images.append(&mut stacked);
        labels.extend(std::iter::repeat_n(label.clone(), count));
        report.groups.push((label, count));
    }

    let (height, width) = dims.unwrap_or((options.empty_height, options.empty_width));
    report.samples = labels.len();
    report.height = height;
    report.width = width;

    let dataset = Dataset {
        images,
        labels,
        height,
        width,
    };
    debug_assert_eq!(dataset.images.len(), dataset.len() * dataset.image_stride());
    tracing::info!(
        samples = report.samples,
        skipped = report.skipped,
        groups = report.groups.len(),
        shape = ?dataset.shape(),
        "dataset built"
    );
    Ok((dataset, report))
}
