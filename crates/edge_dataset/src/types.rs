//! Core types, error definitions, and data structures for edge_dataset.

use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, EdgeDatasetError>;

#[derive(Debug, Error)]
pub enum EdgeDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("download of {url} failed: {msg}")]
    Download { url: String, msg: String },
    #[error("archive decode error at {path}: {msg}")]
    Archive { path: PathBuf, msg: String },
    #[error("archive shape mismatch: {0}")]
    ArchiveShape(String),
    #[error("sample index {index} out of bounds for store of {len} samples")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("image/edge pair mismatch under {root}: {msg}")]
    PairMismatch { root: PathBuf, msg: String },
    #[error("materialized dataset at {root} is incomplete: {msg}")]
    Incomplete { root: PathBuf, msg: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    Other(String),
}

impl EdgeDatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EdgeDatasetError::Io {
            path: path.into(),
            source,
        }
    }
}

/// One loaded training pair after normalization, border crop and transforms.
#[derive(Debug, Clone)]
pub struct EdgeSample {
    pub index: usize,
    /// Image in CHW layout, normalized to [-1, 1].
    pub image_chw: Vec<f32>,
    /// Boundary map in HW layout, normalized to [0, 1].
    pub edges_hw: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

impl EdgeSample {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Random-access collection of samples; the seam between the store and the split manager.
pub trait SampleSource: Send + Sync {
    fn len(&self) -> usize;

    fn load(&self, index: usize) -> DatasetResult<EdgeSample>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed-width file name shared by an image and its boundary map.
pub fn sample_file_name(index: usize) -> String {
    format!("{index:05}.png")
}

pub const IMAGES_DIR: &str = "images";
pub const EDGES_DIR: &str = "edges";
pub const MANIFEST_FILE: &str = "manifest.json";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_zero_padded() {
        assert_eq!(sample_file_name(0), "00000.png");
        assert_eq!(sample_file_name(42), "00042.png");
        assert_eq!(sample_file_name(12345), "12345.png");
    }

    #[test]
    fn out_of_bounds_message_names_index_and_len() {
        let err = EdgeDatasetError::IndexOutOfBounds { index: 4, len: 4 };
        assert_eq!(
            err.to_string(),
            "sample index 4 out of bounds for store of 4 samples"
        );
    }
}
