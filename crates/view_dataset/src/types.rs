//! Core types and error definitions for view_dataset.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no samples found under {0}")]
    EmptyDataset(PathBuf),
    #[error("found {found} class directories under {root}, expected {expected}")]
    ClassCountMismatch {
        root: PathBuf,
        found: usize,
        expected: usize,
    },
    #[error("label {label} out of range for {num_classes} classes")]
    LabelOutOfRange { label: usize, num_classes: usize },
    #[error("{0}")]
    Other(String),
}

/// One labeled image on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleIndex {
    pub path: PathBuf,
    pub label: usize,
}

/// A decoded, normalized view in CHW layout.
#[derive(Debug, Clone)]
pub struct ViewSample {
    pub image_chw: Vec<f32>,
    pub label: usize,
}

pub struct ImageBatch<B: Backend> {
    /// Shape `[n, 3, H, W]`.
    pub images: Tensor<B, 4>,
    /// One-hot targets, shape `[n, num_classes]`.
    pub targets: Tensor<B, 2>,
    /// Class index per sample, same order as `images`.
    pub labels: Vec<usize>,
}

impl<B: Backend> ImageBatch<B> {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
