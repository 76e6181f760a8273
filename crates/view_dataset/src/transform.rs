//! Decode, resize and normalize a single view.

use crate::types::{DatasetError, DatasetResult, SampleIndex, ViewSample};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

/// Per-channel centering: pixels are scaled to `[0, 1]`, then
/// `(x - mean[c]) / std[c]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalize {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalize {
    /// ImageNet statistics used by the VGG16 backbone.
    pub const IMAGENET: Normalize = Normalize {
        mean: [0.485, 0.456, 0.406],
        std: [0.229, 0.224, 0.225],
    };

    pub const IDENTITY: Normalize = Normalize {
        mean: [0.0; 3],
        std: [1.0; 3],
    };

    pub fn new(mean: [f32; 3], std: [f32; 3]) -> DatasetResult<Self> {
        if std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(DatasetError::Other(format!(
                "normalization std must be positive, got {std:?}"
            )));
        }
        Ok(Self { mean, std })
    }

    #[inline]
    pub fn apply(&self, channel: usize, value_u8: u8) -> f32 {
        (value_u8 as f32 / 255.0 - self.mean[channel]) / self.std[channel]
    }

    /// Normalize interleaved RGB bytes into a CHW buffer.
    pub fn rgb_to_chw(&self, width: u32, height: u32, rgb: &[u8]) -> Vec<f32> {
        let pixels = (width * height) as usize;
        let mut out = vec![0.0f32; pixels * 3];
        for (i, px) in rgb.chunks_exact(3).take(pixels).enumerate() {
            for c in 0..3 {
                out[c * pixels + i] = self.apply(c, px[c]);
            }
        }
        out
    }
}

impl Default for Normalize {
    fn default() -> Self {
        Self::IMAGENET
    }
}

/// Load one indexed image as a `size x size` normalized CHW view.
pub fn load_view(idx: &SampleIndex, size: u32, normalize: &Normalize) -> DatasetResult<ViewSample> {
    let img = image::open(&idx.path)
        .map_err(|e| DatasetError::Image {
            path: idx.path.clone(),
            source: e,
        })?
        .to_rgb8();
    let img = if img.dimensions() == (size, size) {
        img
    } else {
        image::imageops::resize(&img, size, size, FilterType::Triangle)
    };
    Ok(ViewSample {
        image_chw: normalize.rgb_to_chw(size, size, img.as_raw()),
        label: idx.label,
    })
}
