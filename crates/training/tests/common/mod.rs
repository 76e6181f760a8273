#![allow(dead_code)]

use image::{Rgb, RgbImage};
use models::{BackboneConfig, BlockSpec, InputShape, MultiViewCnnConfig};
use std::fs;
use std::path::Path;
use view_dataset::{GeneratorConfig, Normalize, ViewSample};

pub const IMAGE_SIZE: usize = 4;

/// One conv block on a 4x4 input: 2 channels x 2 x 2 = 8 flat features.
pub fn tiny_model_config(num_classes: usize) -> MultiViewCnnConfig {
    MultiViewCnnConfig {
        backbone: BackboneConfig {
            in_channels: 3,
            blocks: vec![BlockSpec::new(2, 1)],
        },
        input: InputShape::square_rgb(IMAGE_SIZE),
        fc1_units: 8,
        fc2_units: 8,
        dropout: 0.5,
        num_classes,
        include_top: true,
    }
}

pub fn generator_config(num_classes: usize, batch_size: usize, shuffle: bool) -> GeneratorConfig {
    GeneratorConfig {
        batch_size,
        shuffle,
        seed: Some(11),
        image_size: IMAGE_SIZE as u32,
        num_classes,
        normalize: Normalize::IDENTITY,
        num_workers: 1,
    }
}

/// `count` views cycling through the classes, each a deterministic pattern.
pub fn synthetic_views(count: usize, num_classes: usize) -> Vec<ViewSample> {
    let per_image = 3 * IMAGE_SIZE * IMAGE_SIZE;
    (0..count)
        .map(|i| {
            let label = i % num_classes;
            let image_chw = (0..per_image)
                .map(|j| ((i * 31 + j * 7) % 17) as f32 / 17.0)
                .collect();
            ViewSample { image_chw, label }
        })
        .collect()
}

/// Writes `per_class` solid-color views under `root/class_{k}/`.
pub fn write_class_tree(root: &Path, num_classes: usize, per_class: usize) {
    for class in 0..num_classes {
        let dir = root.join(format!("class_{class}"));
        fs::create_dir_all(&dir).unwrap();
        for i in 0..per_class {
            let shade = (40 * class + 10 * i) as u8;
            let img = RgbImage::from_pixel(
                IMAGE_SIZE as u32,
                IMAGE_SIZE as u32,
                Rgb([shade, 255 - shade, (class * 90) as u8]),
            );
            img.save(dir.join(format!("view_{i:02}.png"))).unwrap();
        }
    }
}
