//! VGG-style convolutional feature extractor.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// One stage: `convs` same-padded 3x3 ReLU convolutions, then a 2x2/2 max-pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpec {
    pub channels: usize,
    pub convs: usize,
}

impl BlockSpec {
    pub const fn new(channels: usize, convs: usize) -> Self {
        Self { channels, convs }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackboneConfig {
    pub in_channels: usize,
    pub blocks: Vec<BlockSpec>,
}

impl BackboneConfig {
    /// The 13-convolution VGG16 feature stack (no fully-connected layers).
    pub fn vgg16() -> Self {
        Self {
            in_channels: 3,
            blocks: vec![
                BlockSpec::new(64, 2),
                BlockSpec::new(128, 2),
                BlockSpec::new(256, 3),
                BlockSpec::new(512, 3),
                BlockSpec::new(512, 3),
            ],
        }
    }

    pub fn out_channels(&self) -> usize {
        self.blocks
            .last()
            .map(|b| b.channels)
            .unwrap_or(self.in_channels)
    }

    /// Spatial size after every pooling stage (each pool floors by 2).
    pub fn output_hw(&self, height: usize, width: usize) -> (usize, usize) {
        self.blocks
            .iter()
            .fold((height, width), |(h, w), _| (h / 2, w / 2))
    }

    /// Length of the flattened feature vector for a `height x width` input.
    pub fn flat_features(&self, height: usize, width: usize) -> usize {
        let (h, w) = self.output_hw(height, width);
        self.out_channels() * h * w
    }
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self::vgg16()
    }
}

#[derive(Debug, Module)]
pub struct ConvBlock<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    fn new(in_channels: usize, spec: BlockSpec, device: &B::Device) -> Self {
        let mut convs = Vec::with_capacity(spec.convs);
        let mut channels = in_channels;
        for _ in 0..spec.convs {
            convs.push(
                Conv2dConfig::new([channels, spec.channels], [3, 3])
                    .with_padding(PaddingConfig2d::Same)
                    .init(device),
            );
            channels = spec.channels;
        }
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        Self { convs, pool }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input;
        for conv in &self.convs {
            x = relu(conv.forward(x));
        }
        self.pool.forward(x)
    }

    pub fn convs(&self) -> &[Conv2d<B>] {
        &self.convs
    }
}

#[derive(Debug, Module)]
pub struct Backbone<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
}

impl<B: Backend> Backbone<B> {
    pub fn new(cfg: &BackboneConfig, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(cfg.blocks.len());
        let mut channels = cfg.in_channels;
        for spec in &cfg.blocks {
            blocks.push(ConvBlock::new(channels, *spec, device));
            channels = spec.channels;
        }
        Self { blocks }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks
            .iter()
            .fold(input, |x, block| block.forward(x))
    }

    pub fn blocks(&self) -> &[ConvBlock<B>] {
        &self.blocks
    }

    /// True when no backbone parameter tracks gradients.
    pub fn is_frozen(&self) -> bool {
        self.blocks.iter().all(|block| {
            block
                .convs
                .iter()
                .all(|conv| !conv_requires_grad(conv))
        })
    }
}

pub(crate) fn conv_requires_grad<B: Backend>(conv: &Conv2d<B>) -> bool {
    conv.weight.val().is_require_grad()
        || conv
            .bias
            .as_ref()
            .map(|b| b.val().is_require_grad())
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vgg16_flattens_224_to_25088() {
        let cfg = BackboneConfig::vgg16();
        assert_eq!(cfg.output_hw(224, 224), (7, 7));
        assert_eq!(cfg.flat_features(224, 224), 512 * 7 * 7);
    }

    #[test]
    fn odd_sizes_floor_at_each_pool() {
        let cfg = BackboneConfig {
            in_channels: 3,
            blocks: vec![BlockSpec::new(4, 1), BlockSpec::new(8, 1)],
        };
        // 13 -> 6 -> 3
        assert_eq!(cfg.output_hw(13, 13), (3, 3));
        assert_eq!(cfg.flat_features(13, 13), 8 * 9);
    }
}
