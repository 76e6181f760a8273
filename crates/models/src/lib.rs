//! Burn model definitions for the multi-view CNN classifier.
//!
//! `MultiViewCnn` is a frozen VGG-style feature extractor followed by a small
//! trainable head:
//!
//! ```text
//! backbone (frozen) -> flatten -> fc1 -> dropout -> fc2 [-> dropout_1 -> predictions]
//! ```
//!
//! The bracketed tail is only present when the top is included. Models are
//! pure Burn modules; loading/saving records lives in the `training` crate.

pub mod backbone;

use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::tensor::activation::{relu, softmax};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

pub use backbone::{Backbone, BackboneConfig, BlockSpec, ConvBlock};

/// Shape of one input image, channels first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl InputShape {
    pub const fn square_rgb(size: usize) -> Self {
        Self {
            channels: 3,
            height: size,
            width: size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiViewCnnConfig {
    pub backbone: BackboneConfig,
    pub input: InputShape,
    pub fc1_units: usize,
    pub fc2_units: usize,
    pub dropout: f64,
    pub num_classes: usize,
    pub include_top: bool,
}

impl Default for MultiViewCnnConfig {
    fn default() -> Self {
        Self {
            backbone: BackboneConfig::vgg16(),
            input: InputShape::square_rgb(224),
            fc1_units: 4096,
            fc2_units: 2048,
            dropout: 0.5,
            num_classes: 40,
            include_top: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Conv2d,
    MaxPool2d,
    Flatten,
    Dense,
    Dropout,
    Softmax,
}

/// One node of the layer graph, in forward order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
    pub name: String,
    pub kind: LayerKind,
    pub trainable: bool,
}

#[derive(Debug, Module)]
pub struct MultiViewCnn<B: Backend> {
    backbone: Backbone<B>,
    fc1: Linear<B>,
    dropout: Dropout,
    fc2: Linear<B>,
    dropout_1: Option<Dropout>,
    predictions: Option<Linear<B>>,
}

/// Build a model, optionally overriding the input shape and the top.
///
/// Backbone parameters are always frozen, whatever the arguments.
pub fn load_model<B: Backend>(
    input: Option<InputShape>,
    include_top: bool,
    cfg: &MultiViewCnnConfig,
    device: &B::Device,
) -> MultiViewCnn<B> {
    let cfg = MultiViewCnnConfig {
        input: input.unwrap_or(cfg.input),
        include_top,
        ..cfg.clone()
    };
    MultiViewCnn::new(&cfg, device)
}

impl<B: Backend> MultiViewCnn<B> {
    pub fn new(cfg: &MultiViewCnnConfig, device: &B::Device) -> Self {
        let mut backbone_cfg = cfg.backbone.clone();
        backbone_cfg.in_channels = cfg.input.channels;
        let backbone = Backbone::new(&backbone_cfg, device).no_grad();

        let flat = backbone_cfg.flat_features(cfg.input.height, cfg.input.width);
        let fc1 = LinearConfig::new(flat, cfg.fc1_units).init(device);
        let fc2 = LinearConfig::new(cfg.fc1_units, cfg.fc2_units).init(device);
        let (dropout_1, predictions) = if cfg.include_top {
            (
                Some(DropoutConfig::new(cfg.dropout).init()),
                Some(LinearConfig::new(cfg.fc2_units, cfg.num_classes.max(1)).init(device)),
            )
        } else {
            (None, None)
        };

        Self {
            backbone,
            fc1,
            dropout: DropoutConfig::new(cfg.dropout).init(),
            fc2,
            dropout_1,
            predictions,
        }
    }

    pub fn include_top(&self) -> bool {
        self.predictions.is_some()
    }

    pub fn backbone(&self) -> &Backbone<B> {
        &self.backbone
    }

    /// The classification layer, absent without a top.
    pub fn predictions(&self) -> Option<&Linear<B>> {
        self.predictions.as_ref()
    }

    /// Swap in a (pretrained) backbone; it is frozen on the way in.
    pub fn with_backbone(mut self, backbone: Backbone<B>) -> Self {
        self.backbone = backbone.no_grad();
        self
    }

    /// Re-apply the freeze, e.g. after loading a full record.
    pub fn freeze_backbone(mut self) -> Self {
        self.backbone = self.backbone.no_grad();
        self
    }

    /// Class scores before softmax, or `fc2` features when there is no top.
    pub fn forward_logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(images);
        let x: Tensor<B, 2> = features.flatten(1, 3);
        let x = relu(self.fc1.forward(x));
        let x = self.dropout.forward(x);
        let x = relu(self.fc2.forward(x));
        match (&self.dropout_1, &self.predictions) {
            (Some(dropout), Some(predictions)) => predictions.forward(dropout.forward(x)),
            _ => x,
        }
    }

    /// Softmax probabilities with a top; the `fc2` features otherwise.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.forward_logits(images);
        if self.include_top() {
            softmax(x, 1)
        } else {
            x
        }
    }

    /// The layer graph in forward order, with keras-style names.
    ///
    /// `trainable` mirrors whether the layer's parameters track gradients,
    /// so on a backend without autodiff every layer reports `false`.
    pub fn layers(&self) -> Vec<LayerSummary> {
        let mut layers = Vec::new();
        for (i, block) in self.backbone.blocks().iter().enumerate() {
            for (j, conv) in block.convs().iter().enumerate() {
                layers.push(LayerSummary {
                    name: format!("block{}_conv{}", i + 1, j + 1),
                    kind: LayerKind::Conv2d,
                    trainable: backbone::conv_requires_grad(conv),
                });
            }
            layers.push(LayerSummary {
                name: format!("block{}_pool", i + 1),
                kind: LayerKind::MaxPool2d,
                trainable: false,
            });
        }
        layers.push(LayerSummary {
            name: "flatten".into(),
            kind: LayerKind::Flatten,
            trainable: false,
        });
        layers.push(dense_summary("fc1", &self.fc1));
        layers.push(LayerSummary {
            name: "dropout".into(),
            kind: LayerKind::Dropout,
            trainable: false,
        });
        layers.push(dense_summary("fc2", &self.fc2));
        if self.dropout_1.is_some() {
            layers.push(LayerSummary {
                name: "dropout_1".into(),
                kind: LayerKind::Dropout,
                trainable: false,
            });
        }
        if let Some(predictions) = &self.predictions {
            layers.push(dense_summary("predictions", predictions));
            layers.push(LayerSummary {
                name: "predictions_softmax".into(),
                kind: LayerKind::Softmax,
                trainable: false,
            });
        }
        layers
    }
}

fn dense_summary<B: Backend>(name: &str, linear: &Linear<B>) -> LayerSummary {
    LayerSummary {
        name: name.to_string(),
        kind: LayerKind::Dense,
        trainable: linear.weight.val().is_require_grad(),
    }
}
