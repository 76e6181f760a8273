use burn::backend::{Autodiff, NdArray};
use burn::tensor::Tensor;
use models::{load_model, BackboneConfig, BlockSpec, InputShape, LayerKind, MultiViewCnnConfig};

// Keep the CPU backend so shape checks run without a GPU.
type ADBackend = Autodiff<NdArray<f32>>;

fn tiny_config(num_classes: usize) -> MultiViewCnnConfig {
    MultiViewCnnConfig {
        backbone: BackboneConfig {
            in_channels: 3,
            blocks: vec![BlockSpec::new(4, 2), BlockSpec::new(8, 1)],
        },
        input: InputShape::square_rgb(8),
        fc1_units: 16,
        fc2_units: 12,
        dropout: 0.5,
        num_classes,
        include_top: true,
    }
}

#[test]
fn forward_with_top_is_a_distribution() {
    let device = Default::default();
    let model = load_model::<ADBackend>(None, true, &tiny_config(5), &device);

    let input = Tensor::<ADBackend, 4>::ones([2, 3, 8, 8], &device);
    let probs = model.forward(input);
    assert_eq!(probs.dims(), [2, 5]);

    let probs: Vec<f32> = probs.into_data().to_vec::<f32>().unwrap_or_default();
    for row in probs.chunks(5) {
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4, "row sums to {sum}");
        assert!(row.iter().all(|p| *p >= 0.0));
    }
}

#[test]
fn without_top_ends_at_fc2() {
    let device = Default::default();
    let model = load_model::<ADBackend>(None, false, &tiny_config(5), &device);
    assert!(!model.include_top());

    let layers = model.layers();
    let last = layers.last().unwrap();
    assert_eq!(last.name, "fc2");
    assert_eq!(last.kind, LayerKind::Dense);
    assert!(layers.iter().all(|l| l.kind != LayerKind::Softmax));

    let input = Tensor::<ADBackend, 4>::zeros([3, 3, 8, 8], &device);
    assert_eq!(model.forward(input).dims(), [3, 12]);
}

#[test]
fn backbone_is_frozen_and_head_trainable() {
    let device = Default::default();
    for include_top in [true, false] {
        let model = load_model::<ADBackend>(None, include_top, &tiny_config(3), &device);
        assert!(model.backbone().is_frozen());

        let layers = model.layers();
        let convs: Vec<_> = layers
            .iter()
            .filter(|l| l.kind == LayerKind::Conv2d)
            .collect();
        assert_eq!(convs.len(), 3);
        assert!(convs.iter().all(|l| !l.trainable));

        let dense: Vec<_> = layers
            .iter()
            .filter(|l| l.kind == LayerKind::Dense)
            .collect();
        assert_eq!(dense.len(), if include_top { 3 } else { 2 });
        assert!(dense.iter().all(|l| l.trainable));
    }
}

#[test]
fn input_override_changes_flatten_width() {
    let device = Default::default();
    let cfg = tiny_config(2);
    let model = load_model::<ADBackend>(Some(InputShape::square_rgb(16)), true, &cfg, &device);

    let input = Tensor::<ADBackend, 4>::zeros([1, 3, 16, 16], &device);
    assert_eq!(model.forward(input).dims(), [1, 2]);
}

#[test]
fn vgg16_layer_names_follow_blocks() {
    let device = Default::default();
    let cfg = MultiViewCnnConfig {
        input: InputShape::square_rgb(32),
        fc1_units: 8,
        fc2_units: 8,
        num_classes: 4,
        ..Default::default()
    };
    let model = load_model::<ADBackend>(None, true, &cfg, &device);
    let names: Vec<String> = model.layers().into_iter().map(|l| l.name).collect();

    assert_eq!(names.first().map(String::as_str), Some("block1_conv1"));
    assert!(names.contains(&"block3_conv3".to_string()));
    assert!(names.contains(&"block5_pool".to_string()));
    let tail: Vec<&str> = names[names.len() - 6..].iter().map(String::as_str).collect();
    assert_eq!(
        tail,
        ["fc1", "dropout", "fc2", "dropout_1", "predictions", "predictions_softmax"]
    );
}
