//! Fine-tuning driver: SGD over a streaming training source with a capped
//! validation pass after each epoch.

use crate::callbacks::{build_callbacks, Callback, EpochControl};
use crate::checkpoint::save_weights;
use crate::config::{MvcnnConfig, TrainConfig};
use crate::metrics::{argmax_rows, scalar_value, to_f32_vec, EpochLogs, RunningMetrics};
use burn::module::AutodiffModule;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::optim::momentum::MomentumConfig;
use burn::optim::{GradientsParams, Optimizer, SgdConfig};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Int, Tensor, TensorData};
use models::MultiViewCnn;
use std::path::{Path, PathBuf};
use view_dataset::{BatchSource, DataGenerator};

#[derive(Debug, Clone, Default)]
pub struct TrainHistory {
    pub epochs: Vec<EpochLogs>,
}

impl TrainHistory {
    pub fn last(&self) -> Option<&EpochLogs> {
        self.epochs.last()
    }
}

/// Train on `cfg.train_dir`, validating on `cfg.valid_dir`.
///
/// With `save_to`, weights are checkpointed every epoch and saved once more
/// on completion; without it nothing but the metrics log is written.
pub fn train<B: AutodiffBackend>(
    model: MultiViewCnn<B>,
    cfg: &MvcnnConfig,
    save_to: Option<&Path>,
    device: &B::Device,
) -> anyhow::Result<(MultiViewCnn<B>, TrainHistory)> {
    let batch = cfg.training.batch_size;
    let mut train_gen = DataGenerator::from_dir(&cfg.train_dir, cfg.generator_config(batch, true))
        .map_err(|e| anyhow::anyhow!("training data {}: {e}", cfg.train_dir.display()))?;
    let mut valid_gen = DataGenerator::from_dir(&cfg.valid_dir, cfg.generator_config(batch, true))
        .map_err(|e| anyhow::anyhow!("validation data {}: {e}", cfg.valid_dir.display()))?;

    if train_gen.classes() != valid_gen.classes() {
        tracing::warn!(
            train = ?train_gen.classes(),
            valid = ?valid_gen.classes(),
            "training and validation class directories differ; labels follow sorted order"
        );
    }
    if cfg.verbose > 0 {
        for (label, name) in train_gen.classes().iter().enumerate() {
            tracing::info!(label, class = %name, "class mapping");
        }
    }

    println!("{} training samples.", train_gen.num_samples());
    println!("{} validation samples.", valid_gen.num_samples());

    let callbacks = build_callbacks(cfg, save_to);
    let (model, history) = fit(
        model,
        &mut train_gen,
        &mut valid_gen,
        &cfg.training,
        cfg.verbose,
        callbacks,
        device,
    )?;

    if let Some(path) = save_to.filter(|p| !p.as_os_str().is_empty()) {
        let written = save_weights(&model, path)?;
        tracing::info!(path = %written.display(), "saved final weights");
    }
    Ok((model, history))
}

/// The training loop proper, over any pair of batch sources.
pub fn fit<B, S, V>(
    mut model: MultiViewCnn<B>,
    train_src: &mut S,
    valid_src: &mut V,
    cfg: &TrainConfig,
    verbose: u8,
    mut callbacks: Vec<Box<dyn Callback>>,
    device: &B::Device,
) -> anyhow::Result<(MultiViewCnn<B>, TrainHistory)>
where
    B: AutodiffBackend,
    S: BatchSource,
    V: BatchSource,
{
    if !model.include_top() {
        anyhow::bail!("cannot train a model without its classification top");
    }
    if train_src.num_classes() != valid_src.num_classes() {
        anyhow::bail!(
            "training source has {} classes, validation source has {}",
            train_src.num_classes(),
            valid_src.num_classes()
        );
    }

    let mut optim = SgdConfig::new()
        .with_momentum(Some(
            MomentumConfig::new()
                .with_momentum(cfg.momentum)
                .with_dampening(0.0),
        ))
        .init();
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let valid_loss: CrossEntropyLoss<B::InnerBackend> = CrossEntropyLossConfig::new().init(device);
    let num_classes = train_src.num_classes();
    let mut lr = cfg.learning_rate;
    let mut history = TrainHistory::default();

    for cb in callbacks.iter_mut() {
        cb.on_train_begin()?;
    }

    for epoch in 1..=cfg.epochs {
        let steps = train_src.batches_per_epoch();
        let report_every = (steps / 10).max(1);
        let mut running = RunningMetrics::default();

        for step in 0..steps {
            let batch = train_src.next_batch::<B>(device)?;
            let n = batch.len();
            let targets = class_targets::<B>(&batch.labels, device);
            let logits = model.forward_logits(batch.images);
            let loss = loss_fn.forward(logits.clone(), targets);

            let loss_val = scalar_value(loss.clone().detach())?;
            let preds = argmax_rows(&to_f32_vec(logits.detach())?, num_classes);
            let correct = count_correct(&preds, &batch.labels);

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(lr, model, grads);

            running.update(loss_val, correct, n);
            if verbose == 1 && ((step + 1) % report_every == 0 || step + 1 == steps) {
                tracing::info!(
                    epoch,
                    batch = step + 1,
                    of = steps,
                    loss = running.loss(),
                    acc = running.accuracy(),
                    "training"
                );
            }
        }

        let valid_model = model.valid();
        let (val_loss, val_acc) =
            validate(&valid_model, &valid_loss, valid_src, cfg.val_samples, device)?;
        let logs = EpochLogs {
            epoch,
            loss: running.loss(),
            acc: running.accuracy(),
            val_loss,
            val_acc,
            lr,
        };
        if verbose > 0 {
            tracing::info!(
                epoch,
                of = cfg.epochs,
                samples = running.samples(),
                loss = logs.loss,
                acc = logs.acc,
                val_loss,
                val_acc,
                lr,
                "epoch complete"
            );
        }

        let save = |path: &Path| -> anyhow::Result<PathBuf> { save_weights(&model, path) };
        let mut ctl = EpochControl::new(lr, &save);
        for cb in callbacks.iter_mut() {
            cb.on_epoch_end(&logs, &mut ctl)?;
        }
        lr = ctl.lr;
        history.epochs.push(logs);
    }

    for cb in callbacks.iter_mut() {
        cb.on_train_end()?;
    }
    Ok((model, history))
}

/// Mean loss and accuracy over at least `max_samples` validation samples
/// (whole batches, capped at one pass).
fn validate<B: Backend, V: BatchSource>(
    model: &MultiViewCnn<B>,
    loss_fn: &CrossEntropyLoss<B>,
    source: &mut V,
    max_samples: usize,
    device: &B::Device,
) -> anyhow::Result<(f64, f64)> {
    let target = max_samples.min(source.num_samples());
    let num_classes = source.num_classes();
    let mut running = RunningMetrics::default();
    while running.samples() < target {
        let batch = source.next_batch::<B>(device)?;
        if batch.is_empty() {
            break;
        }
        let n = batch.len();
        let targets = class_targets::<B>(&batch.labels, device);
        let logits = model.forward_logits(batch.images);
        let loss = loss_fn.forward(logits.clone(), targets);
        let loss_val = scalar_value(loss)?;
        let preds = argmax_rows(&to_f32_vec(logits)?, num_classes);
        running.update(loss_val, count_correct(&preds, &batch.labels), n);
    }
    Ok((running.loss(), running.accuracy()))
}

fn class_targets<B: Backend>(labels: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let data: Vec<i64> = labels.iter().map(|&l| l as i64).collect();
    Tensor::<B, 1, Int>::from_data(TensorData::new(data, [labels.len()]), device)
}

fn count_correct(preds: &[usize], labels: &[usize]) -> usize {
    preds.iter().zip(labels).filter(|(p, t)| p == t).count()
}
