//! Confusion-matrix evaluation over one full pass of a batch source.

use crate::config::MvcnnConfig;
use crate::metrics::{argmax_rows, to_f32_vec, ConfusionMatrix};
use burn::tensor::backend::Backend;
use models::MultiViewCnn;
use view_dataset::{BatchSource, DataGenerator};

/// Tally predictions against labels for exactly one pass over `source`.
///
/// The pass is `batches_per_epoch()` batches. The number of tallied
/// samples is checked against `num_samples()`; a mismatch means the source
/// padded, dropped or reshuffled mid-pass, and is reported as an error.
pub fn evaluate<B: Backend, S: BatchSource>(
    model: &MultiViewCnn<B>,
    source: &mut S,
    device: &B::Device,
) -> anyhow::Result<ConfusionMatrix> {
    if !model.include_top() {
        anyhow::bail!("cannot evaluate a model without its classification top");
    }
    let num_classes = source.num_classes();
    let expected = source.num_samples();
    let batches = source.batches_per_epoch();
    let start_index = source.batch_index();
    let mut matrix = ConfusionMatrix::new(num_classes);

    for _ in 0..batches {
        let batch = source.next_batch::<B>(device)?;
        let y_true = argmax_rows(&to_f32_vec(batch.targets)?, num_classes);
        let probs = model.forward(batch.images);
        let cols = probs.dims()[1];
        if cols != num_classes {
            anyhow::bail!("model predicts {cols} classes, dataset has {num_classes}");
        }
        let y_pred = argmax_rows(&to_f32_vec(probs)?, num_classes);
        matrix.accumulate(&y_true, &y_pred)?;
    }

    if source.batch_index() != start_index {
        tracing::warn!(
            start = start_index,
            end = source.batch_index(),
            "batch index did not return to its starting point after one pass"
        );
    }
    let seen = matrix.total();
    if seen != expected as u64 {
        anyhow::bail!("evaluation pass saw {seen} samples, dataset has {expected}");
    }
    Ok(matrix)
}

/// Evaluate on a shuffled generator over `cfg.valid_dir`.
pub fn test<B: Backend>(
    model: &MultiViewCnn<B>,
    cfg: &MvcnnConfig,
    batch_size: usize,
    num_workers: usize,
    device: &B::Device,
) -> anyhow::Result<ConfusionMatrix> {
    let mut gen_cfg = cfg.generator_config(batch_size, true);
    gen_cfg.num_workers = num_workers;
    let mut source = DataGenerator::from_dir(&cfg.valid_dir, gen_cfg)
        .map_err(|e| anyhow::anyhow!("validation data {}: {e}", cfg.valid_dir.display()))?;
    tracing::info!(
        samples = source.num_samples(),
        batches = source.batches_per_epoch(),
        "evaluating"
    );
    evaluate(model, &mut source, device)
}
