use clap::Parser;
use std::path::PathBuf;
use training::cli::CommonArgs;
use training::{
    init_logging, load_backbone_weights, load_model, load_weights_if_present, train, ADBackend,
};

#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Fine-tune the multi-view CNN head on a class-per-directory image tree"
)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
    /// Training image tree (one directory per class).
    #[arg(long)]
    train_dir: Option<PathBuf>,
    /// CSV metrics log path.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Number of epochs.
    #[arg(long)]
    epochs: Option<usize>,
    /// Batch size.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Train without checkpoints or a final weights save.
    #[arg(long, default_value_t = false)]
    no_save: bool,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let mut cfg = args.common.resolve()?;
    if let Some(dir) = args.train_dir {
        cfg.train_dir = dir;
    }
    if let Some(path) = args.log_file {
        cfg.log_file = path;
    }
    if let Some(epochs) = args.epochs {
        cfg.training.epochs = epochs;
    }
    if let Some(batch) = args.batch_size {
        cfg.training.batch_size = batch;
    }
    cfg.validate()?;

    let device = <ADBackend as burn::tensor::backend::Backend>::Device::default();
    let mut model = load_model::<ADBackend>(None, true, &cfg.model_config(), &device);
    if let Some(path) = &cfg.backbone_weights {
        model = load_backbone_weights(model, path, &device)?;
    } else {
        tracing::warn!("no backbone_weights configured; backbone is randomly initialized and frozen");
    }
    let (model, _) = load_weights_if_present(model, &cfg.model_weights, &device)?;

    println!("Log file: {}", cfg.log_file.display());
    let save_to = (!args.no_save).then_some(cfg.model_weights.as_path());
    let (_, history) = train(model, &cfg, save_to, &device)?;

    if let Some(last) = history.last() {
        println!(
            "Training complete: epochs={} loss={:.4} acc={:.3} val_loss={:.4} val_acc={:.3}",
            last.epoch, last.loss, last.acc, last.val_loss, last.val_acc
        );
    }
    Ok(())
}
