use clap::Parser;
use std::path::PathBuf;
use training::cli::CommonArgs;
use training::{init_logging, load_model, load_weights, test, weights_file, TrainBackend};

#[derive(Parser, Debug)]
#[command(
    name = "eval",
    about = "Evaluate multi-view CNN weights on the validation tree (confusion matrix)"
)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
    /// Evaluation batch size.
    #[arg(long, default_value_t = 32)]
    batch_size: usize,
    /// Image decoding threads.
    #[arg(long, default_value_t = 2)]
    workers: usize,
    /// Write the confusion matrix as JSON here.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let cfg = args.common.resolve()?;

    let device = <TrainBackend as burn::tensor::backend::Backend>::Device::default();
    if !weights_file(&cfg.model_weights).exists() {
        anyhow::bail!(
            "no weights at {}; train first or pass --weights",
            weights_file(&cfg.model_weights).display()
        );
    }
    let model = load_model::<TrainBackend>(None, true, &cfg.model_config(), &device);
    let model = load_weights(model, &cfg.model_weights, &device)?;

    let matrix = test(&model, &cfg, args.batch_size, args.workers, &device)?;

    println!(
        "Eval complete: samples={} accuracy={:.4} classes={}",
        matrix.total(),
        matrix.accuracy(),
        matrix.num_classes()
    );
    for (class, recall) in matrix.per_class_recall().into_iter().enumerate() {
        match recall {
            Some(r) => println!("  class {class:>3}: recall={r:.3}"),
            None => println!("  class {class:>3}: no samples"),
        }
    }

    if let Some(path) = args.output {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_vec_pretty(&matrix)?)?;
        println!("Wrote confusion matrix to {}", path.display());
    }
    Ok(())
}
