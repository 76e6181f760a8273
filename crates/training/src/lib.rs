#![recursion_limit = "256"]

pub mod callbacks;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod evaluate;
pub mod metrics;
pub mod train;

pub use callbacks::{
    build_callbacks, Callback, CsvLogger, EpochControl, ModelCheckpoint, ReduceLrOnPlateau,
};
pub use checkpoint::{
    load_backbone_weights, load_weights, load_weights_if_present, save_weights, weights_file,
};
pub use config::{MvcnnConfig, TrainConfig};
pub use evaluate::{evaluate, test};
pub use metrics::{ConfusionMatrix, EpochLogs};
pub use models::{load_model, MultiViewCnn, MultiViewCnnConfig};
pub use train::{fit, train, TrainHistory};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn::backend::NdArray<f32>;

pub type ADBackend = burn::backend::Autodiff<TrainBackend>;

/// Install the `tracing` subscriber used by the binaries (`RUST_LOG`, default `info`).
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
