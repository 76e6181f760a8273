use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use models::MultiViewCnn;
use std::fs;
use std::path::{Path, PathBuf};

pub type WeightsRecorder = BinFileRecorder<FullPrecisionSettings>;

/// Where the recorder actually writes `path` (it forces a `.bin` extension).
pub fn weights_file(path: &Path) -> PathBuf {
    path.with_extension("bin")
}

pub fn save_weights<B: Backend>(model: &MultiViewCnn<B>, path: &Path) -> anyhow::Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let recorder = WeightsRecorder::new();
    model
        .clone()
        .save_file(path.to_path_buf(), &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save weights to {}: {e}", path.display()))?;
    Ok(weights_file(path))
}

/// Load a full model record; the backbone stays frozen afterwards.
pub fn load_weights<B: Backend>(
    model: MultiViewCnn<B>,
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<MultiViewCnn<B>> {
    let recorder = WeightsRecorder::new();
    let model = model
        .load_file(path.to_path_buf(), &recorder, device)
        .map_err(|e| anyhow::anyhow!("failed to load weights from {}: {e}", path.display()))?;
    Ok(model.freeze_backbone())
}

/// Load weights when the file exists; otherwise return the model untouched.
pub fn load_weights_if_present<B: Backend>(
    model: MultiViewCnn<B>,
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<(MultiViewCnn<B>, bool)> {
    if !weights_file(path).exists() {
        tracing::info!(path = %path.display(), "no saved weights; starting from fresh head");
        return Ok((model, false));
    }
    let model = load_weights(model, path, device)?;
    tracing::info!(path = %weights_file(path).display(), "loaded model weights");
    Ok((model, true))
}

/// Load a pretrained backbone record into the model's feature extractor.
pub fn load_backbone_weights<B: Backend>(
    model: MultiViewCnn<B>,
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<MultiViewCnn<B>> {
    let recorder = WeightsRecorder::new();
    let backbone = model
        .backbone()
        .clone()
        .load_file(path.to_path_buf(), &recorder, device)
        .map_err(|e| {
            anyhow::anyhow!("failed to load backbone weights from {}: {e}", path.display())
        })?;
    tracing::info!(path = %weights_file(path).display(), "loaded pretrained backbone");
    Ok(model.with_backbone(backbone))
}
