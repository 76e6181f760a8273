//! Run configuration: dataset roots, weight/log paths and hyperparameters.
//!
//! Values come from an optional TOML file (`mvcnn.toml`, or the path in
//! `MVCNN_CONFIG`). Every key is optional and falls back to the defaults
//! below. The resolved struct is passed explicitly to every driver.

use models::{InputShape, MultiViewCnnConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use view_dataset::{GeneratorConfig, Normalize};

pub const DEFAULT_CONFIG_NAME: &str = "mvcnn.toml";
pub const CONFIG_ENV: &str = "MVCNN_CONFIG";

#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    /// Validation samples drawn after each epoch (capped at the set size).
    pub val_samples: usize,
    pub num_workers: usize,
    pub seed: Option<u64>,
    /// ReduceLrOnPlateau settings.
    pub lr_factor: f64,
    pub lr_patience: usize,
    pub min_lr: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 2,
            batch_size: 32,
            learning_rate: 1e-3,
            momentum: 0.9,
            val_samples: 1000,
            num_workers: 2,
            seed: None,
            lr_factor: 0.1,
            lr_patience: 0,
            min_lr: 1e-4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MvcnnConfig {
    pub train_dir: PathBuf,
    pub valid_dir: PathBuf,
    /// Model weights; the recorder stores them with a `.bin` extension.
    pub model_weights: PathBuf,
    /// Pretrained backbone record, loaded before training when set.
    pub backbone_weights: Option<PathBuf>,
    /// CSV metrics log.
    pub log_file: PathBuf,
    pub image_size: usize,
    pub num_classes: usize,
    pub normalize: Normalize,
    /// 0 silent, 1 per-batch progress, 2 one line per epoch.
    pub verbose: u8,
    pub training: TrainConfig,
}

impl Default for MvcnnConfig {
    fn default() -> Self {
        Self {
            train_dir: PathBuf::from("data/train"),
            valid_dir: PathBuf::from("data/valid"),
            model_weights: PathBuf::from("checkpoints/mvcnn"),
            backbone_weights: None,
            log_file: PathBuf::from("logs/training.csv"),
            image_size: 224,
            num_classes: 40,
            normalize: Normalize::IMAGENET,
            verbose: 1,
            training: TrainConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    train_dir: Option<String>,
    valid_dir: Option<String>,
    model_weights: Option<String>,
    backbone_weights: Option<String>,
    log_file: Option<String>,
    image_size: Option<usize>,
    num_classes: Option<usize>,
    image_mean: Option<[f32; 3]>,
    image_std: Option<[f32; 3]>,
    verbose: Option<u8>,
    training: Option<TrainingSection>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TrainingSection {
    epochs: Option<usize>,
    batch_size: Option<usize>,
    learning_rate: Option<f64>,
    momentum: Option<f64>,
    val_samples: Option<usize>,
    num_workers: Option<usize>,
    seed: Option<u64>,
    lr_factor: Option<f64>,
    lr_patience: Option<usize>,
    min_lr: Option<f64>,
}

impl MvcnnConfig {
    /// Resolve the config: explicit path, then `MVCNN_CONFIG`, then
    /// `mvcnn.toml` in the working directory, then defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_path(Path::new(&path));
        }
        let default = Path::new(DEFAULT_CONFIG_NAME);
        if default.exists() {
            return Self::from_path(default);
        }
        let cfg = Self::default();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
        Self::from_toml_str(&raw)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let file: ConfigFile = toml::from_str(raw)?;
        let cfg = Self::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let normalize = Normalize::new(
            file.image_mean.unwrap_or(defaults.normalize.mean),
            file.image_std.unwrap_or(defaults.normalize.std),
        )?;
        let t = file.training.unwrap_or_default();
        let td = defaults.training;
        Ok(Self {
            train_dir: file
                .train_dir
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.train_dir),
            valid_dir: file
                .valid_dir
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.valid_dir),
            model_weights: file
                .model_weights
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.model_weights),
            backbone_weights: file
                .backbone_weights
                .filter(|v| !v.trim().is_empty())
                .map(|v| expand_path(&v)),
            log_file: file
                .log_file
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.log_file),
            image_size: file.image_size.unwrap_or(defaults.image_size),
            num_classes: file.num_classes.unwrap_or(defaults.num_classes),
            normalize,
            verbose: file.verbose.unwrap_or(defaults.verbose),
            training: TrainConfig {
                epochs: t.epochs.unwrap_or(td.epochs),
                batch_size: t.batch_size.unwrap_or(td.batch_size),
                learning_rate: t.learning_rate.unwrap_or(td.learning_rate),
                momentum: t.momentum.unwrap_or(td.momentum),
                val_samples: t.val_samples.unwrap_or(td.val_samples),
                num_workers: t.num_workers.unwrap_or(td.num_workers),
                seed: t.seed.or(td.seed),
                lr_factor: t.lr_factor.unwrap_or(td.lr_factor),
                lr_patience: t.lr_patience.unwrap_or(td.lr_patience),
                min_lr: t.min_lr.unwrap_or(td.min_lr),
            },
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_classes == 0 {
            anyhow::bail!("num_classes must be at least 1");
        }
        let (h, w) = self
            .model_config()
            .backbone
            .output_hw(self.image_size, self.image_size);
        if h == 0 || w == 0 {
            anyhow::bail!(
                "image_size {} is too small for the backbone's pooling stages",
                self.image_size
            );
        }
        if self.training.batch_size == 0 {
            anyhow::bail!("training.batch_size must be at least 1");
        }
        if self.training.val_samples == 0 {
            anyhow::bail!("training.val_samples must be at least 1");
        }
        let lr = self.training.learning_rate;
        if !lr.is_finite() || lr <= 0.0 {
            anyhow::bail!("training.learning_rate must be positive, got {lr}");
        }
        let factor = self.training.lr_factor;
        if !(factor > 0.0 && factor < 1.0) {
            anyhow::bail!("training.lr_factor must be in (0, 1), got {factor}");
        }
        if self.verbose > 2 {
            anyhow::bail!("verbose must be 0, 1 or 2, got {}", self.verbose);
        }
        Ok(())
    }

    /// Model shape for this run; head sizes keep their defaults.
    pub fn model_config(&self) -> MultiViewCnnConfig {
        MultiViewCnnConfig {
            input: InputShape::square_rgb(self.image_size),
            num_classes: self.num_classes,
            ..Default::default()
        }
    }

    pub fn generator_config(&self, batch_size: usize, shuffle: bool) -> GeneratorConfig {
        GeneratorConfig {
            batch_size,
            shuffle,
            seed: self.training.seed,
            image_size: self.image_size as u32,
            num_classes: self.num_classes,
            normalize: self.normalize,
            num_workers: self.training.num_workers,
        }
    }
}

fn expand_path(raw: &str) -> PathBuf {
    if let Some(stripped) = raw.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(format!("{home}{stripped}"));
        }
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = MvcnnConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, MvcnnConfig::default());
        assert_eq!(cfg.training.epochs, 2);
        assert_eq!(cfg.training.val_samples, 1000);
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = MvcnnConfig::from_toml_str(
            r#"
            train_dir = "views/train"
            num_classes = 10
            image_mean = [0.5, 0.5, 0.5]
            image_std = [0.25, 0.25, 0.25]
            verbose = 2

            [training]
            batch_size = 8
            seed = 42
            "#,
        )
        .unwrap();
        assert_eq!(cfg.train_dir, PathBuf::from("views/train"));
        assert_eq!(cfg.valid_dir, PathBuf::from("data/valid"));
        assert_eq!(cfg.num_classes, 10);
        assert_eq!(cfg.normalize.std, [0.25; 3]);
        assert_eq!(cfg.verbose, 2);
        assert_eq!(cfg.training.batch_size, 8);
        assert_eq!(cfg.training.seed, Some(42));
        assert_eq!(cfg.training.momentum, 0.9);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(MvcnnConfig::from_toml_str("nmu_classes = 3").is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(MvcnnConfig::from_toml_str("num_classes = 0").is_err());
        assert!(MvcnnConfig::from_toml_str("image_std = [1.0, 0.0, 1.0]").is_err());
        assert!(MvcnnConfig::from_toml_str("[training]\nbatch_size = 0").is_err());
        assert!(MvcnnConfig::from_toml_str("verbose = 3").is_err());
        assert!(MvcnnConfig::from_toml_str("[training]\nval_samples = 0").is_err());
    }

    #[test]
    fn image_size_must_survive_every_pool() {
        assert!(MvcnnConfig::from_toml_str("image_size = 16\nnum_classes = 2").is_err());
        assert!(MvcnnConfig::from_toml_str("image_size = 0").is_err());
        let cfg = MvcnnConfig::from_toml_str("image_size = 32\nnum_classes = 2").unwrap();
        assert_eq!(cfg.image_size, 32);
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expand_path("~/views"), PathBuf::from(format!("{home}/views")));
        }
        assert_eq!(expand_path("views"), PathBuf::from("views"));
    }

    #[test]
    fn model_config_follows_image_size() {
        let cfg = MvcnnConfig {
            image_size: 64,
            num_classes: 7,
            ..Default::default()
        };
        let model = cfg.model_config();
        assert_eq!(model.input, InputShape::square_rgb(64));
        assert_eq!(model.num_classes, 7);
        assert!(model.include_top);
    }
}
