//! Shared command-line arguments for the `train` and `eval` binaries.

use crate::config::MvcnnConfig;
use clap::{Args, ValueEnum};
use std::path::PathBuf;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    #[value(name = "ndarray")]
    NdArray,
    Wgpu,
}

/// Overrides applied on top of the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Config file (defaults to $MVCNN_CONFIG, then ./mvcnn.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
    /// Validation image tree (one directory per class).
    #[arg(long)]
    pub valid_dir: Option<PathBuf>,
    /// Model weights path.
    #[arg(long)]
    pub weights: Option<PathBuf>,
    /// Number of classes.
    #[arg(long)]
    pub num_classes: Option<usize>,
    /// Square input size in pixels.
    #[arg(long)]
    pub image_size: Option<usize>,
    /// 0 silent, 1 per-batch progress, 2 one line per epoch.
    #[arg(long)]
    pub verbose: Option<u8>,
}

impl CommonArgs {
    pub fn resolve(&self) -> anyhow::Result<MvcnnConfig> {
        validate_backend_choice(self.backend.unwrap_or(BackendKind::NdArray))?;
        let mut cfg = MvcnnConfig::load(self.config.as_deref())?;
        if let Some(dir) = &self.valid_dir {
            cfg.valid_dir = dir.clone();
        }
        if let Some(path) = &self.weights {
            cfg.model_weights = path.clone();
        }
        if let Some(n) = self.num_classes {
            cfg.num_classes = n;
        }
        if let Some(size) = self.image_size {
            cfg.image_size = size;
        }
        if let Some(v) = self.verbose {
            cfg.verbose = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            tracing::warn!("built with backend-wgpu; the WGPU backend is used despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mvcnn.toml");
        std::fs::write(&path, "num_classes = 10\nverbose = 2\n").unwrap();
        let args = CommonArgs {
            config: Some(path),
            num_classes: Some(3),
            weights: Some(PathBuf::from("w/mvcnn")),
            ..Default::default()
        };
        let cfg = args.resolve().unwrap();
        assert_eq!(cfg.num_classes, 3);
        assert_eq!(cfg.verbose, 2);
        assert_eq!(cfg.model_weights, PathBuf::from("w/mvcnn"));
    }

    #[test]
    fn backend_names_match_the_error_hint() {
        assert_eq!(
            BackendKind::from_str("ndarray", false),
            Ok(BackendKind::NdArray)
        );
        assert_eq!(BackendKind::from_str("wgpu", false), Ok(BackendKind::Wgpu));
        assert!(BackendKind::from_str("nd-array", false).is_err());
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let args = CommonArgs {
            config: Some(PathBuf::from("/nonexistent/mvcnn.toml")),
            ..Default::default()
        };
        assert!(args.resolve().is_err());
    }
}
