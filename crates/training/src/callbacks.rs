//! Training callbacks: CSV metrics log, learning-rate reduction on plateau,
//! per-epoch checkpoints.

use crate::config::MvcnnConfig;
use crate::metrics::EpochLogs;
use std::fs;
use std::path::{Path, PathBuf};

/// What a callback may touch at the end of an epoch.
pub struct EpochControl<'a> {
    /// Learning rate for the next epoch.
    pub lr: f64,
    save: &'a dyn Fn(&Path) -> anyhow::Result<PathBuf>,
}

impl<'a> EpochControl<'a> {
    pub fn new(lr: f64, save: &'a dyn Fn(&Path) -> anyhow::Result<PathBuf>) -> Self {
        Self { lr, save }
    }

    /// Save the current model weights; returns the file written.
    pub fn save_weights(&self, path: &Path) -> anyhow::Result<PathBuf> {
        (self.save)(path)
    }
}

pub trait Callback {
    fn name(&self) -> &'static str;

    fn on_train_begin(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, ctl: &mut EpochControl<'_>)
        -> anyhow::Result<()>;

    fn on_train_end(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes one `epoch,acc,loss,lr,val_acc,val_loss` row per epoch.
pub struct CsvLogger {
    path: PathBuf,
    writer: Option<csv::Writer<fs::File>>,
}

impl CsvLogger {
    pub const HEADER: [&'static str; 6] = ["epoch", "acc", "loss", "lr", "val_acc", "val_loss"];

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }
}

impl Callback for CsvLogger {
    fn name(&self) -> &'static str {
        "csv_logger"
    }

    fn on_train_begin(&mut self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(&self.path).map_err(|e| {
            anyhow::anyhow!("failed to open metrics log {}: {e}", self.path.display())
        })?;
        writer.write_record(Self::HEADER)?;
        writer.flush()?;
        self.writer = Some(writer);
        Ok(())
    }

    fn on_epoch_end(
        &mut self,
        logs: &EpochLogs,
        _ctl: &mut EpochControl<'_>,
    ) -> anyhow::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            anyhow::bail!("metrics log {} was not opened", self.path.display());
        };
        writer.write_record([
            logs.epoch.to_string(),
            logs.acc.to_string(),
            logs.loss.to_string(),
            logs.lr.to_string(),
            logs.val_acc.to_string(),
            logs.val_loss.to_string(),
        ])?;
        writer.flush()?;
        Ok(())
    }

    fn on_train_end(&mut self) -> anyhow::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Scales the learning rate by `factor` once validation loss stops improving
/// for more than `patience` epochs, never going below `min_lr`.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    pub factor: f64,
    pub patience: usize,
    pub min_lr: f64,
    /// Smallest decrease that counts as an improvement.
    pub min_delta: f64,
    best: Option<f64>,
    wait: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(factor: f64, patience: usize, min_lr: f64) -> Self {
        Self {
            factor,
            patience,
            min_lr,
            min_delta: 1e-4,
            best: None,
            wait: 0,
        }
    }

    /// Feed one monitored value; returns the learning rate to use next.
    pub fn step(&mut self, val_loss: f64, lr: f64) -> f64 {
        let improved = match self.best {
            None => val_loss.is_finite(),
            Some(best) => val_loss < best - self.min_delta,
        };
        if improved {
            self.best = Some(val_loss);
            self.wait = 0;
            return lr;
        }
        let mut next = lr;
        if self.wait >= self.patience && lr > self.min_lr + f64::EPSILON {
            next = (lr * self.factor).max(self.min_lr);
            self.wait = 0;
        }
        self.wait += 1;
        next
    }
}

impl Callback for ReduceLrOnPlateau {
    fn name(&self) -> &'static str {
        "reduce_lr_on_plateau"
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, ctl: &mut EpochControl<'_>) -> anyhow::Result<()> {
        let next = self.step(logs.val_loss, ctl.lr);
        if next < ctl.lr {
            tracing::info!(
                epoch = logs.epoch,
                val_loss = logs.val_loss,
                from = ctl.lr,
                to = next,
                "reducing learning rate"
            );
        }
        ctl.lr = next;
        Ok(())
    }
}

/// Saves weights at the end of every epoch. `{epoch}` in the path is
/// replaced with the 1-based epoch number.
#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    pub filepath: PathBuf,
    pub verbose: bool,
}

impl ModelCheckpoint {
    pub fn new(filepath: impl Into<PathBuf>, verbose: bool) -> Self {
        Self {
            filepath: filepath.into(),
            verbose,
        }
    }

    pub fn path_for_epoch(&self, epoch: usize) -> PathBuf {
        let raw = self.filepath.to_string_lossy();
        if raw.contains("{epoch}") {
            PathBuf::from(raw.replace("{epoch}", &epoch.to_string()))
        } else {
            self.filepath.clone()
        }
    }
}

impl Callback for ModelCheckpoint {
    fn name(&self) -> &'static str {
        "model_checkpoint"
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, ctl: &mut EpochControl<'_>) -> anyhow::Result<()> {
        let path = self.path_for_epoch(logs.epoch);
        let written = ctl.save_weights(&path)?;
        if self.verbose {
            tracing::info!(epoch = logs.epoch, path = %written.display(), "saved checkpoint");
        }
        Ok(())
    }
}

/// Metrics log and LR schedule always; a checkpoint only with an output path.
pub fn build_callbacks(cfg: &MvcnnConfig, save_to: Option<&Path>) -> Vec<Box<dyn Callback>> {
    let mut callbacks: Vec<Box<dyn Callback>> = vec![
        Box::new(CsvLogger::new(cfg.log_file.clone())),
        Box::new(ReduceLrOnPlateau::new(
            cfg.training.lr_factor,
            cfg.training.lr_patience,
            cfg.training.min_lr,
        )),
    ];
    if let Some(path) = save_to.filter(|p| !p.as_os_str().is_empty()) {
        callbacks.push(Box::new(ModelCheckpoint::new(path, true)));
    }
    callbacks
}
