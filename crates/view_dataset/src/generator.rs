//! Restartable batch generators.
//!
//! A generator never runs dry: after the last (possibly short) batch of a
//! pass its `batch_index` wraps back to zero and, when shuffling, the sample
//! order is redrawn. Callers decide how many batches make up a pass, usually
//! `batches_per_epoch()`.

use crate::index::{index_class_dirs, ClassIndex};
use crate::transform::{load_view, Normalize};
use crate::types::{DatasetError, DatasetResult, ImageBatch, ViewSample};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::path::Path;
use std::time::Instant;

/// Number of batches in one full pass, counting a trailing short batch.
pub fn batches_per_epoch(num_samples: usize, batch_size: usize) -> usize {
    num_samples.div_ceil(batch_size.max(1))
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub batch_size: usize,
    pub shuffle: bool,
    /// Seed for reproducible shuffling.
    pub seed: Option<u64>,
    /// Views are resized to `image_size x image_size`.
    pub image_size: u32,
    pub num_classes: usize,
    pub normalize: Normalize,
    /// Threads used to decode the images of one batch.
    pub num_workers: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle: true,
            seed: None,
            image_size: 224,
            num_classes: 40,
            normalize: Normalize::default(),
            num_workers: 2,
        }
    }
}

/// Sample order and position within the current pass.
#[derive(Debug, Clone)]
pub struct EpochCursor {
    order: Vec<usize>,
    batch_size: usize,
    batch_index: usize,
    total_batches_seen: usize,
    shuffle: bool,
    rng: StdRng,
}

impl EpochCursor {
    pub fn new(num_samples: usize, batch_size: usize, shuffle: bool, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let mut order: Vec<usize> = (0..num_samples).collect();
        if shuffle {
            order.shuffle(&mut rng);
        }
        Self {
            order,
            batch_size: batch_size.max(1),
            batch_index: 0,
            total_batches_seen: 0,
            shuffle,
            rng,
        }
    }

    pub fn num_samples(&self) -> usize {
        self.order.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Index of the next batch within the current pass.
    pub fn batch_index(&self) -> usize {
        self.batch_index
    }

    pub fn total_batches_seen(&self) -> usize {
        self.total_batches_seen
    }

    pub fn batches_per_epoch(&self) -> usize {
        batches_per_epoch(self.order.len(), self.batch_size)
    }

    /// Sample positions of the next batch; wraps after the last one.
    pub fn next_indices(&mut self) -> Vec<usize> {
        let n = self.order.len();
        if n == 0 {
            return Vec::new();
        }
        let start = self.batch_index * self.batch_size;
        let end = (start + self.batch_size).min(n);
        let batch = self.order[start..end].to_vec();
        self.total_batches_seen += 1;
        if end >= n {
            self.batch_index = 0;
            if self.shuffle {
                self.order.shuffle(&mut self.rng);
            }
        } else {
            self.batch_index += 1;
        }
        batch
    }
}

/// A streaming, restartable source of labeled batches.
pub trait BatchSource {
    fn num_samples(&self) -> usize;
    fn batch_size(&self) -> usize;
    fn num_classes(&self) -> usize;
    fn batch_index(&self) -> usize;

    fn batches_per_epoch(&self) -> usize {
        batches_per_epoch(self.num_samples(), self.batch_size())
    }

    fn next_batch<B: Backend>(&mut self, device: &B::Device) -> DatasetResult<ImageBatch<B>>;
}

fn check_label(label: usize, num_classes: usize) -> DatasetResult<()> {
    if label >= num_classes {
        return Err(DatasetError::LabelOutOfRange { label, num_classes });
    }
    Ok(())
}

fn assemble<B: Backend>(
    samples: &[&ViewSample],
    image_size: usize,
    num_classes: usize,
    device: &B::Device,
) -> DatasetResult<ImageBatch<B>> {
    let n = samples.len();
    let per_image = 3 * image_size * image_size;
    let mut images = Vec::with_capacity(n * per_image);
    let mut one_hot = vec![0.0f32; n * num_classes];
    let mut labels = Vec::with_capacity(n);
    for (i, sample) in samples.iter().enumerate() {
        if sample.image_chw.len() != per_image {
            return Err(DatasetError::Other(format!(
                "view buffer has {} values, expected {per_image}",
                sample.image_chw.len()
            )));
        }
        check_label(sample.label, num_classes)?;
        images.extend_from_slice(&sample.image_chw);
        one_hot[i * num_classes + sample.label] = 1.0;
        labels.push(sample.label);
    }
    let images = Tensor::<B, 4>::from_data(
        TensorData::new(images, [n, 3, image_size, image_size]),
        device,
    );
    let targets = Tensor::<B, 2>::from_data(TensorData::new(one_hot, [n, num_classes]), device);
    Ok(ImageBatch {
        images,
        targets,
        labels,
    })
}

/// Streams views from a class-per-directory tree, decoding each batch on a
/// small worker pool.
pub struct DataGenerator {
    index: ClassIndex,
    cursor: EpochCursor,
    cfg: GeneratorConfig,
    pool: rayon::ThreadPool,
}

impl DataGenerator {
    pub fn from_dir(root: &Path, cfg: GeneratorConfig) -> DatasetResult<Self> {
        let index = index_class_dirs(root)?;
        Self::from_index(index, cfg)
    }

    pub fn from_index(index: ClassIndex, cfg: GeneratorConfig) -> DatasetResult<Self> {
        if index.num_classes() != cfg.num_classes {
            return Err(DatasetError::ClassCountMismatch {
                root: index.root.clone(),
                found: index.num_classes(),
                expected: cfg.num_classes,
            });
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cfg.num_workers.max(1))
            .build()
            .map_err(|e| DatasetError::Other(format!("failed to start loader pool: {e}")))?;
        let cursor = EpochCursor::new(index.len(), cfg.batch_size, cfg.shuffle, cfg.seed);
        tracing::debug!(
            root = %index.root.display(),
            samples = index.len(),
            classes = index.num_classes(),
            batch_size = cursor.batch_size(),
            "indexed view dataset"
        );
        Ok(Self {
            index,
            cursor,
            cfg,
            pool,
        })
    }

    pub fn classes(&self) -> &[String] {
        &self.index.classes
    }

    pub fn total_batches_seen(&self) -> usize {
        self.cursor.total_batches_seen()
    }
}

impl BatchSource for DataGenerator {
    fn num_samples(&self) -> usize {
        self.index.len()
    }

    fn batch_size(&self) -> usize {
        self.cursor.batch_size()
    }

    fn num_classes(&self) -> usize {
        self.cfg.num_classes
    }

    fn batch_index(&self) -> usize {
        self.cursor.batch_index()
    }

    fn next_batch<B: Backend>(&mut self, device: &B::Device) -> DatasetResult<ImageBatch<B>> {
        let positions = self.cursor.next_indices();
        let started = Instant::now();
        let samples = &self.index.samples;
        let size = self.cfg.image_size;
        let normalize = self.cfg.normalize;
        let loaded: Vec<ViewSample> = self.pool.install(|| {
            positions
                .par_iter()
                .map(|&pos| load_view(&samples[pos], size, &normalize))
                .collect::<DatasetResult<Vec<_>>>()
        })?;
        let refs: Vec<&ViewSample> = loaded.iter().collect();
        let batch = assemble(&refs, size as usize, self.cfg.num_classes, device)?;
        tracing::trace!(
            samples = batch.len(),
            load_ms = started.elapsed().as_secs_f64() * 1000.0,
            "loaded batch"
        );
        Ok(batch)
    }
}

/// Same batching as `DataGenerator`, over views already decoded in memory.
pub struct InMemoryGenerator {
    samples: Vec<ViewSample>,
    cursor: EpochCursor,
    image_size: usize,
    num_classes: usize,
}

impl InMemoryGenerator {
    pub fn new(samples: Vec<ViewSample>, cfg: &GeneratorConfig) -> DatasetResult<Self> {
        if samples.is_empty() {
            return Err(DatasetError::EmptyDataset("<memory>".into()));
        }
        let image_size = cfg.image_size as usize;
        let per_image = 3 * image_size * image_size;
        for sample in &samples {
            check_label(sample.label, cfg.num_classes)?;
            if sample.image_chw.len() != per_image {
                return Err(DatasetError::Other(format!(
                    "view buffer has {} values, expected {per_image}",
                    sample.image_chw.len()
                )));
            }
        }
        let cursor = EpochCursor::new(samples.len(), cfg.batch_size, cfg.shuffle, cfg.seed);
        Ok(Self {
            samples,
            cursor,
            image_size,
            num_classes: cfg.num_classes,
        })
    }

    pub fn total_batches_seen(&self) -> usize {
        self.cursor.total_batches_seen()
    }
}

impl BatchSource for InMemoryGenerator {
    fn num_samples(&self) -> usize {
        self.samples.len()
    }

    fn batch_size(&self) -> usize {
        self.cursor.batch_size()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn batch_index(&self) -> usize {
        self.cursor.batch_index()
    }

    fn next_batch<B: Backend>(&mut self, device: &B::Device) -> DatasetResult<ImageBatch<B>> {
        let positions = self.cursor.next_indices();
        let refs: Vec<&ViewSample> = positions.iter().map(|&p| &self.samples[p]).collect();
        assemble(&refs, self.image_size, self.num_classes, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_division_counts_short_batch() {
        assert_eq!(batches_per_epoch(4000, 32), 125);
        assert_eq!(batches_per_epoch(10, 4), 3);
        assert_eq!(batches_per_epoch(8, 4), 2);
        assert_eq!(batches_per_epoch(0, 4), 0);
        assert_eq!(batches_per_epoch(3, 0), 3);
    }

    #[test]
    fn cursor_wraps_after_short_batch() {
        let mut cursor = EpochCursor::new(10, 4, false, None);
        assert_eq!(cursor.next_indices(), vec![0, 1, 2, 3]);
        assert_eq!(cursor.batch_index(), 1);
        assert_eq!(cursor.next_indices(), vec![4, 5, 6, 7]);
        assert_eq!(cursor.next_indices(), vec![8, 9]);
        assert_eq!(cursor.batch_index(), 0);
        assert_eq!(cursor.next_indices(), vec![0, 1, 2, 3]);
        assert_eq!(cursor.total_batches_seen(), 4);
    }

    #[test]
    fn shuffled_pass_covers_every_sample_once() {
        let mut cursor = EpochCursor::new(9, 2, true, Some(7));
        for _ in 0..3 {
            let mut seen = Vec::new();
            for _ in 0..cursor.batches_per_epoch() {
                seen.extend(cursor.next_indices());
            }
            assert_eq!(cursor.batch_index(), 0);
            seen.sort_unstable();
            assert_eq!(seen, (0..9).collect::<Vec<_>>());
        }
    }

    #[test]
    fn seeded_cursors_agree() {
        let mut a = EpochCursor::new(20, 5, true, Some(3));
        let mut b = EpochCursor::new(20, 5, true, Some(3));
        for _ in 0..8 {
            assert_eq!(a.next_indices(), b.next_indices());
        }
    }
}
