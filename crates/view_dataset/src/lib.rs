//! Labeled image datasets for the multi-view CNN.
//!
//! This crate provides:
//! - Indexing of class-per-directory image trees
//! - Resize + per-channel normalization of decoded views
//! - Restartable batch generators that wrap around at the end of each pass

pub mod generator;
pub mod index;
pub mod transform;
pub mod types;

pub use generator::{
    batches_per_epoch, BatchSource, DataGenerator, EpochCursor, GeneratorConfig,
    InMemoryGenerator,
};
pub use index::{index_class_dirs, ClassIndex};
pub use transform::{load_view, Normalize};
pub use types::*;
