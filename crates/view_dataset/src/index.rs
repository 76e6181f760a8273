//! Indexing of class-per-directory image trees.
//!
//! Layout: `root/<class_name>/<image>`. Class directories are sorted by name
//! and numbered from zero; files inside are sorted too, so the index is
//! stable across runs.

use crate::types::{DatasetError, DatasetResult, SampleIndex};
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Debug, Clone)]
pub struct ClassIndex {
    pub root: PathBuf,
    pub classes: Vec<String>,
    pub samples: Vec<SampleIndex>,
}

impl ClassIndex {
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Per-class sample counts, indexed by class.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for s in &self.samples {
            counts[s.label] += 1;
        }
        counts
    }
}

fn read_dir_sorted(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| DatasetError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DatasetError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn is_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| {
                IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false)
}

pub fn index_class_dirs(root: &Path) -> DatasetResult<ClassIndex> {
    let mut classes = Vec::new();
    let mut samples = Vec::new();
    for class_dir in read_dir_sorted(root)? {
        if !class_dir.is_dir() {
            continue;
        }
        let Some(name) = class_dir.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        let label = classes.len();
        classes.push(name.to_string());
        for path in read_dir_sorted(&class_dir)? {
            if is_image(&path) {
                samples.push(SampleIndex { path, label });
            }
        }
    }
    if samples.is_empty() {
        return Err(DatasetError::EmptyDataset(root.to_path_buf()));
    }
    Ok(ClassIndex {
        root: root.to_path_buf(),
        classes,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_match_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let upper = dir.path().join("VIEW.PNG");
        let text = dir.path().join("notes.txt");
        fs::write(&upper, b"x").unwrap();
        fs::write(&text, b"x").unwrap();
        assert!(is_image(&upper));
        assert!(!is_image(&text));
    }

    #[test]
    fn missing_root_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = index_class_dirs(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, DatasetError::Io { .. }));
    }

    #[test]
    fn root_without_images_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("chair")).unwrap();
        let err = index_class_dirs(dir.path()).unwrap_err();
        assert!(matches!(err, DatasetError::EmptyDataset(_)));
    }
}
