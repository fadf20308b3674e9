//! On-disk workspace layout shared by every pipeline stage.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The three top-level directories the pipeline works across: incoming
/// photos, the processing workspace (store, crops, archives), and the
/// exported ground-truth splits.
#[derive(Clone, Debug)]
pub struct Layout {
    input_dir: PathBuf,
    processed_dir: PathBuf,
    dataset_dir: PathBuf,
}

impl Layout {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        processed_dir: impl Into<PathBuf>,
        dataset_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            processed_dir: processed_dir.into(),
            dataset_dir: dataset_dir.into(),
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn dataset_dir(&self) -> &Path {
        &self.dataset_dir
    }

    /// The single-file annotation store.
    pub fn annotations_file(&self) -> PathBuf {
        self.processed_dir.join("annotations.json")
    }

    /// Cropped region files, one per accepted detection.
    pub fn crops_dir(&self) -> PathBuf {
        self.processed_dir.join("crops")
    }

    /// Archived working copies of processed photos.
    pub fn images_dir(&self) -> PathBuf {
        self.processed_dir.join("images")
    }

    /// Quarantine for files whose annotation record was deleted.
    pub fn deleted_dir(&self) -> PathBuf {
        self.processed_dir.join("deleted")
    }

    /// Directory of one ground-truth split (`train`, `valid`, `test`).
    pub fn split_dir(&self, split: &str) -> PathBuf {
        self.dataset_dir.join(split)
    }

    /// Creates every directory the pipeline writes into.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        for dir in [
            &self.input_dir,
            &self.processed_dir,
            &self.crops_dir(),
            &self.images_dir(),
            &self.deleted_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ensure_dirs_creates_the_working_tree() {
        let dir = tempdir().expect("tempdir");
        let layout = Layout::new(
            dir.path().join("input"),
            dir.path().join("processed"),
            dir.path().join("dataset_gt"),
        );
        layout.ensure_dirs().expect("ensure");

        assert!(layout.input_dir().is_dir());
        assert!(layout.crops_dir().is_dir());
        assert!(layout.images_dir().is_dir());
        assert!(layout.deleted_dir().is_dir());
        // Split directories appear only when an export writes them.
        assert!(!layout.split_dir("train").exists());
    }
}
