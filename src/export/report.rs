//! Export result reporting.

use std::fmt;
use std::path::PathBuf;

use super::SplitMode;

/// What one split ended up holding.
#[derive(Clone, Debug)]
pub struct SplitSummary {
    /// Split name: `train`, `valid`, or `test`.
    pub name: &'static str,

    /// Samples actually written to the manifest.
    pub samples: usize,

    /// Path of the split's `gt.txt`, when the split is non-empty.
    pub manifest: Option<PathBuf>,
}

impl SplitSummary {
    /// A split that received no samples and wrote no files.
    pub fn empty(name: &'static str) -> Self {
        Self {
            name,
            samples: 0,
            manifest: None,
        }
    }

    /// A materialized split.
    pub fn written(name: &'static str, samples: usize, manifest: PathBuf) -> Self {
        Self {
            name,
            samples,
            manifest: Some(manifest),
        }
    }
}

/// The result of one export run.
///
/// "Nothing to export" is a legitimate outcome, not an error: it means no
/// region has been verified yet.
#[derive(Clone, Debug)]
pub struct ExportReport {
    pub mode: SplitMode,

    /// Verified samples considered for partitioning.
    pub total_candidates: usize,

    /// Samples written across all splits.
    pub written: usize,

    /// Samples dropped for missing files or empty labels.
    pub skipped: usize,

    pub splits: Vec<SplitSummary>,
}

impl ExportReport {
    pub fn new(mode: SplitMode, total_candidates: usize) -> Self {
        Self {
            mode,
            total_candidates,
            written: 0,
            skipped: 0,
            splits: Vec::new(),
        }
    }

    /// Report for a store with no verified data.
    pub fn empty(mode: SplitMode) -> Self {
        Self::new(mode, 0)
    }

    pub fn push_split(&mut self, summary: SplitSummary) {
        self.splits.push(summary);
    }

    /// True when there was no verified data to partition.
    pub fn nothing_to_export(&self) -> bool {
        self.total_candidates == 0
    }
}

impl fmt::Display for ExportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nothing_to_export() {
            return writeln!(
                f,
                "No verified text regions to export yet. Verify annotations first."
            );
        }

        writeln!(
            f,
            "Exported {} of {} verified sample(s) in {} mode ({} skipped):",
            self.written, self.total_candidates, self.mode, self.skipped
        )?;
        for split in &self.splits {
            match &split.manifest {
                Some(manifest) => writeln!(
                    f,
                    "  {}: {} sample(s) -> {}",
                    split.name,
                    split.samples,
                    manifest.display()
                )?,
                None => writeln!(f, "  {}: empty", split.name)?,
            }
        }
        Ok(())
    }
}
