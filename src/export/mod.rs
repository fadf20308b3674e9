//! Partitioning and ground-truth export.
//!
//! Verified annotations are shuffled with a fixed seed, split into
//! train/valid/test, and materialized as one directory per split holding
//! the sample files plus a tab-separated `gt.txt` manifest. Repeated runs
//! over the same store contents produce the same split membership — the
//! seed is part of the options precisely so experiments can be reproduced.

mod report;

pub use report::{ExportReport, SplitSummary};

use std::fs;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::annotation::{sanitize_label, AnnotationStore};
use crate::error::TextcropError;
use crate::layout::Layout;

/// The unit of partitioning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitMode {
    /// Each verified region is one sample; its crop file is exported.
    Region,
    /// Each image with at least one verified region is one sample; the
    /// whole processed image is exported.
    Image,
}

impl std::fmt::Display for SplitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitMode::Region => write!(f, "region"),
            SplitMode::Image => write!(f, "image"),
        }
    }
}

impl std::str::FromStr for SplitMode {
    type Err = TextcropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "region" => Ok(SplitMode::Region),
            "image" => Ok(SplitMode::Image),
            other => Err(TextcropError::UnsupportedMode(format!(
                "'{}' (supported: region, image)",
                other
            ))),
        }
    }
}

/// Export options.
#[derive(Clone, Copy, Debug)]
pub struct ExportOptions {
    pub train_ratio: f64,
    pub valid_ratio: f64,
    pub mode: SplitMode,
    /// Shuffle seed. Fixed by default so splits are reproducible.
    pub seed: u64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            train_ratio: 0.8,
            valid_ratio: 0.1,
            mode: SplitMode::Region,
            seed: 42,
        }
    }
}

/// Validates ratio preconditions before any file is touched.
pub fn validate_export_options(opts: &ExportOptions) -> Result<(), TextcropError> {
    if !(opts.train_ratio > 0.0 && opts.train_ratio < 1.0) {
        return Err(TextcropError::InvalidRatios(format!(
            "train_ratio must be in (0, 1), got {}",
            opts.train_ratio
        )));
    }
    if !(0.0..1.0).contains(&opts.valid_ratio) {
        return Err(TextcropError::InvalidRatios(format!(
            "valid_ratio must be in [0, 1), got {}",
            opts.valid_ratio
        )));
    }
    if opts.train_ratio + opts.valid_ratio > 1.0 {
        return Err(TextcropError::InvalidRatios(format!(
            "train_ratio + valid_ratio must be <= 1, got {}",
            opts.train_ratio + opts.valid_ratio
        )));
    }
    Ok(())
}

/// Computes (train, valid, test) sizes for `n_total` samples.
///
/// Train and valid take their floors and test takes the remainder, with two
/// adjustments: in image mode a corpus of three or more always keeps one
/// validation sample, and a corpus too small to give train its floor sends
/// the leftover to train instead of test — a single verified sample must
/// land in train, not test.
pub fn split_sizes(
    n_total: usize,
    train_ratio: f64,
    valid_ratio: f64,
    mode: SplitMode,
) -> (usize, usize, usize) {
    let mut n_train = (n_total as f64 * train_ratio).floor() as usize;
    let mut n_valid = (n_total as f64 * valid_ratio).floor() as usize;

    if mode == SplitMode::Image && n_total >= 3 && n_valid == 0 {
        n_valid = 1;
        n_train = n_train.saturating_sub(1);
    }

    let mut n_test = n_total - n_train - n_valid;
    if n_train == 0 && n_test > 0 {
        n_train = n_test;
        n_test = 0;
    }

    (n_train, n_valid, n_test)
}

/// One sample headed for a split directory.
#[derive(Clone, Debug)]
struct Sample {
    filename: String,
    label: String,
    source: PathBuf,
}

/// Partitions the store's verified data and writes the ground-truth splits.
///
/// An empty verified set is a normal outcome: the report says so and
/// nothing is written. Samples whose source file has gone missing, or whose
/// label sanitizes to nothing, are skipped with a warning.
pub fn export(
    store: &AnnotationStore,
    layout: &Layout,
    opts: &ExportOptions,
) -> Result<ExportReport, TextcropError> {
    validate_export_options(opts)?;

    let mut samples = collect_samples(store, layout, opts.mode);
    if samples.is_empty() {
        info!("no verified samples, nothing to export");
        return Ok(ExportReport::empty(opts.mode));
    }

    let mut rng = StdRng::seed_from_u64(opts.seed);
    samples.shuffle(&mut rng);

    let (n_train, n_valid, _) = split_sizes(samples.len(), opts.train_ratio, opts.valid_ratio, opts.mode);

    let mut report = ExportReport::new(opts.mode, samples.len());
    let bounds = [
        ("train", 0, n_train),
        ("valid", n_train, n_train + n_valid),
        ("test", n_train + n_valid, samples.len()),
    ];

    for (name, start, end) in bounds {
        let subset = &samples[start..end];
        if subset.is_empty() {
            report.push_split(SplitSummary::empty(name));
            continue;
        }
        let summary = write_split(layout, name, subset, &mut report)?;
        info!(split = name, samples = summary.samples, "wrote split");
        report.push_split(summary);
    }

    Ok(report)
}

/// Collects the export candidates in deterministic store order.
fn collect_samples(store: &AnnotationStore, layout: &Layout, mode: SplitMode) -> Vec<Sample> {
    let crops_dir = layout.crops_dir();
    match mode {
        SplitMode::Region => store
            .records()
            .flat_map(|(_, record)| {
                record
                    .regions
                    .iter()
                    .filter(|region| region.verified)
                    .map(|region| Sample {
                        filename: region.crop_filename.clone(),
                        label: region.text.clone(),
                        source: crops_dir.join(&region.crop_filename),
                    })
                    .collect::<Vec<_>>()
            })
            .collect(),
        SplitMode::Image => store
            .records()
            .filter(|(_, record)| record.verified_region_count() > 0)
            .map(|(_, record)| Sample {
                filename: record.image_name.clone(),
                label: record.export_label().to_string(),
                source: record.processed_path.clone(),
            })
            .collect(),
    }
}

/// Materializes one split: copies sample files and writes its `gt.txt`.
fn write_split(
    layout: &Layout,
    name: &'static str,
    samples: &[Sample],
    report: &mut ExportReport,
) -> Result<SplitSummary, TextcropError> {
    let dir = layout.split_dir(name);
    fs::create_dir_all(&dir)?;

    let manifest_path = dir.join("gt.txt");
    let mut manifest = BufWriter::new(fs::File::create(&manifest_path)?);
    let mut written = 0usize;

    for sample in samples {
        let label = sanitize_label(&sample.label);
        if label.is_empty() {
            warn!(file = %sample.filename, "label empty after sanitizing, skipping sample");
            report.skipped += 1;
            continue;
        }
        if !sample.source.exists() {
            warn!(file = %sample.source.display(), "sample file missing, skipping");
            report.skipped += 1;
            continue;
        }
        if let Err(err) = fs::copy(&sample.source, dir.join(&sample.filename)) {
            warn!(file = %sample.filename, error = %err, "failed to copy sample, skipping");
            report.skipped += 1;
            continue;
        }

        writeln!(manifest, "{}\t{}", sample.filename, label)?;
        written += 1;
    }

    manifest.flush()?;
    report.written += written;
    Ok(SplitSummary::written(name, written, manifest_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{ImageRecord, Quad, RegionRecord};
    use std::path::Path;
    use tempfile::tempdir;

    fn verified_region(text: &str, crop: &str) -> RegionRecord {
        let mut region =
            RegionRecord::new(Quad::from_rect(0.0, 0.0, 10.0, 10.0), text, 0.9, crop);
        region.verified = true;
        region
    }

    fn fixture(dir: &Path, images: usize, regions_per_image: usize) -> (AnnotationStore, Layout) {
        let layout = Layout::new(
            dir.join("input"),
            dir.join("processed"),
            dir.join("dataset_gt"),
        );
        layout.ensure_dirs().expect("ensure");

        let mut store = AnnotationStore::open(layout.annotations_file());
        for i in 0..images {
            let image_name = format!("r{i}.jpg");
            let processed = layout.images_dir().join(&image_name);
            fs::write(&processed, format!("photo {i}")).expect("write image");

            let mut regions = Vec::new();
            for j in 0..regions_per_image {
                let crop = format!("r{i}_crop_{j:03}.jpg");
                fs::write(layout.crops_dir().join(&crop), format!("crop {i}/{j}"))
                    .expect("write crop");
                regions.push(verified_region(&format!("text {i} {j}"), &crop));
            }
            store.insert(ImageRecord::new(
                image_name.clone(),
                dir.join(&image_name),
                processed,
                regions,
            ));
        }
        store.save().expect("save");
        (store, layout)
    }

    #[test]
    fn ratio_validation_rejects_bad_inputs() {
        let bad = [
            (0.0, 0.1),
            (1.0, 0.0),
            (0.8, 1.0),
            (0.8, -0.1),
            (0.7, 0.4),
        ];
        for (train_ratio, valid_ratio) in bad {
            let opts = ExportOptions { train_ratio, valid_ratio, ..ExportOptions::default() };
            assert!(
                validate_export_options(&opts).is_err(),
                "expected rejection for ({train_ratio}, {valid_ratio})"
            );
        }

        let opts = ExportOptions::default();
        assert!(validate_export_options(&opts).is_ok());
    }

    #[test]
    fn split_sizes_take_floors_with_remainder_to_test() {
        assert_eq!(split_sizes(10, 0.8, 0.1, SplitMode::Region), (8, 1, 1));
        assert_eq!(split_sizes(20, 0.75, 0.15, SplitMode::Region), (15, 3, 2));
        assert_eq!(split_sizes(0, 0.8, 0.1, SplitMode::Region), (0, 0, 0));
    }

    #[test]
    fn single_sample_lands_in_train() {
        assert_eq!(split_sizes(1, 0.8, 0.1, SplitMode::Region), (1, 0, 0));
    }

    #[test]
    fn image_mode_keeps_a_validation_sample_for_small_corpora() {
        // floor(3 * 0.1) is 0, but three images must still yield one.
        assert_eq!(split_sizes(3, 0.8, 0.1, SplitMode::Image), (1, 1, 1));
        // Region mode is not subject to the floor.
        assert_eq!(split_sizes(3, 0.8, 0.1, SplitMode::Region), (2, 0, 1));
    }

    #[test]
    fn split_sizes_always_partition_exactly() {
        for n in [1usize, 2, 3, 7, 10, 99, 1000] {
            for (tr, vr) in [(0.8, 0.1), (0.5, 0.5), (0.9, 0.0), (0.34, 0.33)] {
                for mode in [SplitMode::Region, SplitMode::Image] {
                    let (a, b, c) = split_sizes(n, tr, vr, mode);
                    assert_eq!(a + b + c, n, "n={n} tr={tr} vr={vr} mode={mode}");
                }
            }
        }
    }

    #[test]
    fn export_without_verified_data_is_a_normal_empty_outcome() {
        let dir = tempdir().expect("tempdir");
        let layout = Layout::new(
            dir.path().join("input"),
            dir.path().join("processed"),
            dir.path().join("dataset_gt"),
        );
        let store = AnnotationStore::open(layout.annotations_file());

        let report = export(&store, &layout, &ExportOptions::default()).expect("export");
        assert!(report.nothing_to_export());
        assert_eq!(report.written, 0);
        assert!(!layout.split_dir("train").exists());
    }

    #[test]
    fn region_export_writes_manifest_and_copies_crops() {
        let dir = tempdir().expect("tempdir");
        let (store, layout) = fixture(dir.path(), 3, 4);

        let report = export(&store, &layout, &ExportOptions::default()).expect("export");
        assert_eq!(report.total_candidates, 12);
        assert_eq!(report.written, 12);
        assert_eq!(report.skipped, 0);

        let train_manifest =
            fs::read_to_string(layout.split_dir("train").join("gt.txt")).expect("manifest");
        let lines: Vec<&str> = train_manifest.lines().collect();
        assert_eq!(lines.len(), 9); // floor(12 * 0.8)
        for line in &lines {
            let (filename, label) = line.split_once('\t').expect("tab-separated");
            assert!(layout.split_dir("train").join(filename).exists());
            assert!(!label.is_empty());
        }
    }

    #[test]
    fn export_is_deterministic_for_a_fixed_seed() {
        let dir_a = tempdir().expect("tempdir");
        let dir_b = tempdir().expect("tempdir");
        let (store_a, layout_a) = fixture(dir_a.path(), 3, 4);
        let (store_b, layout_b) = fixture(dir_b.path(), 3, 4);

        let opts = ExportOptions::default();
        export(&store_a, &layout_a, &opts).expect("export");
        export(&store_b, &layout_b, &opts).expect("export");

        for split in ["train", "valid", "test"] {
            let a = fs::read_to_string(layout_a.split_dir(split).join("gt.txt")).expect("gt");
            let b = fs::read_to_string(layout_b.split_dir(split).join("gt.txt")).expect("gt");
            assert_eq!(a, b, "split {split} differs between identical runs");
        }
    }

    #[test]
    fn different_seeds_produce_different_shuffles() {
        let dir_a = tempdir().expect("tempdir");
        let dir_b = tempdir().expect("tempdir");
        let (store_a, layout_a) = fixture(dir_a.path(), 5, 4);
        let (store_b, layout_b) = fixture(dir_b.path(), 5, 4);

        export(&store_a, &layout_a, &ExportOptions::default()).expect("export");
        export(
            &store_b,
            &layout_b,
            &ExportOptions { seed: 1337, ..ExportOptions::default() },
        )
        .expect("export");

        let a = fs::read_to_string(layout_a.split_dir("train").join("gt.txt")).expect("gt");
        let b = fs::read_to_string(layout_b.split_dir("train").join("gt.txt")).expect("gt");
        assert_ne!(a, b);
    }

    #[test]
    fn missing_crop_is_skipped_not_fatal() {
        let dir = tempdir().expect("tempdir");
        let (store, layout) = fixture(dir.path(), 1, 3);
        fs::remove_file(layout.crops_dir().join("r0_crop_001.jpg")).expect("remove");

        let report = export(&store, &layout, &ExportOptions::default()).expect("export");
        assert_eq!(report.total_candidates, 3);
        assert_eq!(report.written, 2);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn unverified_regions_are_not_candidates() {
        let dir = tempdir().expect("tempdir");
        let (mut store, layout) = fixture(dir.path(), 1, 2);
        // Re-open one region.
        let mut record = store.get("r0.jpg").expect("record").clone();
        record.regions[0].verified = false;
        store.insert(record);

        let report = export(&store, &layout, &ExportOptions::default()).expect("export");
        assert_eq!(report.total_candidates, 1);
    }

    #[test]
    fn image_mode_uses_whole_images_and_their_labels() {
        let dir = tempdir().expect("tempdir");
        let (mut store, layout) = fixture(dir.path(), 1, 2);
        let mut record = store.get("r0.jpg").expect("record").clone();
        record.corrected_text = Some("full corrected\ttext".to_string());
        store.insert(record);

        let opts = ExportOptions { mode: SplitMode::Image, ..ExportOptions::default() };
        let report = export(&store, &layout, &opts).expect("export");
        assert_eq!(report.total_candidates, 1);

        let manifest =
            fs::read_to_string(layout.split_dir("train").join("gt.txt")).expect("manifest");
        assert_eq!(manifest, "r0.jpg\tfull corrected text\n");
        assert!(layout.split_dir("train").join("r0.jpg").exists());
    }

    #[test]
    fn mode_parses_from_cli_strings() {
        assert_eq!("region".parse::<SplitMode>().expect("parse"), SplitMode::Region);
        assert_eq!("image".parse::<SplitMode>().expect("parse"), SplitMode::Image);
        assert!("both".parse::<SplitMode>().is_err());
    }
}
