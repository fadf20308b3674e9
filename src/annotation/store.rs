//! The annotation store: a durable map from image name to [`ImageRecord`].
//!
//! The whole store lives in one JSON document. Loads are fail-soft (a
//! missing or corrupt file yields an empty store), saves are atomic
//! (temp-file-and-rename), and every mutating batch operation follows the
//! same discipline: copy the persisted file to a `.bak` sibling, snapshot
//! the in-memory map, mutate, save — and on a failed save restore both,
//! so the caller never observes a half-applied batch.
//!
//! The store assumes a single writer; there is no internal locking.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::model::{sanitize_label, ImageRecord};
use crate::error::TextcropError;

/// One entry in a verification batch, as produced by the review surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyUpdate {
    pub image_name: String,
    pub region_idx: usize,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_text: Option<String>,
}

/// A positional reference to one region, used by deletion batches.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegionRef {
    pub image_name: String,
    pub region_idx: usize,
}

/// Outcome of a verification batch: how many updates landed, how many were
/// skipped (unknown image, out-of-range index).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub applied: usize,
    pub skipped: usize,
}

/// Outcome of a deletion: regions removed and whole images archived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub removed_regions: usize,
    pub archived_images: usize,
}

/// Aggregate counts over the store, for the `stats` command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub images: usize,
    pub regions: usize,
    pub verified_regions: usize,
    pub corrected_regions: usize,
}

impl StoreStats {
    pub fn pending_regions(&self) -> usize {
        self.regions - self.verified_regions
    }
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Images:       {}", self.images)?;
        writeln!(f, "Text regions: {}", self.regions)?;
        writeln!(f, "  verified:   {}", self.verified_regions)?;
        writeln!(f, "  corrected:  {}", self.corrected_regions)?;
        writeln!(f, "  pending:    {}", self.pending_regions())
    }
}

/// The persistent mapping from image name to annotation record.
#[derive(Debug)]
pub struct AnnotationStore {
    path: PathBuf,
    records: BTreeMap<String, ImageRecord>,
}

impl AnnotationStore {
    /// Opens the store at `path`, loading existing records.
    ///
    /// Fails soft: a missing file yields an empty store, and malformed
    /// content is logged and replaced by an empty store rather than
    /// surfacing an error.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(records) => records,
                Err(err) => {
                    error!(
                        path = %path.display(),
                        error = %err,
                        "malformed annotation store, starting empty"
                    );
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                error!(
                    path = %path.display(),
                    error = %err,
                    "unreadable annotation store, starting empty"
                );
                BTreeMap::new()
            }
        };

        if !records.is_empty() {
            info!(path = %path.display(), images = records.len(), "loaded annotation store");
        }

        Self { path, records }
    }

    /// Path of the persisted store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the retained backup sibling.
    pub fn backup_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, ".bak")
    }

    fn temp_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, ".tmp")
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, image_name: &str) -> bool {
        self.records.contains_key(image_name)
    }

    pub fn get(&self, image_name: &str) -> Option<&ImageRecord> {
        self.records.get(image_name)
    }

    /// Iterates records in image-name order.
    pub fn records(&self) -> impl Iterator<Item = (&String, &ImageRecord)> {
        self.records.iter()
    }

    /// Inserts or replaces a record. The caller is responsible for saving.
    pub fn insert(&mut self, record: ImageRecord) {
        self.records.insert(record.image_name.clone(), record);
    }

    /// Writes the full mapping to disk atomically: serialize to a temp
    /// sibling, then rename over the store file. A failure at any step
    /// leaves the previous on-disk state untouched.
    pub fn save(&self) -> Result<(), TextcropError> {
        let json = serde_json::to_vec_pretty(&self.records).map_err(|source| {
            TextcropError::StoreSerialize {
                path: self.path.clone(),
                source,
            }
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.temp_path();
        fs::write(&tmp, &json)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), images = self.records.len(), "saved annotation store");
        Ok(())
    }

    /// Applies a batch of verification updates.
    ///
    /// Updates naming an unknown image or an out-of-range region index are
    /// logged and skipped; the rest of the batch proceeds. Corrected text is
    /// sanitized and becomes both the region's `text` and `corrected_text`.
    /// The whole batch is persisted under the backup/restore discipline: if
    /// the save fails, neither memory nor disk retains any of the batch.
    pub fn apply_verification(
        &mut self,
        updates: &[VerifyUpdate],
    ) -> Result<BatchOutcome, TextcropError> {
        self.commit(|records| {
            let mut outcome = BatchOutcome::default();
            for update in updates {
                let Some(record) = records.get_mut(&update.image_name) else {
                    warn!(image = %update.image_name, "verification update for unknown image, skipping");
                    outcome.skipped += 1;
                    continue;
                };
                let Some(region) = record.regions.get_mut(update.region_idx) else {
                    warn!(
                        image = %update.image_name,
                        region = update.region_idx,
                        "region index out of range, skipping"
                    );
                    outcome.skipped += 1;
                    continue;
                };

                region.verified = update.verified;
                if let Some(raw) = &update.corrected_text {
                    let text = sanitize_label(raw);
                    if !text.is_empty() {
                        debug!(
                            image = %update.image_name,
                            region = update.region_idx,
                            "corrected region text"
                        );
                        region.text = text.clone();
                        region.corrected_text = Some(text);
                    }
                }

                // Legacy whole-image flag stays a pure derivation.
                record.verified = record.all_regions_verified();
                outcome.applied += 1;
            }
            outcome
        })
    }

    /// Deletes the referenced regions.
    ///
    /// References are grouped by image; within each image the indices are
    /// deduplicated and removed in descending order so earlier removals
    /// cannot shift a not-yet-processed index. An image whose region list
    /// empties is removed from the store in the same operation and its
    /// files are moved into `archive_dir`.
    pub fn delete_regions(
        &mut self,
        items: &[RegionRef],
        archive_dir: &Path,
    ) -> Result<DeleteOutcome, TextcropError> {
        let mut by_image: BTreeMap<&str, BTreeSet<usize>> = BTreeMap::new();
        for item in items {
            by_image
                .entry(item.image_name.as_str())
                .or_default()
                .insert(item.region_idx);
        }

        let (removed, emptied) = self.commit(|records| {
            let mut removed = 0usize;
            let mut emptied_names: Vec<String> = Vec::new();

            for (name, indices) in &by_image {
                let Some(record) = records.get_mut(*name) else {
                    warn!(image = %name, "deletion for unknown image, skipping");
                    continue;
                };
                for idx in indices.iter().rev() {
                    if *idx < record.regions.len() {
                        let gone = record.regions.remove(*idx);
                        debug!(image = %name, region = *idx, text = %gone.text, "removed region");
                        removed += 1;
                    } else {
                        warn!(image = %name, region = *idx, "region index out of range, skipping");
                    }
                }
                record.verified = record.all_regions_verified();
                if record.regions.is_empty() {
                    emptied_names.push((*name).to_string());
                }
            }

            let mut emptied = Vec::with_capacity(emptied_names.len());
            for name in emptied_names {
                if let Some(record) = records.remove(&name) {
                    info!(image = %name, "image has no regions left, removing record");
                    emptied.push(record);
                }
            }

            (removed, emptied)
        })?;

        // Files move only after the store change is durable; a stray file in
        // the working tree is harmless, a record pointing at archived files
        // is not.
        for record in &emptied {
            archive_image_files(record, archive_dir);
        }

        Ok(DeleteOutcome {
            removed_regions: removed,
            archived_images: emptied.len(),
        })
    }

    /// Deletes an image record outright, archiving its files.
    ///
    /// Unknown names are reported as a zero outcome, not an error.
    pub fn delete_image(
        &mut self,
        image_name: &str,
        archive_dir: &Path,
    ) -> Result<DeleteOutcome, TextcropError> {
        if !self.records.contains_key(image_name) {
            warn!(image = image_name, "delete requested for unknown image");
            return Ok(DeleteOutcome::default());
        }

        let removed = self.commit(|records| records.remove(image_name))?;

        match removed {
            Some(record) => {
                let regions = record.regions.len();
                archive_image_files(&record, archive_dir);
                info!(image = image_name, regions, "deleted image record");
                Ok(DeleteOutcome {
                    removed_regions: regions,
                    archived_images: 1,
                })
            }
            None => Ok(DeleteOutcome::default()),
        }
    }

    /// Aggregate counts over all records.
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            images: self.records.len(),
            ..StoreStats::default()
        };
        for record in self.records.values() {
            stats.regions += record.regions.len();
            stats.verified_regions += record.verified_region_count();
            stats.corrected_regions += record
                .regions
                .iter()
                .filter(|region| region.corrected_text.is_some())
                .count();
        }
        stats
    }

    /// Runs one mutating batch under the backup/restore discipline.
    ///
    /// On a failed save the in-memory map reverts to its snapshot and the
    /// persisted file is restored from the backup, so disk and memory stay
    /// in step either way.
    fn commit<R>(
        &mut self,
        mutate: impl FnOnce(&mut BTreeMap<String, ImageRecord>) -> R,
    ) -> Result<R, TextcropError> {
        self.write_backup()?;
        let snapshot = self.records.clone();
        let outcome = mutate(&mut self.records);

        if let Err(err) = self.save() {
            error!(error = %err, "save failed, rolling back");
            self.records = snapshot;
            self.restore_backup();
            return Err(TextcropError::StoreNotSaved {
                source: Box::new(err),
            });
        }

        Ok(outcome)
    }

    fn write_backup(&self) -> Result<(), TextcropError> {
        if self.path.exists() {
            fs::copy(&self.path, self.backup_path())?;
            debug!(path = %self.backup_path().display(), "wrote store backup");
        }
        Ok(())
    }

    fn restore_backup(&self) {
        let backup = self.backup_path();
        if !backup.exists() {
            return;
        }
        match fs::copy(&backup, &self.path) {
            Ok(_) => info!(path = %self.path.display(), "restored annotation store from backup"),
            Err(err) => error!(
                path = %self.path.display(),
                error = %err,
                "failed to restore annotation store from backup"
            ),
        }
    }
}

/// Loads a verification batch from a JSON file.
pub fn load_verify_updates(path: &Path) -> Result<Vec<VerifyUpdate>, TextcropError> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| TextcropError::PayloadParse {
        what: "verification updates",
        path: path.to_path_buf(),
        source,
    })
}

/// Loads a region-deletion batch from a JSON file.
pub fn load_region_refs(path: &Path) -> Result<Vec<RegionRef>, TextcropError> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| TextcropError::PayloadParse {
        what: "region references",
        path: path.to_path_buf(),
        source,
    })
}

/// Moves a deleted record's files into the quarantine directory, never
/// overwriting what is already there. Failures are logged and skipped: a
/// stray file cannot corrupt the store, and every consumer treats missing
/// files as skip-with-warning.
fn archive_image_files(record: &ImageRecord, archive_dir: &Path) {
    if let Err(err) = fs::create_dir_all(archive_dir) {
        error!(
            dir = %archive_dir.display(),
            error = %err,
            "cannot create archive directory, leaving files in place"
        );
        return;
    }

    for path in [&record.processed_path, &record.original_path] {
        if !path.exists() {
            continue;
        }
        let dest = unique_destination(archive_dir, path);
        match fs::rename(path, &dest) {
            Ok(()) => info!(from = %path.display(), to = %dest.display(), "archived image file"),
            Err(err) => warn!(
                from = %path.display(),
                error = %err,
                "failed to archive image file"
            ),
        }
    }
}

/// Picks a destination name in `dir` that does not collide with an existing
/// entry, suffixing the stem with a counter when needed.
fn unique_destination(dir: &Path, src: &Path) -> PathBuf {
    let name = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());

    let candidate = dir.join(&name);
    if !candidate.exists() {
        return candidate;
    }

    let as_path = Path::new(&name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.clone());
    let ext = as_path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut counter = 1u32;
    loop {
        let next = match &ext {
            Some(ext) => format!("{stem}-{counter}.{ext}"),
            None => format!("{stem}-{counter}"),
        };
        let candidate = dir.join(next);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}
