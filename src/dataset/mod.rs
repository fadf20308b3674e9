//! The binary training dataset: layout, conversion, and audit.
//!
//! The training toolchain consumes a flat key-value store: `num-samples`
//! holds the declared total, and each sample is an `image-%09d` blob paired
//! with a `label-%09d` blob, 1-based. Here that store is a single SQLite
//! file with one two-column table, built from a ground-truth split by
//! [`convert_split`] and checked read-only by [`audit`].

mod report;

pub use report::{AuditReport, SamplePreview};

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{info, warn};

use crate::error::TextcropError;

/// Key holding the declared sample count.
pub const NUM_SAMPLES_KEY: &str = "num-samples";

/// Key of the image blob for a 1-based sample ordinal.
pub fn image_key(ordinal: usize) -> String {
    format!("image-{ordinal:09}")
}

/// Key of the label blob for a 1-based sample ordinal.
pub fn label_key(ordinal: usize) -> String {
    format!("label-{ordinal:09}")
}

/// What one conversion run produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertSummary {
    pub written: usize,
    pub skipped: usize,
}

/// Converts one exported split (its directory plus `gt.txt`) into the
/// binary dataset at `output`.
///
/// Samples whose image file is unreadable are skipped with a warning, as
/// are malformed manifest lines; ordinals stay dense over what was actually
/// written. The run is bounded by `timeout`: on expiry the partial output
/// is removed and a terminal error returned, leaving nothing to retry from.
pub fn convert_split(
    split_dir: &Path,
    output: &Path,
    timeout: Duration,
) -> Result<ConvertSummary, TextcropError> {
    let manifest = fs::read_to_string(split_dir.join("gt.txt"))?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    // Rebuild from scratch; a half-written previous run must not leak in.
    if output.exists() {
        fs::remove_file(output)?;
    }

    let started = Instant::now();
    let mut conn = Connection::open(output)?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS samples (key TEXT PRIMARY KEY, value BLOB NOT NULL)",
    )?;

    let tx = conn.transaction()?;
    let mut written = 0usize;
    let mut skipped = 0usize;
    let mut timed_out = false;

    for (line_idx, line) in manifest.lines().enumerate() {
        if started.elapsed() > timeout {
            timed_out = true;
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let Some((filename, label)) = line.split_once('\t') else {
            warn!(line = line_idx + 1, "malformed ground-truth line, skipping");
            skipped += 1;
            continue;
        };

        let image_path = split_dir.join(filename);
        let bytes = match fs::read(&image_path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(file = %image_path.display(), error = %err, "unreadable sample image, skipping");
                skipped += 1;
                continue;
            }
        };

        let ordinal = written + 1;
        tx.execute(
            "INSERT OR REPLACE INTO samples (key, value) VALUES (?1, ?2)",
            params![image_key(ordinal), bytes],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO samples (key, value) VALUES (?1, ?2)",
            params![label_key(ordinal), label.as_bytes()],
        )?;
        written += 1;
    }

    if timed_out {
        drop(tx);
        drop(conn);
        let _ = fs::remove_file(output);
        return Err(TextcropError::ConversionTimeout {
            limit: timeout,
            written,
        });
    }

    tx.execute(
        "INSERT OR REPLACE INTO samples (key, value) VALUES (?1, ?2)",
        params![NUM_SAMPLES_KEY, written.to_string().into_bytes()],
    )?;
    tx.commit()?;

    info!(output = %output.display(), written, skipped, "converted split");
    Ok(ConvertSummary { written, skipped })
}

/// Audits an exported binary dataset, read-only.
///
/// Every declared ordinal is classified as ok, missing (either key absent),
/// or empty-label (label trims to nothing); the dataset is untouched.
pub fn audit(path: &Path) -> Result<AuditReport, TextcropError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let declared: Option<Vec<u8>> = conn
        .query_row(
            "SELECT value FROM samples WHERE key = ?1",
            params![NUM_SAMPLES_KEY],
            |row| row.get(0),
        )
        .optional()?;
    let declared = match declared {
        Some(raw) => String::from_utf8_lossy(&raw)
            .trim()
            .parse::<usize>()
            .map_err(|_| TextcropError::MissingSampleCount {
                path: path.to_path_buf(),
            })?,
        None => {
            return Err(TextcropError::MissingSampleCount {
                path: path.to_path_buf(),
            })
        }
    };

    let mut report = AuditReport::new(declared);
    let mut stmt = conn.prepare("SELECT value FROM samples WHERE key = ?1")?;

    for ordinal in 1..=declared {
        let image: Option<Vec<u8>> = stmt
            .query_row(params![image_key(ordinal)], |row| row.get(0))
            .optional()?;
        let label: Option<Vec<u8>> = stmt
            .query_row(params![label_key(ordinal)], |row| row.get(0))
            .optional()?;

        match (image, label) {
            (Some(image), Some(label)) => {
                let text = String::from_utf8_lossy(&label);
                if text.trim().is_empty() {
                    report.record_empty_label();
                } else {
                    report.record_ok(ordinal, text.trim(), image.len());
                }
            }
            _ => report.record_missing(),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_split(dir: &Path, samples: &[(&str, &str)]) {
        fs::create_dir_all(dir).expect("mkdir");
        let mut gt = String::new();
        for (filename, label) in samples {
            fs::write(dir.join(filename), format!("jpeg bytes for {filename}"))
                .expect("write image");
            gt.push_str(&format!("{filename}\t{label}\n"));
        }
        fs::write(dir.join("gt.txt"), gt).expect("write gt");
    }

    #[test]
    fn convert_then_audit_roundtrip() {
        let dir = tempdir().expect("tempdir");
        let split = dir.path().join("train");
        write_split(
            &split,
            &[
                ("r1_crop_000.jpg", "SUPERNORMAL"),
                ("r1_crop_002.jpg", "TOTAL 42.00"),
            ],
        );

        let output = dir.path().join("bin").join("train.db");
        let summary =
            convert_split(&split, &output, Duration::from_secs(300)).expect("convert");
        assert_eq!(summary, ConvertSummary { written: 2, skipped: 0 });

        let report = audit(&output).expect("audit");
        assert!(report.is_ok());
        assert_eq!(report.declared, 2);
        assert_eq!(report.ok, 2);
        assert_eq!(report.missing, 0);
        assert_eq!(report.empty_label, 0);
        assert_eq!(report.preview[0].label, "SUPERNORMAL");
    }

    #[test]
    fn convert_skips_missing_images_and_keeps_ordinals_dense() {
        let dir = tempdir().expect("tempdir");
        let split = dir.path().join("train");
        write_split(&split, &[("a.jpg", "first"), ("b.jpg", "second"), ("c.jpg", "third")]);
        fs::remove_file(split.join("b.jpg")).expect("remove");

        let output = dir.path().join("train.db");
        let summary =
            convert_split(&split, &output, Duration::from_secs(300)).expect("convert");
        assert_eq!(summary, ConvertSummary { written: 2, skipped: 1 });

        // Dense ordinals: the audit over the declared count stays clean.
        let report = audit(&output).expect("audit");
        assert!(report.is_ok());
        assert_eq!(report.declared, 2);
    }

    #[test]
    fn expired_timeout_removes_partial_output() {
        let dir = tempdir().expect("tempdir");
        let split = dir.path().join("train");
        write_split(&split, &[("a.jpg", "first")]);

        let output = dir.path().join("train.db");
        let err = convert_split(&split, &output, Duration::ZERO).expect_err("must time out");
        assert!(matches!(err, TextcropError::ConversionTimeout { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn audit_flags_missing_and_empty_samples() {
        let dir = tempdir().expect("tempdir");
        let split = dir.path().join("train");
        write_split(&split, &[("a.jpg", "first"), ("b.jpg", "second"), ("c.jpg", "third")]);

        let output = dir.path().join("train.db");
        convert_split(&split, &output, Duration::from_secs(300)).expect("convert");

        // Sabotage: drop one image blob, blank one label.
        let conn = Connection::open(&output).expect("open");
        conn.execute("DELETE FROM samples WHERE key = ?1", params![image_key(1)])
            .expect("delete");
        conn.execute(
            "UPDATE samples SET value = ?1 WHERE key = ?2",
            params![b"   ".to_vec(), label_key(2)],
        )
        .expect("update");
        drop(conn);

        let report = audit(&output).expect("audit");
        assert!(!report.is_ok());
        assert_eq!(report.missing, 1);
        assert_eq!(report.empty_label, 1);
        assert_eq!(report.ok, 1);
    }

    #[test]
    fn audit_requires_a_declared_count() {
        let dir = tempdir().expect("tempdir");
        let output = dir.path().join("train.db");
        let conn = Connection::open(&output).expect("open");
        conn.execute_batch(
            "CREATE TABLE samples (key TEXT PRIMARY KEY, value BLOB NOT NULL)",
        )
        .expect("create");
        drop(conn);

        let err = audit(&output).expect_err("must fail");
        assert!(matches!(err, TextcropError::MissingSampleCount { .. }));
    }
}
