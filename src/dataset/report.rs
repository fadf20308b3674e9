//! Audit report for the binary dataset.

use std::fmt;

use serde::Serialize;

const PREVIEW_LIMIT: usize = 10;
const PREVIEW_LABEL_CHARS: usize = 50;

/// One previewed sample, kept for the first few ok entries.
#[derive(Clone, Debug, Serialize)]
pub struct SamplePreview {
    pub ordinal: usize,
    pub label: String,
    pub image_bytes: usize,
}

/// The result of auditing an exported binary dataset.
///
/// Success means every declared ordinal has both blobs and a non-blank
/// label; the preview exists purely so a human can eyeball the content.
#[derive(Clone, Debug, Serialize)]
pub struct AuditReport {
    /// Sample count the dataset declares for itself.
    pub declared: usize,

    pub ok: usize,
    pub missing: usize,
    pub empty_label: usize,

    pub preview: Vec<SamplePreview>,
}

impl AuditReport {
    pub fn new(declared: usize) -> Self {
        Self {
            declared,
            ok: 0,
            missing: 0,
            empty_label: 0,
            preview: Vec::new(),
        }
    }

    pub fn record_ok(&mut self, ordinal: usize, label: &str, image_bytes: usize) {
        self.ok += 1;
        if self.preview.len() < PREVIEW_LIMIT {
            self.preview.push(SamplePreview {
                ordinal,
                label: label.chars().take(PREVIEW_LABEL_CHARS).collect(),
                image_bytes,
            });
        }
    }

    pub fn record_missing(&mut self) {
        self.missing += 1;
    }

    pub fn record_empty_label(&mut self) {
        self.empty_label += 1;
    }

    /// True when no sample is missing or blank.
    pub fn is_ok(&self) -> bool {
        self.missing == 0 && self.empty_label == 0
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dataset declares {} sample(s)", self.declared)?;

        for sample in &self.preview {
            writeln!(
                f,
                "  [{:3}] {} ({} bytes)",
                sample.ordinal, sample.label, sample.image_bytes
            )?;
        }
        if self.ok > self.preview.len() {
            writeln!(f, "  ... and {} more", self.ok - self.preview.len())?;
        }

        if self.is_ok() {
            writeln!(f, "All samples complete")
        } else {
            if self.missing > 0 {
                writeln!(f, "Missing data: {} sample(s)", self.missing)?;
            }
            if self.empty_label > 0 {
                writeln!(f, "Empty labels: {} sample(s)", self.empty_label)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_is_bounded_and_truncated() {
        let mut report = AuditReport::new(20);
        let long_label = "x".repeat(200);
        for ordinal in 1..=20 {
            report.record_ok(ordinal, &long_label, 1000);
        }

        assert_eq!(report.ok, 20);
        assert_eq!(report.preview.len(), PREVIEW_LIMIT);
        assert_eq!(report.preview[0].label.chars().count(), PREVIEW_LABEL_CHARS);
        assert!(report.to_string().contains("and 10 more"));
    }

    #[test]
    fn success_requires_zero_missing_and_zero_empty() {
        let mut report = AuditReport::new(2);
        report.record_ok(1, "fine", 10);
        assert!(report.is_ok());

        report.record_missing();
        assert!(!report.is_ok());
        assert!(report.to_string().contains("Missing data: 1"));
    }

    #[test]
    fn report_serializes_for_machine_consumers() {
        let mut report = AuditReport::new(1);
        report.record_empty_label();

        let json = serde_json::to_string(&report).expect("serialize");
        assert!(json.contains("\"empty_label\":1"));
        assert!(json.contains("\"declared\":1"));
    }
}
