//! Record types for the annotation store.
//!
//! An [`ImageRecord`] holds everything known about one processed receipt
//! photo; each detected text area inside it is a [`RegionRecord`]. Regions
//! are referenced positionally by their index in `ImageRecord::regions`,
//! which is the detector's emission order and stays stable across saves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A detector quadrilateral: four (x, y) corners in pixel space.
///
/// Detectors emit rotated or skewed boxes, so the four corners are kept
/// verbatim rather than collapsed to an axis-aligned rectangle. The
/// axis-aligned hull is derived on demand via [`Quad::min_x`] and friends.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quad {
    pub points: [[f64; 2]; 4],
}

impl Quad {
    /// Creates a quad from four explicit corners.
    #[inline]
    pub fn new(points: [[f64; 2]; 4]) -> Self {
        Self { points }
    }

    /// Creates an axis-aligned quad from two opposite corners.
    pub fn from_rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self::new([[x0, y0], [x1, y0], [x1, y1], [x0, y1]])
    }

    /// Returns the smallest x coordinate of any corner.
    #[inline]
    pub fn min_x(&self) -> f64 {
        self.points.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min)
    }

    /// Returns the smallest y coordinate of any corner.
    #[inline]
    pub fn min_y(&self) -> f64 {
        self.points.iter().map(|p| p[1]).fold(f64::INFINITY, f64::min)
    }

    /// Returns the largest x coordinate of any corner.
    #[inline]
    pub fn max_x(&self) -> f64 {
        self.points.iter().map(|p| p[0]).fold(f64::NEG_INFINITY, f64::max)
    }

    /// Returns the largest y coordinate of any corner.
    #[inline]
    pub fn max_y(&self) -> f64 {
        self.points.iter().map(|p| p[1]).fold(f64::NEG_INFINITY, f64::max)
    }

    /// Returns true if every coordinate is finite (not NaN or infinite).
    pub fn is_finite(&self) -> bool {
        self.points
            .iter()
            .all(|p| p[0].is_finite() && p[1].is_finite())
    }
}

impl std::fmt::Debug for Quad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Quad")
            .field("points", &self.points)
            .finish()
    }
}

/// A detected text area within an image.
///
/// `text` is the current label: it starts as detector output and is
/// overwritten in place when a human correction lands. `corrected_text` is
/// set only when a correction occurred, and then equals `text`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionRecord {
    /// Detector quadrilateral, not necessarily axis-aligned.
    pub bbox: Quad,

    /// Current label for this region.
    pub text: String,

    /// Detector confidence in [0, 1].
    pub confidence: f64,

    /// Name of the cropped sub-image file in the crops directory.
    pub crop_filename: String,

    /// Human confirmation that `text` is correct.
    #[serde(default)]
    pub verified: bool,

    /// Human-supplied replacement label, present only after a correction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_text: Option<String>,
}

impl RegionRecord {
    /// Creates an unverified region straight from a detection.
    pub fn new(
        bbox: Quad,
        text: impl Into<String>,
        confidence: f64,
        crop_filename: impl Into<String>,
    ) -> Self {
        Self {
            bbox,
            text: text.into(),
            confidence,
            crop_filename: crop_filename.into(),
            verified: false,
            corrected_text: None,
        }
    }
}

/// Everything known about one processed receipt photo.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Original filename; also the store key.
    pub image_name: String,

    /// Where the source photo was found.
    pub original_path: PathBuf,

    /// Archived working copy under the processed images directory.
    pub processed_path: PathBuf,

    /// Detected regions in the detector's emission order.
    pub regions: Vec<RegionRecord>,

    /// Concatenation of region texts at extraction time. Not re-derived
    /// after corrections; image-mode export prefers `corrected_text`.
    pub full_text: String,

    /// Optional whole-image label override supplied by a reviewer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_text: Option<String>,

    /// When this record was created.
    pub created_at: DateTime<Utc>,

    /// Legacy whole-image flag. Derived from per-region verification and
    /// refreshed on every mutation; per-region flags are the source of truth.
    #[serde(default)]
    pub verified: bool,
}

impl ImageRecord {
    /// Creates a record for a freshly extracted image.
    ///
    /// `full_text` is derived once, here, from the region texts.
    pub fn new(
        image_name: impl Into<String>,
        original_path: impl Into<PathBuf>,
        processed_path: impl Into<PathBuf>,
        regions: Vec<RegionRecord>,
    ) -> Self {
        let full_text = regions
            .iter()
            .map(|region| region.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            image_name: image_name.into(),
            original_path: original_path.into(),
            processed_path: processed_path.into(),
            regions,
            full_text,
            corrected_text: None,
            created_at: Utc::now(),
            verified: false,
        }
    }

    /// True when every region has been verified (and at least one exists).
    pub fn all_regions_verified(&self) -> bool {
        !self.regions.is_empty() && self.regions.iter().all(|region| region.verified)
    }

    /// Number of verified regions.
    pub fn verified_region_count(&self) -> usize {
        self.regions.iter().filter(|region| region.verified).count()
    }

    /// Label used when the whole image is one training sample: the
    /// reviewer's override if present, else the extraction-time text.
    pub fn export_label(&self) -> &str {
        self.corrected_text.as_deref().unwrap_or(&self.full_text)
    }
}

/// Collapse embedded newlines, carriage returns, and tabs to single spaces,
/// squeeze whitespace runs, and trim the ends.
///
/// Applied to every human correction before it is stored and to every label
/// before it is written to a ground-truth manifest, so a label can never
/// break the one-sample-per-line, tab-separated format.
pub fn sanitize_label(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
