//! The detector boundary.
//!
//! The text-detection model itself is opaque to this crate: all we rely on
//! is that, given an image, something can produce a sequence of
//! (quadrilateral, recognized string, confidence) triples. [`TextDetector`]
//! is that capability, constructed once by the caller and passed down —
//! there is no process-wide cached model.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::annotation::Quad;
use crate::error::TextcropError;

/// One detector hit: where the text is, what it reads as, and how sure the
/// detector is (0.0 to 1.0).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: Quad,
    pub text: String,
    pub confidence: f64,
}

/// Capability interface over the opaque text detector.
pub trait TextDetector {
    /// Detects text regions in `image`. `image_name` identifies the image
    /// for detectors that key off precomputed results.
    fn detect(
        &self,
        image_name: &str,
        image: &DynamicImage,
    ) -> Result<Vec<Detection>, TextcropError>;
}

/// Replays the output of an external detector run from a JSON sidecar file
/// mapping image name to its detections.
///
/// This is the production boundary: whatever model produced the file, its
/// internals never enter this crate.
#[derive(Debug)]
pub struct SidecarDetector {
    detections: BTreeMap<String, Vec<Detection>>,
}

impl SidecarDetector {
    /// Loads the sidecar file.
    pub fn from_file(path: &Path) -> Result<Self, TextcropError> {
        let content = fs::read_to_string(path)?;
        let detections =
            serde_json::from_str(&content).map_err(|source| TextcropError::PayloadParse {
                what: "detector sidecar",
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self { detections })
    }

    /// Builds a detector from an in-memory map. Used by tests and by
    /// callers that already hold detector output.
    pub fn from_map(detections: BTreeMap<String, Vec<Detection>>) -> Self {
        Self { detections }
    }
}

impl TextDetector for SidecarDetector {
    fn detect(
        &self,
        image_name: &str,
        _image: &DynamicImage,
    ) -> Result<Vec<Detection>, TextcropError> {
        match self.detections.get(image_name) {
            Some(found) => Ok(found.clone()),
            None => {
                warn!(image = image_name, "no detector output for image");
                Ok(Vec::new())
            }
        }
    }
}
