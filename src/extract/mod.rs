//! Region extraction: detector output in, crop files and region records out.
//!
//! For each detection that clears the confidence threshold, the extractor
//! takes the axis-aligned hull of the detector quad, pads and clamps it,
//! writes the cropped sub-image to its own file, and assembles an
//! unverified [`RegionRecord`]. Per-region failures never abort the rest
//! of an image, and a failed image never aborts the sweep.

use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::annotation::{AnnotationStore, ImageRecord, Quad, RegionRecord};
use crate::detect::{Detection, TextDetector};
use crate::error::TextcropError;
use crate::layout::Layout;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Knobs for region extraction.
#[derive(Clone, Copy, Debug)]
pub struct ExtractOptions {
    /// Detections below this confidence are dropped silently.
    pub confidence_threshold: f64,
    /// Pixels added on every side of a region's bounding rectangle.
    pub padding: u32,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            padding: 5,
        }
    }
}

/// An axis-aligned crop rectangle in pixel coordinates, already padded and
/// clamped to the image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Computes the padded, clamped crop rectangle for a detector quad.
///
/// Returns `None` when the clamped rectangle is degenerate (zero width or
/// height) or the quad contains non-finite coordinates.
pub fn crop_rect(quad: &Quad, padding: u32, image_width: u32, image_height: u32) -> Option<CropRect> {
    if !quad.is_finite() {
        return None;
    }

    let pad = padding as f64;
    let x0 = (quad.min_x() - pad).floor().max(0.0);
    let y0 = (quad.min_y() - pad).floor().max(0.0);
    let x1 = (quad.max_x() + pad).ceil().min(image_width as f64);
    let y1 = (quad.max_y() + pad).ceil().min(image_height as f64);

    if x1 - x0 <= 0.0 || y1 - y0 <= 0.0 {
        return None;
    }

    Some(CropRect {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0) as u32,
        height: (y1 - y0) as u32,
    })
}

/// Crop filename for detection `index` of the image with stem `stem`.
///
/// The index is the detector's emission index, before confidence filtering,
/// so the same detector output always yields the same names.
pub fn crop_filename(stem: &str, index: usize) -> String {
    format!("{stem}_crop_{index:03}.jpg")
}

/// What one image's extraction produced.
#[derive(Debug, Default)]
pub struct RegionExtraction {
    pub regions: Vec<RegionRecord>,
    pub full_text: String,
    /// Detections dropped by the confidence threshold.
    pub below_threshold: usize,
    /// Regions dropped for degenerate rectangles or failed crop writes.
    pub dropped: usize,
}

/// Filters detections, writes one crop file per accepted region, and
/// returns the region records for the caller to insert into the store.
pub fn extract_regions(
    image: &DynamicImage,
    stem: &str,
    detections: &[Detection],
    crops_dir: &Path,
    opts: &ExtractOptions,
) -> Result<RegionExtraction, TextcropError> {
    fs::create_dir_all(crops_dir)?;

    let (width, height) = (image.width(), image.height());
    let mut extraction = RegionExtraction::default();
    let mut lines = Vec::new();

    for (index, detection) in detections.iter().enumerate() {
        if detection.confidence < opts.confidence_threshold {
            extraction.below_threshold += 1;
            continue;
        }

        let Some(rect) = crop_rect(&detection.bbox, opts.padding, width, height) else {
            warn!(stem, index, "degenerate crop rectangle, dropping region");
            extraction.dropped += 1;
            continue;
        };

        let filename = crop_filename(stem, index);
        let crop = image
            .crop_imm(rect.x, rect.y, rect.width, rect.height)
            .to_rgb8();
        if let Err(err) = crop.save(crops_dir.join(&filename)) {
            warn!(stem, index, error = %err, "failed to write crop, dropping region");
            extraction.dropped += 1;
            continue;
        }

        lines.push(detection.text.clone());
        extraction.regions.push(RegionRecord::new(
            detection.bbox,
            detection.text.clone(),
            detection.confidence,
            filename,
        ));
    }

    if extraction.below_threshold > 0 {
        debug!(
            stem,
            filtered = extraction.below_threshold,
            threshold = opts.confidence_threshold,
            "dropped low-confidence detections"
        );
    }

    extraction.full_text = lines.join("\n");
    Ok(extraction)
}

/// Runs the detector on one photo and assembles its [`ImageRecord`].
///
/// The original file is copied into the processed images directory so the
/// record survives the input directory being cleaned out. Returns `None`
/// when no region survives filtering: the store never holds an image with
/// an empty region list.
pub fn process_image<D: TextDetector>(
    path: &Path,
    detector: &D,
    layout: &Layout,
    opts: &ExtractOptions,
) -> Result<Option<ImageRecord>, TextcropError> {
    let image_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| image_name.clone());

    let image = image::open(path).map_err(|source| TextcropError::ImageRead {
        path: path.to_path_buf(),
        source,
    })?;

    let detections = detector.detect(&image_name, &image)?;
    let extraction = extract_regions(&image, &stem, &detections, &layout.crops_dir(), opts)?;

    if extraction.regions.is_empty() {
        warn!(image = %image_name, "no usable text regions, skipping image");
        return Ok(None);
    }

    fs::create_dir_all(layout.images_dir())?;
    let processed_path = layout.images_dir().join(&image_name);
    fs::copy(path, &processed_path)?;

    Ok(Some(ImageRecord::new(
        image_name,
        path.to_path_buf(),
        processed_path,
        extraction.regions,
    )))
}

/// Totals for one sweep over the input directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Processes every unannotated photo in the input directory and saves the
/// store once at the end.
///
/// Already-annotated images are skipped unless `overwrite` is set. A photo
/// that fails to process is logged and counted; the sweep continues.
pub fn process_input_dir<D: TextDetector>(
    store: &mut AnnotationStore,
    detector: &D,
    layout: &Layout,
    opts: &ExtractOptions,
    overwrite: bool,
) -> Result<SweepSummary, TextcropError> {
    let mut photos: Vec<PathBuf> = WalkDir::new(layout.input_dir())
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    photos.sort();

    info!(count = photos.len(), dir = %layout.input_dir().display(), "sweeping input directory");

    let mut summary = SweepSummary::default();
    for path in &photos {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !overwrite && store.contains(&name) {
            debug!(image = %name, "already annotated, skipping");
            summary.skipped += 1;
            continue;
        }

        match process_image(path, detector, layout, opts) {
            Ok(Some(record)) => {
                info!(image = %name, regions = record.regions.len(), "annotated image");
                store.insert(record);
                summary.processed += 1;
            }
            Ok(None) => {
                summary.skipped += 1;
            }
            Err(err) => {
                error!(image = %name, error = %err, "failed to process image");
                summary.failed += 1;
            }
        }
    }

    store.save()?;
    Ok(summary)
}
