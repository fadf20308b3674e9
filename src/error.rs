use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for textcrop operations.
#[derive(Debug, Error)]
pub enum TextcropError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize annotation store to {path}: {source}")]
    StoreSerialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Annotation store not saved, previous state restored: {source}")]
    StoreNotSaved {
        #[source]
        source: Box<TextcropError>,
    },

    #[error("Failed to parse {what} from {path}: {source}")]
    PayloadParse {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid split ratios: {0}")]
    InvalidRatios(String),

    #[error("Unsupported partition mode: {0}")]
    UnsupportedMode(String),

    #[error("Dataset error: {0}")]
    Dataset(#[from] rusqlite::Error),

    #[error("Dataset {path} does not declare a sample count")]
    MissingSampleCount { path: PathBuf },

    #[error(
        "Conversion exceeded its {}s limit after {written} sample(s)",
        .limit.as_secs()
    )]
    ConversionTimeout { limit: Duration, written: usize },

    #[error("Dataset audit found {missing} missing and {empty_label} empty-label sample(s)")]
    AuditFailed { missing: usize, empty_label: usize },
}
