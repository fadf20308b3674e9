//! Annotation records and the durable store that owns them.
//!
//! This is the hub of the pipeline: the region extractor inserts records,
//! the verification workflow mutates them in place, and the export engine
//! reads them back out. See [`store::AnnotationStore`] for the consistency
//! discipline around mutation.

mod model;
mod store;

pub use model::{sanitize_label, ImageRecord, Quad, RegionRecord};
pub use store::{
    load_region_refs, load_verify_updates, AnnotationStore, BatchOutcome, DeleteOutcome,
    RegionRef, StoreStats, VerifyUpdate,
};
