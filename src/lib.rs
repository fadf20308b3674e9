//! Textcrop: receipt photos in, a labeled text-recognition corpus out.
//!
//! The pipeline is human-in-the-loop: an opaque detector proposes text
//! regions, the extractor crops them and fills the annotation store, a
//! reviewer verifies or corrects each region, and the export engine
//! deterministically partitions the verified data into train/valid/test
//! ground-truth splits for an external training toolchain.
//!
//! # Modules
//!
//! - [`annotation`]: record model and the durable annotation store
//! - [`detect`]: the detector capability boundary
//! - [`extract`]: region extraction and the input-directory sweep
//! - [`export`]: deterministic partitioning and ground-truth manifests
//! - [`dataset`]: binary dataset conversion and read-only audit
//! - [`layout`]: shared on-disk workspace layout
//! - [`error`]: error types for textcrop operations

pub mod annotation;
pub mod dataset;
pub mod detect;
pub mod error;
pub mod export;
pub mod extract;
pub mod layout;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

pub use error::TextcropError;

use annotation::AnnotationStore;
use export::{ExportOptions, SplitMode};
use extract::ExtractOptions;
use layout::Layout;

/// The textcrop CLI application.
#[derive(Parser)]
#[command(name = "textcrop")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory of incoming receipt photos.
    #[arg(long, global = true, default_value = "input")]
    input: PathBuf,

    /// Working directory holding the annotation store, crops, and archives.
    #[arg(long, global = true, default_value = "processed")]
    processed: PathBuf,

    /// Output directory for the train/valid/test ground-truth splits.
    #[arg(long, global = true, default_value = "dataset_gt")]
    dataset: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Detect and crop text regions for every new photo in the input directory.
    Process(ProcessArgs),
    /// Apply a batch of human verification updates to the store.
    Verify(VerifyArgs),
    /// Delete individual text regions from the store.
    DeleteRegions(DeleteRegionsArgs),
    /// Delete an image and all of its regions from the store.
    DeleteImage(DeleteImageArgs),
    /// Show annotation store statistics.
    Stats,
    /// Partition verified data and write the ground-truth splits.
    Export(ExportArgs),
    /// Convert ground-truth splits into the binary training dataset.
    Convert(ConvertArgs),
    /// Audit an exported binary dataset for missing or empty samples.
    Audit(AuditArgs),
}

/// Arguments for the process subcommand.
#[derive(clap::Args)]
struct ProcessArgs {
    /// Detector sidecar file (JSON: image name -> detections).
    #[arg(long)]
    detections: PathBuf,

    /// Minimum detector confidence to keep a region.
    #[arg(long, default_value_t = 0.5)]
    confidence_threshold: f64,

    /// Pixels of padding around each region crop.
    #[arg(long, default_value_t = 5)]
    padding: u32,

    /// Re-process photos that are already in the store.
    #[arg(long)]
    overwrite: bool,
}

/// Arguments for the verify subcommand.
#[derive(clap::Args)]
struct VerifyArgs {
    /// JSON batch of verification updates.
    updates: PathBuf,
}

/// Arguments for the delete-regions subcommand.
#[derive(clap::Args)]
struct DeleteRegionsArgs {
    /// JSON batch of region references.
    regions: PathBuf,
}

/// Arguments for the delete-image subcommand.
#[derive(clap::Args)]
struct DeleteImageArgs {
    /// Image name (the store key).
    image_name: String,
}

/// Arguments for the export subcommand.
#[derive(clap::Args)]
struct ExportArgs {
    /// Fraction of samples for the training split.
    #[arg(long, default_value_t = 0.8)]
    train_ratio: f64,

    /// Fraction of samples for the validation split.
    #[arg(long, default_value_t = 0.1)]
    valid_ratio: f64,

    /// Partition unit ('region' or 'image').
    #[arg(long, default_value = "region")]
    mode: String,

    /// Shuffle seed; fixed so repeated runs produce the same split.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Arguments for the convert subcommand.
#[derive(clap::Args)]
struct ConvertArgs {
    /// Splits to convert (defaults to every split with a manifest).
    #[arg(long, value_delimiter = ',')]
    splits: Vec<String>,

    /// Output directory for the binary datasets.
    #[arg(long, default_value = "dataset_bin")]
    out: PathBuf,

    /// Conversion time limit in seconds.
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,
}

/// Arguments for the audit subcommand.
#[derive(clap::Args)]
struct AuditArgs {
    /// Binary dataset file to audit.
    dataset_file: PathBuf,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Run the textcrop CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), TextcropError> {
    let cli = Cli::parse();
    let layout = Layout::new(cli.input, cli.processed, cli.dataset);

    match cli.command {
        Some(Commands::Process(args)) => run_process(&layout, args),
        Some(Commands::Verify(args)) => run_verify(&layout, args),
        Some(Commands::DeleteRegions(args)) => run_delete_regions(&layout, args),
        Some(Commands::DeleteImage(args)) => run_delete_image(&layout, args),
        Some(Commands::Stats) => run_stats(&layout),
        Some(Commands::Export(args)) => run_export(&layout, args),
        Some(Commands::Convert(args)) => run_convert(&layout, args),
        Some(Commands::Audit(args)) => run_audit(args),
        None => {
            println!("textcrop {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Receipt text-region annotation and training-corpus export.");
            println!();
            println!("Run 'textcrop --help' for usage information.");
            Ok(())
        }
    }
}

/// Execute the process subcommand.
fn run_process(layout: &Layout, args: ProcessArgs) -> Result<(), TextcropError> {
    layout.ensure_dirs()?;

    let detector = detect::SidecarDetector::from_file(&args.detections)?;
    let mut store = AnnotationStore::open(layout.annotations_file());
    let opts = ExtractOptions {
        confidence_threshold: args.confidence_threshold,
        padding: args.padding,
    };

    let summary = extract::process_input_dir(&mut store, &detector, layout, &opts, args.overwrite)?;
    println!(
        "Annotated {} image(s) ({} skipped, {} failed)",
        summary.processed, summary.skipped, summary.failed
    );
    Ok(())
}

/// Execute the verify subcommand.
fn run_verify(layout: &Layout, args: VerifyArgs) -> Result<(), TextcropError> {
    let updates = annotation::load_verify_updates(&args.updates)?;
    let mut store = AnnotationStore::open(layout.annotations_file());
    let outcome = store.apply_verification(&updates)?;
    println!(
        "Applied {} update(s), skipped {}",
        outcome.applied, outcome.skipped
    );
    Ok(())
}

/// Execute the delete-regions subcommand.
fn run_delete_regions(layout: &Layout, args: DeleteRegionsArgs) -> Result<(), TextcropError> {
    let items = annotation::load_region_refs(&args.regions)?;
    let mut store = AnnotationStore::open(layout.annotations_file());
    let outcome = store.delete_regions(&items, &layout.deleted_dir())?;
    println!(
        "Removed {} region(s); archived {} image(s)",
        outcome.removed_regions, outcome.archived_images
    );
    Ok(())
}

/// Execute the delete-image subcommand.
fn run_delete_image(layout: &Layout, args: DeleteImageArgs) -> Result<(), TextcropError> {
    let mut store = AnnotationStore::open(layout.annotations_file());
    let outcome = store.delete_image(&args.image_name, &layout.deleted_dir())?;
    if outcome.archived_images == 0 {
        println!("No such image: {}", args.image_name);
    } else {
        println!(
            "Deleted {} with {} region(s)",
            args.image_name, outcome.removed_regions
        );
    }
    Ok(())
}

/// Execute the stats subcommand.
fn run_stats(layout: &Layout) -> Result<(), TextcropError> {
    let store = AnnotationStore::open(layout.annotations_file());
    print!("{}", store.stats());
    Ok(())
}

/// Execute the export subcommand.
fn run_export(layout: &Layout, args: ExportArgs) -> Result<(), TextcropError> {
    let mode: SplitMode = args.mode.parse()?;
    let opts = ExportOptions {
        train_ratio: args.train_ratio,
        valid_ratio: args.valid_ratio,
        mode,
        seed: args.seed,
    };

    let store = AnnotationStore::open(layout.annotations_file());
    let report = export::export(&store, layout, &opts)?;
    print!("{report}");
    Ok(())
}

/// Execute the convert subcommand.
fn run_convert(layout: &Layout, args: ConvertArgs) -> Result<(), TextcropError> {
    let timeout = Duration::from_secs(args.timeout_secs);
    let splits: Vec<String> = if args.splits.is_empty() {
        ["train", "valid", "test"]
            .iter()
            .map(|s| s.to_string())
            .filter(|s| layout.split_dir(s).join("gt.txt").exists())
            .collect()
    } else {
        args.splits
    };

    if splits.is_empty() {
        println!(
            "No ground-truth splits found under {}. Run 'textcrop export' first.",
            layout.dataset_dir().display()
        );
        return Ok(());
    }

    fs::create_dir_all(&args.out)?;
    for split in &splits {
        let output = args.out.join(format!("{split}.db"));
        let summary = dataset::convert_split(&layout.split_dir(split), &output, timeout)?;
        println!(
            "{}: {} sample(s) -> {} ({} skipped)",
            split,
            summary.written,
            output.display(),
            summary.skipped
        );
    }
    Ok(())
}

/// Execute the audit subcommand.
fn run_audit(args: AuditArgs) -> Result<(), TextcropError> {
    let report = dataset::audit(&args.dataset_file)?;

    match args.output.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&report)
                .unwrap_or_else(|_| "{}".to_string());
            println!("{json}");
        }
        _ => {
            print!("{report}");
        }
    }

    if report.is_ok() {
        Ok(())
    } else {
        Err(TextcropError::AuditFailed {
            missing: report.missing,
            empty_label: report.empty_label,
        })
    }
}
