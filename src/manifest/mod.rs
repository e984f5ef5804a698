/// Manifest building
///
/// This module handles:
/// - Finding photos under the image root (scan.rs)
/// - Deciding when the cache is stale, enriching photos with exiftool
///   metadata and writing the sorted manifest (builder.rs)

pub mod builder;
pub mod scan;

pub use builder::{BuildOutcome, ManifestBuilder};
pub use scan::{latest_mtime, scan_images, ScannedFile};
