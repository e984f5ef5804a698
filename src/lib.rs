//! pic-sorter: browse a folder of photos, tag each one, sort the files by decision.
//!
//! The interesting part is the manifest builder (`manifest`), which scans the
//! image folder, enriches every photo with capture dates and GPS via exiftool,
//! and caches the sorted result as JSON for the browsing UI.

pub mod config;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod metadata;
pub mod server;
pub mod sorter;
pub mod state;

pub use config::Config;
pub use error::ManifestError;
pub use manifest::{BuildOutcome, ManifestBuilder};
pub use metadata::{ExifTool, MetadataExtractor, RawMetadata};
pub use state::data::{Decision, DecisionStatus, ImageRecord};
