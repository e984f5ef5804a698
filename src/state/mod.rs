/// Persistent state module
///
/// This module handles everything that lives on disk between requests:
/// - Shared data structures (data.rs)
/// - The cached manifest document and its staleness watermark (library.rs)
/// - The user's decisions document (decisions.rs)

pub mod data;
pub mod decisions;
pub mod library;

pub use decisions::{DecisionsError, DecisionsStore};
pub use library::{CacheReadError, ManifestStore};
