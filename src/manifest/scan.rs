use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;
use walkdir::WalkDir;

use crate::config::is_supported_extension;

/// A photo found on disk
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedFile {
    /// Full path as walked (root joined with the relative part)
    pub path: PathBuf,
    /// Path relative to the image root with forward slashes
    pub relative: String,
    /// Modification time at scan time
    pub modified: SystemTime,
}

/// Recursively find all photos under `root`.
///
/// The walk is sorted by file name so the result order is stable across
/// runs. A missing root simply yields no files. Links are followed, but
/// only while they resolve to somewhere inside the root.
pub fn scan_images(root: &Path, extensions: &[String]) -> Vec<ScannedFile> {
    let mut files = Vec::new();
    let canonical_root = root.canonicalize().ok();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!("skipping unreadable entry: {}", err);
                None
            }
        })
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !is_supported_extension(path, extensions) {
            continue;
        }

        let Some(relative) = relative_to_root(path, root) else {
            continue;
        };

        if let Some(canonical_root) = &canonical_root {
            let inside = path
                .canonicalize()
                .is_ok_and(|resolved| resolved.starts_with(canonical_root));
            if !inside {
                debug!("skipping {}, it resolves outside the image root", path.display());
                continue;
            }
        }

        let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
            debug!("cannot stat {}", path.display());
            continue;
        };

        files.push(ScannedFile {
            path: path.to_path_buf(),
            relative,
            modified,
        });
    }

    files
}

/// Newest modification time among the scanned files
pub fn latest_mtime(files: &[ScannedFile]) -> Option<SystemTime> {
    files.iter().map(|f| f.modified).max()
}

/// `root/a/b.jpg` -> `"a/b.jpg"`; `None` if `path` is not below `root`.
pub fn relative_to_root(path: &Path, root: &Path) -> Option<String> {
    let rest = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rest.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
