use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::{set_file_mtime, FileTime};
use thiserror::Error;
use tracing::debug;

use super::data::ImageRecord;
use crate::error::ManifestError;

/// Why a cached manifest could not be used
#[derive(Debug, Error)]
pub enum CacheReadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The ManifestStore manages the cached manifest document.
///
/// The file's own modification time is the staleness watermark: the cache
/// is outdated as soon as any image is newer than it.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the path to the manifest file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Last modification time of the manifest file, if it exists
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    /// Decide whether the cache needs a rebuild.
    ///
    /// - no cache file: stale
    /// - no images at all: fresh (nothing can be newer)
    /// - otherwise stale only if the cache is strictly older than the newest image
    pub fn is_stale(&self, latest_image_mtime: Option<SystemTime>) -> bool {
        let Some(cached_at) = self.modified() else {
            return true;
        };
        match latest_image_mtime {
            None => false,
            Some(latest) => cached_at < latest,
        }
    }

    /// Read and parse the manifest, reporting what went wrong.
    pub fn try_load(&self) -> Result<Vec<ImageRecord>, CacheReadError> {
        let bytes = fs::read(&self.path).map_err(|source| CacheReadError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| CacheReadError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Best-effort load: anything unreadable is an empty manifest.
    pub fn load(&self) -> Vec<ImageRecord> {
        self.try_load().unwrap_or_else(|e| {
            debug!("manifest cache unusable: {}", e);
            Vec::new()
        })
    }

    /// Write the full manifest, pretty-printed.
    ///
    /// The document goes to a sibling temp file first and is renamed into
    /// place, so readers never see a half-written manifest.
    pub fn save(&self, records: &[ImageRecord]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_vec_pretty(records).map_err(io::Error::other)?;

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        fs::write(&tmp_path, &json)?;
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        Ok(())
    }

    /// Pin the cache's modification time to `at`.
    ///
    /// The builder passes the time its scan started, so a photo changed
    /// while a rebuild was running still counts as newer than the cache.
    pub fn set_watermark(&self, at: SystemTime) -> io::Result<()> {
        set_file_mtime(&self.path, FileTime::from_system_time(at))
    }

    /// Sibling file holding the advisory of the build that wrote the cache
    pub fn advisory_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".advisory.json");
        self.path.with_file_name(name)
    }

    /// Record the advisory of the latest rebuild; `None` clears it.
    pub fn save_advisory(&self, advisory: Option<&ManifestError>) -> io::Result<()> {
        let path = self.advisory_path();
        match advisory {
            Some(advisory) => {
                let json = serde_json::to_vec_pretty(advisory).map_err(io::Error::other)?;
                fs::write(path, json)
            }
            None => match fs::remove_file(path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
        }
    }

    /// Advisory stored by the build that wrote the cache, if any.
    pub fn load_advisory(&self) -> Option<ManifestError> {
        let bytes = fs::read(self.advisory_path()).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(advisory) => Some(advisory),
            Err(e) => {
                debug!("ignoring unreadable advisory file: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::timestamp::{parse_timestamp, ResolvedDates};
    use filetime::{set_file_mtime, FileTime};
    use std::time::Duration;

    fn record(name: &str, date: &str) -> ImageRecord {
        let at = parse_timestamp(date).unwrap();
        ImageRecord::new(
            name,
            ResolvedDates {
                display: at,
                original: at,
            },
            None,
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("static").join("images.json"));
        assert!(!store.exists());

        let records = vec![record("a.jpg", "2024-01-01"), record("b.jpg", "2023-01-01")];
        store.save(&records).unwrap();

        assert!(store.exists());
        assert_eq!(store.load(), records);

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.starts_with("[\n  {"));
    }

    #[test]
    fn test_empty_manifest_is_a_valid_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("images.json"));
        store.save(&[]).unwrap();

        assert_eq!(fs::read_to_string(store.path()).unwrap(), "[]");
        assert!(store.try_load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_cache_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("images.json"));
        fs::write(store.path(), "{ not json").unwrap();

        assert!(store.load().is_empty());
        assert!(matches!(store.try_load(), Err(CacheReadError::Parse { .. })));
    }

    #[test]
    fn test_staleness_rules() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("images.json"));
        let now = SystemTime::now();

        // no cache file
        assert!(store.is_stale(Some(now)));
        assert!(store.is_stale(None));

        store.save(&[]).unwrap();
        let cached_at = FileTime::from_system_time(now - Duration::from_secs(60));
        set_file_mtime(store.path(), cached_at).unwrap();

        // no images
        assert!(!store.is_stale(None));
        // images older than the cache
        assert!(!store.is_stale(Some(now - Duration::from_secs(120))));
        // same instant is not stale
        assert!(!store.is_stale(store.modified()));
        // an image touched after the cache
        assert!(store.is_stale(Some(now)));
    }

    #[test]
    fn test_advisory_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("images.json"));
        assert_eq!(store.load_advisory(), None);

        let advisory = ManifestError::ToolUnavailable {
            tool: "exiftool".to_string(),
        };
        store.save_advisory(Some(&advisory)).unwrap();
        assert_eq!(store.advisory_path(), dir.path().join("images.json.advisory.json"));
        assert_eq!(store.load_advisory(), Some(advisory));

        store.save_advisory(None).unwrap();
        assert_eq!(store.load_advisory(), None);
        // clearing twice is fine
        store.save_advisory(None).unwrap();
    }

    #[test]
    fn test_watermark_sets_cache_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("images.json"));
        store.save(&[]).unwrap();

        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        store.set_watermark(at).unwrap();
        assert_eq!(store.modified(), Some(at));
        assert!(store.is_stale(Some(at + Duration::from_secs(1))));
    }
}
