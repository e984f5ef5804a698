use std::collections::{HashMap, HashSet};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::scan::{latest_mtime, relative_to_root, scan_images, ScannedFile};
use crate::config::{is_supported_extension, Config};
use crate::error::ManifestError;
use crate::metadata::exiftool::INSTALL_HINTS;
use crate::metadata::timestamp::{filesystem_dates, local_naive, resolve};
use crate::metadata::{ExifTool, ExtractError, MetadataExtractor, RawMetadata};
use crate::state::data::{sort_newest_first, ImageRecord};
use crate::state::library::ManifestStore;

/// One lock per manifest path; rebuilds of the same file never overlap.
static REBUILD_LOCKS: Lazy<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn rebuild_lock(path: &Path) -> Arc<Mutex<()>> {
    REBUILD_LOCKS
        .lock()
        .entry(path.to_path_buf())
        .or_default()
        .clone()
}

/// Result of a build: always some data, plus an optional advisory
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Manifest, newest first
    pub images: Vec<ImageRecord>,
    /// Non-fatal problem to show the user (degraded data, unreadable cache)
    pub advisory: Option<ManifestError>,
    /// Whether the manifest was recomputed rather than read from cache
    pub rebuilt: bool,
}

impl BuildOutcome {
    pub fn advisory_message(&self) -> Option<String> {
        self.advisory.as_ref().map(ToString::to_string)
    }
}

/// Scans the image root, enriches photos via a `MetadataExtractor` and
/// keeps the cached manifest up to date.
pub struct ManifestBuilder {
    images_root: PathBuf,
    store: ManifestStore,
    extensions: Vec<String>,
    extractor: Arc<dyn MetadataExtractor>,
}

impl ManifestBuilder {
    pub fn new(
        images_root: impl Into<PathBuf>,
        manifest_path: impl Into<PathBuf>,
        extensions: Vec<String>,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Self {
        Self {
            images_root: images_root.into(),
            store: ManifestStore::new(manifest_path),
            extensions,
            extractor,
        }
    }

    /// Builder backed by the real exiftool binary.
    pub fn from_config(cfg: &Config) -> Self {
        let exiftool = ExifTool::new(cfg.exiftool.clone(), cfg.exiftool_timeout);
        Self::new(
            cfg.images_dir.clone(),
            cfg.manifest_path.clone(),
            cfg.extensions.clone(),
            Arc::new(exiftool),
        )
    }

    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    /// Return the manifest, rebuilding it first when needed.
    ///
    /// The cache is reused unless `force` is set, it is missing, it cannot
    /// be read, or some photo is newer than it. A reused cache comes with
    /// the advisory of the build that wrote it, so degraded data stays
    /// flagged. Rebuilds always recompute everything from the current
    /// directory listing.
    pub fn build(&self, force: bool) -> BuildOutcome {
        let lock = rebuild_lock(self.store.path());
        let _guard = lock.lock();

        let scan_started = SystemTime::now();
        let files = scan_images(&self.images_root, &self.extensions);

        if !force && !self.store.is_stale(latest_mtime(&files)) {
            match self.store.try_load() {
                Ok(images) => {
                    return BuildOutcome {
                        images,
                        advisory: self.store.load_advisory(),
                        rebuilt: false,
                    }
                }
                Err(e) => warn!("{}, rebuilding", e),
            }
        }

        self.rebuild(&files, scan_started)
    }

    fn rebuild(&self, files: &[ScannedFile], scan_started: SystemTime) -> BuildOutcome {
        info!(
            "building manifest for {} files under {}",
            files.len(),
            self.images_root.display()
        );

        let enriched = panic::catch_unwind(AssertUnwindSafe(|| self.enrich(files)));

        let (mut images, mut advisory) = match enriched {
            Ok(Ok(images)) => (images, None),
            Ok(Err(err)) => {
                let advisory = ManifestError::from(err);
                warn!("{}", advisory);
                if advisory.is_tool_unavailable() {
                    warn!("{}", INSTALL_HINTS);
                }
                (filesystem_records(files), Some(advisory))
            }
            Err(payload) => {
                let advisory = ManifestError::Unexpected(panic_message(payload.as_ref()));
                error!("{}", advisory);
                (filesystem_records(files), Some(advisory))
            }
        };

        sort_newest_first(&mut images);

        match self.store.save(&images) {
            Ok(()) => {
                // Photos changed after the scan must still look newer.
                if let Err(e) = self.store.set_watermark(scan_started) {
                    warn!("cannot set mtime of {}: {}", self.store.path().display(), e);
                }
                if let Err(e) = self.store.save_advisory(advisory.as_ref()) {
                    warn!(
                        "cannot write {}: {}",
                        self.store.advisory_path().display(),
                        e
                    );
                }
            }
            Err(e) => {
                error!("failed to write {}: {}", self.store.path().display(), e);
                advisory.get_or_insert(ManifestError::Unexpected(format!(
                    "failed to write {}: {}",
                    self.store.path().display(),
                    e
                )));
            }
        }

        let gps_count = images.iter().filter(|r| r.has_gps()).count();
        info!(
            "manifest written: {} images, {} with GPS, output {}",
            images.len(),
            gps_count,
            self.store.path().display()
        );

        BuildOutcome {
            images,
            advisory,
            rebuilt: true,
        }
    }

    /// One batch extraction, mapped back onto the scanned files.
    fn enrich(&self, files: &[ScannedFile]) -> Result<Vec<ImageRecord>, ExtractError> {
        let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
        let raw = self.extractor.extract(&paths)?;
        Ok(self.map_records(files, raw))
    }

    fn map_records(&self, files: &[ScannedFile], raw: Vec<RawMetadata>) -> Vec<ImageRecord> {
        let by_path: HashMap<String, &ScannedFile> =
            files.iter().map(|f| (path_key(&f.path), f)).collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut records = Vec::with_capacity(files.len());

        for entry in raw {
            let Some(source) = entry.source_file.as_deref() else {
                debug!("dropping exiftool record without SourceFile");
                continue;
            };
            let source_path = PathBuf::from(source);
            if !is_supported_extension(&source_path, &self.extensions) {
                continue;
            }

            let relative = match by_path.get(&path_key(&source_path)) {
                Some(file) => file.relative.clone(),
                None => match relative_to_root(&source_path, &self.images_root) {
                    Some(relative) => relative,
                    None => {
                        debug!("dropping {} outside {}", source, self.images_root.display());
                        continue;
                    }
                },
            };
            if seen.contains(&relative) {
                continue;
            }

            // The file may have vanished since the scan.
            let Some(mtime) = current_mtime(&self.images_root.join(&relative)) else {
                debug!("{} disappeared during the build", relative);
                continue;
            };

            let dates = resolve(&entry, local_naive(mtime));
            records.push(ImageRecord::new(&relative, dates, entry.coordinates()));
            seen.insert(relative);
        }

        // Photos exiftool skipped still show up, with filesystem dates.
        for file in files.iter().filter(|f| !seen.contains(&f.relative)) {
            debug!("{} missing from exiftool output", file.relative);
            if let Some(record) = filesystem_record(file) {
                records.push(record);
            }
        }

        records
    }
}

/// Records from filesystem data only: mtime dates, no coordinates.
fn filesystem_records(files: &[ScannedFile]) -> Vec<ImageRecord> {
    files.iter().filter_map(filesystem_record).collect()
}

fn filesystem_record(file: &ScannedFile) -> Option<ImageRecord> {
    let mtime = current_mtime(&file.path)?;
    Some(ImageRecord::new(&file.relative, filesystem_dates(mtime), None))
}

fn current_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Separator-insensitive key for matching exiftool's SourceFile to a scan result
fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("metadata extraction panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("metadata extraction panicked: {s}")
    } else {
        "metadata extraction panicked".to_string()
    }
}
