/// Decision sorter
///
/// Reads the decisions document and files every decided photo into
/// `<out>/<status>/<name>`. Undecided photos stay where they are. Per-file
/// problems are counted and logged but never stop the run.
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use filetime::{set_file_mtime, FileTime};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::state::data::{Decision, DecisionStatus};
use crate::state::decisions::{DecisionsError, DecisionsStore};

#[derive(Debug, Error)]
pub enum SortError {
    #[error("decisions file not found: {}", .0.display())]
    MissingDecisions(PathBuf),

    #[error("image folder not found: {}", .0.display())]
    MissingImages(PathBuf),

    #[error(transparent)]
    Decisions(#[from] DecisionsError),

    #[error("failed to create {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct SortOptions {
    pub decisions_path: PathBuf,
    pub images_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Copy instead of move, leaving the source in place
    pub copy: bool,
}

impl SortOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            decisions_path: cfg.decisions_path.clone(),
            images_dir: cfg.images_dir.clone(),
            out_dir: cfg.sorted_dir.clone(),
            copy: false,
        }
    }
}

/// Counters for one sorter run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SortReport {
    pub moved: usize,
    pub copied: usize,
    pub skipped: usize,
    pub left_in_place: usize,
}

pub fn run(opts: &SortOptions) -> Result<SortReport, SortError> {
    if !opts.decisions_path.exists() {
        return Err(SortError::MissingDecisions(opts.decisions_path.clone()));
    }
    if !opts.images_dir.is_dir() {
        return Err(SortError::MissingImages(opts.images_dir.clone()));
    }

    let decisions = DecisionsStore::new(&opts.decisions_path).load()?;

    for status in DecisionStatus::ALL {
        let dir = opts.out_dir.join(status.folder());
        fs::create_dir_all(&dir).map_err(|source| SortError::CreateDir { path: dir, source })?;
    }

    let mut report = SortReport::default();
    for decision in &decisions {
        sort_one(opts, decision, &mut report);
    }

    info!(
        "sorted into {}: {} moved, {} copied, {} skipped, {} left in place",
        opts.out_dir.display(),
        report.moved,
        report.copied,
        report.skipped,
        report.left_in_place
    );
    Ok(report)
}

fn sort_one(opts: &SortOptions, decision: &Decision, report: &mut SortReport) {
    let Some(name) = decision.name.as_deref().filter(|n| !n.is_empty()) else {
        report.skipped += 1;
        return;
    };
    let Some(status) = decision.status() else {
        report.left_in_place += 1;
        return;
    };
    if !is_safe_name(name) {
        warn!("refusing unsafe file name: {}", name);
        report.skipped += 1;
        return;
    }

    let src = opts.images_dir.join(name);
    let dest = opts.out_dir.join(status.folder()).join(name);

    if !src.is_file() {
        warn!("file missing, skipped: {}", src.display());
        report.skipped += 1;
        return;
    }

    let result = if opts.copy {
        copy_preserving_mtime(&src, &dest)
    } else {
        move_file(&src, &dest)
    };

    match result {
        Ok(()) => {
            debug!("{} -> {}", src.display(), dest.display());
            if opts.copy {
                report.copied += 1;
            } else {
                report.moved += 1;
            }
        }
        Err(e) => {
            warn!("failed to file {} under {}: {}", name, status.folder(), e);
            report.skipped += 1;
        }
    }
}

/// Relative, non-empty and free of `..`
fn is_safe_name(name: &str) -> bool {
    let path = Path::new(name);
    path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn copy_preserving_mtime(src: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dest)?;
    let meta = fs::metadata(src)?;
    set_file_mtime(dest, FileTime::from_last_modification_time(&meta))
}

fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }
    // rename fails across filesystems
    copy_preserving_mtime(src, dest)?;
    fs::remove_file(src)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixture {
        _dir: tempfile::TempDir,
        opts: SortOptions,
    }

    fn fixture(decisions: serde_json::Value, images: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let images_dir = dir.path().join("images");
        fs::create_dir_all(&images_dir).unwrap();
        for name in images {
            let path = images_dir.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, name.as_bytes()).unwrap();
        }
        let decisions_path = dir.path().join("output").join("decisions.json");
        DecisionsStore::new(&decisions_path).save_raw(&decisions).unwrap();

        let opts = SortOptions {
            decisions_path,
            images_dir,
            out_dir: dir.path().join("output").join("sorted"),
            copy: false,
        };
        Fixture { _dir: dir, opts }
    }

    #[test]
    fn test_missing_source_is_skipped() {
        let fx = fixture(json!([{"name": "a.jpg", "status": "favorite"}]), &[]);

        let report = run(&fx.opts).unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.moved, 0);
        let favorites = fx.opts.out_dir.join("favorite");
        assert!(favorites.is_dir());
        assert_eq!(fs::read_dir(favorites).unwrap().count(), 0);
        for status in DecisionStatus::ALL {
            assert!(fx.opts.out_dir.join(status.folder()).is_dir());
        }
    }

    #[test]
    fn test_move_files_by_status() {
        let fx = fixture(
            json!([
                {"name": "a.jpg", "status": "favorite"},
                {"name": "trip/b.jpg", "status": "delete"},
                {"name": "c.jpg", "status": "null"},
                {"name": "d.jpg", "status": "maybe"},
                {"name": "e.jpg", "status": null},
                {"status": "like"}
            ]),
            &["a.jpg", "trip/b.jpg", "c.jpg", "d.jpg", "e.jpg"],
        );

        let report = run(&fx.opts).unwrap();

        assert_eq!(
            report,
            SortReport {
                moved: 2,
                copied: 0,
                skipped: 1,
                left_in_place: 3,
            }
        );
        assert!(fx.opts.out_dir.join("favorite/a.jpg").is_file());
        assert!(fx.opts.out_dir.join("delete/trip/b.jpg").is_file());
        assert!(!fx.opts.images_dir.join("a.jpg").exists());
        for kept in ["c.jpg", "d.jpg", "e.jpg"] {
            assert!(fx.opts.images_dir.join(kept).is_file());
        }
    }

    #[test]
    fn test_copy_keeps_source_and_mtime() {
        let mut fx = fixture(json!([{"name": "a.jpg", "status": "later"}]), &["a.jpg"]);
        fx.opts.copy = true;
        let src = fx.opts.images_dir.join("a.jpg");
        set_file_mtime(&src, FileTime::from_unix_time(1_500_000_000, 0)).unwrap();

        let report = run(&fx.opts).unwrap();

        assert_eq!(report.copied, 1);
        assert!(src.is_file());
        let dest = fx.opts.out_dir.join("later/a.jpg");
        assert_eq!(fs::read(&dest).unwrap(), b"a.jpg");
        let mtime = FileTime::from_last_modification_time(&fs::metadata(&dest).unwrap());
        assert_eq!(mtime.unix_seconds(), 1_500_000_000);
    }

    #[test]
    fn test_unsafe_names_are_skipped() {
        let fx = fixture(
            json!([
                {"name": "../outside.jpg", "status": "like"},
                {"name": "/etc/passwd", "status": "like"}
            ]),
            &[],
        );
        let report = run(&fx.opts).unwrap();
        assert_eq!(report.skipped, 2);
    }

    #[test]
    fn test_missing_inputs_fail() {
        let fx = fixture(json!([]), &[]);

        let mut no_json = fx.opts.clone();
        no_json.decisions_path = fx.opts.decisions_path.with_file_name("nope.json");
        assert!(matches!(run(&no_json), Err(SortError::MissingDecisions(_))));

        let mut no_images = fx.opts.clone();
        no_images.images_dir = fx.opts.images_dir.join("nope");
        assert!(matches!(run(&no_images), Err(SortError::MissingImages(_))));
    }
}
