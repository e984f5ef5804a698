use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Extensions enriched with exiftool by default
pub const DEFAULT_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "heic", "heif", "png", "tif", "tiff"];

/// Client log lines from the browser end up here, inside the log directory
pub const CLIENT_LOG: &str = "frontend.log";

/// Runtime configuration
///
/// Everything has a default relative to `root`; `PIC_SORTER_*` environment
/// variables override the defaults and CLI flags override those.
#[derive(Debug, Clone)]
pub struct Config {
    /// Working root; relative paths below are resolved against it
    pub root: PathBuf,
    /// Address the HTTP server binds to
    pub bind: String,
    /// Folder with the photos to browse
    pub images_dir: PathBuf,
    /// Cached manifest document
    pub manifest_path: PathBuf,
    /// Decisions document written by the UI
    pub decisions_path: PathBuf,
    /// Target folder of the sorter
    pub sorted_dir: PathBuf,
    /// Log directory (server.log, frontend.log)
    pub log_dir: PathBuf,
    /// Lowercase extensions (no dot) counted as photos
    pub extensions: Vec<String>,
    /// exiftool binary name or path
    pub exiftool: String,
    /// Upper bound for one exiftool run
    pub exiftool_timeout: Duration,
    /// Largest request body accepted by the server
    pub max_body_bytes: usize,
}

impl Config {
    /// Defaults for a working root, without looking at the environment.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            bind: "0.0.0.0:8000".to_string(),
            images_dir: root.join("images"),
            manifest_path: root.join("static").join("images.json"),
            decisions_path: root.join("output").join("decisions.json"),
            sorted_dir: root.join("output").join("sorted"),
            log_dir: root.join("logs"),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            exiftool: "exiftool".to_string(),
            exiftool_timeout: Duration::from_secs(120),
            max_body_bytes: 16 * 1024 * 1024,
            root,
        }
    }

    /// Load from `PIC_SORTER_*` variables; `root` wins over `PIC_SORTER_ROOT`.
    pub fn from_env(root: Option<PathBuf>) -> Self {
        let root = root
            .or_else(|| env::var_os("PIC_SORTER_ROOT").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));
        let mut cfg = Self::with_root(root);

        if let Ok(bind) = env::var("PIC_SORTER_BIND") {
            cfg.bind = bind;
        }
        if let Some(p) = env_path(&cfg.root, "PIC_SORTER_IMAGES_DIR") {
            cfg.images_dir = p;
        }
        if let Some(p) = env_path(&cfg.root, "PIC_SORTER_MANIFEST") {
            cfg.manifest_path = p;
        }
        if let Some(p) = env_path(&cfg.root, "PIC_SORTER_DECISIONS") {
            cfg.decisions_path = p;
        }
        if let Some(p) = env_path(&cfg.root, "PIC_SORTER_SORTED_DIR") {
            cfg.sorted_dir = p;
        }
        if let Some(p) = env_path(&cfg.root, "PIC_SORTER_LOG_DIR") {
            cfg.log_dir = p;
        }
        if let Ok(raw) = env::var("PIC_SORTER_EXTENSIONS") {
            let parsed = parse_extensions(&raw);
            if !parsed.is_empty() {
                cfg.extensions = parsed;
            }
        }
        if let Ok(tool) = env::var("PIC_SORTER_EXIFTOOL") {
            cfg.exiftool = tool;
        }
        cfg.exiftool_timeout = Duration::from_secs(env_u64(
            "PIC_SORTER_EXIFTOOL_TIMEOUT_SECS",
            cfg.exiftool_timeout.as_secs(),
        ));
        cfg.max_body_bytes = env_usize("PIC_SORTER_MAX_BODY_BYTES", cfg.max_body_bytes);

        cfg
    }

    /// Resolve a user-supplied path against the working root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn client_log_path(&self) -> PathBuf {
        self.log_dir.join(CLIENT_LOG)
    }

    /// Path shown to clients: relative to the root when possible.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// Whether a file counts as a photo, by extension, case-insensitively.
pub fn is_supported_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| extensions.iter().any(|e| *e == ext))
}

/// `"JPG, .png,webp"` -> `["jpg", "png", "webp"]`
pub fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

fn env_path(root: &Path, name: &str) -> Option<PathBuf> {
    let raw = env::var_os(name)?;
    if raw.is_empty() {
        return None;
    }
    let path = PathBuf::from(raw);
    Some(if path.is_absolute() { path } else { root.join(path) })
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_relative_to_root() {
        let cfg = Config::with_root("/srv/photos");
        assert_eq!(cfg.images_dir, PathBuf::from("/srv/photos/images"));
        assert_eq!(cfg.manifest_path, PathBuf::from("/srv/photos/static/images.json"));
        assert_eq!(cfg.client_log_path(), PathBuf::from("/srv/photos/logs/frontend.log"));
        assert_eq!(cfg.display_path(&cfg.decisions_path), "output/decisions.json");
    }

    #[test]
    fn test_extension_matching_is_case_insensitive() {
        let cfg = Config::with_root(".");
        let supported = |p: &str| is_supported_extension(Path::new(p), &cfg.extensions);
        assert!(supported("a/IMG_1.JPG"));
        assert!(supported("b.HeIc"));
        assert!(!supported("c.gif"));
        assert!(!supported("jpg"));
    }

    #[test]
    fn test_parse_extensions() {
        assert_eq!(parse_extensions("JPG, .png,,webp "), vec!["jpg", "png", "webp"]);
        assert!(parse_extensions(" , ").is_empty());
    }
}
