/// The decisions document
///
/// The UI posts its full list of `{name, status}` entries; the server stores
/// the array exactly as received and the sorter reads it back later.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use super::data::Decision;

#[derive(Debug, Error)]
pub enum DecisionsError {
    #[error("decisions file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid decisions document {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct DecisionsStore {
    path: PathBuf,
}

impl DecisionsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the decisions array verbatim: pretty-printed, non-ASCII kept as is.
    pub fn save_raw(&self, decisions: &Value) -> Result<(), DecisionsError> {
        let io_err = |source| DecisionsError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let json = serde_json::to_string_pretty(decisions).map_err(|source| {
            DecisionsError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;
        fs::write(&self.path, json).map_err(io_err)
    }

    /// Load the decisions for sorting.
    pub fn load(&self) -> Result<Vec<Decision>, DecisionsError> {
        if !self.path.is_file() {
            return Err(DecisionsError::NotFound(self.path.clone()));
        }
        let text = fs::read_to_string(&self.path).map_err(|source| DecisionsError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| DecisionsError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::DecisionStatus;
    use serde_json::json;

    #[test]
    fn test_save_raw_keeps_non_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let store = DecisionsStore::new(dir.path().join("output").join("decisions.json"));

        let decisions = json!([
            {"name": "Straße.jpg", "status": "favorite"},
            {"name": "b.jpg", "status": null, "note": "kept verbatim"}
        ]);
        store.save_raw(&decisions).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("Straße.jpg"));
        assert!(text.contains("kept verbatim"));
        assert!(text.contains("\n  {"));

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].status(), Some(DecisionStatus::Favorite));
        assert_eq!(loaded[1].status(), None);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DecisionsStore::new(dir.path().join("nope.json"));
        assert!(matches!(store.load(), Err(DecisionsError::NotFound(_))));
    }
}
