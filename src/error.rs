/// Error kinds for the manifest pipeline
///
/// None of these stop the user from seeing their photos. The builder always
/// returns data; a `ManifestError` rides along as an advisory string the UI
/// can show ("GPS and EXIF dates were skipped because ...").
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metadata::ExtractError;

#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum ManifestError {
    /// The metadata tool could not be found; filesystem dates were used.
    #[error("{tool} not found on PATH, using filesystem dates (no GPS)")]
    ToolUnavailable { tool: String },

    /// The metadata tool ran but failed or produced garbage.
    #[error("metadata extraction failed, using filesystem dates (no GPS): {0}")]
    Extraction(String),

    /// Anything else that went wrong while building.
    #[error("manifest build error: {0}")]
    Unexpected(String),
}

impl ManifestError {
    pub fn is_tool_unavailable(&self) -> bool {
        matches!(self, ManifestError::ToolUnavailable { .. })
    }
}

impl From<ExtractError> for ManifestError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::ToolUnavailable { tool } => ManifestError::ToolUnavailable { tool },
            other => ManifestError::Extraction(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_errors_map_to_advisory_kinds() {
        let missing: ManifestError = ExtractError::ToolUnavailable {
            tool: "exiftool".to_string(),
        }
        .into();
        assert!(missing.is_tool_unavailable());
        assert!(missing.to_string().contains("exiftool"));

        let failed: ManifestError = ExtractError::Failed {
            code: Some(1),
            stderr: "boom".to_string(),
        }
        .into();
        assert!(matches!(failed, ManifestError::Extraction(ref msg) if msg.contains("boom")));
    }

    #[test]
    fn test_advisory_survives_json() {
        let advisory = ManifestError::ToolUnavailable {
            tool: "exiftool".to_string(),
        };
        let json = serde_json::to_string(&advisory).unwrap();
        assert_eq!(serde_json::from_str::<ManifestError>(&json).unwrap(), advisory);
    }
}
